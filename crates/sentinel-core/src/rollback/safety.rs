//! Risk classification of rollback targets.

use std::fmt;

use sentinel_state::CommitStatus;
use serde::{Deserialize, Serialize};

use super::candidates::RollbackCandidate;
use crate::domain::ValidationError;

const CAUTION_AFTER_DAYS: i64 = 7;
const STALE_AFTER_DAYS: i64 = 30;
const LARGE_CHANGE_FILES: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Safe,
    Caution,
    Risky,
}

impl RiskLevel {
    /// One level up; `Risky` stays `Risky`.
    pub fn escalate(self) -> Self {
        match self {
            RiskLevel::Safe => RiskLevel::Caution,
            RiskLevel::Caution | RiskLevel::Risky => RiskLevel::Risky,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Safe => write!(f, "safe"),
            RiskLevel::Caution => write!(f, "caution"),
            RiskLevel::Risky => write!(f, "risky"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyAssessment {
    pub risk_level: RiskLevel,
    pub warnings: Vec<String>,
    pub requires_confirmation: bool,
    pub age_days: i64,
}

/// Classify how risky it is to roll back to `candidate`.
///
/// The current head is never a valid target and is rejected before any
/// other rule runs.
pub fn assess(candidate: &RollbackCandidate) -> Result<SafetyAssessment, ValidationError> {
    if candidate.is_current || candidate.number <= 1 {
        return Err(ValidationError::RollbackToCurrent);
    }

    let mut level = RiskLevel::Safe;
    let mut warnings = Vec::new();

    if candidate.age_days > STALE_AFTER_DAYS {
        level = RiskLevel::Risky;
        warnings.push(format!(
            "stale candidate: {} days old",
            candidate.age_days
        ));
    } else if candidate.age_days > CAUTION_AFTER_DAYS {
        level = RiskLevel::Caution;
    }

    if candidate.files_changed > LARGE_CHANGE_FILES {
        level = level.escalate();
        warnings.push(format!(
            "large change surface: {} files changed",
            candidate.files_changed
        ));
    }

    match candidate.deployment_status {
        CommitStatus::Failure => {
            level = RiskLevel::Risky;
            warnings.push("target previously failed deployment".to_string());
        }
        CommitStatus::Unknown => {
            warnings.push("deployment status of target is unknown".to_string());
        }
        CommitStatus::Success => {}
    }

    Ok(SafetyAssessment {
        risk_level: level,
        warnings,
        requires_confirmation: level != RiskLevel::Safe,
        age_days: candidate.age_days,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn candidate(
        number: u32,
        age_days: i64,
        files: u32,
        status: CommitStatus,
    ) -> RollbackCandidate {
        RollbackCandidate {
            number,
            commit_id: format!("{number:040}"),
            short_id: format!("{number:07}"),
            message: "change".to_string(),
            author: "dev".to_string(),
            timestamp: Utc::now(),
            relative_age: "just now".to_string(),
            age_days,
            files_changed: files,
            additions: 0,
            deletions: 0,
            deployment_status: status,
            is_current: number == 1,
        }
    }

    #[test]
    fn current_head_is_rejected() {
        let err = assess(&candidate(1, 0, 1, CommitStatus::Success)).unwrap_err();
        assert_eq!(err, ValidationError::RollbackToCurrent);
    }

    #[test]
    fn recent_small_successful_target_is_safe() {
        let a = assess(&candidate(2, 3, 4, CommitStatus::Success)).unwrap();
        assert_eq!(a.risk_level, RiskLevel::Safe);
        assert!(!a.requires_confirmation);
        assert!(a.warnings.is_empty());
    }

    #[test]
    fn age_bands() {
        let week = assess(&candidate(2, 7, 1, CommitStatus::Success)).unwrap();
        assert_eq!(week.risk_level, RiskLevel::Safe);
        let eight = assess(&candidate(2, 8, 1, CommitStatus::Success)).unwrap();
        assert_eq!(eight.risk_level, RiskLevel::Caution);
        let thirty = assess(&candidate(2, 30, 1, CommitStatus::Success)).unwrap();
        assert_eq!(thirty.risk_level, RiskLevel::Caution);
        let stale = assess(&candidate(2, 31, 1, CommitStatus::Success)).unwrap();
        assert_eq!(stale.risk_level, RiskLevel::Risky);
        assert!(stale.warnings[0].starts_with("stale candidate"));
    }

    #[test]
    fn large_change_escalates_one_level() {
        let a = assess(&candidate(2, 3, 75, CommitStatus::Success)).unwrap();
        assert_eq!(a.risk_level, RiskLevel::Caution);
        assert!(a.requires_confirmation);
        assert!(a.warnings[0].starts_with("large change surface"));

        let b = assess(&candidate(2, 10, 75, CommitStatus::Success)).unwrap();
        assert_eq!(b.risk_level, RiskLevel::Risky);
    }

    #[test]
    fn failed_deployment_is_risky() {
        let a = assess(&candidate(3, 1, 1, CommitStatus::Failure)).unwrap();
        assert_eq!(a.risk_level, RiskLevel::Risky);
        assert_eq!(a.warnings, vec!["target previously failed deployment"]);
    }

    #[test]
    fn unknown_status_only_warns() {
        let a = assess(&candidate(3, 1, 1, CommitStatus::Unknown)).unwrap();
        assert_eq!(a.risk_level, RiskLevel::Safe);
        assert_eq!(a.warnings.len(), 1);
        assert!(!a.requires_confirmation);
    }

    #[test]
    fn escalation_saturates() {
        assert_eq!(RiskLevel::Risky.escalate(), RiskLevel::Risky);
        assert!(RiskLevel::Safe < RiskLevel::Risky);
    }
}
