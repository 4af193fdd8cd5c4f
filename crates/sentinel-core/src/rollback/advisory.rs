//! Optional advisory recommendation for a rollback target.
//!
//! An advisor returns free text. Only lines matching the grammar below are
//! understood; everything else is ignored:
//!
//! ```text
//! RECOMMENDED_ROLLBACK: #?<digits>
//! SAFETY_LEVEL: SAFE | CAUTION | RISKY
//! REASON: <text>
//! ```

use async_trait::async_trait;
use sentinel_state::RepoRef;
use serde::{Deserialize, Serialize};

use super::candidates::RollbackCandidate;
use super::error::RollbackResult;
use super::safety::RiskLevel;

const RECOMMENDED: &str = "RECOMMENDED_ROLLBACK: ";
const SAFETY: &str = "SAFETY_LEVEL: ";
const REASON: &str = "REASON: ";

/// Source of free-text rollback advice.
#[async_trait]
pub trait RollbackAdvisor: Send + Sync {
    async fn advise(
        &self,
        repo: &RepoRef,
        candidates: &[RollbackCandidate],
    ) -> RollbackResult<String>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advisory {
    pub recommended: Option<u32>,
    pub safety_level: Option<RiskLevel>,
    pub reason: Option<String>,
}

/// Parse advisor output against `candidate_count` candidates.
///
/// A recommendation outside `2..=candidate_count` is dropped. The first
/// occurrence of each key wins.
pub fn parse_advisory(text: &str, candidate_count: usize) -> Advisory {
    let mut recommended = None;
    let mut safety = None;
    let mut reason = None;

    for line in text.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix(RECOMMENDED) {
            recommended.get_or_insert(rest);
        } else if let Some(rest) = line.strip_prefix(SAFETY) {
            safety.get_or_insert(rest);
        } else if let Some(rest) = line.strip_prefix(REASON) {
            reason.get_or_insert(rest);
        }
    }

    Advisory {
        recommended: recommended
            .and_then(parse_number)
            .filter(|n| *n >= 2 && (*n as usize) <= candidate_count),
        safety_level: safety.and_then(|raw| match raw {
            "SAFE" => Some(RiskLevel::Safe),
            "CAUTION" => Some(RiskLevel::Caution),
            "RISKY" => Some(RiskLevel::Risky),
            _ => None,
        }),
        reason: reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string),
    }
}

fn parse_number(raw: &str) -> Option<u32> {
    let digits = raw.strip_prefix('#').unwrap_or(raw);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_response() {
        let text = "Looking at the history...\n\
                    RECOMMENDED_ROLLBACK: #3\n\
                    SAFETY_LEVEL: CAUTION\n\
                    REASON: last green build before the config change\n";
        let a = parse_advisory(text, 10);
        assert_eq!(a.recommended, Some(3));
        assert_eq!(a.safety_level, Some(RiskLevel::Caution));
        assert_eq!(
            a.reason.as_deref(),
            Some("last green build before the config change")
        );
    }

    #[test]
    fn hash_is_optional_and_lines_are_trimmed() {
        let a = parse_advisory("   RECOMMENDED_ROLLBACK: 4   ", 5);
        assert_eq!(a.recommended, Some(4));
    }

    #[test]
    fn out_of_range_or_current_is_dropped() {
        assert_eq!(parse_advisory("RECOMMENDED_ROLLBACK: #1", 10).recommended, None);
        assert_eq!(parse_advisory("RECOMMENDED_ROLLBACK: #11", 10).recommended, None);
        assert_eq!(parse_advisory("RECOMMENDED_ROLLBACK: #0", 10).recommended, None);
    }

    #[test]
    fn malformed_values_are_dropped() {
        let a = parse_advisory(
            "RECOMMENDED_ROLLBACK: three\nSAFETY_LEVEL: safe\nrecommended_rollback: 2",
            10,
        );
        assert_eq!(a, Advisory::default());
        assert_eq!(parse_advisory("RECOMMENDED_ROLLBACK: #2a", 10).recommended, None);
        assert_eq!(
            parse_advisory("RECOMMENDED_ROLLBACK: 99999999999999", 10).recommended,
            None
        );
    }

    #[test]
    fn first_recommendation_wins() {
        let a = parse_advisory("RECOMMENDED_ROLLBACK: #12\nRECOMMENDED_ROLLBACK: #2", 5);
        assert_eq!(a.recommended, None);
    }

    #[test]
    fn first_occurrence_wins_for_every_key() {
        let text = "SAFETY_LEVEL: MAYBE\n\
                    RECOMMENDED_ROLLBACK: #3\n\
                    SAFETY_LEVEL: SAFE\n\
                    REASON: first\n\
                    RECOMMENDED_ROLLBACK: #4\n\
                    REASON: second\n";
        let a = parse_advisory(text, 10);
        assert_eq!(a.recommended, Some(3));
        assert_eq!(a.safety_level, None);
        assert_eq!(a.reason.as_deref(), Some("first"));
    }
}
