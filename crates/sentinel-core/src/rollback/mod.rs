//! Rollback candidate resolution, safety classification and safe execution.

pub mod advisory;
pub mod candidates;
pub mod error;
pub mod executor;
pub mod safety;

pub use advisory::{parse_advisory, Advisory, RollbackAdvisor};
pub use candidates::{
    heuristic_recommendation, humanize_age, CandidateReport, CandidateResolver, RollbackCandidate,
    DEFAULT_ADVISORY_TIMEOUT, DEFAULT_CANDIDATE_LIMIT,
};
pub use error::{RollbackError, RollbackResult};
pub use executor::{RollbackExecutor, RollbackOutcome, RollbackRequest};
pub use safety::{assess, RiskLevel, SafetyAssessment};
