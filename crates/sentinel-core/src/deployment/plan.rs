//! Step planning and duration estimates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::model::{
    Deployment, DeploymentStatus, DeploymentStep, DeploymentStrategy, Environment, Language,
};

const BASE_SECS: u64 = 120;
const PER_STEP_SECS: u64 = 30;
const LARGE_REPO_MB: u64 = 50;
const HUGE_REPO_MB: u64 = 500;

/// Input for planning a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub repository_name: String,
    pub strategy: DeploymentStrategy,
    pub environment: Environment,
    /// File names at the repository root, used for language detection.
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub repository_size_mb: u64,
}

pub fn detect_language<S: AsRef<str>>(files: &[S]) -> Language {
    let has = |wanted: &[&str]| {
        files.iter().any(|f| {
            let name = f.as_ref().rsplit('/').next().unwrap_or_default();
            wanted.contains(&name)
        })
    };
    if has(&["Cargo.toml"]) {
        Language::Rust
    } else if has(&["package.json"]) {
        Language::Node
    } else if has(&["requirements.txt", "pyproject.toml"]) {
        Language::Python
    } else if has(&["go.mod"]) {
        Language::Go
    } else {
        Language::Generic
    }
}

fn install_description(language: Language) -> &'static str {
    match language {
        Language::Rust => "cargo fetch --locked",
        Language::Node => "npm ci",
        Language::Python => "pip install -r requirements.txt",
        Language::Go => "go mod download",
        Language::Generic => "install project dependencies",
    }
}

fn test_description(language: Language) -> &'static str {
    match language {
        Language::Rust => "cargo test --workspace",
        Language::Node => "npm test",
        Language::Python => "pytest",
        Language::Go => "go test ./...",
        Language::Generic => "run the project test suite",
    }
}

/// Ordered steps for `language` and `strategy`.
pub fn plan_steps(language: Language, strategy: DeploymentStrategy) -> Vec<DeploymentStep> {
    let mut steps = vec![
        DeploymentStep::new("checkout", "check out the requested revision"),
        DeploymentStep::new("install-dependencies", install_description(language)),
        DeploymentStep::new("run-tests", test_description(language)),
        DeploymentStep::new("build-artifact", "build the release artifact"),
    ];

    let strategy_steps: &[(&str, &str)] = match strategy {
        DeploymentStrategy::BlueGreen => &[
            ("provision-green", "provision the idle green environment"),
            ("deploy-green", "deploy the artifact to green"),
            ("switch-traffic", "switch traffic from blue to green"),
            ("retire-blue", "retire the previous blue environment"),
        ],
        DeploymentStrategy::Canary => &[
            ("canary-10-percent", "route 10% of traffic to the new version"),
            ("monitor-canary", "watch error rate and latency of the canary"),
            ("canary-50-percent", "route 50% of traffic to the new version"),
            ("canary-100-percent", "route all traffic to the new version"),
        ],
        DeploymentStrategy::Rolling => &[
            ("rolling-update", "replace instances in batches"),
            ("health-check", "verify instance health"),
        ],
        DeploymentStrategy::Recreate => &[
            ("recreate-instances", "stop old instances and start new ones"),
            ("health-check", "verify instance health"),
        ],
    };
    steps.extend(
        strategy_steps
            .iter()
            .map(|(name, description)| DeploymentStep::new(name, *description)),
    );
    steps
}

/// Reporting-only estimate in seconds.
pub fn estimate_duration_secs(
    step_count: usize,
    repository_size_mb: u64,
    strategy: DeploymentStrategy,
    environment: Environment,
) -> u64 {
    let mut secs = BASE_SECS + PER_STEP_SECS * step_count as u64;
    if repository_size_mb >= HUGE_REPO_MB {
        secs += 180;
    } else if repository_size_mb >= LARGE_REPO_MB {
        secs += 60;
    }
    secs += match strategy {
        DeploymentStrategy::BlueGreen => 60,
        DeploymentStrategy::Canary => 240,
        DeploymentStrategy::Rolling | DeploymentStrategy::Recreate => 0,
    };
    if environment == Environment::Production {
        secs += 60;
    }
    secs
}

/// Build a pending deployment for `request`.
pub fn plan_deployment(request: &DeploymentRequest, now: DateTime<Utc>) -> Deployment {
    let language = detect_language(&request.files);
    let steps = plan_steps(language, request.strategy);
    let estimated_duration_secs = estimate_duration_secs(
        steps.len(),
        request.repository_size_mb,
        request.strategy,
        request.environment,
    );
    Deployment {
        id: Uuid::new_v4().to_string(),
        repository_name: request.repository_name.clone(),
        strategy: request.strategy,
        environment: request.environment,
        status: DeploymentStatus::Pending,
        language,
        steps,
        current_step: None,
        log: Vec::new(),
        estimated_duration_secs,
        rollback_of: None,
        created_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(steps: &[DeploymentStep]) -> Vec<&str> {
        steps.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn language_detection_prefers_manifest_order() {
        assert_eq!(detect_language(&["README.md", "Cargo.toml"]), Language::Rust);
        assert_eq!(detect_language(&["web/package.json"]), Language::Node);
        assert_eq!(detect_language(&["pyproject.toml"]), Language::Python);
        assert_eq!(detect_language(&["go.mod"]), Language::Go);
        assert_eq!(detect_language::<&str>(&[]), Language::Generic);
    }

    #[test]
    fn canary_phases_follow_base_steps() {
        let steps = plan_steps(Language::Node, DeploymentStrategy::Canary);
        assert_eq!(
            names(&steps),
            vec![
                "checkout",
                "install-dependencies",
                "run-tests",
                "build-artifact",
                "canary-10-percent",
                "monitor-canary",
                "canary-50-percent",
                "canary-100-percent",
            ]
        );
        assert_eq!(steps[1].description, "npm ci");
    }

    #[test]
    fn blue_green_switches_environments() {
        let steps = plan_steps(Language::Rust, DeploymentStrategy::BlueGreen);
        assert_eq!(
            &names(&steps)[4..],
            &["provision-green", "deploy-green", "switch-traffic", "retire-blue"]
        );
    }

    #[test]
    fn estimate_adds_size_strategy_and_environment() {
        // 8 steps: 120 + 240, huge repo +180, canary +240, production +60
        assert_eq!(
            estimate_duration_secs(8, 600, DeploymentStrategy::Canary, Environment::Production),
            840
        );
        // 6 steps, 50 MB boundary counts as large
        assert_eq!(
            estimate_duration_secs(6, 50, DeploymentStrategy::Rolling, Environment::Staging),
            120 + 180 + 60
        );
        assert_eq!(
            estimate_duration_secs(6, 49, DeploymentStrategy::Recreate, Environment::Development),
            300
        );
    }

    #[test]
    fn planned_deployment_is_pending() {
        let request = DeploymentRequest {
            repository_name: "widgets".to_string(),
            strategy: DeploymentStrategy::BlueGreen,
            environment: Environment::Staging,
            files: vec!["go.mod".to_string()],
            repository_size_mb: 10,
        };
        let deployment = plan_deployment(&request, Utc::now());
        assert_eq!(deployment.status, DeploymentStatus::Pending);
        assert_eq!(deployment.language, Language::Go);
        assert_eq!(deployment.steps.len(), 8);
        assert_eq!(deployment.estimated_duration_secs, 120 + 240 + 60);
        assert!(deployment.current_step.is_none());
    }
}
