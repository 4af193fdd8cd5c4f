//! Repo Sentinel command-line front end
//!
//! ## Commands
//!
//! - `check-config`: validate the configuration and print the trigger table
//! - `webhook`: verify and dispatch one stored webhook delivery
//! - `action`: dispatch a direct user action for a repository
//! - `deploy`: plan and dry-run a deployment
//! - `candidates`: list rollback candidates for a branch
//! - `rollback`: propose a rollback as a pull request

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, Level};

use sentinel_core::deployment::DryRunStepRunner;
use sentinel_core::metrics::METRICS;
use sentinel_core::{
    CandidateResolver, CandidatesQuery, DeploymentManager, DeploymentRequest,
    DeploymentStrategy, Dispatcher, Environment, ResultHistory, RollbackCommand,
    SentinelConfig, SentinelService, TriggerRegistry, UserAction, WebhookIngress,
};
use sentinel_state::{GitHubHost, GitHubHostConfig, MemoryStateStore};

#[derive(Parser)]
#[command(name = "sentineld")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Event orchestration for repository automation agents", long_about = None)]
struct Cli {
    /// Path to the TOML configuration (defaults apply when omitted)
    #[arg(short, long, global = true, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,

    /// Hosting API token; overrides the variable named by `host.token_env`
    #[arg(long, global = true, env = "SENTINEL_GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration and print the effective trigger table
    CheckConfig,

    /// Verify and dispatch a stored webhook delivery
    Webhook {
        /// Value of the X-GitHub-Event header (push, repository, ...)
        #[arg(long)]
        event: String,

        /// Delivery id (X-GitHub-Delivery)
        #[arg(long, default_value = "local")]
        delivery: String,

        /// File holding the raw request body
        #[arg(long)]
        body: PathBuf,

        /// Value of the X-Hub-Signature-256 header
        #[arg(long)]
        signature: Option<String>,

        /// Select the repository for this user before dispatching
        #[arg(long)]
        select_as: Option<String>,
    },

    /// Dispatch a direct user action
    Action {
        #[arg(value_enum)]
        kind: ActionKind,

        /// Repository URL
        #[arg(long)]
        repo: String,

        /// Requesting user
        #[arg(long)]
        user: String,
    },

    /// Plan a deployment and run it with the dry-run step runner
    Deploy {
        /// Repository name
        #[arg(long)]
        name: String,

        /// blue-green, rolling, canary or recreate
        #[arg(long, default_value = "rolling")]
        strategy: DeploymentStrategy,

        /// development, staging or production
        #[arg(long, default_value = "staging")]
        environment: Environment,

        /// Repository file paths used for language detection
        #[arg(long = "file")]
        files: Vec<String>,

        /// Repository size used for the duration estimate
        #[arg(long, default_value = "0")]
        size_mb: u64,
    },

    /// List rollback candidates for a branch
    Candidates {
        /// Repository URL
        #[arg(long)]
        repo: String,

        #[arg(short, long, default_value = "main")]
        branch: String,
    },

    /// Propose a rollback to candidate NUMBER as a pull request
    Rollback {
        /// Repository URL
        #[arg(long)]
        repo: String,

        #[arg(short, long, default_value = "main")]
        branch: String,

        /// Candidate number as shown by `candidates` (2 or higher)
        number: u32,

        /// Proceed even when the target needs confirmation
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ActionKind {
    Select,
    Initialize,
    OptimizeWorkflow,
    Analyze,
    Describe,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    sentinel_core::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;
    let token = cli.token.clone();

    let outcome = match cli.command {
        Commands::CheckConfig => cmd_check_config(&config),
        Commands::Webhook {
            event,
            delivery,
            body,
            signature,
            select_as,
        } => {
            let service = build_service(&config, token)?;
            cmd_webhook(
                &config,
                &service,
                &event,
                &delivery,
                &body,
                signature.as_deref(),
                select_as.as_deref(),
            )
            .await
        }
        Commands::Action { kind, repo, user } => {
            let service = build_service(&config, token)?;
            cmd_action(&service, kind, &repo, &user).await
        }
        Commands::Deploy {
            name,
            strategy,
            environment,
            files,
            size_mb,
        } => {
            let request = DeploymentRequest {
                repository_name: name,
                strategy,
                environment,
                files,
                repository_size_mb: size_mb,
            };
            cmd_deploy(&config, &request).await
        }
        Commands::Candidates { repo, branch } => {
            let service = build_service(&config, token)?;
            cmd_candidates(&service, &repo, &branch).await
        }
        Commands::Rollback {
            repo,
            branch,
            number,
            force,
        } => {
            let service = build_service(&config, token)?;
            cmd_rollback(&service, &repo, &branch, number, force).await
        }
    };

    METRICS.flush();
    outcome
}

fn load_config(path: Option<&Path>) -> Result<SentinelConfig> {
    match path {
        Some(path) => SentinelConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => Ok(SentinelConfig::default()),
    }
}

fn host_token(config: &SentinelConfig, explicit: Option<String>) -> Option<String> {
    explicit
        .or_else(|| std::env::var(&config.host.token_env).ok())
        .filter(|t| !t.trim().is_empty())
}

fn webhook_ingress(config: &SentinelConfig) -> Result<WebhookIngress> {
    match &config.webhook.secret_env {
        Some(var) => {
            let secret = std::env::var(var)
                .with_context(|| format!("webhook secret variable {var} is not set"))?;
            Ok(WebhookIngress::with_secret(secret))
        }
        None => Ok(WebhookIngress::unverified()),
    }
}

fn build_dispatcher(config: &SentinelConfig) -> Result<Arc<Dispatcher>> {
    let handlers = config.http_handlers()?;
    let triggers = TriggerRegistry::build(config.trigger_specs(), &handlers)
        .context("trigger table does not match the configured handlers")?;
    Ok(Arc::new(Dispatcher::new(
        Arc::new(triggers),
        Arc::new(handlers),
        Arc::new(MemoryStateStore::new()),
        Arc::new(ResultHistory::with_capacity(config.history_retention)),
    )))
}

fn build_resolver(config: &SentinelConfig, token: Option<String>) -> Result<CandidateResolver> {
    let host = GitHubHost::new(GitHubHostConfig {
        api_base: config.host.api_base.clone(),
        token: host_token(config, token),
        timeout_secs: config.host.timeout_secs,
    })?;
    Ok(CandidateResolver::new(Arc::new(host)))
}

fn build_service(config: &SentinelConfig, token: Option<String>) -> Result<SentinelService> {
    Ok(SentinelService::new(
        build_dispatcher(config)?,
        Arc::new(DeploymentManager::new(Arc::new(DryRunStepRunner))),
        build_resolver(config, token)?,
        config.rollback_candidate_limit,
        config.status_log_lines,
    ))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_check_config(config: &SentinelConfig) -> Result<()> {
    let handlers = config.http_handlers()?;
    let triggers = TriggerRegistry::build(config.trigger_specs(), &handlers)
        .context("trigger table does not match the configured handlers")?;

    println!("handlers: {}", handlers.len());
    for name in handlers.names() {
        println!("  - {name}");
    }
    println!("triggers: {}", triggers.len());
    for trigger in triggers.triggers() {
        let events: Vec<&str> = trigger.event_types.iter().map(|t| t.as_str()).collect();
        println!(
            "  {:>4}  {:<20} {:<40} when={} {}",
            trigger.priority,
            trigger.handler_name,
            events.join(","),
            trigger.condition.map(|c| c.key()).unwrap_or("-"),
            if trigger.enabled { "" } else { "(disabled)" },
        );
    }
    info!(handlers = handlers.len(), triggers = triggers.len(), "configuration ok");
    Ok(())
}

async fn cmd_webhook(
    config: &SentinelConfig,
    service: &SentinelService,
    event_header: &str,
    delivery: &str,
    body_path: &Path,
    signature: Option<&str>,
    select_as: Option<&str>,
) -> Result<()> {
    let body = std::fs::read(body_path)
        .with_context(|| format!("failed to read {}", body_path.display()))?;
    let ingress = webhook_ingress(config)?;
    let Some(event) = ingress.receive(event_header, delivery, signature, &body)? else {
        println!("delivery {delivery} ({event_header}) ignored");
        return Ok(());
    };

    if let Some(user) = select_as {
        let selected = service
            .select_repository(&UserAction::new(event.repository_url(), user))
            .await;
        if !selected.success {
            bail!(
                "repository selection failed: {}",
                selected.error.unwrap_or_default()
            );
        }
    }

    let response = service.handle_event(&event).await;
    print_json(&response)?;
    if !response.success {
        bail!("dispatch rejected");
    }
    Ok(())
}

async fn cmd_action(
    service: &SentinelService,
    kind: ActionKind,
    repo: &str,
    user: &str,
) -> Result<()> {
    let action = UserAction::new(repo, user);
    if kind != ActionKind::Select {
        // Requests other than selection need a registered repository; this
        // process starts with an empty store.
        let selected = service.select_repository(&action).await;
        print_json(&selected)?;
        if !selected.success {
            bail!(
                "repository selection failed: {}",
                selected.error.unwrap_or_default()
            );
        }
    }
    let response = match kind {
        ActionKind::Select => service.select_repository(&action).await,
        ActionKind::Initialize => service.initialize_repository(&action).await,
        ActionKind::OptimizeWorkflow => service.request_workflow_optimization(&action).await,
        ActionKind::Analyze => service.request_analysis(&action).await,
        ActionKind::Describe => service.request_description(&action).await,
    };
    print_json(&response)?;
    if !response.success {
        bail!("action rejected");
    }
    Ok(())
}

async fn cmd_deploy(config: &SentinelConfig, request: &DeploymentRequest) -> Result<()> {
    let manager = DeploymentManager::new(Arc::new(DryRunStepRunner));
    let id = manager.submit(request).await?;
    manager.join(&id).await?;
    let view = manager.status(&id, config.status_log_lines).await?;
    print_json(&view)
}

async fn cmd_candidates(service: &SentinelService, repo: &str, branch: &str) -> Result<()> {
    let response = service
        .rollback_candidates(&CandidatesQuery {
            repository_url: repo.to_string(),
            branch: branch.to_string(),
        })
        .await;
    print_json(&response)?;
    if !response.success {
        bail!("candidate resolution failed");
    }
    Ok(())
}

async fn cmd_rollback(
    service: &SentinelService,
    repo: &str,
    branch: &str,
    number: u32,
    force: bool,
) -> Result<()> {
    let response = service
        .execute_rollback(&RollbackCommand {
            repository_url: repo.to_string(),
            rollback_number: number,
            branch: branch.to_string(),
            force,
        })
        .await;
    print_json(&response)?;
    match (&response.error, response.success) {
        (Some(err), _) => bail!("rollback rejected: {err}"),
        (None, false) => info!("rollback not applied; see outcome"),
        (None, true) => {}
    }
    Ok(())
}
