//! Faultline server binary.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;

use faultline::adapters::cluster::OperatorClusterApi;
use faultline::adapters::http::{serve, AppState};
use faultline::adapters::sqlite::{
    all_embedded_migrations, create_pool, Migrator, PoolConfig, SqliteSessionRepository,
    SqliteTaskRepository,
};
use faultline::domain::ports::{ClusterApi, LlmClient, TaskRepository};
use faultline::infrastructure::config::{Config, ConfigLoader};
use faultline::infrastructure::llm::{OpenAiCompatClient, OpenAiCompatClientConfig, RetryPolicy};
use faultline::kgroot::CorrelationConfig;
use faultline::services::{
    AbortRegistry, AgentSettings, ApprovalTable, ChatService, ChatSettings, EventLog,
    Orchestrator, Supervisor, SupervisorSettings, ToolRegistry,
};

#[derive(Parser)]
#[command(name = "faultline", about = "Autonomous Kubernetes troubleshooting engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the investigation API server
    Serve {
        /// Config file path (defaults to .faultline/config.yaml)
        #[arg(long)]
        config: Option<String>,
    },
    /// Write a default configuration file
    Init {
        /// Target path
        #[arg(long, default_value = ".faultline/config.yaml")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config } => {
            let config = match config {
                Some(path) => ConfigLoader::load_from_file(path)?,
                None => ConfigLoader::load()?,
            };
            run_server(config).await
        }
        Command::Init { path } => init_config(&path),
    }
}

fn init_config(path: &str) -> Result<()> {
    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("failed to create config directory")?;
    }
    let config = Config::default();
    let yaml = serde_yaml::to_string(&config).context("failed to serialize default config")?;
    std::fs::write(path, yaml).context("failed to write config file")?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

async fn run_server(config: Config) -> Result<()> {
    let _log_guard = faultline::infrastructure::logging::init(&config.logging);

    // Database
    let database_url = format!("sqlite:{}", config.database.path);
    let pool = create_pool(
        &database_url,
        Some(PoolConfig {
            max_connections: config.database.max_connections,
            ..PoolConfig::default()
        }),
    )
    .await
    .context("failed to open database")?;
    Migrator::new(pool.clone())
        .run_embedded_migrations(all_embedded_migrations())
        .await
        .context("failed to run migrations")?;

    let task_repo: Arc<dyn TaskRepository> = Arc::new(SqliteTaskRepository::new(pool.clone()));
    let session_repo = Arc::new(SqliteSessionRepository::new(pool));

    // LLM client
    let api_key = std::env::var(&config.llm.api_key_env).unwrap_or_default();
    if api_key.is_empty() {
        tracing::warn!(var = %config.llm.api_key_env, "LLM API key env var is empty");
    }
    let llm: Arc<dyn LlmClient> = Arc::new(
        OpenAiCompatClient::new(OpenAiCompatClientConfig {
            base_url: config.llm.base_url.clone(),
            api_key,
            rate_limit_rps: config.llm.rate_limit_rps,
            timeout_secs: config.llm.timeout_secs,
            retry: RetryPolicy::default(),
        })
        .map_err(|e| anyhow::anyhow!("failed to build LLM client: {e}"))?,
    );

    // Cluster proxy
    let cluster: Arc<dyn ClusterApi> = Arc::new(
        OperatorClusterApi::new(config.cluster.operator_url.clone())
            .map_err(|e| anyhow::anyhow!("failed to build cluster client: {e}"))?,
    );

    // Core services
    let events = Arc::new(EventLog::with_buffer(task_repo.clone(), config.investigation.event_buffer));
    let approvals = Arc::new(ApprovalTable::new());
    let registry = Arc::new(ToolRegistry::with_builtin(cluster.clone()));
    let investigation_aborts = Arc::new(AbortRegistry::new());
    let chat_aborts = Arc::new(AbortRegistry::new());

    let chat = Arc::new(ChatService::new(
        session_repo.clone(),
        llm.clone(),
        registry.clone(),
        approvals.clone(),
        chat_aborts.clone(),
        config.policy.clone(),
        ChatSettings {
            model: config.llm.model.clone(),
            approval_timeout: std::time::Duration::from_secs(
                config.investigation.approval_timeout_secs,
            ),
            ..ChatSettings::default()
        },
    ));

    let supervisor = Arc::new(Supervisor::new(
        task_repo.clone(),
        events.clone(),
        llm,
        cluster,
        registry,
        approvals.clone(),
        config.policy.clone(),
        SupervisorSettings {
            model: config.llm.model.clone(),
            correlation_model: config.llm.correlation_model.clone(),
            max_turns: config.investigation.max_turns,
            max_owner_depth: config.investigation.max_owner_depth,
            max_candidates: config.investigation.max_candidates,
            correlation: CorrelationConfig::default(),
            agent: AgentSettings {
                max_iterations: config.investigation.agent_max_iterations,
                wall_clock: std::time::Duration::from_secs(config.investigation.agent_timeout_secs),
                approval_timeout: std::time::Duration::from_secs(
                    config.investigation.approval_timeout_secs,
                ),
            },
        },
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        task_repo,
        events,
        investigation_aborts,
        supervisor,
    ));

    // The in-memory signal tables died with any previous process; drain the
    // investigations it left behind.
    orchestrator.recover_interrupted().await?;

    let state = Arc::new(AppState {
        orchestrator,
        chat,
        sessions: session_repo,
        chat_aborts,
        approvals,
    });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server address")?;

    serve(state, addr, shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("server error: {e}"))?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
