//! integration-bus CLI: runs the QSM/SOM/WEQ models on one event bus.
//!
//! Usage:
//!   integration-bus run [--config path] [--strategy all] [--query text]
//!   integration-bus config [--config path]

use clap::{Parser, Subcommand};
use integration_bus::adapter::{KnowledgeRequest, ModelAdapter, QsmAdapter, SomAdapter, WeqAdapter};
use integration_bus::completion::{MockCompletion, TextCompletion};
use integration_bus::integration::{
    EventKind, IntegrationConfig, IntegrationEvent, IntegrationManager, ModelKind, SyncOutcome,
    SyncStrategy,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "integration-bus",
    version,
    about = "Event bus for integrating quantum and neural models"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to the YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the built-in models, run one sync round and report
    Run {
        /// Synchronization strategy (state, entanglement, field, events, all)
        #[arg(long, default_value = "all")]
        strategy: SyncStrategy,
        /// Publish a knowledge-gap request with this query before syncing
        #[arg(long)]
        query: Option<String>,
    },
    /// Print the effective configuration as YAML
    Config,
}

/// Explicit path must exist; the default path is optional.
fn load_config(path: Option<PathBuf>) -> Result<IntegrationConfig, String> {
    match path {
        Some(path) => IntegrationConfig::load(&path)
            .map_err(|e| format!("failed to load {}: {}", path.display(), e)),
        None => {
            let path = IntegrationConfig::default_path();
            if path.exists() {
                IntegrationConfig::load(&path)
                    .map_err(|e| format!("failed to load {}: {}", path.display(), e))
            } else {
                Ok(IntegrationConfig::default())
            }
        }
    }
}

fn cmd_config(config: &IntegrationConfig) -> i32 {
    match config.to_yaml() {
        Ok(yaml) => {
            print!("{}", yaml);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn run_bus(
    config: IntegrationConfig,
    strategy: SyncStrategy,
    query: Option<String>,
) -> Result<(), String> {
    let manager = Arc::new(IntegrationManager::new(config));
    let completion: Arc<dyn TextCompletion> = Arc::new(MockCompletion::available());

    let adapters: Vec<Arc<dyn ModelAdapter>> = vec![
        Arc::new(QsmAdapter::for_manager("qsm-1", completion.clone(), &manager)),
        Arc::new(SomAdapter::for_manager("som-1", completion.clone(), &manager)),
        Arc::new(WeqAdapter::for_manager("weq-1", completion, &manager)),
    ];
    for adapter in adapters {
        manager
            .register_model_adapter(adapter)
            .await
            .map_err(|e| e.to_string())?;
    }

    if let Some(query) = query {
        let request = KnowledgeRequest { query: Some(query) };
        manager
            .publish_event(
                IntegrationEvent::new(EventKind::Custom, "cli", ModelKind::Custom)
                    .with_payload(request.to_payload()),
            )
            .map_err(|e| e.to_string())?;
    }
    let drained = manager.process_integration_events().await;
    println!("Processed {} pending events", drained);

    match manager
        .synchronize_models(strategy)
        .await
        .map_err(|e| e.to_string())?
    {
        SyncOutcome::Completed { events_processed } => {
            println!("Synchronized ({}): {} events", strategy.as_payload(), events_processed)
        }
        SyncOutcome::Skipped => println!("Synchronization skipped"),
        SyncOutcome::Deferred => println!("Synchronization deferred"),
    }

    for model in manager.models() {
        println!(
            "  {} {} ({}) active={}",
            model.model_kind, model.model_id, model.model_name, model.active
        );
    }
    let stats = manager.stats();
    println!(
        "Events: published={} processed={} rejected={} adapter_failures={}",
        stats.events_published, stats.events_processed, stats.events_rejected, stats.adapter_failures
    );

    manager.shutdown().await;
    Ok(())
}

fn cmd_run(config: IntegrationConfig, strategy: SyncStrategy, query: Option<String>) -> i32 {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create tokio runtime: {}", e);
            return 1;
        }
    };
    match rt.block_on(run_bus(config, strategy, query)) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match load_config(cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    let code = match cli.command {
        Commands::Run { strategy, query } => cmd_run(config, strategy, query),
        Commands::Config => cmd_config(&config),
    };
    std::process::exit(code);
}
