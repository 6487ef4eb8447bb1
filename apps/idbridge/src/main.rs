use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use idbridge_graph::{CredentialPool, GraphClient, TenantEndpoints};
use idbridge_jit::{build_validator, JitConfig, JitPipeline, PrivateKeyCache, ValidatorConfig};
use idbridge_pipeline::{ExecutionResult, ExportPipeline, ImportPipeline};
use idbridge_store::{EnvSecretStore, FsObjectStore, ObjectStore, SecretStore};

mod config;

use config::AppConfig;

#[derive(Parser)]
#[command(name = "idbridge", about = "Directory identity migration toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export users from the source directory into object storage.
    Export,
    /// Import exported pages into the target directory.
    Import,
    /// Serve the JIT credential migration handler.
    Serve,
}

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        std::process::exit(1);
    });

    // Ctrl-C stops pipelines after the current unit of work.
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    match cli.command {
        Command::Export => run_export(&config, &cancel).await,
        Command::Import => run_import(&config, &cancel).await,
        Command::Serve => run_serve(&config, &cancel).await,
    }
}

fn object_store(config: &AppConfig) -> Arc<dyn ObjectStore> {
    Arc::new(FsObjectStore::new(config.store_root.clone()))
}

async fn graph_client(
    endpoints: TenantEndpoints,
    credentials: &[idbridge_graph::CredentialConfig],
) -> Arc<GraphClient> {
    let secrets = EnvSecretStore::new();
    let pool = CredentialPool::new(&secrets, credentials, endpoints.clone())
        .await
        .unwrap_or_else(|e| {
            eprintln!("Credential error: {e}");
            std::process::exit(1);
        });
    Arc::new(
        GraphClient::new(Arc::new(pool), endpoints).unwrap_or_else(|e| {
            eprintln!("Client error: {e}");
            std::process::exit(1);
        }),
    )
}

fn exit_with(result: &ExecutionResult) -> ! {
    if result.success {
        std::process::exit(0);
    }
    std::process::exit(1);
}

async fn run_export(config: &AppConfig, cancel: &CancellationToken) {
    let client = graph_client(config.source_endpoints(), &config.source_credentials).await;
    let pipeline = ExportPipeline::new(client, object_store(config), config.export_config())
        .unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        });

    let result = pipeline.run(cancel).await;
    exit_with(&result);
}

async fn run_import(config: &AppConfig, cancel: &CancellationToken) {
    let client = graph_client(config.target_endpoints(), &config.target_credentials).await;
    let pipeline = ImportPipeline::new(client, object_store(config), config.import_config())
        .unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        });

    let result = pipeline.run(cancel).await;
    exit_with(&result);
}

async fn run_serve(config: &AppConfig, cancel: &CancellationToken) {
    let secrets: Arc<dyn SecretStore> = Arc::new(EnvSecretStore::new());
    let validator_config = ValidatorConfig {
        client_id: config.jit.client_id.clone(),
        test_mode: config.jit.test_mode,
        production: config.jit.production,
    };
    let validator = build_validator(&validator_config, config.source_endpoints())
        .unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}");
            std::process::exit(1);
        });

    let mut jit_config = JitConfig::new(config.source_domain.clone());
    jit_config.validation_timeout = config.jit.validation_timeout;
    let pipeline = JitPipeline::new(
        jit_config,
        PrivateKeyCache::new(secrets, config.jit.key_secret_name.clone()),
        validator,
    );

    let app = idbridge_jit::router(Arc::new(pipeline));
    let listener = tokio::net::TcpListener::bind(config.jit.listen_addr)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Cannot bind {}: {e}", config.jit.listen_addr);
            std::process::exit(1);
        });

    tracing::info!(listen_addr = %config.jit.listen_addr, "JIT handler listening");
    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .unwrap_or_else(|e| {
            eprintln!("Server error: {e}");
            std::process::exit(1);
        });
}
