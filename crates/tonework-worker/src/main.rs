//! Audio task worker binary.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tonework_media::{CommandRunner, ToolRunner};
use tonework_models::{FieldAliases, TaskParser};
use tonework_queue::{BrokerConfig, ConnectionSupervisor};
use tonework_storage::{BlobStore, S3BlobStore, S3Config};
use tonework_worker::{metrics, TaskConsumer, TaskProcessor, WorkerConfig, WorkerError, WorkerResult};

#[tokio::main]
async fn main() {
    // Install rustls crypto provider (required for TLS to MinIO/RabbitMQ)
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("rustls crypto provider already installed");
    }

    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting tonework-worker");

    if let Err(e) = run().await {
        error!("Worker stopped: {}", e);
        std::process::exit(e.exit_code());
    }

    info!("Worker shutdown complete");
}

/// Colored output for dev, JSON for production.
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tonework=info,lapin=warn,aws_config=warn"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn run() -> WorkerResult<()> {
    let config = WorkerConfig::from_env()?;
    info!("Worker config: {:?}", config);

    if let Some(addr) = config.metrics_addr {
        metrics::init_metrics(addr)?;
        info!("Metrics listening on {}", addr);
    }

    let tool = config.tool.build_from_env();
    let tool_name = tool.name().to_string();

    let broker = BrokerConfig::from_env(&tool_name)?;

    // Blob store is built once and injected
    let storage_config = S3Config::from_env()?;
    let default_bucket = storage_config.bucket_name.clone();
    let store = Arc::new(S3BlobStore::new(storage_config));
    store
        .ensure_bucket(&default_bucket)
        .await
        .map_err(|e| WorkerError::startup_failed(format!("bucket {}: {}", default_bucket, e)))?;
    info!("Bucket {} ready", default_bucket);

    let runner = ToolRunner::new(
        tool,
        CommandRunner::new().with_timeout(config.tool_timeout_secs),
    );
    let processor = Arc::new(TaskProcessor::new(
        store,
        runner,
        config.results_prefix.clone(),
        config.work_dir.clone(),
    ));
    let consumer = Arc::new(TaskConsumer::new(
        TaskParser::new(FieldAliases::v1(), default_bucket),
        processor,
        config.result_delivery,
    ));

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received shutdown signal, finishing in-flight task");
        let _ = stop_tx.send(true);
        // Keep the sender alive so receivers never see a closed channel
        std::future::pending::<()>().await;
    });

    ConnectionSupervisor::new(broker, tool_name, consumer, stop_rx)
        .run()
        .await?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            error!("Failed to install SIGTERM handler: {}", e);
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    tokio::signal::ctrl_c().await.ok();
}
