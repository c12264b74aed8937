use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use lease_worker::{
    dispatch::builtin,
    observability::{init_tracing, LogFormat},
    store::memory::MemoryOutcomeStore,
    transport::memory::{MemoryTransport, MemoryTransportConfig},
    Consumer, LiveTelemetry, NewTask, TaskGateway, WorkerConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let log_format = match std::env::var("LEASE_WORKER_LOG_FORMAT") {
        Ok(value) => value.parse::<LogFormat>().map_err(anyhow::Error::msg)?,
        Err(_) => LogFormat::default(),
    };
    init_tracing("info", log_format)?;

    let config = WorkerConfig::from_env().context("invalid LEASE_WORKER_* configuration")?;
    let demo_work = match std::env::var("LEASE_WORKER_DEMO_WORK_SECS") {
        Ok(value) => Duration::from_secs(value.trim().parse().context("LEASE_WORKER_DEMO_WORK_SECS")?),
        Err(_) => Duration::from_secs(5),
    };

    let transport = Arc::new(MemoryTransport::with_config(MemoryTransportConfig {
        max_dequeue_count: config.retry.max_attempts(),
        max_body_bytes: config.max_inline_body_bytes,
    }));
    let store = Arc::new(MemoryOutcomeStore::new());
    let telemetry = Arc::new(LiveTelemetry::new());
    let registry = Arc::new(builtin::default_registry(demo_work)?);

    let gateway = TaskGateway::new(transport.clone(), store.clone(), telemetry.clone(), &config);
    let demo = [
        NewTask::inline(builtin::SEND_EMAIL, "user@example.com"),
        NewTask::inline(builtin::SEND_NOTIFICATION, "Your export is ready"),
        NewTask::inline(builtin::GENERATE_REPORT, "monthly-sales"),
        NewTask::blob(builtin::PROCESS_FILE, "uploads/archive.zip"),
        // No handler: fails until it lands in the poison queue
        NewTask::inline("Frobnicate", "???"),
    ];
    for request in demo {
        gateway.submit(request).await?;
    }

    let consumer = Consumer::new(transport, registry, store, telemetry.clone(), config)?;
    let handle = consumer.start();

    info!("Press Ctrl+C to stop");
    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl+C")?;
    handle.shutdown().await?;

    for outcome in gateway.outcomes_for(Utc::now().date_naive()).await? {
        println!(
            "[lease-worker] {} {} {} (attempt {})",
            outcome.task_id,
            outcome.task_type,
            outcome.status.name(),
            outcome.attempt
        );
    }

    let snapshot = telemetry.metrics().snapshot();
    println!(
        "[lease-worker] submitted={} completed={} failed={} poisoned={}",
        snapshot.submitted, snapshot.completed, snapshot.failed, snapshot.poisoned
    );
    Ok(())
}
