mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use taskrelay_config::ConfigLoader;
use taskrelay_dispatch::{DeduplicationIndex, JobDispatcher, JobStatusStore};
use taskrelay_processor::{JobProcessor, ProcessorConfig};
use taskrelay_queue::{JobQueue, QueueMode};
use taskrelay_resilience::{RetryPolicy, ShutdownCoordinator};

/// Runs the taskrelay job execution fabric until interrupted.
#[derive(Parser, Debug)]
#[command(name = "taskrelay", version, about)]
struct Cli {
    /// Path to a TOML configuration file overlaying the built-in defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let cli = Cli::parse();
    let config = ConfigLoader::new()
        .load(cli.config.as_ref())
        .context("failed to load configuration")?;

    tracing::info!(?config, "starting taskrelay");

    let queue_mode = if config.queue.enable_prioritization {
        QueueMode::Priority
    } else {
        QueueMode::Fifo
    };
    let queue = Arc::new(JobQueue::new(queue_mode, config.queue.max_queue_size));
    let status_store = Arc::new(JobStatusStore::new());
    let dedup = Arc::new(DeduplicationIndex::new());
    let dispatcher = Arc::new(JobDispatcher::new(queue.clone(), status_store.clone(), dedup.clone()));

    // Concrete job handlers depend on deployment-specific collaborators
    // (source control, an LLM, a sandbox runner) and are registered by the
    // embedding application via `dispatcher.register_handler(...)` before
    // the processor starts accepting work.

    let retry_policy = RetryPolicy {
        enabled: config.processor.enable_retry,
        base_delay: config.processor.retry_delay(),
        max_delay: config.processor.retry_delay() * 60,
        backoff_strategy: Default::default(),
        jitter: true,
    };

    let shutdown = Arc::new(ShutdownCoordinator::new());
    let processor = Arc::new(JobProcessor::new(
        queue.clone(),
        dispatcher.clone(),
        status_store,
        dedup,
        retry_policy,
        shutdown.clone(),
        ProcessorConfig {
            max_concurrency: config.processor.max_concurrency,
            shutdown_timeout: config.processor.shutdown_timeout(),
        },
    ));

    let run_handle = tokio::spawn(processor.run());

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("interrupt received, draining in-flight jobs");

    queue.complete();
    let drained = shutdown.shutdown(config.processor.shutdown_timeout()).await;
    if !drained {
        tracing::warn!("shutdown timed out with jobs still active, forcing exit");
    }

    run_handle.await.context("processor task panicked")?;
    Ok(())
}
