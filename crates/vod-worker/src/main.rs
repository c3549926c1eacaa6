//! Pipeline worker binary: stage executors plus the cleanup worker.

use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vod_media::{check_ffmpeg, check_ffprobe, FfmpegTranscoder, MediaConfig};
use vod_models::Stage;
use vod_queue::{QueueConfig, RedisQueue};
use vod_state::{RedisStateStore, StateConfig};
use vod_storage::S3Store;
use vod_worker::{CleanupWorker, PipelineConfig, PipelineContext, StageExecutor};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = match "vod=info".parse() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::from_default_env(),
    };

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

    info!("Starting vod-worker");

    if let Err(e) = check_ffmpeg() {
        error!("{}", e);
        std::process::exit(1);
    }
    if let Err(e) = check_ffprobe() {
        error!("{}", e);
        std::process::exit(1);
    }

    let config = PipelineConfig::from_env();
    info!("Pipeline config: {:?}", config);

    let raw_store = match S3Store::from_env("RAW_BUCKET") {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to create raw store: {}", e);
            std::process::exit(1);
        }
    };
    let processed_store = match S3Store::from_env("PROCESSED_BUCKET") {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to create processed store: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = raw_store.check_connectivity().await {
        error!("Raw bucket unreachable: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = processed_store.check_connectivity().await {
        error!("Processed bucket unreachable: {}", e);
        std::process::exit(1);
    }

    let queue = match RedisQueue::connect(QueueConfig::from_env()).await {
        Ok(queue) => queue,
        Err(e) => {
            error!("Failed to connect job queue: {}", e);
            std::process::exit(1);
        }
    };
    let state = match RedisStateStore::connect(StateConfig::from_env()).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to connect state store: {}", e);
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let transcoder = FfmpegTranscoder::new(MediaConfig {
        timeout: Some(config.ffmpeg_timeout),
        threads: config.ffmpeg_threads,
    })
    .with_cancel(shutdown_rx.clone());

    let ctx = Arc::new(PipelineContext {
        raw_store: Arc::new(raw_store),
        processed_store: Arc::new(processed_store),
        state: Arc::new(state),
        queue: Arc::new(queue),
        transcoder: Arc::new(transcoder),
        config,
    });

    let mut tasks = Vec::new();
    for stage in Stage::QUEUED {
        let executor = StageExecutor::new(Arc::clone(&ctx), stage, shutdown_rx.clone());
        tasks.push(tokio::spawn(executor.run()));
    }
    let cleanup = CleanupWorker::new(Arc::clone(&ctx), shutdown_rx.clone());
    tasks.push(tokio::spawn(cleanup.run()));

    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        task.await.ok();
    }

    info!("Worker shutdown complete");
}
