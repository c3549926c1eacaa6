//! Queue capability trait and configuration.

use async_trait::async_trait;
use std::time::Duration;
use vod_models::Stage;

use crate::error::QueueResult;
use crate::job::{ClaimedJob, Job};

/// Queue configuration, read from the environment in production.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub redis_url: String,
    /// Prefix for all queue keys, `vod` by default.
    pub key_prefix: String,
    pub consumer_group: String,
    /// How long a claimed job stays invisible before it is redelivered to
    /// another worker.
    pub visibility_timeout: Duration,
}

impl QueueConfig {
    pub fn from_env() -> Self {
        let visibility_secs = std::env::var("QUEUE_VISIBILITY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300);
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            key_prefix: std::env::var("QUEUE_KEY_PREFIX").unwrap_or_else(|_| "vod".to_string()),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|_| "vod-workers".to_string()),
            visibility_timeout: Duration::from_secs(visibility_secs),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "vod".to_string(),
            consumer_group: "vod-workers".to_string(),
            visibility_timeout: Duration::from_secs(300),
        }
    }
}

/// Durable at-least-once job queue, partitioned by pipeline stage.
///
/// Delivery contract:
/// - A claimed job is invisible to other consumers until it is acked,
///   nacked, or its visibility timeout elapses.
/// - Ack is idempotent; acking after the timeout already redelivered the
///   job is harmless (the redelivery proceeds independently).
/// - Ordering within a stage is best-effort FIFO, not guaranteed.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append a job to its stage's queue.
    async fn enqueue(&self, job: Job) -> QueueResult<()>;

    /// Make a job deliverable only after `delay` has elapsed. Used for
    /// retry backoff.
    async fn enqueue_delayed(&self, job: Job, delay: Duration) -> QueueResult<()>;

    /// Claim the next available job for a stage, waiting up to `wait` for
    /// one to arrive. Expired in-flight jobs are reclaimed before new ones
    /// are read.
    async fn claim(&self, stage: Stage, wait: Duration) -> QueueResult<Option<ClaimedJob>>;

    /// Acknowledge successful (or terminally failed) processing and drop
    /// the job.
    async fn ack(&self, claimed: &ClaimedJob) -> QueueResult<()>;

    /// Return a job to its queue for immediate redelivery.
    async fn nack(&self, claimed: &ClaimedJob) -> QueueResult<()>;

    /// Reset the visibility clock for a long-running job so it is not
    /// redelivered while still being worked on.
    async fn extend_visibility(&self, claimed: &ClaimedJob) -> QueueResult<()>;
}
