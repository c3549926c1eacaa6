//! Stage executor: claims jobs, runs handlers, owns retry bookkeeping.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use vod_models::{Stage, VideoStatus};
use vod_queue::{ClaimedJob, JobQueue};
use vod_state::update;

use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::stages;

/// Claims jobs for one stage and runs them on a bounded set of tasks.
pub struct StageExecutor {
    ctx: Arc<PipelineContext>,
    stage: Stage,
    semaphore: Arc<Semaphore>,
    shutdown: watch::Receiver<bool>,
}

impl StageExecutor {
    pub fn new(ctx: Arc<PipelineContext>, stage: Stage, shutdown: watch::Receiver<bool>) -> Self {
        let semaphore = Arc::new(Semaphore::new(ctx.config.max_concurrent_jobs));
        Self {
            ctx,
            stage,
            semaphore,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        info!(
            stage = %self.stage,
            concurrency = self.ctx.config.max_concurrent_jobs,
            "Stage executor started"
        );

        loop {
            if *self.shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        info!(stage = %self.stage, "Shutdown signal received, stopping executor");
                        break;
                    }
                }
                claimed = self.ctx.queue.claim(self.stage, self.ctx.config.claim_wait) => {
                    match claimed {
                        Ok(Some(claimed)) => {
                            let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                                Ok(permit) => permit,
                                Err(_) => break,
                            };
                            let ctx = Arc::clone(&self.ctx);
                            tokio::spawn(async move {
                                let _permit = permit;
                                execute_job(ctx, claimed).await;
                            });
                        }
                        Ok(None) => {}
                        Err(e) => {
                            error!(stage = %self.stage, error = %e, "Claim failed, backing off");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }

        // Let in-flight jobs finish before dropping out.
        let drain = async {
            while self.semaphore.available_permits() < self.ctx.config.max_concurrent_jobs {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        };
        let _ = tokio::time::timeout(Duration::from_secs(60), drain).await;
        info!(stage = %self.stage, "Stage executor stopped");
    }
}

/// Run one claimed job to completion, heartbeating its visibility while it
/// works, then settle it with the queue.
pub async fn execute_job(ctx: Arc<PipelineContext>, claimed: ClaimedJob) {
    let job = &claimed.job;
    info!(
        job_id = %job.job_id(),
        video_id = %job.video_id(),
        stage = %job.stage(),
        attempt = job.attempt(),
        "Executing job"
    );

    let work = stages::process(&ctx, job);
    tokio::pin!(work);
    let mut heartbeat = tokio::time::interval(ctx.config.heartbeat_interval);
    heartbeat.tick().await;

    let result = loop {
        tokio::select! {
            result = &mut work => break result,
            _ = heartbeat.tick() => {
                if let Err(e) = ctx.queue.extend_visibility(&claimed).await {
                    warn!(job_id = %job.job_id(), error = %e, "Heartbeat failed");
                }
            }
        }
    };

    match result {
        Ok(()) => {
            info!(job_id = %job.job_id(), "Job completed");
            if let Err(e) = ctx.queue.ack(&claimed).await {
                error!(job_id = %job.job_id(), error = %e, "Ack failed");
            }
        }
        Err(e) if e.is_cancelled() => {
            // Interrupted by shutdown, not a failure; hand the job back.
            info!(job_id = %job.job_id(), "Job interrupted, returning to queue");
            if let Err(e) = ctx.queue.nack(&claimed).await {
                error!(job_id = %job.job_id(), error = %e, "Nack failed");
            }
        }
        Err(e) => handle_failure(&ctx, &claimed, &e).await,
    }
}

/// Record a failed attempt and either schedule the next one or fail the
/// video for good.
pub async fn handle_failure(ctx: &PipelineContext, claimed: &ClaimedJob, error: &PipelineError) {
    let job = &claimed.job;
    let attempt = job.attempt();
    let exhausted = attempt >= ctx.config.max_attempts;
    error!(
        job_id = %job.job_id(),
        video_id = %job.video_id(),
        stage = %job.stage(),
        attempt,
        error = %error,
        "Job attempt failed"
    );

    let recorded = update(ctx.state.as_ref(), job.video_id(), |rec| {
        if rec.status == VideoStatus::Cancelled {
            return Ok(None);
        }
        rec.record_error(job.stage(), error.to_string(), attempt);
        if exhausted {
            rec.transition(VideoStatus::Failed);
        }
        Ok::<_, PipelineError>(Some(()))
    })
    .await;
    match recorded {
        Ok((_, Some(()))) => {}
        Ok((_, None)) => debug!(video_id = %job.video_id(), "Video cancelled, error not recorded"),
        Err(e) => error!(video_id = %job.video_id(), error = %e, "Failed to record error history"),
    }

    let mut consumed = true;
    if exhausted {
        warn!(
            job_id = %job.job_id(),
            video_id = %job.video_id(),
            attempts = attempt,
            "Attempt budget exhausted, video failed"
        );
    } else {
        let delay = ctx.config.retry_delay(attempt);
        match ctx.queue.enqueue_delayed(job.next_attempt(), delay).await {
            Ok(()) => info!(
                job_id = %job.job_id(),
                next_attempt = attempt + 1,
                delay_secs = delay.as_secs(),
                "Retry scheduled"
            ),
            Err(e) => {
                // Could not schedule the retry; keep the delivery alive so
                // the visibility timeout redelivers it.
                error!(job_id = %job.job_id(), error = %e, "Failed to schedule retry");
                consumed = false;
            }
        }
    }

    if consumed {
        if let Err(e) = ctx.queue.ack(claimed).await {
            error!(job_id = %job.job_id(), error = %e, "Ack failed");
        }
    } else if let Err(e) = ctx.queue.nack(claimed).await {
        error!(job_id = %job.job_id(), error = %e, "Nack failed");
    }
}
