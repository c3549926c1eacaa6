//! Timer-driven cleanup: expired sessions, staged chunks, cancelled and
//! failed videos, stalled processing, raw retention.
//!
//! Every pass is idempotent and per-video failures are logged and skipped,
//! so a partial sweep converges over later runs.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use vod_models::{Stage, VideoId, VideoStatus};
use vod_state::{update, StateStore};
use vod_storage::{keys, ObjectStore};

use crate::context::PipelineContext;
use crate::error::{PipelineError, PipelineResult};

pub struct CleanupWorker {
    ctx: Arc<PipelineContext>,
    shutdown: watch::Receiver<bool>,
}

impl CleanupWorker {
    pub fn new(ctx: Arc<PipelineContext>, shutdown: watch::Receiver<bool>) -> Self {
        Self { ctx, shutdown }
    }

    pub async fn run(mut self) {
        info!(
            interval_secs = self.ctx.config.cleanup_interval.as_secs(),
            "Cleanup worker started"
        );
        let mut interval = tokio::time::interval(self.ctx.config.cleanup_interval);
        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => self.sweep().await,
            }
        }
        info!("Cleanup worker stopped");
    }

    /// One full pass over every known video.
    pub async fn sweep(&self) {
        let ids = match self.ctx.state.list().await {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "Cleanup sweep could not list videos");
                return;
            }
        };
        debug!(videos = ids.len(), "Cleanup sweep started");
        for video_id in ids {
            if let Err(e) = self.sweep_video(&video_id).await {
                warn!(video_id = %video_id, error = %e, "Cleanup pass failed");
            }
        }
    }

    async fn sweep_video(&self, video_id: &VideoId) -> PipelineResult<()> {
        let record = match self.ctx.state.load(video_id).await {
            Ok(versioned) => versioned.record,
            // Removed by a concurrent sweep.
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let now = Utc::now();

        match record.status {
            VideoStatus::Pending | VideoStatus::Uploading => {
                let expired = record
                    .upload
                    .as_ref()
                    .map(|s| s.is_expired(now))
                    .unwrap_or(true);
                if expired {
                    self.expire_upload(video_id).await?;
                }
            }
            VideoStatus::Queued | VideoStatus::Processing => {
                self.reclaim_chunks(video_id).await?;
                if record.status == VideoStatus::Processing
                    && record.updated_at + self.ctx.config.stalled_grace < now
                {
                    self.fail_stalled(video_id).await?;
                }
            }
            VideoStatus::Ready => {
                self.reclaim_chunks(video_id).await?;
                if record.expires_at < now && record.raw_location.is_some() {
                    self.reclaim_raw(video_id).await?;
                }
            }
            VideoStatus::Cancelled => self.reclaim_cancelled(video_id).await?,
            VideoStatus::Failed => {
                if record.updated_at + self.ctx.config.failed_grace < now {
                    self.reclaim_failed(video_id).await?;
                }
            }
        }
        Ok(())
    }

    /// An upload that never completed inside its TTL: drop the staged
    /// chunks and fail the video.
    async fn expire_upload(&self, video_id: &VideoId) -> PipelineResult<()> {
        let removed = self
            .ctx
            .raw_store
            .delete_prefix(&keys::chunk_prefix(video_id))
            .await?;
        update(self.ctx.state.as_ref(), video_id, |rec| {
            if !matches!(rec.status, VideoStatus::Pending | VideoStatus::Uploading) {
                return Ok(None);
            }
            rec.upload = None;
            rec.record_error(Stage::Cleanup, "Upload session expired", 1);
            rec.transition(VideoStatus::Failed);
            Ok::<_, PipelineError>(Some(()))
        })
        .await?;
        info!(video_id = %video_id, chunks = removed, "Expired upload session cleaned up");
        Ok(())
    }

    /// Staging chunks are dead weight once the raw file is assembled.
    async fn reclaim_chunks(&self, video_id: &VideoId) -> PipelineResult<()> {
        let removed = self
            .ctx
            .raw_store
            .delete_prefix(&keys::chunk_prefix(video_id))
            .await?;
        if removed > 0 {
            debug!(video_id = %video_id, chunks = removed, "Staged chunks reclaimed");
        }
        Ok(())
    }

    /// A processing video untouched past the stall horizon lost its jobs
    /// (queue data loss, crashed worker past the attempt budget); fail it
    /// so it stops looking in-flight.
    async fn fail_stalled(&self, video_id: &VideoId) -> PipelineResult<()> {
        let (_, committed) = update(self.ctx.state.as_ref(), video_id, |rec| {
            if rec.status != VideoStatus::Processing
                || rec.updated_at + self.ctx.config.stalled_grace >= Utc::now()
            {
                return Ok(None);
            }
            rec.record_error(Stage::Cleanup, "Processing stalled, no progress recorded", 1);
            rec.transition(VideoStatus::Failed);
            Ok::<_, PipelineError>(Some(()))
        })
        .await?;
        if committed.is_some() {
            warn!(video_id = %video_id, "Stalled processing marked failed");
        }
        Ok(())
    }

    /// Past the retention horizon the raw upload goes; renditions and
    /// manifests stay playable.
    async fn reclaim_raw(&self, video_id: &VideoId) -> PipelineResult<()> {
        let (_, committed) = update(self.ctx.state.as_ref(), video_id, |rec| {
            match rec.raw_location.take() {
                Some(key) => {
                    rec.updated_at = Utc::now();
                    Ok::<_, PipelineError>(Some(key))
                }
                None => Ok(None),
            }
        })
        .await?;
        if let Some(raw_key) = committed {
            self.ctx.raw_store.delete(&raw_key).await?;
            info!(video_id = %video_id, "Raw upload reclaimed after retention");
        }
        Ok(())
    }

    /// Cancelled videos keep their record but lose every stored object.
    async fn reclaim_cancelled(&self, video_id: &VideoId) -> PipelineResult<()> {
        let record = self.ctx.state.load(video_id).await?.record;
        let nothing_left = record.upload.is_none()
            && record.raw_location.is_none()
            && record.renditions.is_empty();
        if nothing_left {
            return Ok(());
        }

        self.ctx
            .raw_store
            .delete_prefix(&keys::video_prefix(video_id))
            .await?;
        self.ctx
            .processed_store
            .delete_prefix(&keys::video_prefix(video_id))
            .await?;

        update(self.ctx.state.as_ref(), video_id, |rec| {
            rec.upload = None;
            rec.raw_location = None;
            rec.renditions.clear();
            rec.manifests = Default::default();
            rec.updated_at = Utc::now();
            Ok::<_, PipelineError>(Some(()))
        })
        .await?;
        info!(video_id = %video_id, "Cancelled video reclaimed");
        Ok(())
    }

    /// Failed videos past the grace period: drop all artifacts, archive the
    /// error history for postmortems, then forget the record.
    async fn reclaim_failed(&self, video_id: &VideoId) -> PipelineResult<()> {
        let record = self.ctx.state.load(video_id).await?.record;

        self.ctx
            .raw_store
            .delete_prefix(&keys::video_prefix(video_id))
            .await?;
        self.ctx
            .processed_store
            .delete_prefix(&keys::video_prefix(video_id))
            .await?;

        // Written after the prefix delete so it survives it.
        let archive = serde_json::to_vec_pretty(&record.error_history)?;
        self.ctx
            .processed_store
            .put_bytes(&keys::error_archive(video_id), archive, "application/json")
            .await?;

        self.ctx.state.remove(video_id).await?;
        info!(
            video_id = %video_id,
            errors = record.error_history.len(),
            "Failed video reclaimed, error history archived"
        );
        Ok(())
    }
}
