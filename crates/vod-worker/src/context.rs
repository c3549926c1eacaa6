//! Shared dependencies for all pipeline workers.

use std::sync::Arc;
use tempfile::TempDir;
use vod_media::Transcoder;
use vod_queue::JobQueue;
use vod_state::StateStore;
use vod_storage::ObjectStore;

use crate::config::PipelineConfig;
use crate::error::PipelineResult;

/// Everything a worker needs, behind the capability traits.
pub struct PipelineContext {
    /// Bucket holding upload chunks and assembled raw files.
    pub raw_store: Arc<dyn ObjectStore>,
    /// Bucket holding renditions, segments and manifests.
    pub processed_store: Arc<dyn ObjectStore>,
    pub state: Arc<dyn StateStore>,
    pub queue: Arc<dyn JobQueue>,
    pub transcoder: Arc<dyn Transcoder>,
    pub config: PipelineConfig,
}

impl PipelineContext {
    /// A scratch directory removed on drop. One per job, so concurrent
    /// jobs never share paths.
    pub fn scratch_dir(&self) -> PipelineResult<TempDir> {
        std::fs::create_dir_all(&self.config.work_dir)?;
        Ok(TempDir::new_in(&self.config.work_dir)?)
    }
}
