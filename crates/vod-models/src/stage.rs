//! Pipeline stage identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A processing stage of the pipeline.
///
/// The job queue is partitioned by stage; workers claim jobs for the
/// stage they serve. `Cleanup` is timer-driven rather than queue-driven
/// but shares the tag so error history entries can name it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Transcode,
    Chunk,
    Manifest,
    Cleanup,
}

impl Stage {
    /// Stages that receive work through the job queue.
    pub const QUEUED: [Stage; 3] = [Stage::Transcode, Stage::Chunk, Stage::Manifest];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Transcode => "transcode",
            Stage::Chunk => "chunk",
            Stage::Manifest => "manifest",
            Stage::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
