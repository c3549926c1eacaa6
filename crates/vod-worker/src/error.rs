//! Pipeline error types.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Upload validation failures, reported back to the caller of the
/// assembler rather than recorded in the error history.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("Declared size {declared} exceeds limit {limit}")]
    SizeExceeded { declared: u64, limit: u64 },

    #[error("Chunk count {declared} exceeds limit {limit}")]
    TooManyChunks { declared: u32, limit: u32 },

    #[error("Chunk index {index} out of range (expected < {total})")]
    ChunkIndexOutOfRange { index: u32, total: u32 },

    #[error("Chunk total {declared} disagrees with session total {expected}")]
    ChunkTotalMismatch { declared: u32, expected: u32 },

    #[error("No active upload session for video {0}")]
    NoActiveSession(String),

    #[error("Upload session for video {0} has expired")]
    SessionExpired(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error("Missing rendition {quality} for video {video_id}")]
    MissingRendition { video_id: String, quality: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Storage(#[from] vod_storage::StorageError),

    #[error(transparent)]
    Queue(#[from] vod_queue::QueueError),

    #[error(transparent)]
    State(#[from] vod_state::StateError),

    #[error(transparent)]
    Media(#[from] vod_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// True when the work was interrupted by shutdown rather than failing;
    /// such jobs are nacked for redelivery instead of burning an attempt.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Media(e) if e.is_cancelled())
    }
}
