//! Shared data models for the Vodforge streaming pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Video lifecycle records and renditions
//! - Chunked upload sessions
//! - Pipeline stages and error history
//! - The transcoding quality ladder

pub mod profile;
pub mod session;
pub mod stage;
pub mod video;

// Re-export common types
pub use profile::{default_ladder, QualityProfile};
pub use session::UploadSession;
pub use stage::Stage;
pub use video::{
    DashSegment, ErrorEntry, HlsSegment, ManifestLocations, Rendition, VideoId, VideoRecord,
    VideoStatus,
};
