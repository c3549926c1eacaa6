//! Pipeline workers: upload assembly, stage execution and cleanup.
//!
//! Everything here runs against the capability traits (`ObjectStore`,
//! `JobQueue`, `StateStore`, `Transcoder`), so the whole pipeline is
//! testable in-process with filesystem storage and in-memory queue/state.

pub mod assembler;
pub mod cleanup;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod stages;

#[cfg(test)]
pub mod testutil;

pub use assembler::{ChunkOutcome, UploadAssembler};
pub use cleanup::CleanupWorker;
pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use error::{PipelineError, PipelineResult, UploadError};
pub use executor::StageExecutor;
