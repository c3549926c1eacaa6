//! Stage-partitioned job queue.
//!
//! This crate provides:
//! - Job payloads for the transcode/chunk/manifest stages
//! - The `JobQueue` capability trait with visibility-timeout semantics
//! - A Redis Streams implementation for production
//! - An in-memory implementation for tests and development

pub mod error;
pub mod job;
pub mod memory;
pub mod queue;
pub mod redis_queue;

pub use error::{QueueError, QueueResult};
pub use job::{ChunkJob, ClaimedJob, Job, JobId, ManifestJob, TranscodeJob};
pub use memory::MemoryQueue;
pub use queue::{JobQueue, QueueConfig};
pub use redis_queue::RedisQueue;
