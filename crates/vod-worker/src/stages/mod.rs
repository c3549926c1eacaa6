//! Stage handlers.
//!
//! Each handler is a free async function taking the shared context and the
//! stage's job payload. Handlers are idempotent: a redelivered job redoes
//! its work and overwrites the same storage keys, and all state commits go
//! through CAS guards that make the downstream enqueue happen once.

pub mod chunk;
pub mod manifest;
pub mod transcode;

use vod_queue::Job;

use crate::context::PipelineContext;
use crate::error::PipelineResult;

/// Dispatch a job to its stage handler.
pub async fn process(ctx: &PipelineContext, job: &Job) -> PipelineResult<()> {
    match job {
        Job::Transcode(j) => transcode::run(ctx, j).await,
        Job::Chunk(j) => chunk::run(ctx, j).await,
        Job::Manifest(j) => manifest::run(ctx, j).await,
    }
}
