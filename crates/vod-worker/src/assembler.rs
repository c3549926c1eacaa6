//! Upload intake: session creation, chunk staging and reassembly.
//!
//! Chunk completion races are settled by the state store's CAS: the writer
//! whose commit makes the received set complete is the one writer that
//! assembles the raw file and enqueues the transcode job.

use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use vod_models::{VideoId, VideoRecord, VideoStatus};
use vod_queue::{Job, JobQueue};
use vod_state::{update, StateStore};
use vod_storage::{keys, ObjectStore};

use crate::context::PipelineContext;
use crate::error::{PipelineError, PipelineResult, UploadError};

/// Result of accepting one chunk.
#[derive(Debug, Clone)]
pub struct ChunkOutcome {
    /// Distinct chunks received so far.
    pub received: u32,
    /// Declared chunk total.
    pub expected: u32,
    /// True once the raw file has been assembled and queued.
    pub complete: bool,
}

pub struct UploadAssembler<'a> {
    ctx: &'a PipelineContext,
}

impl<'a> UploadAssembler<'a> {
    pub fn new(ctx: &'a PipelineContext) -> Self {
        Self { ctx }
    }

    /// Create a video record with an open upload session.
    pub async fn initialize(
        &self,
        filename: &str,
        content_type: &str,
        size_bytes: u64,
    ) -> PipelineResult<VideoId> {
        if !content_type.starts_with("video/") {
            return Err(UploadError::UnsupportedContentType(content_type.to_string()).into());
        }
        if size_bytes > self.ctx.config.max_upload_bytes {
            return Err(UploadError::SizeExceeded {
                declared: size_bytes,
                limit: self.ctx.config.max_upload_bytes,
            }
            .into());
        }

        let video_id = VideoId::new();
        let record = VideoRecord::new(
            video_id.clone(),
            filename,
            content_type,
            size_bytes,
            self.ctx.config.session_ttl,
            self.ctx.config.raw_retention,
        );
        self.ctx.state.insert(record).await?;
        info!(video_id = %video_id, filename, "Upload initialized");
        Ok(video_id)
    }

    /// Stage one chunk. Idempotent for retransmitted chunks.
    ///
    /// The chunk object is written before the session is updated, so a
    /// recorded index always has its bytes in place. Any commit that
    /// leaves the set complete while the session is still open triggers
    /// assembly, so a retransmit after a failed assembly attempt retries
    /// it; the `Queued` CAS inside [`assemble`](Self::assemble) keeps the
    /// transcode enqueue to exactly one.
    pub async fn accept_chunk(
        &self,
        video_id: &VideoId,
        index: u32,
        total_chunks: u32,
        data: Vec<u8>,
    ) -> PipelineResult<ChunkOutcome> {
        if total_chunks == 0 || total_chunks > self.ctx.config.max_chunks {
            return Err(UploadError::TooManyChunks {
                declared: total_chunks,
                limit: self.ctx.config.max_chunks,
            }
            .into());
        }
        if index >= total_chunks {
            return Err(UploadError::ChunkIndexOutOfRange {
                index,
                total: total_chunks,
            }
            .into());
        }

        // Cheap pre-checks before paying for the object write. The CAS
        // below re-validates, so a race here only wastes one upload.
        let current = self.ctx.state.load(video_id).await?.record;
        Self::check_session(&current)?;

        self.ctx
            .raw_store
            .put_bytes(
                &keys::chunk(video_id, index),
                data,
                "application/octet-stream",
            )
            .await?;

        let (record, committed) = update(self.ctx.state.as_ref(), video_id, |rec| {
            Self::check_session(rec)?;
            let session = match rec.upload.as_mut() {
                Some(s) => s,
                None => return Ok(None),
            };
            match session.expected_total_chunks {
                None => session.expected_total_chunks = Some(total_chunks),
                Some(existing) if existing != total_chunks => {
                    return Err(UploadError::ChunkTotalMismatch {
                        declared: total_chunks,
                        expected: existing,
                    }
                    .into())
                }
                Some(_) => {}
            }
            session.received.insert(index);
            let complete = session.is_complete();
            if rec.status == VideoStatus::Pending {
                rec.transition(VideoStatus::Uploading);
            } else {
                rec.updated_at = Utc::now();
            }
            Ok::<_, PipelineError>(Some(complete))
        })
        .await?;

        let complete = match committed {
            Some(flag) => flag,
            // Session vanished between the pre-check and the commit
            // (cancel or concurrent assembly); the chunk object will be
            // reclaimed by cleanup.
            None => {
                return Err(UploadError::NoActiveSession(video_id.as_str().to_string()).into())
            }
        };

        let (received, expected) = match record.upload.as_ref() {
            Some(s) => (
                s.received.len() as u32,
                s.expected_total_chunks.unwrap_or(total_chunks),
            ),
            None => (total_chunks, total_chunks),
        };

        if complete {
            self.assemble(video_id, &record).await?;
        }

        Ok(ChunkOutcome {
            received,
            expected,
            complete,
        })
    }

    /// Cancel a video. Terminal states are left untouched; staged objects
    /// are reclaimed by the cleanup worker, not here. The upload session
    /// stays on the record until then, so the sweep can tell there are
    /// chunks left to delete.
    pub async fn cancel(&self, video_id: &VideoId) -> PipelineResult<bool> {
        let (_, committed) = update(self.ctx.state.as_ref(), video_id, |rec| {
            if rec.status.is_terminal() {
                return Ok(None);
            }
            rec.transition(VideoStatus::Cancelled);
            Ok::<_, PipelineError>(Some(()))
        })
        .await?;
        if committed.is_some() {
            info!(video_id = %video_id, "Video cancelled");
        }
        Ok(committed.is_some())
    }

    fn check_session(record: &VideoRecord) -> PipelineResult<()> {
        match record.status {
            VideoStatus::Pending | VideoStatus::Uploading => {}
            _ => {
                return Err(
                    UploadError::NoActiveSession(record.video_id.as_str().to_string()).into(),
                )
            }
        }
        match record.upload.as_ref() {
            Some(session) if session.is_expired(Utc::now()) => {
                Err(UploadError::SessionExpired(record.video_id.as_str().to_string()).into())
            }
            Some(_) => Ok(()),
            None => Err(UploadError::NoActiveSession(record.video_id.as_str().to_string()).into()),
        }
    }

    /// Concatenate staged chunks into the raw object, close the session
    /// and enqueue the transcode job.
    ///
    /// Safe to call repeatedly for the same video: the raw object write is
    /// an overwrite and only the commit that moves the record out of its
    /// upload state enqueues the transcode job.
    async fn assemble(&self, video_id: &VideoId, record: &VideoRecord) -> PipelineResult<()> {
        let total = match record.upload.as_ref().and_then(|s| s.expected_total_chunks) {
            Some(total) => total,
            None => {
                return Err(PipelineError::invalid_state(format!(
                    "assembly triggered without chunk total for {video_id}"
                )))
            }
        };

        // Spool to a scratch file so a large upload never has to fit in
        // memory all at once.
        let scratch = self.ctx.scratch_dir()?;
        let assembled_path = scratch.path().join("assembled");
        let mut assembled = fs::File::create(&assembled_path).await?;
        for index in 0..total {
            let chunk = self.ctx.raw_store.get_bytes(&keys::chunk(video_id, index)).await?;
            assembled.write_all(&chunk).await?;
        }
        assembled.flush().await?;
        drop(assembled);

        let actual = fs::metadata(&assembled_path).await?.len();
        if actual != record.size_bytes {
            warn!(
                video_id = %video_id,
                declared = record.size_bytes,
                actual,
                "Assembled size differs from declared size"
            );
        }

        let raw_key = keys::raw(video_id, &record.filename);
        self.ctx
            .raw_store
            .put_file(&raw_key, &assembled_path, &record.content_type)
            .await?;

        let (_, committed) = update(self.ctx.state.as_ref(), video_id, |rec| {
            // A cancel that slipped in, or a concurrent assembler that
            // already queued the video, wins; cleanup reclaims the staged
            // objects.
            if !matches!(rec.status, VideoStatus::Pending | VideoStatus::Uploading) {
                return Ok(None);
            }
            rec.raw_location = Some(raw_key.clone());
            rec.upload = None;
            rec.transition(VideoStatus::Queued);
            Ok::<_, PipelineError>(Some(()))
        })
        .await?;

        if committed.is_none() {
            return Ok(());
        }

        self.ctx.queue.enqueue(Job::transcode(video_id.clone())).await?;
        info!(video_id = %video_id, chunks = total, "Raw file assembled, transcode queued");
        Ok(())
    }
}
