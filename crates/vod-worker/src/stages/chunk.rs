//! Chunk stage: segment one rendition for HLS and DASH delivery.

use std::path::Path;
use tokio::fs;
use tracing::{debug, info};
use vod_media::Transcoder;
use vod_models::VideoId;
use vod_queue::{ChunkJob, Job, JobQueue};
use vod_state::{update, StateStore};
use vod_storage::{keys, ObjectStore};

use crate::context::PipelineContext;
use crate::error::{PipelineError, PipelineResult};

pub async fn run(ctx: &PipelineContext, job: &ChunkJob) -> PipelineResult<()> {
    let video_id = &job.video_id;
    let quality = &job.quality;

    let record = ctx.state.load(video_id).await?.record;
    if record.status.is_terminal() {
        info!(video_id = %video_id, status = %record.status, "Skipping chunk, video in terminal state");
        return Ok(());
    }
    let rendition = record
        .rendition(quality)
        .ok_or_else(|| PipelineError::MissingRendition {
            video_id: video_id.as_str().to_string(),
            quality: quality.clone(),
        })?;

    let scratch = ctx.scratch_dir()?;
    let input = scratch.path().join(format!("{quality}.mp4"));
    ctx.processed_store.get_file(&rendition.location, &input).await?;

    let hls_dir = scratch.path().join("hls");
    let hls_segments = ctx
        .transcoder
        .segment_hls(&input, &hls_dir, ctx.config.hls_segment_secs)
        .await?;
    for segment in &hls_segments {
        ctx.processed_store
            .put_file(
                &keys::hls_segment(video_id, quality, &segment.filename),
                &hls_dir.join(&segment.filename),
                "video/mp2t",
            )
            .await?;
    }
    debug!(video_id = %video_id, quality = %quality, segments = hls_segments.len(), "HLS segments uploaded");

    let dash_dir = scratch.path().join("dash");
    let dash_segments = ctx
        .transcoder
        .segment_dash(&input, &dash_dir, ctx.config.dash_segment_secs)
        .await?;
    upload_dash_files(ctx, video_id, quality, &dash_dir).await?;
    debug!(video_id = %video_id, quality = %quality, segments = dash_segments.len(), "DASH segments uploaded");

    // Record the inventories. The writer whose commit makes every
    // rendition chunked flips the manifest guard and owns the enqueue.
    let (_, wins_manifest) = update(ctx.state.as_ref(), video_id, |rec| {
        if rec.status.is_terminal() {
            return Ok(None);
        }
        let rendition = match rec.rendition_mut(quality) {
            Some(r) => r,
            // Rendition set was replaced by a transcode retry; this job's
            // output is stale and a fresh chunk job is on its way.
            None => return Ok(None),
        };
        rendition.hls_segments = hls_segments.clone();
        rendition.dash_segments = dash_segments.clone();
        rendition.chunked = true;
        rec.updated_at = chrono::Utc::now();

        let wins = rec.all_renditions_chunked() && !rec.manifest_enqueued;
        if wins {
            rec.manifest_enqueued = true;
        }
        Ok::<_, PipelineError>(Some(wins))
    })
    .await?;

    if wins_manifest == Some(true) {
        ctx.queue.enqueue(Job::manifest(video_id.clone())).await?;
        info!(video_id = %video_id, "All renditions chunked, manifest job queued");
    }
    Ok(())
}

/// Upload the init segment and every media segment produced for DASH.
async fn upload_dash_files(
    ctx: &PipelineContext,
    video_id: &VideoId,
    quality: &str,
    dash_dir: &Path,
) -> PipelineResult<()> {
    let mut entries = fs::read_dir(dash_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        let is_media = name == "init.mp4" || name.ends_with(".m4s");
        if !is_media {
            continue;
        }
        ctx.processed_store
            .put_file(
                &keys::dash_file(video_id, quality, &name),
                &entry.path(),
                "video/mp4",
            )
            .await?;
    }
    Ok(())
}
