//! Transcode stage: raw upload to MP4 renditions, one per ladder rung.

use tracing::{debug, info};
use vod_media::Transcoder;
use vod_models::{Rendition, VideoStatus};
use vod_queue::{Job, JobQueue, TranscodeJob};
use vod_state::update;
use vod_storage::{keys, ObjectStore};

use crate::context::PipelineContext;
use crate::error::{PipelineError, PipelineResult};

pub async fn run(ctx: &PipelineContext, job: &TranscodeJob) -> PipelineResult<()> {
    let video_id = &job.video_id;

    // Claim the video for processing. A cancelled or already-finished
    // video makes this a no-op; the job is simply consumed.
    let (record, claimed) = update(ctx.state.as_ref(), video_id, |rec| {
        if rec.status.is_terminal() && rec.status != VideoStatus::Failed {
            return Ok(None);
        }
        if rec.status != VideoStatus::Processing && !rec.transition(VideoStatus::Processing) {
            return Ok(None);
        }
        Ok::<_, PipelineError>(Some(()))
    })
    .await?;
    if claimed.is_none() {
        info!(video_id = %video_id, status = %record.status, "Skipping transcode, video not processable");
        return Ok(());
    }

    let raw_key = record
        .raw_location
        .clone()
        .ok_or_else(|| PipelineError::invalid_state(format!("no raw file for {video_id}")))?;

    let scratch = ctx.scratch_dir()?;
    let input = scratch.path().join("source");
    ctx.raw_store.get_file(&raw_key, &input).await?;

    let info = ctx.transcoder.probe(&input).await?;
    debug!(video_id = %video_id, duration = info.duration, "Probed source");

    // Encode every rung, then upload. Keyframes align to the HLS segment
    // length so both segmenters can stream-copy later.
    let mut renditions = Vec::with_capacity(ctx.config.ladder.len());
    for profile in &ctx.config.ladder {
        let output = scratch.path().join(format!("{}.mp4", profile.name));
        ctx.transcoder
            .transcode(&input, &output, profile, ctx.config.hls_segment_secs)
            .await?;

        let key = keys::rendition(video_id, &profile.name);
        ctx.processed_store
            .put_file(&key, &output, "video/mp4")
            .await?;
        renditions.push(Rendition::from_profile(profile, key));
        debug!(video_id = %video_id, quality = %profile.name, "Rendition uploaded");
    }

    // Replace the rendition set wholesale; a retry after partial failure
    // starts the chunk accounting over, including the manifest guard.
    let (_, committed) = update(ctx.state.as_ref(), video_id, |rec| {
        if rec.status != VideoStatus::Processing {
            return Ok(None);
        }
        rec.duration_seconds = Some(info.duration);
        rec.renditions = renditions.clone();
        rec.manifest_enqueued = false;
        rec.updated_at = chrono::Utc::now();
        Ok::<_, PipelineError>(Some(()))
    })
    .await?;
    if committed.is_none() {
        info!(video_id = %video_id, "Video cancelled during transcode, discarding output");
        return Ok(());
    }

    for profile in &ctx.config.ladder {
        ctx.queue
            .enqueue(Job::chunk(video_id.clone(), profile.name.clone()))
            .await?;
    }
    info!(
        video_id = %video_id,
        renditions = ctx.config.ladder.len(),
        "Transcode complete, chunk jobs queued"
    );
    Ok(())
}
