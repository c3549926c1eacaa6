//! Manifest stage: playlists and MPD from the recorded segment inventories.

use tracing::info;
use vod_media::manifest;
use vod_models::{ManifestLocations, VideoStatus};
use vod_queue::ManifestJob;
use vod_state::{update, StateStore};
use vod_storage::{keys, ObjectStore};

use crate::context::PipelineContext;
use crate::error::{PipelineError, PipelineResult};

pub async fn run(ctx: &PipelineContext, job: &ManifestJob) -> PipelineResult<()> {
    let video_id = &job.video_id;

    // A retry still inside its attempt budget may pull a failed video back
    // to ready; a redelivery of the exhausted final attempt may not.
    let revivable = job.attempt < ctx.config.max_attempts;

    let record = ctx.state.load(video_id).await?.record;
    if record.status.is_terminal() && !(record.status == VideoStatus::Failed && revivable) {
        info!(video_id = %video_id, status = %record.status, "Skipping manifest, video in terminal state");
        return Ok(());
    }
    if !record.all_renditions_chunked() {
        // Should not happen given the enqueue guard; treat as a retryable
        // fault rather than publishing a partial manifest.
        return Err(PipelineError::invalid_state(format!(
            "manifest requested before all renditions chunked for {video_id}"
        )));
    }
    let duration = record.duration_seconds.unwrap_or_else(|| {
        record
            .renditions
            .first()
            .map(|r| r.hls_segments.iter().map(|s| s.duration).sum())
            .unwrap_or(0.0)
    });

    let renditions: Vec<&_> = record.renditions.iter().collect();

    // Variant playlists sit next to the per-quality segment directories.
    for rendition in &record.renditions {
        let playlist = manifest::variant_playlist(
            &format!("{}/", rendition.quality),
            &rendition.hls_segments,
        );
        ctx.processed_store
            .put_bytes(
                &keys::hls_variant(video_id, &rendition.quality),
                playlist.into_bytes(),
                "application/vnd.apple.mpegurl",
            )
            .await?;
    }

    let master = manifest::master_playlist(&renditions);
    let master_key = keys::hls_master(video_id);
    ctx.processed_store
        .put_bytes(
            &master_key,
            master.into_bytes(),
            "application/vnd.apple.mpegurl",
        )
        .await?;

    let mpd = manifest::mpd(&renditions, duration);
    let mpd_key = keys::dash_manifest(video_id);
    ctx.processed_store
        .put_bytes(&mpd_key, mpd.into_bytes(), "application/dash+xml")
        .await?;

    let (_, committed) = update(ctx.state.as_ref(), video_id, |rec| {
        if rec.status.is_terminal() && !(rec.status == VideoStatus::Failed && revivable) {
            return Ok(None);
        }
        rec.manifests = ManifestLocations {
            hls: Some(master_key.clone()),
            dash: Some(mpd_key.clone()),
        };
        if rec.status == VideoStatus::Failed {
            rec.transition(VideoStatus::Processing);
        }
        rec.transition(VideoStatus::Ready);
        Ok::<_, PipelineError>(Some(()))
    })
    .await?;

    if committed.is_some() {
        info!(video_id = %video_id, "Manifests published, video ready");
    }
    Ok(())
}
