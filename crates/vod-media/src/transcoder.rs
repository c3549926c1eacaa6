//! The `Transcoder` seam and its FFmpeg-backed implementation.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::sync::watch;
use tracing::{debug, warn};
use vod_models::{DashSegment, HlsSegment, QualityProfile};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::probe::{self, VideoInfo};

/// Settings for FFmpeg invocations.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Kill FFmpeg after this long. None means no limit.
    pub timeout: Option<Duration>,
    /// Encoder thread cap. Zero lets FFmpeg decide.
    pub threads: u32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(3600)),
            threads: 0,
        }
    }
}

/// Media operations the pipeline workers depend on.
///
/// Durations are reported per segment from the container metadata of the
/// files actually produced, not from the requested segment length.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Encode `input` into an MP4 rendition at the profile's resolution and
    /// bitrates, with keyframes aligned for later segmentation.
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        profile: &QualityProfile,
        segment_secs: u32,
    ) -> MediaResult<()>;

    /// Split a rendition into HLS transport-stream segments without
    /// re-encoding. Returns the segments in playback order.
    async fn segment_hls(
        &self,
        input: &Path,
        out_dir: &Path,
        segment_secs: u32,
    ) -> MediaResult<Vec<HlsSegment>>;

    /// Split a rendition into DASH media segments plus an init segment,
    /// without re-encoding. Returns the media segments in playback order.
    async fn segment_dash(
        &self,
        input: &Path,
        out_dir: &Path,
        segment_secs: u32,
    ) -> MediaResult<Vec<DashSegment>>;

    /// Probe a file for duration, dimensions and codec.
    async fn probe(&self, input: &Path) -> MediaResult<VideoInfo>;
}

/// Production transcoder shelling out to ffmpeg/ffprobe.
#[derive(Clone)]
pub struct FfmpegTranscoder {
    runner: FfmpegRunner,
    threads: u32,
}

impl FfmpegTranscoder {
    pub fn new(cfg: MediaConfig) -> Self {
        let mut runner = FfmpegRunner::new();
        if let Some(timeout) = cfg.timeout {
            runner = runner.with_timeout(timeout);
        }
        Self {
            runner,
            threads: cfg.threads,
        }
    }

    /// Attach a cancellation signal; a raised signal kills in-flight FFmpeg
    /// processes.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.runner = self.runner.with_cancel(cancel_rx);
        self
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        profile: &QualityProfile,
        segment_secs: u32,
    ) -> MediaResult<()> {
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).await?;
        }
        let cmd = FfmpegCommand::new(input, output)
            .video_codec("libx264")
            .audio_codec("aac")
            .video_bitrate(profile.video_bitrate())
            .audio_bitrate(profile.audio_bitrate())
            .size(profile.resolution())
            .output_args(["-profile:v", "main", "-level", "3.1"])
            // Keyframes land on segment boundaries so segmentation can
            // stream-copy.
            .output_args([
                "-g",
                &(segment_secs * 2).to_string(),
                "-keyint_min",
                &segment_secs.to_string(),
                "-sc_threshold",
                "0",
            ])
            .output_args(["-movflags", "+faststart"])
            .threads(self.threads);

        self.runner.run(&cmd).await?;
        debug!(quality = %profile.name, "Encoded rendition");
        Ok(())
    }

    async fn segment_hls(
        &self,
        input: &Path,
        out_dir: &Path,
        segment_secs: u32,
    ) -> MediaResult<Vec<HlsSegment>> {
        fs::create_dir_all(out_dir).await?;
        let segment_template = out_dir.join("segment_%03d.ts");
        let cmd = FfmpegCommand::new(input, out_dir.join("playlist.m3u8"))
            .copy_codecs()
            .output_args(["-hls_time", &segment_secs.to_string()])
            .output_args(["-hls_list_size", "0"])
            .output_arg("-hls_segment_filename")
            .output_arg(segment_template.to_string_lossy())
            .output_args(["-f", "hls"]);

        self.runner.run(&cmd).await?;

        let mut segments = Vec::new();
        let mut index = 0u32;
        loop {
            let filename = format!("segment_{index:03}.ts");
            let path = out_dir.join(&filename);
            if !path.exists() {
                break;
            }
            let duration = match probe::get_duration(&path).await {
                Ok(d) => d,
                // Fall back to the target length rather than failing the
                // whole rendition over one unreadable header.
                Err(e) => {
                    warn!(segment = %filename, error = %e, "Segment probe failed");
                    segment_secs as f64
                }
            };
            segments.push(HlsSegment { filename, duration });
            index += 1;
        }

        if segments.is_empty() {
            return Err(MediaError::InvalidVideo(
                "HLS segmenter produced no segments".to_string(),
            ));
        }
        Ok(segments)
    }

    async fn segment_dash(
        &self,
        input: &Path,
        out_dir: &Path,
        segment_secs: u32,
    ) -> MediaResult<Vec<DashSegment>> {
        fs::create_dir_all(out_dir).await?;
        let cmd = FfmpegCommand::new(input, out_dir.join("manifest.mpd"))
            .copy_codecs()
            .output_args(["-use_timeline", "1", "-use_template", "1"])
            .output_args(["-init_seg_name", "init.mp4"])
            .output_args(["-media_seg_name", "segment-$Number$.m4s"])
            .output_args(["-seg_duration", &segment_secs.to_string()])
            .output_args(["-adaptation_sets", "id=0,streams=v id=1,streams=a"])
            .output_args(["-f", "dash"]);

        self.runner.run(&cmd).await?;

        if !out_dir.join("init.mp4").exists() {
            return Err(MediaError::InvalidVideo(
                "DASH segmenter produced no init segment".to_string(),
            ));
        }

        let mut segments = Vec::new();
        let mut start_ms = 0u64;
        // DASH media segments number from 1.
        let mut number = 1u32;
        loop {
            let filename = format!("segment-{number}.m4s");
            let path = out_dir.join(&filename);
            if !path.exists() {
                break;
            }
            let duration_ms = match probe::get_duration(&path).await {
                Ok(d) => (d * 1000.0).round() as u64,
                Err(e) => {
                    warn!(segment = %filename, error = %e, "Segment probe failed");
                    u64::from(segment_secs) * 1000
                }
            };
            segments.push(DashSegment {
                index: number,
                start_ms,
                duration_ms,
            });
            start_ms += duration_ms;
            number += 1;
        }

        if segments.is_empty() {
            return Err(MediaError::InvalidVideo(
                "DASH segmenter produced no segments".to_string(),
            ));
        }
        Ok(segments)
    }

    async fn probe(&self, input: &Path) -> MediaResult<VideoInfo> {
        probe::probe_video(input).await
    }
}
