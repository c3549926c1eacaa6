//! Test doubles for the pipeline.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use vod_media::{MediaError, MediaResult, Transcoder, VideoInfo};
use vod_models::{DashSegment, HlsSegment, QualityProfile};

/// Deterministic transcoder that writes marker files instead of media.
///
/// Per-quality transcode failures can be injected to exercise the retry
/// path; segmenting always succeeds on any existing input file.
pub struct FakeTranscoder {
    /// Reported source duration in seconds.
    pub duration: f64,
    /// Segments produced per rendition.
    pub segment_count: u32,
    /// quality -> remaining transcode failures to inject
    failures: Mutex<HashMap<String, u32>>,
}

impl Default for FakeTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeTranscoder {
    pub fn new() -> Self {
        Self {
            duration: 10.0,
            segment_count: 2,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Make the next `times` transcodes of `quality` fail.
    pub fn fail_transcode(&self, quality: &str, times: u32) {
        self.failures
            .lock()
            .unwrap()
            .insert(quality.to_string(), times);
    }

    fn take_failure(&self, quality: &str) -> bool {
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(quality) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        profile: &QualityProfile,
        _segment_secs: u32,
    ) -> MediaResult<()> {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }
        if self.take_failure(&profile.name) {
            return Err(MediaError::ffmpeg_failed(
                format!("Simulated encoder failure for {}", profile.name),
                None,
                Some(1),
            ));
        }
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(output, format!("mp4:{}", profile.name))?;
        Ok(())
    }

    async fn segment_hls(
        &self,
        input: &Path,
        out_dir: &Path,
        _segment_secs: u32,
    ) -> MediaResult<Vec<HlsSegment>> {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }
        std::fs::create_dir_all(out_dir)?;
        let per_segment = self.duration / self.segment_count as f64;
        let mut segments = Vec::new();
        for index in 0..self.segment_count {
            let filename = format!("segment_{index:03}.ts");
            std::fs::write(out_dir.join(&filename), b"ts")?;
            segments.push(HlsSegment {
                filename,
                duration: per_segment,
            });
        }
        Ok(segments)
    }

    async fn segment_dash(
        &self,
        input: &Path,
        out_dir: &Path,
        _segment_secs: u32,
    ) -> MediaResult<Vec<DashSegment>> {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }
        std::fs::create_dir_all(out_dir)?;
        std::fs::write(out_dir.join("init.mp4"), b"init")?;
        let per_segment_ms = (self.duration * 1000.0 / self.segment_count as f64) as u64;
        let mut segments = Vec::new();
        for number in 1..=self.segment_count {
            std::fs::write(out_dir.join(format!("segment-{number}.m4s")), b"m4s")?;
            segments.push(DashSegment {
                index: number,
                start_ms: u64::from(number - 1) * per_segment_ms,
                duration_ms: per_segment_ms,
            });
        }
        Ok(segments)
    }

    async fn probe(&self, input: &Path) -> MediaResult<VideoInfo> {
        if !input.exists() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }
        Ok(VideoInfo {
            duration: self.duration,
            width: 1920,
            height: 1080,
            codec: "h264".to_string(),
            size: std::fs::metadata(input)?.len(),
            bitrate: 0,
        })
    }
}
