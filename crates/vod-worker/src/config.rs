//! Pipeline configuration.

use std::path::PathBuf;
use std::time::Duration;
use vod_models::{default_ladder, QualityProfile};

/// Pipeline settings, read from the environment in production.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Quality ladder for transcoding.
    pub ladder: Vec<QualityProfile>,

    /// HLS segment length in seconds.
    pub hls_segment_secs: u32,
    /// DASH segment length in seconds.
    pub dash_segment_secs: u32,
    /// FFmpeg encoder thread cap. Zero lets FFmpeg decide.
    pub ffmpeg_threads: u32,
    /// Kill FFmpeg after this long.
    pub ffmpeg_timeout: Duration,

    /// Attempt budget per job, including the first attempt.
    pub max_attempts: u32,
    /// Base delay for retry backoff; doubles per failed attempt.
    pub retry_base_delay: Duration,
    /// How long a claim call blocks waiting for a job.
    pub claim_wait: Duration,
    /// How often an in-flight job resets its visibility clock.
    pub heartbeat_interval: Duration,
    /// Concurrent jobs per stage executor.
    pub max_concurrent_jobs: usize,

    /// Upload validation: maximum declared size in bytes.
    pub max_upload_bytes: u64,
    /// Upload validation: maximum declared chunk count.
    pub max_chunks: u32,
    /// How long an upload session stays open without completing.
    pub session_ttl: chrono::Duration,

    /// How long raw uploads are retained after the video is ready.
    pub raw_retention: chrono::Duration,
    /// Grace period before a failed video's artifacts are reclaimed.
    pub failed_grace: chrono::Duration,
    /// A processing video untouched for this long is considered stalled.
    pub stalled_grace: chrono::Duration,
    /// Interval between cleanup sweeps.
    pub cleanup_interval: Duration,

    /// Scratch directory for per-job work dirs.
    pub work_dir: PathBuf,
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            ladder: default_ladder(),
            hls_segment_secs: env_u32("HLS_SEGMENT_DURATION", 6),
            dash_segment_secs: env_u32("DASH_SEGMENT_DURATION", 4),
            ffmpeg_threads: env_u32("FFMPEG_THREADS", 4),
            ffmpeg_timeout: Duration::from_secs(env_u64("FFMPEG_TIMEOUT_SECS", 3600)),
            max_attempts: env_u32("MAX_JOB_ATTEMPTS", 3),
            retry_base_delay: Duration::from_secs(env_u64("RETRY_BASE_DELAY_SECS", 30)),
            claim_wait: Duration::from_secs(env_u64("CLAIM_WAIT_SECS", 5)),
            heartbeat_interval: Duration::from_secs(env_u64("HEARTBEAT_INTERVAL_SECS", 60)),
            max_concurrent_jobs: env_u64("MAX_CONCURRENT_JOBS", 2) as usize,
            max_upload_bytes: env_u64("MAX_UPLOAD_BYTES", 10 * 1024 * 1024 * 1024),
            max_chunks: env_u32("MAX_UPLOAD_CHUNKS", 10_000),
            session_ttl: chrono::Duration::hours(env_u64("UPLOAD_SESSION_TTL_HOURS", 24) as i64),
            raw_retention: chrono::Duration::days(env_u64("RAW_RETENTION_DAYS", 30) as i64),
            failed_grace: chrono::Duration::hours(env_u64("FAILED_GRACE_HOURS", 24) as i64),
            stalled_grace: chrono::Duration::hours(env_u64("STALLED_GRACE_HOURS", 6) as i64),
            cleanup_interval: Duration::from_secs(env_u64("CLEANUP_INTERVAL_SECS", 300)),
            work_dir: std::env::var("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir().join("vod-worker")),
        }
    }

    /// Delay before redelivering attempt `attempt + 1`.
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        // Exponential backoff keyed on the attempt that just failed.
        self.retry_base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_doubles() {
        let cfg = PipelineConfig {
            retry_base_delay: Duration::from_secs(30),
            ..PipelineConfig::from_env()
        };
        assert_eq!(cfg.retry_delay(1), Duration::from_secs(30));
        assert_eq!(cfg.retry_delay(2), Duration::from_secs(60));
        assert_eq!(cfg.retry_delay(3), Duration::from_secs(120));
    }
}
