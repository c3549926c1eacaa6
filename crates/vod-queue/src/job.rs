//! Job payloads carried through the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use vod_models::{Stage, VideoId};

/// Unique job identifier, stable across retries of the same logical job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

fn first_attempt() -> u32 {
    1
}

/// Transcode every ladder rung of a video into MP4 renditions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeJob {
    pub job_id: JobId,
    pub video_id: VideoId,
    /// 1-based attempt number, preserved across redeliveries.
    #[serde(default = "first_attempt")]
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// Segment one rendition into HLS and DASH media segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkJob {
    pub job_id: JobId,
    pub video_id: VideoId,
    /// Ladder rung name, e.g. `720p`.
    pub quality: String,
    #[serde(default = "first_attempt")]
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// Generate the HLS master/variant playlists and the DASH MPD.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestJob {
    pub job_id: JobId,
    pub video_id: VideoId,
    #[serde(default = "first_attempt")]
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// A queued unit of pipeline work, tagged by stage for the wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Job {
    Transcode(TranscodeJob),
    Chunk(ChunkJob),
    Manifest(ManifestJob),
}

impl Job {
    pub fn transcode(video_id: VideoId) -> Self {
        Self::Transcode(TranscodeJob {
            job_id: JobId::generate(),
            video_id,
            attempt: 1,
            enqueued_at: Utc::now(),
        })
    }

    pub fn chunk(video_id: VideoId, quality: impl Into<String>) -> Self {
        Self::Chunk(ChunkJob {
            job_id: JobId::generate(),
            video_id,
            quality: quality.into(),
            attempt: 1,
            enqueued_at: Utc::now(),
        })
    }

    pub fn manifest(video_id: VideoId) -> Self {
        Self::Manifest(ManifestJob {
            job_id: JobId::generate(),
            video_id,
            attempt: 1,
            enqueued_at: Utc::now(),
        })
    }

    pub fn stage(&self) -> Stage {
        match self {
            Self::Transcode(_) => Stage::Transcode,
            Self::Chunk(_) => Stage::Chunk,
            Self::Manifest(_) => Stage::Manifest,
        }
    }

    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Transcode(j) => &j.job_id,
            Self::Chunk(j) => &j.job_id,
            Self::Manifest(j) => &j.job_id,
        }
    }

    pub fn video_id(&self) -> &VideoId {
        match self {
            Self::Transcode(j) => &j.video_id,
            Self::Chunk(j) => &j.video_id,
            Self::Manifest(j) => &j.video_id,
        }
    }

    pub fn attempt(&self) -> u32 {
        match self {
            Self::Transcode(j) => j.attempt,
            Self::Chunk(j) => j.attempt,
            Self::Manifest(j) => j.attempt,
        }
    }

    /// The same logical job with the attempt counter advanced, for re-enqueue
    /// after a failed attempt.
    pub fn next_attempt(&self) -> Self {
        let mut job = self.clone();
        match &mut job {
            Self::Transcode(j) => j.attempt += 1,
            Self::Chunk(j) => j.attempt += 1,
            Self::Manifest(j) => j.attempt += 1,
        }
        job
    }
}

/// A job handed to a worker, with the receipt needed to ack or nack it.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    /// Opaque delivery receipt. Valid for exactly one delivery; a redelivered
    /// job carries a fresh receipt and the old one is dead.
    pub receipt: String,
    pub job: Job,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_is_stage_tagged() {
        let job = Job::chunk(VideoId::from("vid-1"), "720p");
        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains(r#""type":"chunk"#));
        assert!(json.contains(r#""quality":"720p"#));

        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back.stage(), Stage::Chunk);
        assert_eq!(back.video_id().as_str(), "vid-1");
    }

    #[test]
    fn test_attempt_defaults_to_one() {
        let json = format!(
            r#"{{"type":"manifest","job_id":"j1","video_id":"v1","enqueued_at":"{}"}}"#,
            Utc::now().to_rfc3339()
        );
        let job: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(job.attempt(), 1);
    }

    #[test]
    fn test_next_attempt_keeps_identity() {
        let job = Job::transcode(VideoId::from("v1"));
        let retry = job.next_attempt();
        assert_eq!(retry.job_id(), job.job_id());
        assert_eq!(retry.attempt(), 2);
    }
}
