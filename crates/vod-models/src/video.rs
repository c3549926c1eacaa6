//! Video lifecycle records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::profile::QualityProfile;
use crate::session::UploadSession;
use crate::stage::Stage;

/// Unique identifier for a video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Generate a new random video ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle status of a video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    /// Upload initialized, no chunks received yet
    #[default]
    Pending,
    /// At least one chunk received
    Uploading,
    /// Raw file assembled, transcode job enqueued
    Queued,
    /// A worker is producing renditions, segments or manifests
    Processing,
    /// Manifests written, playable (terminal success)
    Ready,
    /// Pipeline failure (terminal once the retry budget is exhausted)
    Failed,
    /// Cancelled by external request (terminal)
    Cancelled,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Pending => "pending",
            VideoStatus::Uploading => "uploading",
            VideoStatus::Queued => "queued",
            VideoStatus::Processing => "processing",
            VideoStatus::Ready => "ready",
            VideoStatus::Failed => "failed",
            VideoStatus::Cancelled => "cancelled",
        }
    }

    /// Whether the pipeline will take no further action on this video.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            VideoStatus::Ready | VideoStatus::Failed | VideoStatus::Cancelled
        )
    }

    /// Whether `next` is a legal transition from `self`.
    ///
    /// Transitions are monotonic except `Failed -> Processing`, which the
    /// job attempt counter limits to the retry budget.
    pub fn can_transition(self, next: VideoStatus) -> bool {
        use VideoStatus::*;
        matches!(
            (self, next),
            (Pending, Uploading)
                | (Pending, Queued)
                | (Uploading, Queued)
                | (Queued, Processing)
                | (Processing, Ready)
                | (Pending | Uploading | Queued | Processing, Failed)
                | (Failed, Processing)
                | (Pending | Uploading | Queued | Processing, Cancelled)
        )
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One HLS media segment of a rendition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HlsSegment {
    /// Segment filename (e.g. "segment_000.ts")
    pub filename: String,
    /// Measured duration in seconds
    pub duration: f64,
}

/// One DASH media segment of a rendition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashSegment {
    /// 1-based segment number
    pub index: u32,
    /// Presentation start in milliseconds
    pub start_ms: u64,
    /// Measured duration in milliseconds
    pub duration_ms: u64,
}

/// One transcoded quality variant of a video.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rendition {
    /// Quality label (e.g. "720p")
    pub quality: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Video bitrate in kbit/s
    pub video_bitrate_kbps: u32,
    /// Audio bitrate in kbit/s
    pub audio_bitrate_kbps: u32,
    /// Processed-store key of the encoded rendition file
    pub location: String,
    /// Set by the chunk worker once segments exist in storage
    #[serde(default)]
    pub chunked: bool,
    /// HLS segment inventory, populated when chunked
    #[serde(default)]
    pub hls_segments: Vec<HlsSegment>,
    /// DASH segment timeline, populated when chunked
    #[serde(default)]
    pub dash_segments: Vec<DashSegment>,
}

impl Rendition {
    /// A fresh, not-yet-chunked rendition for a ladder rung.
    pub fn from_profile(profile: &QualityProfile, location: impl Into<String>) -> Self {
        Self {
            quality: profile.name.clone(),
            width: profile.width,
            height: profile.height,
            video_bitrate_kbps: profile.video_bitrate_kbps,
            audio_bitrate_kbps: profile.audio_bitrate_kbps,
            location: location.into(),
            chunked: false,
            hls_segments: Vec::new(),
            dash_segments: Vec::new(),
        }
    }

    /// Peak bandwidth in bits per second.
    pub fn bandwidth(&self) -> u64 {
        self.video_bitrate_kbps as u64 * 1000
    }

    /// Resolution string in `WxH` form.
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Storage keys of the generated manifests.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManifestLocations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hls: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dash: Option<String>,
}

/// One entry of a video's append-only error history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Stage that produced the error
    pub stage: Stage,
    /// Human-readable message (not exposed raw diagnostics)
    pub message: String,
    /// When the error was recorded
    pub timestamp: DateTime<Utc>,
    /// Attempt number that failed (1-based)
    pub attempt: u32,
}

/// Durable record of a video's pipeline lifecycle.
///
/// The state store is the single source of truth for this record; all
/// mutations go through versioned compare-and-swap so racing workers
/// cannot lose updates or double-trigger stage transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoRecord {
    /// Unique video ID
    pub video_id: VideoId,

    /// Original upload filename
    pub filename: String,

    /// Declared content type (e.g. "video/mp4")
    pub content_type: String,

    /// Declared size in bytes
    pub size_bytes: u64,

    /// Lifecycle status
    #[serde(default)]
    pub status: VideoStatus,

    /// Raw-store key of the assembled upload (valid once status >= queued,
    /// cleared when the retention horizon reclaims it)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_location: Option<String>,

    /// Source duration in seconds, probed at transcode time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,

    /// Produced renditions, in ladder order
    #[serde(default)]
    pub renditions: Vec<Rendition>,

    /// Generated manifest locations
    #[serde(default)]
    pub manifests: ManifestLocations,

    /// Append-only error history
    #[serde(default)]
    pub error_history: Vec<ErrorEntry>,

    /// Guard flag: set by the chunk worker that wins the all-chunked race
    #[serde(default)]
    pub manifest_enqueued: bool,

    /// In-progress upload session; cleared when the raw file is assembled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadSession>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Raw upload retention horizon
    pub expires_at: DateTime<Utc>,
}

impl VideoRecord {
    pub fn new(
        video_id: VideoId,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        size_bytes: u64,
        session_ttl: chrono::Duration,
        raw_retention: chrono::Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            video_id,
            filename: filename.into(),
            content_type: content_type.into(),
            size_bytes,
            status: VideoStatus::Pending,
            raw_location: None,
            duration_seconds: None,
            renditions: Vec::new(),
            manifests: ManifestLocations::default(),
            error_history: Vec::new(),
            manifest_enqueued: false,
            upload: Some(UploadSession::new(size_bytes, session_ttl)),
            created_at: now,
            updated_at: now,
            expires_at: now + raw_retention,
        }
    }

    /// Look up a rendition by quality label.
    pub fn rendition(&self, quality: &str) -> Option<&Rendition> {
        self.renditions.iter().find(|r| r.quality == quality)
    }

    pub fn rendition_mut(&mut self, quality: &str) -> Option<&mut Rendition> {
        self.renditions.iter_mut().find(|r| r.quality == quality)
    }

    /// True when at least one rendition exists and all are chunked.
    pub fn all_renditions_chunked(&self) -> bool {
        !self.renditions.is_empty() && self.renditions.iter().all(|r| r.chunked)
    }

    /// Append an error entry and bump `updated_at`.
    pub fn record_error(&mut self, stage: Stage, message: impl Into<String>, attempt: u32) {
        let now = Utc::now();
        self.error_history.push(ErrorEntry {
            stage,
            message: message.into(),
            timestamp: now,
            attempt,
        });
        self.updated_at = now;
    }

    /// Apply a status transition, returning false if it is illegal.
    pub fn transition(&mut self, next: VideoStatus) -> bool {
        if !self.status.can_transition(next) {
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> VideoRecord {
        VideoRecord::new(
            VideoId::new(),
            "clip.mp4",
            "video/mp4",
            1024,
            chrono::Duration::hours(1),
            chrono::Duration::days(30),
        )
    }

    #[test]
    fn test_video_id_generation() {
        assert_ne!(VideoId::new(), VideoId::new());
    }

    #[test]
    fn test_new_record_has_session() {
        let r = record();
        assert_eq!(r.status, VideoStatus::Pending);
        assert!(r.upload.is_some());
        assert!(r.renditions.is_empty());
    }

    #[test]
    fn test_status_transitions_monotonic() {
        use VideoStatus::*;
        assert!(Pending.can_transition(Uploading));
        assert!(Uploading.can_transition(Queued));
        assert!(Queued.can_transition(Processing));
        assert!(Processing.can_transition(Ready));
        assert!(Failed.can_transition(Processing));

        assert!(!Ready.can_transition(Processing));
        assert!(!Cancelled.can_transition(Processing));
        assert!(!Queued.can_transition(Uploading));
        assert!(!Ready.can_transition(Failed));
    }

    #[test]
    fn test_transition_rejects_illegal() {
        let mut r = record();
        assert!(r.transition(VideoStatus::Cancelled));
        assert!(!r.transition(VideoStatus::Processing));
        assert_eq!(r.status, VideoStatus::Cancelled);
    }

    #[test]
    fn test_all_renditions_chunked() {
        let mut r = record();
        assert!(!r.all_renditions_chunked());
        r.renditions.push(Rendition {
            quality: "240p".into(),
            width: 426,
            height: 240,
            video_bitrate_kbps: 300,
            audio_bitrate_kbps: 64,
            location: "videos/x/renditions/240p.mp4".into(),
            chunked: false,
            hls_segments: Vec::new(),
            dash_segments: Vec::new(),
        });
        assert!(!r.all_renditions_chunked());
        r.rendition_mut("240p").unwrap().chunked = true;
        assert!(r.all_renditions_chunked());
    }

    #[test]
    fn test_record_serde_roundtrip() {
        let mut r = record();
        r.record_error(Stage::Transcode, "engine timed out", 1);
        let json = serde_json::to_string(&r).expect("serialize VideoRecord");
        let decoded: VideoRecord = serde_json::from_str(&json).expect("deserialize VideoRecord");
        assert_eq!(decoded.video_id, r.video_id);
        assert_eq!(decoded.error_history.len(), 1);
        assert_eq!(decoded.error_history[0].stage, Stage::Transcode);
    }
}
