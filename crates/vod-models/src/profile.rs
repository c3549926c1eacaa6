//! Transcoding quality ladder.

use serde::{Deserialize, Serialize};

/// One rung of the quality ladder: resolution plus codec bitrates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityProfile {
    /// Quality label (e.g. "720p")
    pub name: String,
    /// Target width in pixels
    pub width: u32,
    /// Target height in pixels
    pub height: u32,
    /// Video bitrate in kbit/s
    pub video_bitrate_kbps: u32,
    /// Audio bitrate in kbit/s
    pub audio_bitrate_kbps: u32,
}

impl QualityProfile {
    pub fn new(
        name: impl Into<String>,
        width: u32,
        height: u32,
        video_bitrate_kbps: u32,
        audio_bitrate_kbps: u32,
    ) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            video_bitrate_kbps,
            audio_bitrate_kbps,
        }
    }

    /// Resolution string in FFmpeg's `WxH` form.
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Video bitrate string for FFmpeg (e.g. "2800k").
    pub fn video_bitrate(&self) -> String {
        format!("{}k", self.video_bitrate_kbps)
    }

    /// Audio bitrate string for FFmpeg (e.g. "128k").
    pub fn audio_bitrate(&self) -> String {
        format!("{}k", self.audio_bitrate_kbps)
    }

    /// Peak bandwidth in bits per second, as advertised in manifests.
    pub fn bandwidth(&self) -> u64 {
        self.video_bitrate_kbps as u64 * 1000
    }
}

/// The default quality ladder used when none is configured.
pub fn default_ladder() -> Vec<QualityProfile> {
    vec![
        QualityProfile::new("240p", 426, 240, 300, 64),
        QualityProfile::new("360p", 640, 360, 800, 96),
        QualityProfile::new("480p", 854, 480, 1400, 128),
        QualityProfile::new("720p", 1280, 720, 2800, 128),
        QualityProfile::new("1080p", 1920, 1080, 5000, 192),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ladder_ordered_by_bandwidth() {
        let ladder = default_ladder();
        assert_eq!(ladder.len(), 5);
        for pair in ladder.windows(2) {
            assert!(pair[0].bandwidth() < pair[1].bandwidth());
        }
    }

    #[test]
    fn test_profile_formatting() {
        let p = QualityProfile::new("720p", 1280, 720, 2800, 128);
        assert_eq!(p.resolution(), "1280x720");
        assert_eq!(p.video_bitrate(), "2800k");
        assert_eq!(p.bandwidth(), 2_800_000);
    }
}
