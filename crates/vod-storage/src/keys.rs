//! Storage key layout.
//!
//! All workers address objects through these helpers so the layout stays
//! consistent between staging, renditions, segments and manifests.
//!
//! Raw bucket:        `videos/{id}/chunks/chunk_{index}`, `videos/{id}/{filename}`
//! Processed bucket:  `videos/{id}/renditions/{quality}.mp4`
//!                    `videos/{id}/hls/{quality}/segment_NNN.ts`
//!                    `videos/{id}/hls/master.m3u8`, `videos/{id}/hls/{quality}.m3u8`
//!                    `videos/{id}/dash/video_{quality}/init.mp4` + `segment-{n}.m4s`
//!                    `videos/{id}/dash/manifest.mpd`

use vod_models::VideoId;

/// Root prefix for everything belonging to a video, in either bucket.
pub fn video_prefix(video_id: &VideoId) -> String {
    format!("videos/{video_id}/")
}

/// Staged upload chunk (raw bucket).
pub fn chunk(video_id: &VideoId, index: u32) -> String {
    format!("videos/{video_id}/chunks/chunk_{index}")
}

/// Staging prefix for upload chunks (raw bucket).
pub fn chunk_prefix(video_id: &VideoId) -> String {
    format!("videos/{video_id}/chunks/")
}

/// Assembled raw upload (raw bucket).
pub fn raw(video_id: &VideoId, filename: &str) -> String {
    // Strip any client-supplied path components.
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    format!("videos/{video_id}/{base}")
}

/// Encoded rendition file (processed bucket).
pub fn rendition(video_id: &VideoId, quality: &str) -> String {
    format!("videos/{video_id}/renditions/{quality}.mp4")
}

/// HLS segment directory for one rendition (processed bucket).
pub fn hls_segment_prefix(video_id: &VideoId, quality: &str) -> String {
    format!("videos/{video_id}/hls/{quality}/")
}

/// One HLS segment (processed bucket).
pub fn hls_segment(video_id: &VideoId, quality: &str, filename: &str) -> String {
    format!("videos/{video_id}/hls/{quality}/{filename}")
}

/// HLS master playlist (processed bucket).
pub fn hls_master(video_id: &VideoId) -> String {
    format!("videos/{video_id}/hls/master.m3u8")
}

/// HLS variant playlist for one rendition (processed bucket).
pub fn hls_variant(video_id: &VideoId, quality: &str) -> String {
    format!("videos/{video_id}/hls/{quality}.m3u8")
}

/// DASH segment directory for one rendition (processed bucket).
pub fn dash_segment_prefix(video_id: &VideoId, quality: &str) -> String {
    format!("videos/{video_id}/dash/video_{quality}/")
}

/// One DASH file (init or media segment) for a rendition (processed bucket).
pub fn dash_file(video_id: &VideoId, quality: &str, filename: &str) -> String {
    format!("videos/{video_id}/dash/video_{quality}/{filename}")
}

/// DASH manifest (processed bucket).
pub fn dash_manifest(video_id: &VideoId) -> String {
    format!("videos/{video_id}/dash/manifest.mpd")
}

/// Archived error history of a failed video (processed bucket).
pub fn error_archive(video_id: &VideoId) -> String {
    format!("videos/{video_id}/error_history.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let id = VideoId::from("abc");
        assert_eq!(chunk(&id, 4), "videos/abc/chunks/chunk_4");
        assert_eq!(raw(&id, "clip.mp4"), "videos/abc/clip.mp4");
        assert_eq!(rendition(&id, "720p"), "videos/abc/renditions/720p.mp4");
        assert_eq!(
            hls_segment(&id, "720p", "segment_000.ts"),
            "videos/abc/hls/720p/segment_000.ts"
        );
        assert_eq!(hls_master(&id), "videos/abc/hls/master.m3u8");
        assert_eq!(
            dash_file(&id, "480p", "init.mp4"),
            "videos/abc/dash/video_480p/init.mp4"
        );
        assert_eq!(dash_manifest(&id), "videos/abc/dash/manifest.mpd");
    }

    #[test]
    fn test_raw_strips_path_components() {
        let id = VideoId::from("abc");
        assert_eq!(raw(&id, "../../etc/passwd"), "videos/abc/passwd");
        assert_eq!(raw(&id, "dir\\clip.mov"), "videos/abc/clip.mov");
    }
}
