//! HLS playlist generation (RFC 8216 VOD profile).

use vod_models::{HlsSegment, Rendition};

/// Generate the master playlist listing all variant playlists, lowest
/// bandwidth first.
pub fn master_playlist(renditions: &[&Rendition]) -> String {
    let mut sorted: Vec<&Rendition> = renditions.to_vec();
    sorted.sort_by_key(|r| r.bandwidth());

    let mut lines = vec!["#EXTM3U".to_string(), "#EXT-X-VERSION:3".to_string()];
    for rendition in sorted {
        lines.push(format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}",
            rendition.bandwidth(),
            rendition.resolution()
        ));
        lines.push(format!("{}.m3u8", rendition.quality));
    }
    lines.join("\n")
}

/// Generate one variant playlist.
///
/// `segment_uri_prefix` is prepended to each segment filename; the variant
/// playlist lives one directory above the segments.
pub fn variant_playlist(segment_uri_prefix: &str, segments: &[HlsSegment]) -> String {
    let max_duration = segments.iter().map(|s| s.duration).fold(0.0f64, f64::max);
    let target_duration = max_duration.ceil() as u64;

    let mut lines = vec![
        "#EXTM3U".to_string(),
        "#EXT-X-VERSION:3".to_string(),
        format!("#EXT-X-TARGETDURATION:{target_duration}"),
        "#EXT-X-MEDIA-SEQUENCE:0".to_string(),
    ];
    for segment in segments {
        lines.push(format!("#EXTINF:{:.6},", segment.duration));
        lines.push(format!("{segment_uri_prefix}{}", segment.filename));
    }
    lines.push("#EXT-X-ENDLIST".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use vod_models::default_ladder;

    fn rendition(quality: &str) -> Rendition {
        let profile = default_ladder()
            .into_iter()
            .find(|p| p.name == quality)
            .unwrap();
        Rendition::from_profile(&profile, format!("videos/v1/renditions/{quality}.mp4"))
    }

    #[test]
    fn test_master_playlist_orders_by_ascending_bandwidth() {
        let hi = rendition("720p");
        let lo = rendition("240p");
        let playlist = master_playlist(&[&hi, &lo]);

        let lines: Vec<&str> = playlist.lines().collect();
        assert_eq!(lines[0], "#EXTM3U");
        assert_eq!(lines[1], "#EXT-X-VERSION:3");
        assert_eq!(
            lines[2],
            "#EXT-X-STREAM-INF:BANDWIDTH=300000,RESOLUTION=426x240"
        );
        assert_eq!(lines[3], "240p.m3u8");
        assert_eq!(
            lines[4],
            "#EXT-X-STREAM-INF:BANDWIDTH=2800000,RESOLUTION=1280x720"
        );
        assert_eq!(lines[5], "720p.m3u8");
    }

    #[test]
    fn test_variant_playlist_format() {
        let segments = vec![
            HlsSegment {
                filename: "segment_000.ts".to_string(),
                duration: 6.006,
            },
            HlsSegment {
                filename: "segment_001.ts".to_string(),
                duration: 4.5,
            },
        ];
        let playlist = variant_playlist("720p/", &segments);

        let lines: Vec<&str> = playlist.lines().collect();
        assert_eq!(lines[2], "#EXT-X-TARGETDURATION:7");
        assert_eq!(lines[3], "#EXT-X-MEDIA-SEQUENCE:0");
        assert_eq!(lines[4], "#EXTINF:6.006000,");
        assert_eq!(lines[5], "720p/segment_000.ts");
        assert_eq!(lines[6], "#EXTINF:4.500000,");
        assert_eq!(lines[7], "720p/segment_001.ts");
        assert_eq!(*lines.last().unwrap(), "#EXT-X-ENDLIST");
    }
}
