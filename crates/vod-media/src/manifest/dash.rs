//! DASH MPD generation (static profile).

use std::fmt::Write;
use vod_models::Rendition;

const H264_MAIN_CODECS: &str = "avc1.64001f";

/// Generate a static MPD covering all chunked renditions.
///
/// One adaptation set per rendition, addressed by `SegmentTemplate` with an
/// explicit `SegmentTimeline` built from the measured segment durations
/// (timescale 1000, so timeline units are milliseconds).
pub fn mpd(renditions: &[&Rendition], duration_seconds: f64) -> String {
    let mut sorted: Vec<&Rendition> = renditions.to_vec();
    sorted.sort_by_key(|r| r.bandwidth());

    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    let _ = writeln!(
        out,
        "<MPD xmlns=\"urn:mpeg:dash:schema:mpd:2011\" \
         profiles=\"urn:mpeg:dash:profile:isoff-live:2011\" \
         type=\"static\" minBufferTime=\"PT2S\" \
         mediaPresentationDuration=\"PT{duration_seconds:.3}S\">"
    );
    out.push_str("  <Period id=\"1\" start=\"PT0S\">\n");

    for rendition in sorted {
        let id = format!("video_{}", rendition.quality);
        let _ = writeln!(
            out,
            "    <AdaptationSet id=\"{id}\" mimeType=\"video/mp4\" \
             codecs=\"{H264_MAIN_CODECS}\" startWithSAP=\"1\">"
        );
        let _ = writeln!(
            out,
            "      <Representation id=\"{id}\" width=\"{}\" height=\"{}\" bandwidth=\"{}\">",
            rendition.width,
            rendition.height,
            rendition.bandwidth()
        );
        let _ = writeln!(
            out,
            "        <SegmentTemplate initialization=\"{id}/init.mp4\" \
             media=\"{id}/segment-$Number$.m4s\" timescale=\"1000\" startNumber=\"1\">"
        );
        out.push_str("          <SegmentTimeline>\n");
        for segment in &rendition.dash_segments {
            let _ = writeln!(
                out,
                "            <S t=\"{}\" d=\"{}\"/>",
                segment.start_ms, segment.duration_ms
            );
        }
        out.push_str("          </SegmentTimeline>\n");
        out.push_str("        </SegmentTemplate>\n");
        out.push_str("      </Representation>\n");
        out.push_str("    </AdaptationSet>\n");
    }

    out.push_str("  </Period>\n");
    out.push_str("</MPD>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use vod_models::{default_ladder, DashSegment};

    fn rendition(quality: &str, segments: Vec<DashSegment>) -> Rendition {
        let profile = default_ladder()
            .into_iter()
            .find(|p| p.name == quality)
            .unwrap();
        let mut r =
            Rendition::from_profile(&profile, format!("videos/v1/renditions/{quality}.mp4"));
        r.chunked = true;
        r.dash_segments = segments;
        r
    }

    #[test]
    fn test_mpd_structure() {
        let r = rendition(
            "480p",
            vec![
                DashSegment {
                    index: 1,
                    start_ms: 0,
                    duration_ms: 4000,
                },
                DashSegment {
                    index: 2,
                    start_ms: 4000,
                    duration_ms: 3500,
                },
            ],
        );
        let xml = mpd(&[&r], 7.5);

        assert!(xml.contains("urn:mpeg:dash:schema:mpd:2011"));
        assert!(xml.contains("profiles=\"urn:mpeg:dash:profile:isoff-live:2011\""));
        assert!(xml.contains("type=\"static\""));
        assert!(xml.contains("mediaPresentationDuration=\"PT7.500S\""));
        assert!(xml.contains("initialization=\"video_480p/init.mp4\""));
        assert!(xml.contains("media=\"video_480p/segment-$Number$.m4s\""));
        assert!(xml.contains("timescale=\"1000\""));
        assert!(xml.contains("<S t=\"0\" d=\"4000\"/>"));
        assert!(xml.contains("<S t=\"4000\" d=\"3500\"/>"));
    }

    #[test]
    fn test_mpd_orders_by_ascending_bandwidth() {
        let lo = rendition("240p", Vec::new());
        let hi = rendition("720p", Vec::new());
        let xml = mpd(&[&hi, &lo], 10.0);

        let lo_pos = xml.find("video_240p").unwrap();
        let hi_pos = xml.find("video_720p").unwrap();
        assert!(lo_pos < hi_pos);
    }
}
