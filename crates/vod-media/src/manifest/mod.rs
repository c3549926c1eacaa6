//! HLS playlist and DASH MPD generation.
//!
//! Manifests are rebuilt from the segment inventories recorded in the video
//! state, never parsed back out of FFmpeg's own playlist output, so a
//! manifest regeneration needs no media files at all.

pub mod dash;
pub mod hls;

pub use dash::mpd;
pub use hls::{master_playlist, variant_playlist};
