//! FFmpeg orchestration and streaming manifest generation.
//!
//! FFmpeg and FFprobe are driven as subprocesses; nothing in this crate
//! links against media libraries. The `Transcoder` trait is the seam the
//! pipeline workers run against, so tests substitute a fake without
//! needing FFmpeg installed.

pub mod command;
pub mod error;
pub mod manifest;
pub mod probe;
pub mod transcoder;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use probe::{get_duration, probe_video, VideoInfo};
pub use transcoder::{FfmpegTranscoder, MediaConfig, Transcoder};
