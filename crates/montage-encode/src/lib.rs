//! # montage-encode
//!
//! Output sinks for the export driver. `FfmpegSink` shells out to FFmpeg
//! for H.264 video with audio passthrough; `PngSequenceSink` writes one
//! PNG per frame; `MemorySink` keeps frames in memory.

pub mod ffmpeg;
pub mod memory;
pub mod sequence;

pub use ffmpeg::{FfmpegAudio, FfmpegSink};
pub use memory::{MemoryAudio, MemorySink};
pub use sequence::{save_png, PngSequenceSink};
