//! Output sink contracts used by the export driver.
//!
//! A sink receives finished frames in presentation order, may push back
//! when it is not ready for more, and is finalized exactly once. Sinks that
//! produce a file with sound also expose a parallel [`AudioSink`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::MontageResult;
use crate::frame::FrameBuffer;
use crate::time::{TimeRange, Timestamp};

/// A contiguous range of a source file's audio, placed on the output timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSegment {
    /// Source media file.
    pub source: PathBuf,
    /// Range within the source, in source seconds (the clip's trim range).
    pub source_range: TimeRange,
    /// Where the range starts on the output timeline, in seconds.
    pub output_start: f64,
}

/// What a sink reports after successful finalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SinkSummary {
    pub frames_written: u64,
    pub audio_segments: usize,
    /// Output location, when the sink writes to the filesystem.
    pub output: Option<PathBuf>,
}

/// Receives composited frames in presentation order.
pub trait FrameSink: Send {
    /// Block until the sink can accept another frame. An error means the
    /// sink was closed or failed and the export must stop.
    fn wait_ready(&mut self) -> MontageResult<()> {
        Ok(())
    }

    /// Append one frame at its presentation time.
    fn append(&mut self, frame: &FrameBuffer, pts: Timestamp) -> MontageResult<()>;

    /// The audio track of this output, if it has one.
    fn audio(&mut self) -> Option<&mut dyn AudioSink> {
        None
    }

    /// Flush and close the output. A failure here fails the whole export.
    fn finish(&mut self) -> MontageResult<SinkSummary>;
}

/// Receives audio passthrough segments for the output's audio track.
pub trait AudioSink: Send {
    fn append_segment(&mut self, segment: &AudioSegment) -> MontageResult<()>;
}
