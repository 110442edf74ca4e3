use montage_core::{
    AudioSegment, AudioSink, FrameBuffer, FrameSink, MontageError, MontageResult, SinkSummary,
    Timestamp,
};

/// Keeps everything in memory. Used for tests and for callers that want
/// the frames themselves.
#[derive(Default)]
pub struct MemorySink {
    pub frames: Vec<(Timestamp, FrameBuffer)>,
    pub audio: Option<MemoryAudio>,
    fail_after: Option<u64>,
    closed: bool,
    finished: bool,
}

#[derive(Debug, Default)]
pub struct MemoryAudio {
    pub segments: Vec<AudioSegment>,
}

impl AudioSink for MemoryAudio {
    fn append_segment(&mut self, segment: &AudioSegment) -> MontageResult<()> {
        self.segments.push(segment.clone());
        Ok(())
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give the sink an audio track.
    pub fn with_audio(mut self) -> Self {
        self.audio = Some(MemoryAudio::default());
        self
    }

    /// Report the sink as closed once `frames` frames have been accepted.
    pub fn fail_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn segments(&self) -> &[AudioSegment] {
        self.audio.as_ref().map(|a| a.segments.as_slice()).unwrap_or_default()
    }
}

impl FrameSink for MemorySink {
    fn wait_ready(&mut self) -> MontageResult<()> {
        let limit_hit = self
            .fail_after
            .is_some_and(|n| self.frames.len() as u64 >= n);
        if self.closed || limit_hit {
            return Err(MontageError::Sink("sink closed".into()));
        }
        Ok(())
    }

    fn append(&mut self, frame: &FrameBuffer, pts: Timestamp) -> MontageResult<()> {
        if self.closed || self.finished {
            return Err(MontageError::Sink("sink closed".into()));
        }
        self.frames.push((pts, frame.clone()));
        Ok(())
    }

    fn audio(&mut self) -> Option<&mut dyn AudioSink> {
        self.audio.as_mut().map(|a| a as &mut dyn AudioSink)
    }

    fn finish(&mut self) -> MontageResult<SinkSummary> {
        if self.finished {
            return Err(MontageError::Sink("sink already finished".into()));
        }
        self.finished = true;
        Ok(SinkSummary {
            frames_written: self.frames.len() as u64,
            audio_segments: self.segments().len(),
            output: None,
        })
    }
}
