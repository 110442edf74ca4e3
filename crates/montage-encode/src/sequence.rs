use std::path::PathBuf;

use montage_core::{FrameBuffer, FrameSink, MontageError, MontageResult, SinkSummary, Timestamp};

/// Writes every frame as a numbered PNG (`frame_000000.png`, ...) into a
/// directory. Has no audio track.
pub struct PngSequenceSink {
    dir: PathBuf,
    frames_written: u64,
}

impl PngSequenceSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            frames_written: 0,
        }
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.dir.join(format!("frame_{:06}.png", index))
    }
}

impl FrameSink for PngSequenceSink {
    fn append(&mut self, frame: &FrameBuffer, _pts: Timestamp) -> MontageResult<()> {
        if self.frames_written == 0 {
            std::fs::create_dir_all(&self.dir)?;
        }
        let path = self.frame_path(self.frames_written);
        save_png(frame, &path)?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> MontageResult<SinkSummary> {
        tracing::info!("wrote {} frames to {}", self.frames_written, self.dir.display());
        Ok(SinkSummary {
            frames_written: self.frames_written,
            audio_segments: 0,
            output: Some(self.dir.clone()),
        })
    }
}

/// Save one frame as an RGBA PNG.
pub fn save_png(frame: &FrameBuffer, path: &std::path::Path) -> MontageResult<()> {
    let img = image::RgbaImage::from_raw(frame.width, frame.height, frame.data.clone())
        .ok_or_else(|| {
            MontageError::Sink(format!(
                "frame buffer is not {}x{}",
                frame.width, frame.height
            ))
        })?;
    img.save(path)
        .map_err(|e| MontageError::Sink(format!("failed to write {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use montage_core::Color;

    #[test]
    fn test_writes_numbered_frames() {
        let dir = std::env::temp_dir().join(format!("montage_seq_{}", uuid::Uuid::new_v4()));
        let mut sink = PngSequenceSink::new(&dir);
        let frame = FrameBuffer::solid(4, 2, &Color::RED);
        sink.append(&frame, Timestamp::zero()).unwrap();
        sink.append(&frame, Timestamp::from_seconds(1.0 / 30.0)).unwrap();
        let summary = sink.finish().unwrap();
        assert_eq!(summary.frames_written, 2);

        let img = image::open(dir.join("frame_000001.png")).unwrap().to_rgba8();
        assert_eq!(img.dimensions(), (4, 2));
        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 0, 255]);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
