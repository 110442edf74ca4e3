//! File export driver.
//!
//! Renders `ceil(duration × fps)` frames from one snapshot, sequentially,
//! through the same compositor as preview, and hands them to a
//! [`FrameSink`]. Active layers are taken straight from the snapshot for
//! every frame time rather than from preview instructions.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

use montage_core::hash::{ContentHash, FrameHasher};
use montage_core::{
    AudioSegment, Duration, FrameSink, MontageError, MontageResult, Size2D, Timestamp,
};
use montage_ir::TimelineSnapshot;

use crate::compositor::{FrameCompositor, RenderRequest};
use crate::instruction::{resolve_canvas, CanvasSize};

/// Where an export is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStage {
    Preparing,
    Rendering,
    Audio,
    Finalizing,
    Complete,
    Failed,
}

/// One progress report. `fraction` never decreases over an export and is
/// exactly 1.0 on completion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExportProgress {
    pub stage: ExportStage,
    pub fraction: f64,
    pub frames_rendered: u64,
    pub total_frames: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportSettings {
    pub fps: f64,
    /// Canvas used when no clip reports a size.
    pub fallback_canvas: Size2D,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            fps: 30.0,
            fallback_canvas: Size2D::new(1920.0, 1080.0),
        }
    }
}

impl ExportSettings {
    pub fn from_config(config: &montage_core::RenderConfig) -> Self {
        Self {
            fps: config.fps,
            fallback_canvas: config.default_canvas(),
        }
    }
}

/// Outcome of a successful export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportReport {
    pub revision: u64,
    pub frames_written: u64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    pub duration: f64,
    pub audio_segments: usize,
    pub layers_skipped: u64,
    /// Hash over every frame written, in order.
    pub content_hash: String,
    pub output: Option<std::path::PathBuf>,
}

pub struct ExportDriver {
    compositor: Arc<FrameCompositor>,
    settings: ExportSettings,
    progress: Option<UnboundedSender<ExportProgress>>,
}

impl ExportDriver {
    pub fn new(compositor: Arc<FrameCompositor>, settings: ExportSettings) -> Self {
        Self {
            compositor,
            settings,
            progress: None,
        }
    }

    /// Report progress on `tx`. Sends never block; a dropped receiver is
    /// ignored.
    pub fn with_progress(mut self, tx: UnboundedSender<ExportProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Export `snapshot` into `sink`. On failure a `Failed` progress event
    /// is sent and the sink is left unfinished.
    pub fn run(
        &self,
        snapshot: &TimelineSnapshot,
        sink: &mut dyn FrameSink,
    ) -> MontageResult<ExportReport> {
        let mut last = ExportProgress {
            stage: ExportStage::Preparing,
            fraction: 0.0,
            frames_rendered: 0,
            total_frames: 0,
        };
        match self.export(snapshot, sink, &mut last) {
            Ok(report) => Ok(report),
            Err(e) => {
                tracing::warn!("export of revision {} failed: {}", snapshot.revision, e);
                self.report(ExportProgress {
                    stage: ExportStage::Failed,
                    ..last
                });
                Err(e)
            }
        }
    }

    fn export(
        &self,
        snapshot: &TimelineSnapshot,
        sink: &mut dyn FrameSink,
        last: &mut ExportProgress,
    ) -> MontageResult<ExportReport> {
        self.emit(last, *last);

        let fps = self.settings.fps;
        if !(fps.is_finite() && fps > 0.0) {
            return Err(MontageError::Config(format!("frame rate must be positive, got {}", fps)));
        }
        if snapshot.is_empty() {
            return Err(MontageError::Config("composition has no clips".into()));
        }
        let duration = snapshot.duration();
        if !(duration > 0.0) {
            return Err(MontageError::Config(format!(
                "composition duration must be positive, got {:.3}s",
                duration
            )));
        }

        let canvas = resolve_canvas(
            snapshot,
            Some(self.compositor.source().as_ref()),
            self.settings.fallback_canvas,
        );
        let total = Duration::from_seconds(duration).frame_count(fps);
        tracing::info!(
            "exporting revision {}: {} frames at {} fps, {}",
            snapshot.revision,
            total,
            fps,
            canvas
        );

        let (hash, layers_skipped) = self.render_frames(snapshot, sink, canvas, total, last)?;
        let audio_segments = self.pass_audio(snapshot, sink, last)?;

        self.emit(
            last,
            ExportProgress {
                stage: ExportStage::Finalizing,
                ..*last
            },
        );
        let summary = sink
            .finish()
            .map_err(|e| MontageError::Sink(format!("finalizing output failed: {}", e)))?;

        self.emit(
            last,
            ExportProgress {
                stage: ExportStage::Complete,
                fraction: 1.0,
                ..*last
            },
        );
        tracing::info!(
            "export complete: {} frames, {} audio segments, hash {}",
            total,
            audio_segments,
            hash.to_hex()
        );
        Ok(ExportReport {
            revision: snapshot.revision,
            frames_written: total,
            fps,
            width: canvas.width,
            height: canvas.height,
            duration,
            audio_segments,
            layers_skipped,
            content_hash: hash.to_hex(),
            output: summary.output,
        })
    }

    fn render_frames(
        &self,
        snapshot: &TimelineSnapshot,
        sink: &mut dyn FrameSink,
        canvas: CanvasSize,
        total: u64,
        last: &mut ExportProgress,
    ) -> MontageResult<(ContentHash, u64)> {
        let fps = self.settings.fps;
        let mut hasher = FrameHasher::new();
        let mut layers_skipped = 0u64;
        self.emit(
            last,
            ExportProgress {
                stage: ExportStage::Rendering,
                fraction: 0.0,
                frames_rendered: 0,
                total_frames: total,
            },
        );

        for k in 0..total {
            let t = k as f64 / fps;
            let layers = snapshot.active_clips_at(t);
            let overlays = snapshot.active_overlays_at(t);
            let frame = self.compositor.render(&RenderRequest {
                snapshot,
                time: t,
                canvas,
                layers: &layers,
                overlays: &overlays,
            })?;
            layers_skipped += frame.layers_skipped as u64;
            hasher.update(&frame.image);

            sink.wait_ready()
                .and_then(|()| sink.append(&frame.image, Timestamp::from_seconds(t)))
                .map_err(|e| {
                    MontageError::Sink(format!("frame {} at {:.3}s rejected: {}", k, t, e))
                })?;

            tracing::debug!("exported frame {}/{}", k + 1, total);
            self.emit(
                last,
                ExportProgress {
                    stage: ExportStage::Rendering,
                    fraction: (k + 1) as f64 / total as f64,
                    frames_rendered: k + 1,
                    total_frames: total,
                },
            );
        }
        Ok((hasher.finish(), layers_skipped))
    }

    /// Hand each audio-bearing clip's trimmed range to the sink's audio
    /// track, in timeline order.
    fn pass_audio(
        &self,
        snapshot: &TimelineSnapshot,
        sink: &mut dyn FrameSink,
        last: &mut ExportProgress,
    ) -> MontageResult<usize> {
        let segments = audio_segments(snapshot);
        let Some(audio) = sink.audio() else {
            if !segments.is_empty() {
                tracing::debug!("sink has no audio track, dropping {} segments", segments.len());
            }
            return Ok(0);
        };
        self.emit(
            last,
            ExportProgress {
                stage: ExportStage::Audio,
                ..*last
            },
        );
        for segment in &segments {
            audio
                .append_segment(segment)
                .map_err(|e| {
                    MontageError::Sink(format!(
                        "audio segment from {} rejected: {}",
                        segment.source.display(),
                        e
                    ))
                })?;
        }
        Ok(segments.len())
    }

    fn emit(&self, last: &mut ExportProgress, next: ExportProgress) {
        let next = ExportProgress {
            fraction: next.fraction.max(last.fraction),
            ..next
        };
        *last = next;
        self.report(next);
    }

    fn report(&self, progress: ExportProgress) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(progress);
        }
    }
}

/// Audio passthrough segments for every clip that has audio, ordered by
/// timeline start then track.
pub fn audio_segments(snapshot: &TimelineSnapshot) -> Vec<AudioSegment> {
    let mut clips: Vec<_> = snapshot.clips.iter().filter(|c| c.has_audio).collect();
    clips.sort_by(|a, b| {
        a.timeline_start
            .total_cmp(&b.timeline_start)
            .then(a.track.cmp(&b.track))
    });
    clips
        .into_iter()
        .map(|c| AudioSegment {
            source: c.source.path().to_path_buf(),
            source_range: c.source_range(),
            output_start: c.timeline_start,
        })
        .collect()
}

/// Run an export on the blocking pool. The snapshot is owned by the task,
/// so later edits cannot affect it.
pub fn spawn_export(
    driver: ExportDriver,
    snapshot: Arc<TimelineSnapshot>,
    mut sink: Box<dyn FrameSink>,
) -> tokio::task::JoinHandle<MontageResult<ExportReport>> {
    tokio::task::spawn_blocking(move || driver.run(&snapshot, sink.as_mut()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use montage_ir::{Clip, SourceRef};

    #[test]
    fn test_audio_segments_in_timeline_order() {
        let snapshot = TimelineSnapshot {
            revision: 1,
            clips: vec![
                Clip::new(SourceRef::new("b.mp4"), 10.0)
                    .at(4.0, 0)
                    .trimmed(1.0, 3.0)
                    .with_media(Size2D::new(4.0, 4.0), None, true),
                Clip::new(SourceRef::new("silent.mp4"), 10.0).at(0.0, 0),
                Clip::new(SourceRef::new("a.mp4"), 10.0)
                    .at(0.0, 1)
                    .trimmed(0.0, 4.0)
                    .with_media(Size2D::new(4.0, 4.0), None, true),
            ],
            overlays: Vec::new(),
        };
        let segments = audio_segments(&snapshot);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].source, std::path::PathBuf::from("a.mp4"));
        assert_eq!(segments[0].output_start, 0.0);
        assert_eq!(segments[1].source, std::path::PathBuf::from("b.mp4"));
        assert_eq!(segments[1].source_range, montage_core::TimeRange::new(1.0, 3.0));
        assert_eq!(segments[1].output_start, 4.0);
    }
}
