//! Interactive preview driver.
//!
//! Holds the current [`InstructionSet`] behind a lock that is only taken to
//! clone or swap an `Arc`, so renders never wait for a rebuild and a
//! rebuild never sees a half-updated set. Rebuilds are tagged with a
//! generation number; only the most recently started one may commit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Semaphore;

use montage_core::{MontageError, MontageResult, Size2D};
use montage_ir::TimelineSnapshot;

use crate::compositor::{CompositeFrame, FrameCompositor, RenderRequest};
use crate::instruction::{CanvasSize, InstructionSet};

/// Lifecycle of the preview's instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Nothing has been built yet.
    Idle,
    /// A rebuild is in flight. The previous set (if any) is still served.
    Rebuilding,
    Ready,
}

/// Transport position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Playhead {
    pub position: f64,
    pub playing: bool,
}

/// How a rebuild ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    Committed { revision: u64, segments: usize },
    /// A newer rebuild started before this one finished; its result was
    /// dropped.
    Superseded,
}

struct Transport {
    playhead: Playhead,
    duration: f64,
}

pub struct PreviewEngine {
    compositor: Arc<FrameCompositor>,
    current: RwLock<Arc<InstructionSet>>,
    generation: AtomicU64,
    /// Generation of the last committed rebuild, 0 before the first.
    committed: AtomicU64,
    state: Mutex<EngineState>,
    transport: Mutex<Transport>,
    permits: Arc<Semaphore>,
    fallback_canvas: Size2D,
}

impl PreviewEngine {
    pub fn new(
        compositor: Arc<FrameCompositor>,
        fallback_canvas: Size2D,
        max_concurrent_renders: usize,
    ) -> Self {
        let empty = InstructionSet::empty(CanvasSize::from_size(fallback_canvas));
        Self {
            compositor,
            current: RwLock::new(Arc::new(empty)),
            generation: AtomicU64::new(0),
            committed: AtomicU64::new(0),
            state: Mutex::new(EngineState::Idle),
            transport: Mutex::new(Transport {
                playhead: Playhead {
                    position: 0.0,
                    playing: false,
                },
                duration: 0.0,
            }),
            permits: Arc::new(Semaphore::new(max_concurrent_renders.max(1))),
            fallback_canvas,
        }
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// The instruction set currently being served.
    pub fn current(&self) -> Arc<InstructionSet> {
        self.current.read().clone()
    }

    pub fn playhead(&self) -> Playhead {
        self.transport.lock().playhead
    }

    /// Move the playhead, clamped to the current composition.
    pub fn seek(&self, position: f64) {
        let mut transport = self.transport.lock();
        transport.playhead.position = clamp_position(position, transport.duration);
    }

    pub fn play(&self) {
        self.transport.lock().playhead.playing = true;
    }

    pub fn pause(&self) {
        self.transport.lock().playhead.playing = false;
    }

    /// Rebuild instructions for `snapshot` and swap them in, unless another
    /// rebuild was started in the meantime.
    pub async fn rebuild(&self, snapshot: Arc<TimelineSnapshot>) -> MontageResult<RebuildOutcome> {
        // Taken under the state lock so state writes follow generation order.
        let generation = {
            let mut state = self.state.lock();
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *state = EngineState::Rebuilding;
            generation
        };
        let revision = snapshot.revision;
        tracing::debug!("rebuild {} started for revision {}", generation, revision);

        let source = self.compositor.source().clone();
        let fallback = self.fallback_canvas;
        let built = match tokio::task::spawn_blocking(move || {
            InstructionSet::for_snapshot(snapshot, source.as_ref(), fallback)
        })
        .await
        {
            Ok(built) => built,
            Err(e) => {
                let settled = if self.committed.load(Ordering::SeqCst) > 0 {
                    EngineState::Ready
                } else {
                    EngineState::Idle
                };
                self.settle(generation, settled);
                return Err(MontageError::Render(format!("rebuild task failed: {}", e)));
            }
        };

        let mut current = self.current.write();
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::warn!(
                "rebuild {} for revision {} superseded, discarding",
                generation,
                revision
            );
            return Ok(RebuildOutcome::Superseded);
        }

        let segments = built.len();
        let duration = built.duration;
        {
            let mut transport = self.transport.lock();
            let captured = transport.playhead;
            *current = Arc::new(built);
            transport.duration = duration;
            transport.playhead = Playhead {
                position: clamp_position(captured.position, duration),
                playing: captured.playing,
            };
        }
        self.committed.store(generation, Ordering::SeqCst);
        self.settle(generation, EngineState::Ready);
        drop(current);
        tracing::info!(
            "preview ready: revision {}, {} segments, {:.3}s",
            revision,
            segments,
            duration
        );
        Ok(RebuildOutcome::Committed { revision, segments })
    }

    /// Move to `state` unless a newer rebuild has started.
    fn settle(&self, generation: u64, state: EngineState) {
        let mut current = self.state.lock();
        if self.generation.load(Ordering::SeqCst) == generation {
            *current = state;
        }
    }

    /// Render the frame at composition time `time` from the current set.
    pub async fn render_at(&self, time: f64) -> MontageResult<CompositeFrame> {
        let set = self.current();
        if set.is_empty() {
            return Err(MontageError::NothingToRender);
        }
        let instruction = set
            .find(time)
            .ok_or(MontageError::OutOfRange {
                time,
                duration: set.duration,
            })?
            .clone();

        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| MontageError::Render(format!("preview renderer closed: {}", e)))?;
        let compositor = self.compositor.clone();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            compositor.render(&RenderRequest {
                snapshot: &set.snapshot,
                time,
                canvas: set.canvas,
                layers: &instruction.layers,
                overlays: &instruction.overlays,
            })
        })
        .await
        .map_err(|e| MontageError::Render(format!("render task failed: {}", e)))?
    }

    /// Render the frame under the playhead.
    pub async fn render_playhead(&self) -> MontageResult<CompositeFrame> {
        let position = self.playhead().position;
        self.render_at(position).await
    }
}

fn clamp_position(position: f64, duration: f64) -> f64 {
    if position.is_nan() {
        return 0.0;
    }
    position.clamp(0.0, duration.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_position() {
        assert_eq!(clamp_position(5.0, 3.0), 3.0);
        assert_eq!(clamp_position(-1.0, 3.0), 0.0);
        assert_eq!(clamp_position(f64::NAN, 3.0), 0.0);
        assert_eq!(clamp_position(2.0, 0.0), 0.0);
        assert_eq!(clamp_position(1.5, 3.0), 1.5);
    }
}
