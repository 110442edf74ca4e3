//! Segment instructions: the composition cut into time ranges over which
//! the set of active layers does not change.

use std::sync::Arc;

use montage_core::{Size2D, TimeRange};
use montage_ir::{Placement, PlacementId, TextOverlay, TimelineSnapshot};

use crate::source::FrameSource;

/// What to draw over one stretch of the composition.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub range: TimeRange,
    /// Active placements, bottom track first.
    pub layers: Vec<PlacementId>,
    /// Indices into the snapshot's overlays, in list order.
    pub overlays: Vec<usize>,
}

/// Partition `[0, duration)` into instructions.
///
/// Boundaries are `0`, `duration` and every placement start and end,
/// clamped into range. Each non-empty gap between adjacent boundaries
/// yields one instruction, even when nothing is active in it.
pub fn build_instructions(
    placements: &[Placement],
    overlays: &[TextOverlay],
    duration: f64,
) -> Vec<Instruction> {
    if !(duration > 0.0) || !duration.is_finite() {
        return Vec::new();
    }

    let mut boundaries: Vec<f64> = placements
        .iter()
        .flat_map(|p| [p.range.start, p.range.end])
        .filter(|t| t.is_finite())
        .map(|t| t.clamp(0.0, duration))
        .chain([0.0, duration])
        .collect();
    boundaries.sort_by(f64::total_cmp);
    boundaries.dedup();

    let mut z_order: Vec<&Placement> = placements.iter().collect();
    z_order.sort_by_key(|p| p.z_key());

    boundaries
        .windows(2)
        .filter(|w| w[1] > w[0])
        .map(|w| {
            let (s, e) = (w[0], w[1]);
            Instruction {
                range: TimeRange::new(s, e),
                layers: z_order
                    .iter()
                    .filter(|p| p.range.overlaps(s, e))
                    .map(|p| p.id)
                    .collect(),
                overlays: overlays
                    .iter()
                    .enumerate()
                    .filter(|(_, o)| o.range().overlaps(s, e))
                    .map(|(i, _)| i)
                    .collect(),
            }
        })
        .collect()
}

/// Output canvas in whole pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn from_size(size: Size2D) -> Self {
        Self {
            width: size.width.round().max(0.0) as u32,
            height: size.height.round().max(0.0) as u32,
        }
    }

    pub fn as_size(&self) -> Size2D {
        Size2D::new(self.width as f64, self.height as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for CanvasSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Canvas size for a snapshot: the display size of the first clip, asking
/// `source` when the clip has no cached size, else `fallback`.
pub fn resolve_canvas(
    snapshot: &TimelineSnapshot,
    source: Option<&dyn FrameSource>,
    fallback: Size2D,
) -> CanvasSize {
    let Some(first) = snapshot.first_clip() else {
        return CanvasSize::from_size(fallback);
    };
    let size = first.display_size().or_else(|| {
        let source = source?;
        match source.metadata(&first.source) {
            Ok(meta) => Some(meta.display_size()),
            Err(e) => {
                tracing::warn!("could not probe {} for canvas size: {}", first.source, e);
                None
            }
        }
    });
    let canvas = CanvasSize::from_size(size.unwrap_or(fallback));
    if canvas.is_empty() {
        CanvasSize::from_size(fallback)
    } else {
        canvas
    }
}

/// Everything needed to render any time in a snapshot. Immutable once
/// built; shared between render calls through an `Arc`.
#[derive(Debug, Clone)]
pub struct InstructionSet {
    pub snapshot: Arc<TimelineSnapshot>,
    pub placements: Vec<Placement>,
    pub instructions: Vec<Instruction>,
    pub duration: f64,
    pub canvas: CanvasSize,
}

impl InstructionSet {
    pub fn build(snapshot: Arc<TimelineSnapshot>, canvas: CanvasSize) -> Self {
        let placements = snapshot.placements();
        let duration = snapshot.duration();
        let instructions = build_instructions(&placements, &snapshot.overlays, duration);
        tracing::debug!(
            "built {} instructions for revision {} ({:.3}s, {})",
            instructions.len(),
            snapshot.revision,
            duration,
            canvas
        );
        Self {
            snapshot,
            placements,
            instructions,
            duration,
            canvas,
        }
    }

    /// Resolve the canvas through `source` and build.
    pub fn for_snapshot(
        snapshot: Arc<TimelineSnapshot>,
        source: &dyn FrameSource,
        fallback: Size2D,
    ) -> Self {
        let canvas = resolve_canvas(&snapshot, Some(source), fallback);
        Self::build(snapshot, canvas)
    }

    pub fn empty(canvas: CanvasSize) -> Self {
        Self::build(Arc::new(TimelineSnapshot::default()), canvas)
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn revision(&self) -> u64 {
        self.snapshot.revision
    }

    /// The instruction whose range contains `t`. `t == duration` maps to
    /// the last instruction; anything outside `[0, duration]` is `None`.
    pub fn find(&self, t: f64) -> Option<&Instruction> {
        let last = self.instructions.last()?;
        if t == self.duration {
            return Some(last);
        }
        let idx = self.instructions.partition_point(|i| i.range.end <= t);
        self.instructions.get(idx).filter(|i| i.range.contains(t))
    }
}
