use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use montage_core::{Affine2D, Filter, MontageError, MontageResult, Point2D, Size2D, TimeRange};

use crate::keyframe::{normalized, Interpolate, KeyframeList};

/// Unique identifier for a clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClipId(pub Uuid);

impl ClipId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClipId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClipId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a source media file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceRef(pub PathBuf);

impl SourceRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Animatable transform of a clip: offset in canvas pixels with +y up,
/// uniform scale, and rotation in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipParams {
    pub offset: Point2D,
    pub scale: f64,
    pub rotation: f64,
}

impl Default for ClipParams {
    fn default() -> Self {
        Self {
            offset: Point2D::zero(),
            scale: 1.0,
            rotation: 0.0,
        }
    }
}

impl Interpolate for ClipParams {
    fn lerp(&self, other: &Self, t: f64) -> Self {
        Self {
            offset: self.offset.lerp(&other.offset, t),
            scale: Interpolate::lerp(&self.scale, &other.scale, t),
            rotation: Interpolate::lerp(&self.rotation, &other.rotation, t),
        }
    }
}

/// A trimmed range of one source placed on a track of the composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: ClipId,
    pub source: SourceRef,
    /// Length of the untrimmed source, in seconds.
    pub original_duration: f64,
    pub trim_start: f64,
    pub trim_end: f64,
    /// Stacking order; track 0 is the bottom.
    pub track: u32,
    /// Composition time at which `trim_start` is shown.
    pub timeline_start: f64,
    /// Static transform, used when the clip has no keyframes.
    #[serde(default)]
    pub transform: ClipParams,
    #[serde(default)]
    pub filter: Filter,
    #[serde(default = "default_intensity")]
    pub filter_intensity: f64,
    /// Exposure adjustment in stops.
    #[serde(default)]
    pub exposure: f64,
    /// Orientation-normalizing transform recorded by the source metadata.
    #[serde(default)]
    pub orientation: Option<Affine2D>,
    /// Encoded frame size before orientation.
    #[serde(default)]
    pub natural_size: Option<Size2D>,
    #[serde(default)]
    pub has_audio: bool,
    #[serde(default)]
    pub keyframes: KeyframeList<ClipParams>,
}

fn default_intensity() -> f64 {
    1.0
}

impl Clip {
    /// A clip showing the whole source from composition time 0 on track 0.
    pub fn new(source: SourceRef, original_duration: f64) -> Self {
        Self {
            id: ClipId::new(),
            source,
            original_duration,
            trim_start: 0.0,
            trim_end: original_duration,
            track: 0,
            timeline_start: 0.0,
            transform: ClipParams::default(),
            filter: Filter::None,
            filter_intensity: default_intensity(),
            exposure: 0.0,
            orientation: None,
            natural_size: None,
            has_audio: false,
            keyframes: KeyframeList::new(),
        }
    }

    /// Trimmed length on the composition clock.
    pub fn duration(&self) -> f64 {
        self.trim_end - self.trim_start
    }

    pub fn timeline_end(&self) -> f64 {
        self.timeline_start + self.duration()
    }

    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.timeline_start, self.timeline_end())
    }

    pub fn is_active_at(&self, t: f64) -> bool {
        self.range().contains(t)
    }

    /// Source time shown at composition time `t`.
    pub fn source_time(&self, t: f64) -> f64 {
        self.trim_start + (t - self.timeline_start)
    }

    /// Position of composition time `t` within this clip, in `[0, 1]`.
    pub fn normalized_time(&self, t: f64) -> f64 {
        normalized(t - self.timeline_start, self.duration())
    }

    /// Transform in effect at composition time `t`.
    pub fn params_at(&self, t: f64) -> ClipParams {
        self.keyframes
            .sample_or(self.normalized_time(t), &self.transform)
    }

    /// Trim range within the source.
    pub fn source_range(&self) -> TimeRange {
        TimeRange::new(self.trim_start, self.trim_end)
    }

    pub fn validate(&self) -> MontageResult<()> {
        let finite = [
            self.original_duration,
            self.trim_start,
            self.trim_end,
            self.timeline_start,
            self.exposure,
            self.filter_intensity,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            return Err(MontageError::Validation(format!(
                "clip {} has a non-finite time or parameter",
                self.id
            )));
        }
        if !(0.0 <= self.trim_start
            && self.trim_start < self.trim_end
            && self.trim_end <= self.original_duration)
        {
            return Err(MontageError::Validation(format!(
                "clip {} trim [{}, {}) must satisfy 0 <= start < end <= {}",
                self.id, self.trim_start, self.trim_end, self.original_duration
            )));
        }
        if self.timeline_start < 0.0 {
            return Err(MontageError::Validation(format!(
                "clip {} starts before the composition ({})",
                self.id, self.timeline_start
            )));
        }
        Ok(())
    }

    /// Cut the clip at composition time `t` into two clips that together
    /// show exactly what this one did. The right half gets a fresh id.
    pub fn split_at(&self, t: f64) -> MontageResult<(Clip, Clip)> {
        if !(t > self.timeline_start && t < self.timeline_end()) {
            return Err(MontageError::InvalidArgument(format!(
                "cannot split clip {} at {:.3}s outside ({:.3}, {:.3})",
                self.id,
                t,
                self.timeline_start,
                self.timeline_end()
            )));
        }
        let cut = self.source_time(t);
        let (left_keys, right_keys) = self.keyframes.split_at(self.normalized_time(t));

        let mut left = self.clone();
        left.trim_end = cut;
        left.keyframes = left_keys;

        let mut right = self.clone();
        right.id = ClipId::new();
        right.trim_start = cut;
        right.timeline_start = t;
        right.keyframes = right_keys;

        Ok((left, right))
    }

    /// Builder: place the clip on the composition.
    pub fn at(mut self, timeline_start: f64, track: u32) -> Self {
        self.timeline_start = timeline_start;
        self.track = track;
        self
    }

    /// Builder: set the trim range.
    pub fn trimmed(mut self, trim_start: f64, trim_end: f64) -> Self {
        self.trim_start = trim_start;
        self.trim_end = trim_end;
        self
    }

    /// Builder: set the static transform.
    pub fn with_transform(mut self, offset: Point2D, scale: f64, rotation: f64) -> Self {
        self.transform = ClipParams {
            offset,
            scale,
            rotation,
        };
        self
    }

    /// Builder: set the filter and its intensity.
    pub fn with_filter(mut self, filter: Filter, intensity: f64) -> Self {
        self.filter = filter;
        self.filter_intensity = intensity;
        self
    }

    pub fn with_exposure(mut self, ev: f64) -> Self {
        self.exposure = ev;
        self
    }

    /// Builder: cache source metadata.
    pub fn with_media(
        mut self,
        natural_size: Size2D,
        orientation: Option<Affine2D>,
        has_audio: bool,
    ) -> Self {
        self.natural_size = Some(natural_size);
        self.orientation = orientation;
        self.has_audio = has_audio;
        self
    }

    pub fn with_keyframes(mut self, keyframes: KeyframeList<ClipParams>) -> Self {
        self.keyframes = keyframes;
        self
    }

    /// Display size after orientation, when the natural size is known.
    pub fn display_size(&self) -> Option<Size2D> {
        let size = self.natural_size?;
        match self.orientation {
            Some(o) if o.is_quarter_turn() => Some(size.transposed()),
            _ => Some(size),
        }
    }
}
