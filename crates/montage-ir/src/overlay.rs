use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use montage_core::{Color, MontageError, MontageResult, Point2D, TextAlign, TimeRange};

use crate::keyframe::{normalized, Interpolate, KeyframeList};

/// Unique identifier for a text overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OverlayId(pub Uuid);

impl OverlayId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OverlayId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OverlayId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which font to rasterize an overlay with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontDescriptor {
    pub family: String,
    /// Font file to load. Without one the rasterizer's default is used.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl FontDescriptor {
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

impl Default for FontDescriptor {
    fn default() -> Self {
        Self::new("sans-serif")
    }
}

/// Animatable placement of a text overlay. `position` is in normalized
/// canvas coordinates with y pointing down; rotation is in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextParams {
    pub position: Point2D,
    pub rotation: f64,
    pub scale: f64,
    pub opacity: f64,
}

impl Default for TextParams {
    fn default() -> Self {
        Self {
            position: Point2D::new(0.5, 0.5),
            rotation: 0.0,
            scale: 1.0,
            opacity: 1.0,
        }
    }
}

impl Interpolate for TextParams {
    fn lerp(&self, other: &Self, t: f64) -> Self {
        Self {
            position: self.position.lerp(&other.position, t),
            rotation: Interpolate::lerp(&self.rotation, &other.rotation, t),
            scale: Interpolate::lerp(&self.scale, &other.scale, t),
            opacity: Interpolate::lerp(&self.opacity, &other.opacity, t),
        }
    }
}

/// A run of text shown over the clips during `[start, end)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextOverlay {
    pub id: OverlayId,
    pub text: String,
    #[serde(default)]
    pub font: FontDescriptor,
    /// Font size in canvas pixels.
    pub size: f64,
    #[serde(default)]
    pub color: Color,
    #[serde(default)]
    pub alignment: TextAlign,
    /// Static placement, used when the overlay has no keyframes.
    #[serde(default)]
    pub transform: TextParams,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub keyframes: KeyframeList<TextParams>,
}

impl TextOverlay {
    pub fn new(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            id: OverlayId::new(),
            text: text.into(),
            font: FontDescriptor::default(),
            size: 48.0,
            color: Color::WHITE,
            alignment: TextAlign::Center,
            transform: TextParams::default(),
            start,
            end,
            keyframes: KeyframeList::new(),
        }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start, self.end)
    }

    pub fn is_active_at(&self, t: f64) -> bool {
        self.range().contains(t)
    }

    pub fn normalized_time(&self, t: f64) -> f64 {
        normalized(t - self.start, self.duration())
    }

    /// Placement in effect at composition time `t`.
    pub fn params_at(&self, t: f64) -> TextParams {
        self.keyframes
            .sample_or(self.normalized_time(t), &self.transform)
    }

    pub fn validate(&self) -> MontageResult<()> {
        if !(self.start.is_finite() && self.end.is_finite() && self.start < self.end) {
            return Err(MontageError::Validation(format!(
                "overlay {} must start before it ends ({} .. {})",
                self.id, self.start, self.end
            )));
        }
        if !(self.size > 0.0) {
            return Err(MontageError::Validation(format!(
                "overlay {} has non-positive font size {}",
                self.id, self.size
            )));
        }
        Ok(())
    }

    pub fn with_font(mut self, font: FontDescriptor, size: f64) -> Self {
        self.font = font;
        self.size = size;
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn with_alignment(mut self, alignment: TextAlign) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.transform.position = Point2D::new(x, y);
        self
    }

    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.transform.opacity = opacity;
        self
    }

    pub fn with_keyframes(mut self, keyframes: KeyframeList<TextParams>) -> Self {
        self.keyframes = keyframes;
        self
    }
}
