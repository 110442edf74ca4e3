use montage_core::{Filter, MontageResult, Point2D, Size2D};

use crate::clip::{Clip, ClipParams, SourceRef};
use crate::editor::EditorState;
use crate::keyframe::{Keyframe, KeyframeList};
use crate::overlay::TextOverlay;

/// A builder for assembling a timeline programmatically.
/// Useful for the CLI, fixtures, and unit testing.
#[derive(Default)]
pub struct TimelineBuilder {
    clips: Vec<Clip>,
    overlays: Vec<TextOverlay>,
}

impl TimelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a clip. Order of addition is the tie-breaker for equal tracks.
    pub fn clip(mut self, clip: Clip) -> Self {
        self.clips.push(clip);
        self
    }

    /// Add an overlay. Overlays draw in the order they were added.
    pub fn overlay(mut self, overlay: TextOverlay) -> Self {
        self.overlays.push(overlay);
        self
    }

    /// Run every entity through the editor's checks.
    pub fn build(self) -> MontageResult<EditorState> {
        let mut state = EditorState::new();
        for clip in self.clips {
            state.add_clip(clip)?;
        }
        for overlay in self.overlays {
            state.add_overlay(overlay)?;
        }
        Ok(state)
    }
}

/// A builder for a single clip.
pub struct ClipBuilder {
    clip: Clip,
    keys: Vec<Keyframe<ClipParams>>,
}

impl ClipBuilder {
    pub fn new(source: impl Into<std::path::PathBuf>, original_duration: f64) -> Self {
        Self {
            clip: Clip::new(SourceRef::new(source), original_duration),
            keys: Vec::new(),
        }
    }

    pub fn place(mut self, timeline_start: f64, track: u32) -> Self {
        self.clip = self.clip.at(timeline_start, track);
        self
    }

    pub fn trim(mut self, trim_start: f64, trim_end: f64) -> Self {
        self.clip = self.clip.trimmed(trim_start, trim_end);
        self
    }

    pub fn offset(mut self, x: f64, y: f64) -> Self {
        self.clip.transform.offset = Point2D::new(x, y);
        self
    }

    pub fn scale(mut self, scale: f64) -> Self {
        self.clip.transform.scale = scale;
        self
    }

    pub fn rotation(mut self, degrees: f64) -> Self {
        self.clip.transform.rotation = degrees;
        self
    }

    pub fn filter(mut self, filter: Filter, intensity: f64) -> Self {
        self.clip = self.clip.with_filter(filter, intensity);
        self
    }

    pub fn exposure(mut self, ev: f64) -> Self {
        self.clip.exposure = ev;
        self
    }

    pub fn natural_size(mut self, width: f64, height: f64) -> Self {
        self.clip.natural_size = Some(Size2D::new(width, height));
        self
    }

    pub fn audio(mut self, has_audio: bool) -> Self {
        self.clip.has_audio = has_audio;
        self
    }

    /// Keyframe the transform at normalized `time`.
    pub fn keyframe(mut self, time: f64, value: ClipParams) -> Self {
        self.keys.push(Keyframe::new(time, value));
        self
    }

    pub fn build(self) -> Clip {
        let mut clip = self.clip;
        if !self.keys.is_empty() {
            clip.keyframes = KeyframeList::from_keys(self.keys);
        }
        clip
    }
}
