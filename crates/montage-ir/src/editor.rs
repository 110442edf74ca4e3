//! The editable timeline.
//!
//! [`EditorState`] exclusively owns clips, overlays and their keyframes.
//! Every mutation validates the touched entity before committing and bumps
//! the revision, which is what tells the render side to rebuild.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use montage_core::{Affine2D, Filter, MontageError, MontageResult, Size2D};

use crate::clip::{Clip, ClipId, ClipParams};
use crate::keyframe::Keyframe;
use crate::overlay::{OverlayId, TextOverlay, TextParams};
use crate::snapshot::TimelineSnapshot;
use crate::validate::validate_timeline;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EditorState {
    #[serde(default)]
    revision: u64,
    #[serde(default)]
    clips: Vec<Clip>,
    #[serde(default)]
    overlays: Vec<TextOverlay>,
}

impl EditorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a project file and check every entity.
    pub fn from_json(json: &str) -> MontageResult<Self> {
        let state: EditorState = serde_json::from_str(json)?;
        validate_timeline(&state.clips, &state.overlays).map_err(|errors| {
            let joined: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            MontageError::Validation(joined.join("; "))
        })?;
        Ok(state)
    }

    pub fn load_from_file(path: &Path) -> MontageResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> MontageResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn clips(&self) -> &[Clip] {
        &self.clips
    }

    pub fn overlays(&self) -> &[TextOverlay] {
        &self.overlays
    }

    pub fn clip(&self, id: ClipId) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == id)
    }

    pub fn overlay(&self, id: OverlayId) -> Option<&TextOverlay> {
        self.overlays.iter().find(|o| o.id == id)
    }

    /// Freeze the current state for rendering.
    pub fn snapshot(&self) -> Arc<TimelineSnapshot> {
        Arc::new(TimelineSnapshot {
            revision: self.revision,
            clips: self.clips.clone(),
            overlays: self.overlays.clone(),
        })
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    fn clip_index(&self, id: ClipId) -> MontageResult<usize> {
        self.clips
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| MontageError::NotFound(format!("clip {}", id)))
    }

    fn overlay_index(&self, id: OverlayId) -> MontageResult<usize> {
        self.overlays
            .iter()
            .position(|o| o.id == id)
            .ok_or_else(|| MontageError::NotFound(format!("overlay {}", id)))
    }

    /// Apply `edit` to a copy of the clip and commit it only if the edit
    /// succeeds and the result is still valid.
    pub fn update_clip<R>(
        &mut self,
        id: ClipId,
        edit: impl FnOnce(&mut Clip) -> MontageResult<R>,
    ) -> MontageResult<R> {
        let index = self.clip_index(id)?;
        let mut clip = self.clips[index].clone();
        let out = edit(&mut clip)?;
        clip.id = id;
        clip.validate()?;
        self.clips[index] = clip;
        self.touch();
        Ok(out)
    }

    /// Overlay counterpart of [`EditorState::update_clip`].
    pub fn update_overlay<R>(
        &mut self,
        id: OverlayId,
        edit: impl FnOnce(&mut TextOverlay) -> MontageResult<R>,
    ) -> MontageResult<R> {
        let index = self.overlay_index(id)?;
        let mut overlay = self.overlays[index].clone();
        let out = edit(&mut overlay)?;
        overlay.id = id;
        overlay.validate()?;
        self.overlays[index] = overlay;
        self.touch();
        Ok(out)
    }

    // Clips

    pub fn add_clip(&mut self, clip: Clip) -> MontageResult<ClipId> {
        clip.validate()?;
        if self.clip(clip.id).is_some() {
            return Err(MontageError::Validation(format!(
                "duplicate clip id: {}",
                clip.id
            )));
        }
        let id = clip.id;
        self.clips.push(clip);
        self.touch();
        Ok(id)
    }

    pub fn remove_clip(&mut self, id: ClipId) -> MontageResult<Clip> {
        let index = self.clip_index(id)?;
        let clip = self.clips.remove(index);
        self.touch();
        Ok(clip)
    }

    /// Swap in a new version of an existing clip, matched by id.
    pub fn replace_clip(&mut self, clip: Clip) -> MontageResult<()> {
        self.update_clip(clip.id, move |c| {
            *c = clip;
            Ok(())
        })
    }

    pub fn trim_clip(&mut self, id: ClipId, trim_start: f64, trim_end: f64) -> MontageResult<()> {
        self.update_clip(id, |c| {
            c.trim_start = trim_start;
            c.trim_end = trim_end;
            Ok(())
        })
    }

    pub fn move_clip(&mut self, id: ClipId, timeline_start: f64, track: u32) -> MontageResult<()> {
        self.update_clip(id, |c| {
            c.timeline_start = timeline_start;
            c.track = track;
            Ok(())
        })
    }

    /// Replace a clip with two halves cut at composition time `t`. The left
    /// half keeps the original id.
    pub fn split_clip(&mut self, id: ClipId, t: f64) -> MontageResult<(ClipId, ClipId)> {
        let index = self.clip_index(id)?;
        let (left, right) = self.clips[index].split_at(t)?;
        left.validate()?;
        right.validate()?;
        let ids = (left.id, right.id);
        self.clips[index] = left;
        self.clips.insert(index + 1, right);
        self.touch();
        Ok(ids)
    }

    pub fn set_clip_transform(&mut self, id: ClipId, transform: ClipParams) -> MontageResult<()> {
        self.update_clip(id, |c| {
            c.transform = transform;
            Ok(())
        })
    }

    pub fn set_clip_filter(
        &mut self,
        id: ClipId,
        filter: Filter,
        intensity: f64,
    ) -> MontageResult<()> {
        self.update_clip(id, |c| {
            c.filter = filter;
            c.filter_intensity = intensity.clamp(0.0, 1.0);
            Ok(())
        })
    }

    pub fn set_clip_exposure(&mut self, id: ClipId, ev: f64) -> MontageResult<()> {
        self.update_clip(id, |c| {
            c.exposure = ev;
            Ok(())
        })
    }

    /// Record source metadata on the clip.
    pub fn set_clip_media(
        &mut self,
        id: ClipId,
        natural_size: Size2D,
        orientation: Option<Affine2D>,
        has_audio: bool,
    ) -> MontageResult<()> {
        self.update_clip(id, |c| {
            c.natural_size = Some(natural_size);
            c.orientation = orientation;
            c.has_audio = has_audio;
            Ok(())
        })
    }

    /// Add a keyframe at clip-local normalized `time`, seeded with the
    /// transform currently shown there. Returns its index.
    pub fn add_clip_keyframe(&mut self, id: ClipId, time: f64) -> MontageResult<usize> {
        self.update_clip(id, |c| {
            let base = c.transform;
            c.keyframes.insert_at(time, &base)
        })
    }

    pub fn remove_clip_keyframe(
        &mut self,
        id: ClipId,
        index: usize,
    ) -> MontageResult<Keyframe<ClipParams>> {
        self.update_clip(id, |c| c.keyframes.remove(index))
    }

    pub fn move_clip_keyframe(
        &mut self,
        id: ClipId,
        index: usize,
        time: f64,
    ) -> MontageResult<usize> {
        self.update_clip(id, |c| c.keyframes.move_keyframe(index, time))
    }

    pub fn set_clip_keyframe(
        &mut self,
        id: ClipId,
        index: usize,
        value: ClipParams,
    ) -> MontageResult<()> {
        self.update_clip(id, |c| c.keyframes.set_value(index, value))
    }

    // Overlays

    pub fn add_overlay(&mut self, overlay: TextOverlay) -> MontageResult<OverlayId> {
        overlay.validate()?;
        if self.overlay(overlay.id).is_some() {
            return Err(MontageError::Validation(format!(
                "duplicate overlay id: {}",
                overlay.id
            )));
        }
        let id = overlay.id;
        self.overlays.push(overlay);
        self.touch();
        Ok(id)
    }

    pub fn remove_overlay(&mut self, id: OverlayId) -> MontageResult<TextOverlay> {
        let index = self.overlay_index(id)?;
        let overlay = self.overlays.remove(index);
        self.touch();
        Ok(overlay)
    }

    pub fn add_overlay_keyframe(&mut self, id: OverlayId, time: f64) -> MontageResult<usize> {
        self.update_overlay(id, |o| {
            let base = o.transform;
            o.keyframes.insert_at(time, &base)
        })
    }

    pub fn remove_overlay_keyframe(
        &mut self,
        id: OverlayId,
        index: usize,
    ) -> MontageResult<Keyframe<TextParams>> {
        self.update_overlay(id, |o| o.keyframes.remove(index))
    }

    pub fn move_overlay_keyframe(
        &mut self,
        id: OverlayId,
        index: usize,
        time: f64,
    ) -> MontageResult<usize> {
        self.update_overlay(id, |o| o.keyframes.move_keyframe(index, time))
    }

    pub fn set_overlay_keyframe(
        &mut self,
        id: OverlayId,
        index: usize,
        value: TextParams,
    ) -> MontageResult<()> {
        self.update_overlay(id, |o| o.keyframes.set_value(index, value))
    }
}
