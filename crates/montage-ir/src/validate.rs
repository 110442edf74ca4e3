use std::collections::HashSet;

use montage_core::MontageError;

use crate::clip::Clip;
use crate::overlay::TextOverlay;

/// Check every clip and overlay, collecting all problems instead of
/// stopping at the first.
pub fn validate_timeline(
    clips: &[Clip],
    overlays: &[TextOverlay],
) -> Result<(), Vec<MontageError>> {
    let mut errors = Vec::new();

    let mut clip_ids = HashSet::new();
    for clip in clips {
        if !clip_ids.insert(clip.id) {
            errors.push(MontageError::Validation(format!(
                "duplicate clip id: {}",
                clip.id
            )));
        }
        if let Err(e) = clip.validate() {
            errors.push(e);
        }
        if clip.keyframes.keys().iter().any(|k| !k.time.is_finite()) {
            errors.push(MontageError::Validation(format!(
                "clip {} has a keyframe with a non-finite time",
                clip.id
            )));
        }
    }

    let mut overlay_ids = HashSet::new();
    for overlay in overlays {
        if !overlay_ids.insert(overlay.id) {
            errors.push(MontageError::Validation(format!(
                "duplicate overlay id: {}",
                overlay.id
            )));
        }
        if let Err(e) = overlay.validate() {
            errors.push(e);
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
