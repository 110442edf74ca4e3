use serde::{Deserialize, Serialize};

use crate::clip::Clip;
use crate::overlay::TextOverlay;
use crate::placement::{Placement, PlacementId};

/// An immutable copy of the editor state at one revision.
///
/// Everything on the render side reads snapshots; edits made after a
/// snapshot was taken never show up in it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineSnapshot {
    pub revision: u64,
    pub clips: Vec<Clip>,
    pub overlays: Vec<TextOverlay>,
}

impl TimelineSnapshot {
    /// Composition length: the latest clip end. Overlays do not extend it.
    pub fn duration(&self) -> f64 {
        self.clips
            .iter()
            .map(Clip::timeline_end)
            .fold(0.0, f64::max)
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// One placement per clip, in clip order.
    pub fn placements(&self) -> Vec<Placement> {
        self.clips
            .iter()
            .enumerate()
            .map(|(i, clip)| Placement {
                id: PlacementId(i),
                track: clip.track,
                range: clip.range(),
            })
            .collect()
    }

    pub fn clip(&self, id: PlacementId) -> Option<&Clip> {
        self.clips.get(id.0)
    }

    /// Clips whose range contains `t`, bottom track first.
    pub fn active_clips_at(&self, t: f64) -> Vec<PlacementId> {
        let mut active: Vec<Placement> = self
            .placements()
            .into_iter()
            .filter(|p| p.range.contains(t))
            .collect();
        active.sort_by_key(Placement::z_key);
        active.into_iter().map(|p| p.id).collect()
    }

    /// Indices of overlays whose `[start, end)` contains `t`, in list order.
    pub fn active_overlays_at(&self, t: f64) -> Vec<usize> {
        self.overlays
            .iter()
            .enumerate()
            .filter(|(_, o)| o.is_active_at(t))
            .map(|(i, _)| i)
            .collect()
    }

    /// The clip that determines the canvas: earliest start, then lowest track.
    pub fn first_clip(&self) -> Option<&Clip> {
        self.clips.iter().min_by(|a, b| {
            a.timeline_start
                .total_cmp(&b.timeline_start)
                .then(a.track.cmp(&b.track))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clip::SourceRef;

    fn snapshot() -> TimelineSnapshot {
        TimelineSnapshot {
            revision: 1,
            clips: vec![
                Clip::new(SourceRef::new("top.mp4"), 3.0).at(2.0, 1),
                Clip::new(SourceRef::new("bottom.mp4"), 4.0).at(4.0, 0),
                Clip::new(SourceRef::new("also-top.mp4"), 8.0).at(0.0, 1),
            ],
            overlays: vec![
                TextOverlay::new("late", 1.0, 20.0),
                TextOverlay::new("early", 0.0, 1.0),
            ],
        }
    }

    #[test]
    fn test_duration_ignores_overlays() {
        assert_eq!(snapshot().duration(), 8.0);
        assert_eq!(TimelineSnapshot::default().duration(), 0.0);
    }

    #[test]
    fn test_active_clips_sorted_by_track_then_slot() {
        let s = snapshot();
        assert_eq!(
            s.active_clips_at(4.5),
            vec![PlacementId(1), PlacementId(0), PlacementId(2)]
        );
        assert_eq!(s.active_clips_at(1.0), vec![PlacementId(2)]);
        assert!(s.active_clips_at(8.0).is_empty());
    }

    #[test]
    fn test_active_overlays() {
        let s = snapshot();
        assert_eq!(s.active_overlays_at(0.5), vec![1]);
        assert_eq!(s.active_overlays_at(1.0), vec![0]);
    }

    #[test]
    fn test_first_clip() {
        let s = snapshot();
        assert_eq!(s.first_clip().unwrap().source, SourceRef::new("also-top.mp4"));
    }
}
