use serde::{Deserialize, Serialize};

use montage_core::TimeRange;

/// Slot of a placement in a snapshot's placement arena. Equal to the index
/// of the placed clip in [`crate::TimelineSnapshot::clips`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlacementId(pub usize);

impl std::fmt::Display for PlacementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A clip's assigned time range and track within the composition.
/// Derived from a snapshot; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub id: PlacementId,
    pub track: u32,
    pub range: TimeRange,
}

impl Placement {
    /// Compositing order: bottom track first, then arena order.
    pub fn z_key(&self) -> (u32, PlacementId) {
        (self.track, self.id)
    }
}
