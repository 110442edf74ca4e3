//! # montage-ir
//!
//! The Montage editor data model: clips placed on tracks, text overlays,
//! normalized-time keyframes with their interpolation engine, and the
//! immutable timeline snapshots the renderer consumes.

pub mod builder;
pub mod clip;
pub mod editor;
pub mod keyframe;
pub mod overlay;
pub mod placement;
pub mod snapshot;
pub mod validate;

pub use builder::{ClipBuilder, TimelineBuilder};
pub use clip::{Clip, ClipId, ClipParams, SourceRef};
pub use editor::EditorState;
pub use keyframe::{interpolate, Interpolate, Keyframe, KeyframeList, MIN_KEYFRAME_SPACING};
pub use overlay::{FontDescriptor, OverlayId, TextOverlay, TextParams};
pub use placement::{Placement, PlacementId};
pub use snapshot::TimelineSnapshot;
pub use validate::validate_timeline;
