//! # montage-render
//!
//! The Montage compositing engine. Turns timeline snapshots into segment
//! instructions and composited RGBA frames, and drives them to an
//! interactive preview or a file export. CPU only: geometry goes through a
//! single affine resample per layer, parallelized with rayon.

pub mod compositor;
pub mod effects;
pub mod export;
pub mod instruction;
pub mod preview;
pub mod source;
pub mod text;
pub mod transform;

pub use compositor::{CompositeFrame, FrameCompositor, RenderRequest};
pub use export::{
    spawn_export, ExportDriver, ExportProgress, ExportReport, ExportSettings, ExportStage,
};
pub use instruction::{build_instructions, resolve_canvas, CanvasSize, Instruction, InstructionSet};
pub use preview::{EngineState, Playhead, PreviewEngine, RebuildOutcome};
pub use source::{
    probe_clips, FfmpegSource, FrameSource, MediaSource, SourceMetadata, StillImageSource,
};
pub use text::{FontdueRasterizer, TextRasterizer, TextRequest};
