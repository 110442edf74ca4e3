//! # montage-core
//!
//! Core types and primitives for the Montage compositing engine.
//! This crate contains foundational types shared across all Montage crates:
//! frame buffers, colors, 2D transforms, time ranges, filters, output sink
//! contracts, configuration and error types.

pub mod color;
pub mod config;
pub mod error;
pub mod frame;
pub mod hash;
pub mod math;
pub mod sink;
pub mod time;
pub mod types;

pub use config::*;

pub use color::Color;
pub use error::{MontageError, MontageResult};
pub use frame::{FrameBuffer, FrameIndex};
pub use math::{Affine2D, Point2D, Rect, Size2D};
pub use sink::{AudioSegment, AudioSink, FrameSink, SinkSummary};
pub use time::{Duration, TimeRange, Timestamp};
pub use types::{Filter, TextAlign};
