//! In-memory sources and text for driving the engine without media files.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use montage_core::{Color, FrameBuffer, MontageError, MontageResult, Size2D};
use montage_ir::SourceRef;
use montage_render::{FrameCompositor, FrameSource, SourceMetadata, TextRasterizer, TextRequest};

/// Serves a solid frame per source path. Paths under `broken/` fail to
/// decode; paths under `slow/` answer metadata slowly; asking for the
/// metadata of a path under `panic/` panics.
#[derive(Default)]
pub struct SolidSource {
    media: HashMap<String, (Color, Size2D, bool)>,
}

impl SolidSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, color: Color, width: f64, height: f64) -> Self {
        self.media
            .insert(path.to_string(), (color, Size2D::new(width, height), false));
        self
    }

    pub fn with_audio(mut self, path: &str, color: Color, width: f64, height: f64) -> Self {
        self.media
            .insert(path.to_string(), (color, Size2D::new(width, height), true));
        self
    }

    fn lookup(&self, source: &SourceRef) -> MontageResult<(Color, Size2D, bool)> {
        let key = source.path().to_string_lossy().to_string();
        if key.starts_with("broken/") {
            return Err(MontageError::decode("corrupt stream", source));
        }
        self.media
            .get(&key)
            .copied()
            .ok_or_else(|| MontageError::asset("unknown test media", source.path()))
    }
}

impl FrameSource for SolidSource {
    fn decode(&self, source: &SourceRef, _seconds: f64) -> MontageResult<FrameBuffer> {
        let (color, size, _) = self.lookup(source)?;
        Ok(FrameBuffer::solid(size.width as u32, size.height as u32, &color))
    }

    fn metadata(&self, source: &SourceRef) -> MontageResult<SourceMetadata> {
        if source.path().starts_with("slow") {
            std::thread::sleep(Duration::from_millis(300));
        }
        if source.path().starts_with("panic") {
            panic!("metadata lookup for {} blew up", source);
        }
        let (_, size, has_audio) = self.lookup(source)?;
        Ok(SourceMetadata {
            natural_size: size,
            orientation: None,
            has_audio,
            duration: 60.0,
        })
    }
}

/// Draws text as a solid block, 4 px per character and 8 px tall.
pub struct BlockText;

impl TextRasterizer for BlockText {
    fn rasterize(&self, request: &TextRequest<'_>) -> MontageResult<FrameBuffer> {
        let width = request.text.chars().count() as u32 * 4;
        Ok(FrameBuffer::solid(width, 8, &request.color))
    }
}

pub fn compositor(source: SolidSource) -> Arc<FrameCompositor> {
    Arc::new(FrameCompositor::new(Arc::new(source), Arc::new(BlockText)))
}

pub fn rgba(color: Color) -> [u8; 4] {
    color.to_rgba8()
}
