//! Text rasterization.
//!
//! The compositor only needs a tight, straight-alpha image of a text run;
//! placement, rotation and opacity are applied afterwards.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use fontdue::{Font, FontSettings};

use montage_core::{Color, FrameBuffer, MontageError, MontageResult, TextAlign};
use montage_ir::FontDescriptor;

/// One text run to rasterize.
#[derive(Debug, Clone)]
pub struct TextRequest<'a> {
    pub text: &'a str,
    pub font: &'a FontDescriptor,
    /// Font size in canvas pixels.
    pub size: f32,
    pub color: Color,
    pub alignment: TextAlign,
}

/// Turns text into an alpha-bearing image.
pub trait TextRasterizer: Send + Sync {
    fn rasterize(&self, request: &TextRequest<'_>) -> MontageResult<FrameBuffer>;
}

/// Rasterizer backed by fontdue, loading fonts from the descriptor's path.
#[derive(Default)]
pub struct FontdueRasterizer {
    fonts: DashMap<PathBuf, Arc<Font>>,
    /// Used for descriptors that name no file.
    default_font: Option<PathBuf>,
}

impl FontdueRasterizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_font(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_font = Some(path.into());
        self
    }

    fn font_for(&self, descriptor: &FontDescriptor) -> MontageResult<Arc<Font>> {
        let path = descriptor
            .path
            .as_ref()
            .or(self.default_font.as_ref())
            .ok_or_else(|| {
                MontageError::asset(
                    format!("no font file for family '{}'", descriptor.family),
                    PathBuf::new(),
                )
            })?;
        if let Some(font) = self.fonts.get(path) {
            return Ok(font.clone());
        }
        let font = Arc::new(load_font(path)?);
        self.fonts.insert(path.clone(), font.clone());
        Ok(font)
    }
}

fn load_font(path: &Path) -> MontageResult<Font> {
    let data = std::fs::read(path).map_err(|e| {
        MontageError::asset(format!("failed to read font file: {}", e), path)
    })?;
    Font::from_bytes(data, FontSettings::default())
        .map_err(|e| MontageError::asset(format!("failed to parse font: {}", e), path))
}

impl TextRasterizer for FontdueRasterizer {
    fn rasterize(&self, request: &TextRequest<'_>) -> MontageResult<FrameBuffer> {
        let font = self.font_for(request.font)?;
        Ok(render_text(&font, request))
    }
}

/// Measurements for a single line of text.
#[derive(Debug, Clone, Copy)]
struct LineMeasure {
    width: i32,
    ascent: i32,
    descent: i32,
}

fn measure_line(font: &Font, text: &str, size: f32) -> LineMeasure {
    let mut m = LineMeasure {
        width: 0,
        ascent: 0,
        descent: 0,
    };
    // Empty lines still take up a line's height.
    let probe = if text.is_empty() { " " } else { text };
    for ch in probe.chars() {
        let metrics = font.metrics(ch, size);
        m.ascent = m.ascent.max(metrics.height as i32 + metrics.ymin);
        m.descent = m.descent.max(-metrics.ymin);
        if !text.is_empty() {
            m.width += metrics.advance_width.round() as i32;
        }
    }
    m
}

/// Lay out `\n`-separated lines and draw them into a tight buffer.
fn render_text(font: &Font, request: &TextRequest<'_>) -> FrameBuffer {
    if request.text.is_empty() || !(request.size > 0.0) {
        return FrameBuffer::new(0, 0);
    }
    let size = request.size;
    let lines: Vec<&str> = request.text.split('\n').collect();
    let measures: Vec<LineMeasure> = lines.iter().map(|l| measure_line(font, l, size)).collect();

    let line_height = (size * 1.3).round() as i32;
    let max_width = measures.iter().map(|m| m.width).max().unwrap_or(0);
    let last = measures[measures.len() - 1];
    let total_height = line_height * (lines.len() as i32 - 1) + last.ascent + last.descent;

    let mut fb = FrameBuffer::new(max_width.max(1) as u32, total_height.max(1) as u32);
    let [r, g, b, a] = request.color.to_rgba8();

    let mut baseline_top = 0;
    for (line, measure) in lines.iter().zip(&measures) {
        let mut cursor = match request.alignment {
            TextAlign::Left => 0,
            TextAlign::Center => (max_width - measure.width) / 2,
            TextAlign::Right => max_width - measure.width,
        };
        for ch in line.chars() {
            let (metrics, bitmap) = font.rasterize(ch, size);
            let gx0 = cursor + metrics.xmin;
            let gy0 = baseline_top + measure.ascent - (metrics.height as i32 + metrics.ymin);
            for gy in 0..metrics.height {
                for gx in 0..metrics.width {
                    let coverage = bitmap[gy * metrics.width + gx] as u32;
                    if coverage == 0 {
                        continue;
                    }
                    let (px, py) = (gx0 + gx as i32, gy0 + gy as i32);
                    if px < 0 || py < 0 || px >= fb.width as i32 || py >= fb.height as i32 {
                        continue;
                    }
                    let alpha = (coverage * a as u32 / 255) as u8;
                    let existing = fb.get_pixel(px as u32, py as u32).map_or(0, |p| p[3]);
                    fb.set_pixel(px as u32, py as u32, [r, g, b, alpha.max(existing)]);
                }
            }
            cursor += metrics.advance_width.round() as i32;
        }
        baseline_top += line_height;
    }
    fb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_font_path_is_asset_error() {
        let raster = FontdueRasterizer::new();
        let font = FontDescriptor::new("Inter");
        let request = TextRequest {
            text: "Hello",
            font: &font,
            size: 24.0,
            color: Color::WHITE,
            alignment: TextAlign::Center,
        };
        let err = raster.rasterize(&request).unwrap_err();
        assert!(err.is_layer_local());
    }

    #[test]
    fn test_unreadable_font_file_is_asset_error() {
        let raster = FontdueRasterizer::new().with_default_font("/nonexistent/font.ttf");
        let font = FontDescriptor::new("Inter");
        let request = TextRequest {
            text: "Hello",
            font: &font,
            size: 24.0,
            color: Color::WHITE,
            alignment: TextAlign::Left,
        };
        assert!(matches!(
            raster.rasterize(&request),
            Err(MontageError::Asset { .. })
        ));
    }
}
