//! The frame compositor: one image per requested composition time.
//!
//! Preview and export both go through [`FrameCompositor::render`], so the
//! same snapshot and time always give the same pixels.

use std::sync::Arc;

use rayon::prelude::*;

use montage_core::{Affine2D, Color, FrameBuffer, MontageError, MontageResult, Point2D, Size2D};
use montage_ir::{Clip, PlacementId, TextOverlay, TimelineSnapshot};

use crate::effects::{apply_exposure, apply_filter};
use crate::instruction::CanvasSize;
use crate::source::FrameSource;
use crate::text::{TextRasterizer, TextRequest};
use crate::transform::{layer_matrix, warp};

/// Overlays at or below this opacity are not drawn.
const MIN_VISIBLE_OPACITY: f64 = 0.001;

/// One render call.
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub snapshot: &'a TimelineSnapshot,
    /// Composition time in seconds.
    pub time: f64,
    pub canvas: CanvasSize,
    /// Clip layers to draw, bottom first.
    pub layers: &'a [PlacementId],
    /// Overlay indices to consider, in list order.
    pub overlays: &'a [usize],
}

/// A rendered frame plus what went into it.
#[derive(Debug, Clone)]
pub struct CompositeFrame {
    pub image: FrameBuffer,
    pub time: f64,
    pub layers_drawn: usize,
    /// Layers dropped because their source or asset failed.
    pub layers_skipped: usize,
    pub overlays_drawn: usize,
}

/// Shared render context. Holds no per-frame state, so one compositor can
/// serve any number of concurrent requests.
pub struct FrameCompositor {
    source: Arc<dyn FrameSource>,
    text: Arc<dyn TextRasterizer>,
    background: Color,
}

impl FrameCompositor {
    pub fn new(source: Arc<dyn FrameSource>, text: Arc<dyn TextRasterizer>) -> Self {
        Self {
            source,
            text,
            background: Color::BLACK,
        }
    }

    pub fn with_background(mut self, background: Color) -> Self {
        self.background = background;
        self
    }

    pub fn source(&self) -> &Arc<dyn FrameSource> {
        &self.source
    }

    pub fn background(&self) -> Color {
        self.background
    }

    /// Draw the requested layers and overlays over the background.
    pub fn render(&self, request: &RenderRequest<'_>) -> MontageResult<CompositeFrame> {
        let canvas = request.canvas;
        if canvas.is_empty() {
            return Err(MontageError::Resource(format!(
                "cannot allocate a {} canvas",
                canvas
            )));
        }
        let t = request.time;

        // Layers are prepared in parallel and composited in order.
        let prepared: Vec<MontageResult<Option<FrameBuffer>>> = request
            .layers
            .par_iter()
            .map(|&id| match request.snapshot.clip(id) {
                Some(clip) => self.prepare_layer(clip, t, canvas),
                None => {
                    tracing::warn!(
                        "placement {} is not in snapshot revision {}",
                        id,
                        request.snapshot.revision
                    );
                    Ok(None)
                }
            })
            .collect();

        let mut frame = FrameBuffer::solid(canvas.width, canvas.height, &self.background);
        let mut layers_drawn = 0;
        let mut layers_skipped = 0;
        for (layer, id) in prepared.into_iter().zip(request.layers) {
            match layer {
                Ok(Some(image)) => {
                    frame.composite_over(&image, 0, 0);
                    layers_drawn += 1;
                }
                Ok(None) => layers_skipped += 1,
                Err(e) if e.is_layer_local() => {
                    tracing::warn!("skipping layer {} at {:.3}s: {}", id, t, e);
                    layers_skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        let mut overlays_drawn = 0;
        for &index in request.overlays {
            let Some(overlay) = request.snapshot.overlays.get(index) else {
                continue;
            };
            match self.prepare_overlay(overlay, t, canvas) {
                Ok(Some(image)) => {
                    frame.composite_over(&image, 0, 0);
                    overlays_drawn += 1;
                }
                Ok(None) => {}
                Err(e) if e.is_layer_local() => {
                    tracing::warn!("skipping overlay {} at {:.3}s: {}", overlay.id, t, e);
                }
                Err(e) => return Err(e),
            }
        }

        tracing::debug!(
            "composited {:.3}s: {} layers, {} skipped, {} overlays",
            t,
            layers_drawn,
            layers_skipped,
            overlays_drawn
        );
        Ok(CompositeFrame {
            image: frame,
            time: t,
            layers_drawn,
            layers_skipped,
            overlays_drawn,
        })
    }

    /// Decode, place and grade one clip into a canvas-sized transparent
    /// image.
    fn prepare_layer(
        &self,
        clip: &Clip,
        t: f64,
        canvas: CanvasSize,
    ) -> MontageResult<Option<FrameBuffer>> {
        let decoded = self.source.decode(&clip.source, clip.source_time(t))?;
        if decoded.is_empty() {
            return Ok(None);
        }

        let params = clip.params_at(t);
        let natural = Size2D::new(decoded.width as f64, decoded.height as f64);
        let matrix = layer_matrix(natural, clip.orientation.as_ref(), canvas.as_size(), &params);
        let mut layer = warp(&decoded, &matrix, canvas.width, canvas.height);

        apply_exposure(&mut layer, clip.exposure);

        if !clip.filter.is_none() {
            let filtered = apply_filter(layer, clip.filter, clip.filter_intensity);
            layer = if filtered.pad == 0 {
                filtered.image
            } else {
                let pad = filtered.pad as i32;
                filtered.image.crop(pad, pad, canvas.width, canvas.height)
            };
        }
        Ok(Some(layer))
    }

    /// Rasterize and place one overlay, or `None` when it is not visible
    /// at `t`.
    fn prepare_overlay(
        &self,
        overlay: &TextOverlay,
        t: f64,
        canvas: CanvasSize,
    ) -> MontageResult<Option<FrameBuffer>> {
        if !overlay.is_active_at(t) {
            return Ok(None);
        }
        let params = overlay.params_at(t);
        if params.opacity < MIN_VISIBLE_OPACITY {
            return Ok(None);
        }

        let text = self.text.rasterize(&TextRequest {
            text: &overlay.text,
            font: &overlay.font,
            size: overlay.size as f32,
            color: overlay.color,
            alignment: overlay.alignment,
        })?;
        if text.is_empty() {
            return Ok(None);
        }

        let anchor = Point2D::new(
            params.position.x * canvas.width as f64,
            params.position.y * canvas.height as f64,
        );
        let matrix = text_matrix(text.width, text.height, anchor, params.rotation, params.scale);
        let mut placed = warp(&text, &matrix, canvas.width, canvas.height);
        placed.scale_alpha(params.opacity.clamp(0.0, 1.0) as f32);
        Ok(Some(placed))
    }
}

/// Center a `width`×`height` text image on `anchor`, rotated (degrees,
/// clockwise) and scaled about its own center.
pub fn text_matrix(
    width: u32,
    height: u32,
    anchor: Point2D,
    rotation_deg: f64,
    scale: f64,
) -> Affine2D {
    Affine2D::translate(-(width as f64) / 2.0, -(height as f64) / 2.0)
        .then(&Affine2D::rotate(rotation_deg.to_radians()))
        .then(&Affine2D::scale(scale, scale))
        .then(&Affine2D::translate(anchor.x, anchor.y))
}
