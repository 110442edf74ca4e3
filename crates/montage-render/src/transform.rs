//! Geometric part of the layer pipeline.
//!
//! Orientation, fit-and-center, rotation/scale about the canvas center and
//! the user offset are folded into one [`Affine2D`], which [`warp`] applies
//! with a single inverse-mapped bilinear resample.

use rayon::prelude::*;

use montage_core::{Affine2D, FrameBuffer, Point2D, Rect, Size2D};
use montage_ir::ClipParams;

/// Source orientation applied and re-anchored so the oriented image's
/// top-left corner lands on the origin. Returns the transform and the
/// oriented extent.
pub fn orientation_matrix(source: Size2D, orientation: Option<&Affine2D>) -> (Affine2D, Size2D) {
    let orient = orientation.copied().unwrap_or(Affine2D::IDENTITY);
    let bbox = orient.transform_rect_bbox(Rect::from_size(source));
    let anchored = orient.then(&Affine2D::translate(-bbox.x0, -bbox.y0));
    (anchored, Size2D::new(bbox.width(), bbox.height()))
}

/// Uniform scale that fits `extent` inside `canvas`, centered.
pub fn fit_matrix(extent: Size2D, canvas: Size2D) -> Affine2D {
    if extent.width <= 0.0 || extent.height <= 0.0 {
        return Affine2D::IDENTITY;
    }
    let fit = (canvas.width / extent.width).min(canvas.height / extent.height);
    Affine2D::scale(fit, fit).then(&Affine2D::translate(
        (canvas.width - extent.width * fit) / 2.0,
        (canvas.height - extent.height * fit) / 2.0,
    ))
}

/// Rotation (degrees, clockwise on screen) followed by uniform scale, both
/// about `center`.
pub fn spin_matrix(center: Point2D, rotation_deg: f64, scale: f64) -> Affine2D {
    Affine2D::about(
        center,
        Affine2D::rotate(rotation_deg.to_radians()).then(&Affine2D::scale(scale, scale)),
    )
}

/// Translation by a user offset, where +y points up.
pub fn offset_matrix(offset: Point2D) -> Affine2D {
    Affine2D::translate(offset.x, -offset.y)
}

/// Full source-to-canvas transform of a clip layer.
pub fn layer_matrix(
    source: Size2D,
    orientation: Option<&Affine2D>,
    canvas: Size2D,
    params: &ClipParams,
) -> Affine2D {
    let (oriented, extent) = orientation_matrix(source, orientation);
    oriented
        .then(&fit_matrix(extent, canvas))
        .then(&spin_matrix(canvas.center(), params.rotation, params.scale))
        .then(&offset_matrix(params.offset))
}

/// Resample `src` through `matrix` into a transparent `width`×`height`
/// buffer. A singular matrix produces an empty (fully transparent) result.
pub fn warp(src: &FrameBuffer, matrix: &Affine2D, width: u32, height: u32) -> FrameBuffer {
    let mut out = FrameBuffer::new(width, height);
    if src.is_empty() || out.is_empty() {
        return out;
    }
    let Some(inv) = matrix.inverse() else {
        return out;
    };

    let sw = src.width as usize;
    let sh = src.height as usize;
    let stride = width as usize * FrameBuffer::BPP;
    out.data
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            for x in 0..width as usize {
                let p = inv.apply(Point2D::new(x as f64 + 0.5, y as f64 + 0.5));
                if let Some(px) = sample_bilinear(&src.data, sw, sh, p.x, p.y) {
                    row[x * 4..x * 4 + 4].copy_from_slice(&px);
                }
            }
        });
    out
}

/// Bilinear sample at continuous coordinates where pixel `i` covers
/// `[i, i + 1)`. Points outside the image return `None`; taps near the edge
/// clamp inward. Interpolates premultiplied values.
#[inline]
fn sample_bilinear(buf: &[u8], width: usize, height: usize, x: f64, y: f64) -> Option<[u8; 4]> {
    if !(x >= 0.0 && y >= 0.0 && x < width as f64 && y < height as f64) {
        return None;
    }
    let sx = (x - 0.5).max(0.0);
    let sy = (y - 0.5).max(0.0);
    let x0 = (sx.floor() as usize).min(width - 1);
    let y0 = (sy.floor() as usize).min(height - 1);
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = (sx - x0 as f64) as f32;
    let fy = (sy - y0 as f64) as f32;

    let taps = [
        ((y0 * width + x0) * 4, (1.0 - fx) * (1.0 - fy)),
        ((y0 * width + x1) * 4, fx * (1.0 - fy)),
        ((y1 * width + x0) * 4, (1.0 - fx) * fy),
        ((y1 * width + x1) * 4, fx * fy),
    ];

    let mut alpha = 0.0f32;
    let mut color = [0.0f32; 3];
    for (idx, w) in taps {
        if w == 0.0 {
            continue;
        }
        let a = buf[idx + 3] as f32 * w;
        alpha += a;
        for c in 0..3 {
            color[c] += buf[idx + c] as f32 * a;
        }
    }
    if alpha <= 0.0 {
        return Some([0, 0, 0, 0]);
    }
    Some([
        (color[0] / alpha).round().clamp(0.0, 255.0) as u8,
        (color[1] / alpha).round().clamp(0.0, 255.0) as u8,
        (color[2] / alpha).round().clamp(0.0, 255.0) as u8,
        alpha.round().clamp(0.0, 255.0) as u8,
    ])
}
