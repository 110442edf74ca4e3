use serde::{Deserialize, Serialize};

/// An RGBA8 image with straight (non-premultiplied) alpha.
///
/// Every image that flows through the compositor is one of these: decoded
/// source frames, rasterized text, per-layer intermediates and the final
/// composited canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    /// Raw pixel data, 4 bytes per pixel, row-major.
    pub data: Vec<u8>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl FrameBuffer {
    /// Bytes per pixel.
    pub const BPP: usize = 4;

    /// Create a new frame buffer filled with zeros (transparent black).
    pub fn new(width: u32, height: u32) -> Self {
        let size = (width as usize) * (height as usize) * Self::BPP;
        Self {
            data: vec![0u8; size],
            width,
            height,
        }
    }

    /// Create a frame buffer filled with a solid color.
    pub fn solid(width: u32, height: u32, color: &crate::Color) -> Self {
        let pixel = color.to_rgba8();
        let pixel_count = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(pixel_count * Self::BPP);
        for _ in 0..pixel_count {
            data.extend_from_slice(&pixel);
        }
        Self {
            data,
            width,
            height,
        }
    }

    /// Wrap raw RGBA bytes. Returns `None` when the length does not match.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if data.len() != (width as usize) * (height as usize) * Self::BPP {
            return None;
        }
        Some(Self {
            data,
            width,
            height,
        })
    }

    /// Total number of pixels.
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Total byte size of the pixel data.
    pub fn byte_size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Get the RGBA value at a pixel coordinate. Returns None if out of bounds.
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = self.offset(x, y);
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ])
    }

    /// Set the RGBA value at a pixel coordinate. No-op if out of bounds.
    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let offset = self.offset(x, y);
        self.data[offset..offset + 4].copy_from_slice(&rgba);
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        ((y as usize) * (self.width as usize) + (x as usize)) * Self::BPP
    }

    /// Multiply every alpha value by `opacity`.
    pub fn scale_alpha(&mut self, opacity: f32) {
        let opacity = opacity.clamp(0.0, 1.0);
        if opacity >= 1.0 {
            return;
        }
        for px in self.data.chunks_exact_mut(4) {
            px[3] = (px[3] as f32 * opacity).round() as u8;
        }
    }

    /// Copy out the region `[x, x + width) × [y, y + height)`, where `(x, y)`
    /// may be negative. Pixels outside this buffer come back transparent.
    pub fn crop(&self, x: i32, y: i32, width: u32, height: u32) -> FrameBuffer {
        let mut out = FrameBuffer::new(width, height);
        let src_w = self.width as i32;
        let src_h = self.height as i32;
        for oy in 0..height as i32 {
            let sy = y + oy;
            if sy < 0 || sy >= src_h {
                continue;
            }
            let x0 = x.max(0);
            let x1 = (x + width as i32).min(src_w);
            if x0 >= x1 {
                continue;
            }
            let src_start = self.offset(x0 as u32, sy as u32);
            let len = (x1 - x0) as usize * Self::BPP;
            let dst_start = out.offset((x0 - x) as u32, oy as u32);
            out.data[dst_start..dst_start + len]
                .copy_from_slice(&self.data[src_start..src_start + len]);
        }
        out
    }

    /// Alpha-composite `src` on top of `self` at position (dx, dy)
    /// (Porter-Duff "over", straight alpha, integer math).
    pub fn composite_over(&mut self, src: &FrameBuffer, dx: i32, dy: i32) {
        let dst_width = self.width as i32;
        let dst_height = self.height as i32;

        let start_y = (-dy).max(0);
        let end_y = (src.height as i32).min(dst_height - dy);
        let start_x = (-dx).max(0);
        let end_x = (src.width as i32).min(dst_width - dx);

        if start_x >= end_x || start_y >= end_y {
            return;
        }

        let src_stride = src.width as usize * Self::BPP;
        let dst_stride = self.width as usize * Self::BPP;

        for sy in start_y..end_y {
            let dst_y = dy + sy;
            let src_row_start = (sy as usize * src_stride) + (start_x as usize * Self::BPP);
            let dst_row_start =
                (dst_y as usize * dst_stride) + ((dx + start_x) as usize * Self::BPP);
            let len = (end_x - start_x) as usize * Self::BPP;

            let src_slice = &src.data[src_row_start..src_row_start + len];
            let dst_slice = &mut self.data[dst_row_start..dst_row_start + len];

            for (s, d) in src_slice.chunks_exact(4).zip(dst_slice.chunks_exact_mut(4)) {
                blend_over(d, s);
            }
        }
    }
}

/// Blend one straight-alpha source pixel over a destination pixel in place.
#[inline]
fn blend_over(d: &mut [u8], s: &[u8]) {
    let sa = s[3] as u32;
    if sa == 0 {
        return;
    }
    if sa == 255 {
        d.copy_from_slice(s);
        return;
    }

    let da = d[3] as u32;
    let inv_sa = 255 - sa;
    let out_a = sa + ((da * inv_sa) / 255);
    if out_a == 0 {
        return;
    }

    for c in 0..3 {
        let sc = s[c] as u32;
        let dc = d[c] as u32;
        d[c] = ((sc * sa * 255 + dc * da * inv_sa) / (out_a * 255)) as u8;
    }
    d[3] = out_a as u8;
}

/// A zero-based frame index on a fixed-rate output timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FrameIndex(pub u64);

impl FrameIndex {
    /// Presentation time of this frame: `index / fps`.
    pub fn to_timestamp(&self, fps: f64) -> crate::Timestamp {
        crate::Timestamp::from_seconds(self.0 as f64 / fps)
    }
}

impl std::fmt::Display for FrameIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Frame({})", self.0)
    }
}
