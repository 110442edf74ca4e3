//! Photometric steps of the layer pipeline: exposure and look filters.
//!
//! All operations work on straight-alpha RGBA8 and leave alpha untouched,
//! except blur, which spreads coverage and grows the image.

use rayon::prelude::*;

use montage_core::{Filter, FrameBuffer};

/// Blur radius in pixels at filter intensity 1.0.
pub const MAX_BLUR_RADIUS: u32 = 24;

const LUMA: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// Multiply color by `2^ev`.
pub fn apply_exposure(fb: &mut FrameBuffer, ev: f64) {
    if ev == 0.0 || !ev.is_finite() {
        return;
    }
    let gain = 2f64.powf(ev) as f32;
    map_rgb(fb, |rgb| rgb.map(|c| c * gain));
}

/// Result of a filter pass: the image plus how many pixels it grew by on
/// every side.
pub struct Filtered {
    pub image: FrameBuffer,
    pub pad: u32,
}

/// Apply `filter` at `intensity` (clamped to `[0, 1]`).
pub fn apply_filter(mut fb: FrameBuffer, filter: Filter, intensity: f64) -> Filtered {
    let i = intensity.clamp(0.0, 1.0) as f32;
    match filter {
        Filter::None => {}
        Filter::Sepia => map_rgb(&mut fb, |c| {
            let s = [
                0.393 * c[0] + 0.769 * c[1] + 0.189 * c[2],
                0.349 * c[0] + 0.686 * c[1] + 0.168 * c[2],
                0.272 * c[0] + 0.534 * c[1] + 0.131 * c[2],
            ];
            mix(c, s.map(|v| v.min(255.0)), i)
        }),
        Filter::Mono => map_rgb(&mut fb, |c| mix(c, [luma(c); 3], i)),
        Filter::Noir => map_rgb(&mut fb, |c| {
            let v = contrast(luma(c), 1.0 + i);
            [v; 3]
        }),
        Filter::Chrome => map_rgb(&mut fb, |c| {
            let l = luma(c);
            let saturation = 1.0 + 0.6 * i;
            c.map(|v| contrast(l + (v - l) * saturation, 1.0 + 0.25 * i))
        }),
        Filter::Fade => map_rgb(&mut fb, |c| {
            let l = luma(c);
            let lift = 40.0 * i;
            mix(c, [l; 3], 0.35 * i).map(|v| lift + v * (255.0 - lift) / 255.0)
        }),
        Filter::Invert => map_rgb(&mut fb, |c| mix(c, c.map(|v| 255.0 - v), i)),
        Filter::Vignette => vignette(&mut fb, i),
        Filter::Blur => {
            let radius = (i * MAX_BLUR_RADIUS as f32).round() as u32;
            if radius > 0 {
                return Filtered {
                    image: blur(&fb, radius, radius as f32 / 2.0),
                    pad: radius,
                };
            }
        }
    }
    Filtered { image: fb, pad: 0 }
}

fn luma(c: [f32; 3]) -> f32 {
    LUMA[0] * c[0] + LUMA[1] * c[1] + LUMA[2] * c[2]
}

fn contrast(v: f32, k: f32) -> f32 {
    (v - 127.5) * k + 127.5
}

fn mix(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
    ]
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Per-pixel color transform over `[0, 255]` floats, skipping fully
/// transparent pixels.
fn map_rgb(fb: &mut FrameBuffer, f: impl Fn([f32; 3]) -> [f32; 3] + Sync) {
    fb.data.par_chunks_mut(4).for_each(|px| {
        if px[3] == 0 {
            return;
        }
        let out = f([px[0] as f32, px[1] as f32, px[2] as f32]);
        px[0] = to_u8(out[0]);
        px[1] = to_u8(out[1]);
        px[2] = to_u8(out[2]);
    });
}

/// Darken towards the corners. Higher intensity darkens more and starts
/// the falloff closer to the center.
fn vignette(fb: &mut FrameBuffer, i: f32) {
    if i <= 0.0 || fb.is_empty() {
        return;
    }
    let w = fb.width as usize;
    let (cx, cy) = (fb.width as f32 / 2.0, fb.height as f32 / 2.0);
    let max_dist = (cx * cx + cy * cy).sqrt();
    let inner = 0.75 - 0.35 * i;
    fb.data
        .par_chunks_mut(w * 4)
        .enumerate()
        .for_each(|(y, row)| {
            let dy = y as f32 + 0.5 - cy;
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let dx = x as f32 + 0.5 - cx;
                let d = (dx * dx + dy * dy).sqrt() / max_dist;
                let factor = 1.0 - 0.85 * i * smoothstep(inner, 1.0, d);
                for c in px.iter_mut().take(3) {
                    *c = to_u8(*c as f32 * factor);
                }
            }
        });
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Gaussian blur into a buffer grown by `radius` on every side, so
/// coverage can spread past the original edges.
pub fn blur(src: &FrameBuffer, radius: u32, sigma: f32) -> FrameBuffer {
    let pad = radius as i32;
    let mut padded = src.crop(-pad, -pad, src.width + 2 * radius, src.height + 2 * radius);
    if radius == 0 || !(sigma > 0.0) || padded.is_empty() {
        return padded;
    }

    premultiply(&mut padded.data);
    let kernel = gaussian_kernel_q16(radius, sigma);
    let (w, h) = (padded.width as usize, padded.height as usize);
    let mut tmp = vec![0u8; padded.data.len()];
    horizontal_pass(&padded.data, &mut tmp, w, &kernel);
    vertical_pass(&tmp, &mut padded.data, w, h, &kernel);
    unpremultiply(&mut padded.data);
    padded
}

fn premultiply(data: &mut [u8]) {
    data.par_chunks_mut(4).for_each(|px| {
        let a = px[3] as u32;
        for c in px.iter_mut().take(3) {
            *c = ((*c as u32 * a + 127) / 255) as u8;
        }
    });
}

fn unpremultiply(data: &mut [u8]) {
    data.par_chunks_mut(4).for_each(|px| {
        let a = px[3] as u32;
        if a == 0 {
            px[..3].fill(0);
            return;
        }
        for c in px.iter_mut().take(3) {
            *c = ((*c as u32 * 255 + a / 2) / a).min(255) as u8;
        }
    });
}

/// Normalized Gaussian weights in 16.16 fixed point, summing to exactly 1.
fn gaussian_kernel_q16(radius: u32, sigma: f32) -> Vec<u32> {
    let r = radius as i32;
    let denom = 2.0 * (sigma as f64) * (sigma as f64);
    let weights_f: Vec<f64> = (-r..=r)
        .map(|i| (-(i as f64) * (i as f64) / denom).exp())
        .collect();
    let sum: f64 = weights_f.iter().sum();

    let mut weights: Vec<u32> = weights_f
        .iter()
        .map(|w| ((w / sum) * 65536.0).round().clamp(0.0, 65536.0) as u32)
        .collect();
    let total: i64 = weights.iter().map(|&w| w as i64).sum();
    let mid = weights.len() / 2;
    weights[mid] = (weights[mid] as i64 + 65536 - total).clamp(0, 65536) as u32;
    weights
}

fn horizontal_pass(src: &[u8], dst: &mut [u8], width: usize, k: &[u32]) {
    let radius = (k.len() / 2) as i64;
    let w = width as i64;
    dst.par_chunks_mut(width * 4)
        .zip(src.par_chunks(width * 4))
        .for_each(|(out_row, in_row)| {
            for x in 0..w {
                let mut acc = [0u64; 4];
                for (ki, &kw) in k.iter().enumerate() {
                    let sx = (x + ki as i64 - radius).clamp(0, w - 1) as usize;
                    for c in 0..4 {
                        acc[c] += kw as u64 * in_row[sx * 4 + c] as u64;
                    }
                }
                let o = x as usize * 4;
                for c in 0..4 {
                    out_row[o + c] = q16_to_u8(acc[c]);
                }
            }
        });
}

fn vertical_pass(src: &[u8], dst: &mut [u8], width: usize, height: usize, k: &[u32]) {
    let radius = (k.len() / 2) as i64;
    let h = height as i64;
    dst.par_chunks_mut(width * 4)
        .enumerate()
        .for_each(|(y, out_row)| {
            for x in 0..width {
                let mut acc = [0u64; 4];
                for (ki, &kw) in k.iter().enumerate() {
                    let sy = (y as i64 + ki as i64 - radius).clamp(0, h - 1) as usize;
                    let idx = (sy * width + x) * 4;
                    for c in 0..4 {
                        acc[c] += kw as u64 * src[idx + c] as u64;
                    }
                }
                for c in 0..4 {
                    out_row[x * 4 + c] = q16_to_u8(acc[c]);
                }
            }
        });
}

fn q16_to_u8(acc: u64) -> u8 {
    ((acc + 32768) >> 16).min(255) as u8
}
