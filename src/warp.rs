//! Projective warps of small RGBA canvases.
//!
//! A homography is fitted from four point pairs by solving the 8x8 linear
//! system directly; the warp then pulls every output pixel back through
//! the inverse mapping and samples the source bilinearly.

use crate::types::{RenderRng, symmetric};
use tiny_skia::Pixmap;

pub type Point = (f32, f32);

const SINGULAR_EPS: f64 = 1e-12;

/// 3x3 projective map, row-major, normalized so `h[8] == 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    h: [f64; 9],
}

impl Homography {
    pub fn identity() -> Self {
        Self {
            h: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        }
    }

    /// The unique homography taking each `from[i]` to `to[i]`, or `None` for
    /// degenerate (collinear) configurations.
    pub fn from_correspondences(from: &[Point; 4], to: &[Point; 4]) -> Option<Self> {
        let mut a = [[0.0f64; 9]; 8];
        for (i, (&(x, y), &(u, v))) in from.iter().zip(to.iter()).enumerate() {
            let (x, y, u, v) = (x as f64, y as f64, u as f64, v as f64);
            a[2 * i] = [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y, u];
            a[2 * i + 1] = [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y, v];
        }
        let coeffs = solve_8x8(a)?;
        let mut h = [1.0; 9];
        h[..8].copy_from_slice(&coeffs);
        Some(Self { h })
    }

    pub fn apply(&self, x: f32, y: f32) -> Option<Point> {
        let (x, y) = (x as f64, y as f64);
        let h = &self.h;
        let w = h[6] * x + h[7] * y + h[8];
        if w.abs() < SINGULAR_EPS {
            return None;
        }
        let u = (h[0] * x + h[1] * y + h[2]) / w;
        let v = (h[3] * x + h[4] * y + h[5]) / w;
        Some((u as f32, v as f32))
    }
}

/// Gauss-Jordan elimination with partial pivoting on an augmented 8x9 matrix.
fn solve_8x8(mut a: [[f64; 9]; 8]) -> Option<[f64; 8]> {
    for col in 0..8 {
        let pivot = (col..8).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < SINGULAR_EPS {
            return None;
        }
        a.swap(col, pivot);
        let p = a[col][col];
        for k in col..9 {
            a[col][k] /= p;
        }
        for row in 0..8 {
            if row == col {
                continue;
            }
            let factor = a[row][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..9 {
                a[row][k] -= factor * a[col][k];
            }
        }
    }
    let mut out = [0.0; 8];
    for (i, row) in a.iter().enumerate() {
        out[i] = row[8];
    }
    Some(out)
}

/// Corners of a `size`-square canvas (TL, TR, BR, BL).
pub fn square_corners(size: f32) -> [Point; 4] {
    [(0.0, 0.0), (size, 0.0), (size, size), (0.0, size)]
}

/// Canvas corners each moved independently by up to `max_shift` per axis.
pub fn perturbed_corners(rng: &mut RenderRng, size: f32, max_shift: f32) -> [Point; 4] {
    square_corners(size).map(|(x, y)| (x + symmetric(rng, max_shift), y + symmetric(rng, max_shift)))
}

/// Warps `src` so its corners land on `corners` (TL, TR, BR, BL). The output
/// has the same dimensions as the input; uncovered pixels are transparent.
pub fn warp_perspective(src: &Pixmap, corners: &[Point; 4]) -> Option<Pixmap> {
    let (w, h) = (src.width(), src.height());
    let source = [(0.0, 0.0), (w as f32, 0.0), (w as f32, h as f32), (0.0, h as f32)];
    let inverse = Homography::from_correspondences(corners, &source)?;
    let mut out = Pixmap::new(w, h)?;
    let data = src.data();
    let dst = out.data_mut();
    for y in 0..h {
        for x in 0..w {
            let Some((sx, sy)) = inverse.apply(x as f32 + 0.5, y as f32 + 0.5) else {
                continue;
            };
            let px = sample_bilinear(data, w, h, sx - 0.5, sy - 0.5);
            let offset = ((y * w + x) * 4) as usize;
            dst[offset..offset + 4].copy_from_slice(&px);
        }
    }
    Some(out)
}

fn sample_bilinear(data: &[u8], w: u32, h: u32, fx: f32, fy: f32) -> [u8; 4] {
    if !fx.is_finite() || !fy.is_finite() {
        return [0; 4];
    }
    let x0 = fx.floor();
    let y0 = fy.floor();
    let tx = fx - x0;
    let ty = fy - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);
    let mut acc = [0.0f32; 4];
    let taps = [
        (x0, y0, (1.0 - tx) * (1.0 - ty)),
        (x0 + 1, y0, tx * (1.0 - ty)),
        (x0, y0 + 1, (1.0 - tx) * ty),
        (x0 + 1, y0 + 1, tx * ty),
    ];
    for (x, y, weight) in taps {
        if weight <= 0.0 || x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
            continue;
        }
        let offset = ((y as usize) * w as usize + x as usize) * 4;
        for c in 0..4 {
            acc[c] += data[offset + c] as f32 * weight;
        }
    }
    // Premultiplied input stays premultiplied under a convex blend; the
    // min keeps rounding from pushing a color past its alpha.
    let a = acc[3].round().clamp(0.0, 255.0) as u8;
    let mut out = [0, 0, 0, a];
    for c in 0..3 {
        out[c] = (acc[c].round().clamp(0.0, 255.0) as u8).min(a);
    }
    out
}
