//! Per-glyph rendering.
//!
//! Each character is painted on its own oversampled square canvas, pushed
//! through warp, shear, rotation, downsampling and blur, and then stamped
//! onto the shared text layer. Every random draw comes from the caller's
//! generator, one glyph at a time, in a fixed order.

use crate::config::Physics;
use crate::font::{FontCatalog, ScaledFont};
use crate::types::{RenderRng, Rgb, randint, symmetric, uniform};
use crate::warp::{perturbed_corners, warp_perspective};
use image::{RgbaImage, imageops};
use rand::seq::IndexedRandom;
use std::sync::Arc;
use tiny_skia::{
    Color, FillRule, FilterQuality, IntSize, Paint, Pixmap, PixmapPaint, Transform,
};

/// Internal supersampling applied on top of the glyph canvas scale.
pub const OVERSAMPLE: u32 = 3;
const CANVAS_SCALE: f32 = 2.5;
const CANVAS_MARGIN: f32 = 1.2;
const OVERLAP: f32 = 0.08;
const COLOR_JITTER: i32 = 15;
const ALPHA_JITTER: i32 = 15;
const MIN_SHEAR: f32 = 0.01;
const SHEAR_JITTER: f32 = 0.02;
const DISTORTION_SPAN: f32 = 0.15;

/// Physics values for one document, already sampled from their ranges.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GlyphPhysics {
    pub shakiness: f32,
    pub opacity: f32,
    pub slant: f32,
    pub blur: f32,
    pub kerning: f32,
    pub height_var: f32,
    pub width_var: f32,
    pub distortion: f32,
}

impl GlyphPhysics {
    pub fn sample(physics: &Physics, rng: &mut RenderRng) -> Self {
        Self {
            shakiness: physics.shakiness.sample(rng),
            opacity: physics.opacity.sample(rng),
            slant: physics.slant.sample(rng),
            blur: physics.blur.sample(rng),
            kerning: physics.kerning.sample(rng),
            height_var: physics.height_var.sample(rng),
            width_var: physics.width_var.sample(rng),
            distortion: physics.distortion.sample(rng),
        }
    }
}

/// Maps the 0-10 opacity slider plus a jitter to a glyph alpha.
pub fn opacity_alpha(opacity: f32, jitter: i32) -> u8 {
    (30.0 + opacity * 22.5 + jitter as f32).clamp(10.0, 255.0) as u8
}

fn variance_scale(rng: &mut RenderRng, percent: f32) -> f32 {
    let spread = percent / 100.0;
    if spread <= 0.0 {
        return 1.0;
    }
    1.0 + symmetric(rng, spread)
}

/// How one line is painted: font pool, size, physics and base color.
#[derive(Debug, Clone, Copy)]
pub struct LineStyle<'a> {
    pub pool: &'a [String],
    pub size: u32,
    pub physics: &'a GlyphPhysics,
    pub color: Rgb,
}

/// Paints `text` with its pen starting at `(x, y)`, `y` being the top of
/// the line box. Returns the number of glyphs stamped.
pub fn draw_line(
    layer: &mut Pixmap,
    fonts: &mut FontCatalog,
    text: &str,
    x: f32,
    y: f32,
    style: &LineStyle<'_>,
    rng: &mut RenderRng,
) -> usize {
    let Some(primary) = style.pool.first() else {
        return 0;
    };
    let physics = style.physics;
    let mut cursor = x;
    let mut stamped = 0;
    for ch in text.chars() {
        if ch == ' ' {
            let space = fonts
                .get_font(primary, style.size)
                .map(|font| font.char_width(' '))
                .unwrap_or(style.size as f32 * 0.3);
            cursor += space + uniform(rng, 0.0, physics.kerning / 2.0);
            continue;
        }

        let name = if style.pool.len() > 1 {
            style.pool.choose(rng).unwrap_or(primary)
        } else {
            primary
        };
        let Some((font, name)) = fonts
            .get_font(name, style.size)
            .map(|font| (font, name.as_str()))
            .or_else(|| fonts.get_font(primary, style.size).map(|f| (f, primary.as_str())))
        else {
            continue;
        };
        let big = fonts
            .get_font(name, style.size * OVERSAMPLE)
            .unwrap_or_else(|| font.clone());

        let alpha = opacity_alpha(physics.opacity, randint(rng, -ALPHA_JITTER, ALPHA_JITTER));
        let color = style.color.jittered(rng, COLOR_JITTER);
        if let Some((glyph, target)) = render_glyph(&big, ch, style.size, physics, color, alpha, rng) {
            let jitter = symmetric(rng, physics.shakiness * 0.6);
            let offset = (target / 4) as f32;
            let px = (cursor - offset).floor() as i32;
            let py = (y + jitter - offset).floor() as i32;
            layer.draw_pixmap(
                px,
                py,
                glyph.as_ref(),
                &PixmapPaint::default(),
                Transform::identity(),
                None,
            );
            stamped += 1;
        }

        let width = font.char_width(ch);
        cursor += width * (1.0 - OVERLAP) + uniform(rng, -physics.kerning / 2.0, physics.kerning);
    }
    stamped
}

/// Rasterizes one glyph through the distortion chain. Returns the finished
/// glyph image and its side length.
fn render_glyph(
    font: &Arc<ScaledFont>,
    ch: char,
    size: u32,
    physics: &GlyphPhysics,
    color: Rgb,
    alpha: u8,
    rng: &mut RenderRng,
) -> Option<(Pixmap, u32)> {
    let height_scale = variance_scale(rng, physics.height_var);
    let width_scale = variance_scale(rng, physics.width_var);
    let stretch = height_scale.max(width_scale).max(1.0);
    let target = (size as f32 * CANVAS_SCALE * stretch * CANVAS_MARGIN).ceil().max(1.0) as u32;
    let canvas_size = target * OVERSAMPLE;

    let mut canvas = Pixmap::new(canvas_size, canvas_size)?;
    let origin = (canvas_size / 4) as f32;
    let path = font.glyph_path(
        ch,
        origin,
        origin + font.ascent() * height_scale,
        width_scale,
        height_scale,
    );
    if let Some(path) = path {
        let mut paint = Paint::default();
        paint.set_color(Color::from_rgba8(color.r, color.g, color.b, alpha));
        paint.anti_alias = true;
        canvas.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }

    if physics.distortion > 0.0 {
        let max_shift = physics.distortion / 100.0 * DISTORTION_SPAN * canvas_size as f32;
        let corners = perturbed_corners(rng, canvas_size as f32, max_shift);
        if let Some(warped) = warp_perspective(&canvas, &corners) {
            canvas = warped;
        }
    }

    let shear = physics.slant * 0.1 + symmetric(rng, SHEAR_JITTER);
    let angle = symmetric(rng, physics.shakiness * 1.2);
    let shear = if shear.abs() > MIN_SHEAR { shear } else { 0.0 };
    if shear != 0.0 || angle != 0.0 {
        let center = canvas_size as f32 / 2.0;
        let transform =
            Transform::from_rotate_at(-angle, center, center).pre_concat(Transform::from_skew(shear, 0.0));
        let mut turned = Pixmap::new(canvas_size, canvas_size)?;
        let paint = PixmapPaint {
            quality: FilterQuality::Bicubic,
            ..PixmapPaint::default()
        };
        turned.draw_pixmap(0, 0, canvas.as_ref(), &paint, transform, None);
        canvas = turned;
    }

    let big = RgbaImage::from_raw(canvas_size, canvas_size, canvas.take())?;
    let mut small = imageops::resize(&big, target, target, imageops::FilterType::Lanczos3);
    if physics.blur > 0.0 {
        let sigma = physics.blur / 3.0 + uniform(rng, 0.0, 0.1);
        small = imageops::blur(&small, sigma);
    }
    for px in small.pixels_mut() {
        let a = px.0[3];
        for c in 0..3 {
            px.0[c] = px.0[c].min(a);
        }
    }
    let glyph = Pixmap::from_vec(small.into_raw(), IntSize::from_wh(target, target)?)?;
    Some((glyph, target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::fixtures;
    use crate::seed::rng_for_seed;
    use crate::types::ParamValue;
    use std::fs;

    fn plain() -> GlyphPhysics {
        GlyphPhysics {
            opacity: 8.0,
            ..GlyphPhysics::default()
        }
    }

    fn inked(layer: &Pixmap) -> Vec<(u32, u32)> {
        let w = layer.width();
        layer
            .data()
            .chunks_exact(4)
            .enumerate()
            .filter(|(_, px)| px[3] > 0)
            .map(|(i, _)| (i as u32 % w, i as u32 / w))
            .collect()
    }

    #[test]
    fn opacity_slider_maps_into_alpha_range() {
        assert_eq!(opacity_alpha(0.0, -15), 15);
        assert_eq!(opacity_alpha(0.0, -30), 10);
        assert_eq!(opacity_alpha(8.0, 0), 210);
        assert_eq!(opacity_alpha(10.0, 15), 255);
    }

    #[test]
    fn scalar_physics_sample_without_noise() {
        let physics = Physics {
            shakiness: ParamValue::Scalar(2.0),
            blur: ParamValue::Range { min: 1.0, max: 3.0 },
            ..Physics::default()
        };
        let mut rng = rng_for_seed(4);
        let sampled = GlyphPhysics::sample(&physics, &mut rng);
        assert_eq!(sampled.shakiness, 2.0);
        assert_eq!(sampled.opacity, 8.0);
        assert!((1.0..=3.0).contains(&sampled.blur));
    }

    #[test]
    fn zero_variance_is_a_no_op() {
        let mut rng = rng_for_seed(1);
        assert_eq!(variance_scale(&mut rng, 0.0), 1.0);
        for _ in 0..100 {
            let s = variance_scale(&mut rng, 20.0);
            assert!((0.8..=1.2).contains(&s));
        }
    }

    #[test]
    fn empty_pool_draws_nothing() {
        let mut layer = Pixmap::new(50, 50).unwrap();
        let mut fonts = FontCatalog::new("/definitely/not/a/fonts/dir");
        let physics = plain();
        let style = LineStyle {
            pool: &[],
            size: 20,
            physics: &physics,
            color: Rgb::BLACK,
        };
        let mut rng = rng_for_seed(1);
        assert_eq!(draw_line(&mut layer, &mut fonts, "hi", 0.0, 0.0, &style, &mut rng), 0);
        assert!(inked(&layer).is_empty());
    }

    #[test]
    fn line_is_painted_near_its_pen_position() {
        let Some(dir) = fixtures::font_dir("glyph_line", &["hand.ttf"]) else {
            return;
        };
        let mut fonts = FontCatalog::new(&dir);
        let mut layer = Pixmap::new(300, 120).unwrap();
        let physics = plain();
        let pool = vec!["hand.ttf".to_string()];
        let style = LineStyle {
            pool: &pool,
            size: 24,
            physics: &physics,
            color: Rgb::INK_BLUE,
        };
        let mut rng = rng_for_seed(7);
        let stamped = draw_line(&mut layer, &mut fonts, "Hi there", 20.0, 40.0, &style, &mut rng);
        assert_eq!(stamped, 7);
        let ink = inked(&layer);
        assert!(!ink.is_empty());
        assert!(ink.iter().all(|&(x, y)| x >= 10 && (30..=90).contains(&y)));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn same_seed_paints_identical_pixels() {
        let Some(dir) = fixtures::font_dir("glyph_seed", &["a.ttf", "b.ttf"]) else {
            return;
        };
        let physics = GlyphPhysics {
            shakiness: 3.0,
            opacity: 6.0,
            slant: 2.0,
            blur: 1.0,
            kerning: 2.0,
            height_var: 10.0,
            width_var: 10.0,
            distortion: 30.0,
        };
        let pool = vec!["a.ttf".to_string(), "b.ttf".to_string()];
        let style = LineStyle {
            pool: &pool,
            size: 18,
            physics: &physics,
            color: Rgb::INK_BLUE,
        };
        let paint = |seed: u32| {
            let mut fonts = FontCatalog::new(&dir);
            let mut layer = Pixmap::new(220, 80).unwrap();
            let mut rng = rng_for_seed(seed);
            draw_line(&mut layer, &mut fonts, "Wobbly", 10.0, 20.0, &style, &mut rng);
            layer
        };
        assert_eq!(paint(5).data(), paint(5).data());
        assert_ne!(paint(5).data(), paint(6).data());
        let _ = fs::remove_dir_all(&dir);
    }
}
