use crate::config::{FontMode, RenderConfig, Zone, ZoneSource};
use crate::data::DataRow;
use crate::error::ScrawlError;
use crate::font::FontCatalog;
use crate::glyph::{GlyphPhysics, LineStyle, draw_line};
use crate::layout::{fit_zone, line_spacing_factor};
use crate::seed::{rng_for_seed, seed_for_row};
use crate::select::{active_pool, pick_weighted};
use crate::types::{RenderRng, Rgb};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::codecs::jpeg::JpegEncoder;
use image::{RgbImage, RgbaImage};
use std::fs;
use std::path::{Path, PathBuf};
use tiny_skia::Pixmap;

/// JPEG quality used for preview transport.
pub const PREVIEW_JPEG_QUALITY: u8 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The zone resolved to blank text.
    EmptyText,
    /// No size down to the floor fits the zone.
    DoesNotFit,
    /// No usable font file exists.
    NoFont,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneOutcome {
    Drawn { size: u32, lines: usize },
    Skipped(SkipReason),
}

impl ZoneOutcome {
    pub fn is_drawn(&self) -> bool {
        matches!(self, ZoneOutcome::Drawn { .. })
    }
}

/// A composited page: background plus text layer, still carrying alpha.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    image: RgbaImage,
    seed: u32,
    zones: Vec<ZoneOutcome>,
}

impl RenderedDocument {
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    pub fn zones(&self) -> &[ZoneOutcome] {
        &self.zones
    }

    pub fn drawn_zones(&self) -> usize {
        self.zones.iter().filter(|z| z.is_drawn()).count()
    }

    pub fn skipped_zones(&self) -> usize {
        self.zones.len() - self.drawn_zones()
    }

    /// Drops the alpha channel.
    pub fn flatten(&self) -> RgbImage {
        let mut out = RgbImage::new(self.image.width(), self.image.height());
        for (dst, src) in out.pixels_mut().zip(self.image.pixels()) {
            dst.0 = [src.0[0], src.0[1], src.0[2]];
        }
        out
    }

    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, ScrawlError> {
        let flat = self.flatten();
        let mut out = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
        flat.write_with_encoder(encoder)?;
        Ok(out)
    }

    pub fn to_jpeg_data_uri(&self) -> Result<String, ScrawlError> {
        let bytes = self.encode_jpeg(PREVIEW_JPEG_QUALITY)?;
        Ok(format!("data:image/jpeg;base64,{}", BASE64.encode(bytes)))
    }

    pub fn save_jpeg(&self, path: &Path, quality: u8) -> Result<(), ScrawlError> {
        let bytes = self.encode_jpeg(quality)?;
        fs::write(path, bytes)?;
        Ok(())
    }
}

/// Document-wide values drawn once per render, in a fixed order.
#[derive(Debug, Clone)]
struct DocumentPlan {
    available: Vec<String>,
    active: Vec<String>,
    document_font: Option<String>,
    size: u32,
    physics: GlyphPhysics,
    color: Rgb,
}

/// Owns the font cache; one instance renders one document at a time.
#[derive(Debug)]
pub struct Renderer {
    fonts: FontCatalog,
}

impl Renderer {
    pub fn new(fonts_dir: impl Into<PathBuf>) -> Self {
        Self {
            fonts: FontCatalog::new(fonts_dir),
        }
    }

    pub fn fonts(&self) -> &FontCatalog {
        &self.fonts
    }

    pub fn clear_font_cache(&mut self) {
        self.fonts.clear();
    }

    /// Loads `background` and renders `row` onto it.
    pub fn render(
        &mut self,
        background: &Path,
        row: &DataRow,
        config: &RenderConfig,
        row_index: usize,
    ) -> Result<RenderedDocument, ScrawlError> {
        let image = image::open(background)
            .map_err(|err| ScrawlError::background(background, err))?
            .to_rgba8();
        Ok(self.render_image(image, row, config, row_index))
    }

    /// Renders `row` onto an already decoded background.
    pub fn render_image(
        &mut self,
        background: RgbaImage,
        row: &DataRow,
        config: &RenderConfig,
        row_index: usize,
    ) -> RenderedDocument {
        let seed = seed_for_row(row, row_index, &config.globals.seed_key);
        let mut rng = rng_for_seed(seed);
        let available = self.fonts.loadable_fonts();
        if available.is_empty() {
            log::warn!("no usable fonts in {}; zones left blank", self.fonts.dir().display());
            return RenderedDocument {
                image: background,
                seed,
                zones: vec![ZoneOutcome::Skipped(SkipReason::NoFont); config.zones.len()],
            };
        }

        let plan = plan_document(available, config, &mut rng);
        let Some(mut layer) = Pixmap::new(background.width(), background.height()) else {
            return RenderedDocument {
                image: background,
                seed,
                zones: Vec::new(),
            };
        };
        let zones = config
            .zones
            .iter()
            .map(|zone| self.draw_zone(&mut layer, zone, row, &plan, &mut rng))
            .collect();

        let mut image = background;
        composite_over(&mut image, &layer);
        RenderedDocument { image, seed, zones }
    }

    fn draw_zone(
        &mut self,
        layer: &mut Pixmap,
        zone: &Zone,
        row: &DataRow,
        plan: &DocumentPlan,
        rng: &mut RenderRng,
    ) -> ZoneOutcome {
        let pool = zone_pool(zone, plan);
        let Some(measure_font) = pool.first().cloned() else {
            return ZoneOutcome::Skipped(SkipReason::NoFont);
        };
        let size = match &zone.size {
            Some(param) => {
                let sampled = param.sample(rng);
                if sampled > 0.0 { sampled as u32 } else { plan.size }
            }
            None => plan.size,
        };
        let text = match &zone.source {
            ZoneSource::Column(key) => row.get(key).unwrap_or_default(),
            ZoneSource::Literal(text) => text.as_str(),
        };
        if text.trim().is_empty() {
            return ZoneOutcome::Skipped(SkipReason::EmptyText);
        }

        let spacing = line_spacing_factor(rng);
        let fonts = &mut self.fonts;
        let Some(layout) = fit_zone(text, &zone.rect, size, spacing, |px| {
            fonts.get_font(&measure_font, px)
        }) else {
            log::debug!("zone at ({}, {}) cannot fit {} chars", zone.rect.x, zone.rect.y, text.len());
            return ZoneOutcome::Skipped(SkipReason::DoesNotFit);
        };
        log::debug!(
            "zone at ({}, {}) fitted at {}px over {} lines",
            zone.rect.x,
            zone.rect.y,
            layout.size,
            layout.lines.len()
        );

        let style = LineStyle {
            pool: &pool,
            size: layout.size,
            physics: &plan.physics,
            color: plan.color,
        };
        for line in &layout.lines {
            draw_line(layer, fonts, &line.text, layout.x, line.y, &style, rng);
        }
        ZoneOutcome::Drawn {
            size: layout.size,
            lines: layout.lines.len(),
        }
    }
}

fn plan_document(available: Vec<String>, config: &RenderConfig, rng: &mut RenderRng) -> DocumentPlan {
    let globals = &config.globals;
    let active = active_pool(&available, &globals.font_weights);
    let document_font = match &globals.font_mode {
        FontMode::PerCharacter => None,
        FontMode::PerDocument => pick_weighted(&available, &globals.font_weights, rng),
        FontMode::Fixed(name) => {
            if available.contains(name) {
                Some(name.clone())
            } else {
                log::warn!("font '{name}' not available; substituting {}", available[0]);
                Some(available[0].clone())
            }
        }
    };
    let size = globals.size.sample(rng).max(0.0) as u32;
    let physics = GlyphPhysics::sample(&globals.physics, rng);
    let variance = globals.color_variance.sample(rng) as i32;
    let color = globals.color.jittered(rng, variance);
    DocumentPlan {
        available,
        active,
        document_font,
        size,
        physics,
        color,
    }
}

/// Fonts a zone draws from. Never empty while any font is available.
fn zone_pool(zone: &Zone, plan: &DocumentPlan) -> Vec<String> {
    if let Some(font) = zone.font.as_ref().filter(|f| plan.available.contains(f)) {
        return vec![font.clone()];
    }
    match &plan.document_font {
        Some(font) => vec![font.clone()],
        None => plan.active.clone(),
    }
}

/// Source-over of a premultiplied layer onto a straight-alpha image.
/// Pixels the layer leaves fully transparent are not touched.
fn composite_over(image: &mut RgbaImage, layer: &Pixmap) {
    for (dst, src) in image.pixels_mut().zip(layer.data().chunks_exact(4)) {
        let sa = src[3] as f32 / 255.0;
        if src[3] == 0 {
            continue;
        }
        let da = dst.0[3] as f32 / 255.0;
        let out_a = sa + da * (1.0 - sa);
        for c in 0..3 {
            let premul = src[c] as f32 / 255.0 + dst.0[c] as f32 / 255.0 * da * (1.0 - sa);
            dst.0[c] = (premul / out_a * 255.0).round().clamp(0.0, 255.0) as u8;
        }
        dst.0[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::fixtures;
    use crate::types::{ParamValue, ZoneRect};
    use image::Rgba;
    use std::collections::BTreeMap;

    fn paper(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([240, 236, 225, 255]))
    }

    fn plan(available: &[&str], mode: FontMode, weights: &[(&str, u32)]) -> DocumentPlan {
        let mut config = RenderConfig::default();
        config.globals.font_mode = mode;
        config.globals.font_weights = weights
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect::<BTreeMap<_, _>>();
        let available = available.iter().map(|s| s.to_string()).collect();
        plan_document(available, &config, &mut rng_for_seed(3))
    }

    #[test]
    fn fixed_mode_substitutes_missing_font() {
        let p = plan(&["a.ttf", "b.ttf"], FontMode::Fixed("b.ttf".into()), &[]);
        assert_eq!(p.document_font.as_deref(), Some("b.ttf"));
        let p = plan(&["a.ttf", "b.ttf"], FontMode::Fixed("zzz.ttf".into()), &[]);
        assert_eq!(p.document_font.as_deref(), Some("a.ttf"));
    }

    #[test]
    fn per_character_zones_use_the_active_pool() {
        let p = plan(
            &["a.ttf", "b.ttf", "c.ttf"],
            FontMode::PerCharacter,
            &[("a.ttf", 3), ("c.ttf", 1), ("b.ttf", 0)],
        );
        let zone = Zone::from_column(ZoneRect::new(0.0, 0.0, 10.0, 10.0), "name");
        assert_eq!(zone_pool(&zone, &p), vec!["a.ttf", "c.ttf"]);
        let pinned = zone.clone().with_font("b.ttf");
        assert_eq!(zone_pool(&pinned, &p), vec!["b.ttf"]);
        let ghost = zone.with_font("ghost.ttf");
        assert_eq!(zone_pool(&ghost, &p), vec!["a.ttf", "c.ttf"]);
    }

    #[test]
    fn per_document_mode_resolves_one_weighted_font() {
        let p = plan(&["a.ttf", "b.ttf"], FontMode::PerDocument, &[("a.ttf", 0)]);
        assert_eq!(p.document_font.as_deref(), Some("b.ttf"));
        let zone = Zone::literal(ZoneRect::new(0.0, 0.0, 10.0, 10.0), "x");
        assert_eq!(zone_pool(&zone, &p), vec!["b.ttf"]);
    }

    #[test]
    fn document_values_follow_configuration() {
        let mut config = RenderConfig::default();
        config.globals.size = ParamValue::Range { min: 30.0, max: 31.0 };
        config.globals.color = Rgb::new(100, 100, 100);
        config.globals.color_variance = ParamValue::Scalar(10.0);
        let p = plan_document(vec!["a.ttf".into()], &config, &mut rng_for_seed(9));
        assert_eq!(p.size, 30);
        for ch in [p.color.r, p.color.g, p.color.b] {
            assert!((90..=110).contains(&ch));
        }
        assert_eq!(p.physics.opacity, 8.0);
    }

    #[test]
    fn compositing_leaves_transparent_pixels_alone() {
        let mut image = paper(4, 1);
        let mut layer = Pixmap::new(4, 1).unwrap();
        layer.data_mut()[4..8].copy_from_slice(&[0, 0, 128, 128]);
        layer.data_mut()[8..12].copy_from_slice(&[10, 20, 30, 255]);
        composite_over(&mut image, &layer);
        assert_eq!(image.get_pixel(0, 0).0, [240, 236, 225, 255]);
        assert_eq!(image.get_pixel(3, 0).0, [240, 236, 225, 255]);
        assert_eq!(image.get_pixel(2, 0).0, [10, 20, 30, 255]);
        let half = image.get_pixel(1, 0).0;
        assert_eq!(half[3], 255);
        assert!(half[0] < 130 && half[2] > 200);
    }

    #[test]
    fn without_fonts_background_is_returned_unchanged() {
        let mut renderer = Renderer::new("/definitely/not/a/fonts/dir");
        let mut config = RenderConfig::default();
        config
            .zones
            .push(Zone::from_column(ZoneRect::new(10.0, 10.0, 100.0, 50.0), "name"));
        let row = DataRow::from_pairs([("id", "1"), ("name", "Alice")]);
        let doc = renderer.render_image(paper(120, 80), &row, &config, 0);
        assert_eq!(doc.image(), &paper(120, 80));
        assert_eq!(doc.zones(), &[ZoneOutcome::Skipped(SkipReason::NoFont)]);
    }

    #[test]
    fn blank_and_missing_text_skip_their_zone() {
        let Some(dir) = fixtures::font_dir("compose_skip", &["hand.ttf"]) else {
            return;
        };
        let mut renderer = Renderer::new(&dir);
        let rect = ZoneRect::new(10.0, 10.0, 200.0, 60.0);
        let mut config = RenderConfig::default();
        config.zones = vec![
            Zone::from_column(rect, "missing"),
            Zone::literal(rect, "   "),
            Zone::from_column(rect, "name"),
            Zone::literal(ZoneRect::new(0.0, 0.0, 30.0, 4.0), "cramped"),
        ];
        let row = DataRow::from_pairs([("name", "Alice")]);
        let doc = renderer.render_image(paper(240, 100), &row, &config, 0);
        assert_eq!(doc.zones()[0], ZoneOutcome::Skipped(SkipReason::EmptyText));
        assert_eq!(doc.zones()[1], ZoneOutcome::Skipped(SkipReason::EmptyText));
        assert!(matches!(doc.zones()[2], ZoneOutcome::Drawn { size: 20, lines: 1 }));
        assert_eq!(doc.zones()[3], ZoneOutcome::Skipped(SkipReason::DoesNotFit));
        assert_eq!(doc.drawn_zones(), 1);
        assert_eq!(doc.skipped_zones(), 3);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn zone_size_overrides_document_size() {
        let Some(dir) = fixtures::font_dir("compose_size", &["hand.ttf"]) else {
            return;
        };
        let mut renderer = Renderer::new(&dir);
        let rect = ZoneRect::new(0.0, 0.0, 400.0, 200.0);
        let mut config = RenderConfig::default();
        config.zones = vec![
            Zone::literal(rect, "Big").with_size(36.0),
            Zone::literal(rect, "Inherit").with_size(0.0),
        ];
        let doc = renderer.render_image(paper(400, 200), &DataRow::new(), &config, 0);
        assert_eq!(doc.zones()[0], ZoneOutcome::Drawn { size: 36, lines: 1 });
        assert_eq!(doc.zones()[1], ZoneOutcome::Drawn { size: 20, lines: 1 });
        let _ = fs::remove_dir_all(&dir);
    }

    /// A fonts dir where `a.ttf` is garbage and `b.ttf` is a real font.
    fn half_broken_fonts(tag: &str) -> Option<PathBuf> {
        let dir = fixtures::font_dir(tag, &["b.ttf"])?;
        fs::write(dir.join("a.ttf"), b"not a font at all").ok()?;
        Some(dir)
    }

    fn hello_config(mode: FontMode, weights: &[(&str, u32)]) -> RenderConfig {
        let mut config = RenderConfig::default();
        config.globals.font_mode = mode;
        config.globals.font_weights = weights.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        config
            .zones
            .push(Zone::literal(ZoneRect::new(10.0, 10.0, 200.0, 60.0), "Hello"));
        config
    }

    #[test]
    fn unparsable_fonts_fall_back_to_a_loadable_one() {
        let Some(dir) = half_broken_fonts("compose_broken") else {
            return;
        };
        let mut renderer = Renderer::new(&dir);
        let row = DataRow::from_pairs([("id", "7")]);
        let configs = [
            hello_config(FontMode::Fixed("a.ttf".into()), &[]),
            hello_config(FontMode::PerCharacter, &[("a.ttf", 9)]),
            hello_config(FontMode::PerCharacter, &[("a.ttf", 9), ("b.ttf", 1)]),
            hello_config(FontMode::PerDocument, &[("a.ttf", 100)]),
        ];
        for config in &configs {
            let doc = renderer.render_image(paper(240, 100), &row, config, 0);
            assert!(doc.zones()[0].is_drawn(), "{:?}: {:?}", config.globals.font_mode, doc.zones());
            assert_ne!(doc.image(), &paper(240, 100));
        }

        let mut pinned = hello_config(FontMode::Fixed("b.ttf".into()), &[]);
        pinned.zones[0] = pinned.zones[0].clone().with_font("a.ttf");
        let doc = renderer.render_image(paper(240, 100), &row, &pinned, 0);
        assert!(doc.zones()[0].is_drawn());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn per_document_pick_never_blanks_a_row() {
        let Some(dir) = half_broken_fonts("compose_broken_rows") else {
            return;
        };
        let mut renderer = Renderer::new(&dir);
        let config = hello_config(FontMode::PerDocument, &[]);
        for i in 0..40 {
            let row = DataRow::from_pairs([("id", format!("row-{i}"))]);
            let doc = renderer.render_image(paper(240, 100), &row, &config, i);
            assert_eq!(doc.drawn_zones(), 1, "row {i}: {:?}", doc.zones());
        }
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn only_broken_fonts_means_no_font() {
        let Some(dir) = half_broken_fonts("compose_all_broken") else {
            return;
        };
        fs::remove_file(dir.join("b.ttf")).unwrap();
        let mut renderer = Renderer::new(&dir);
        let config = hello_config(FontMode::PerCharacter, &[]);
        let doc = renderer.render_image(paper(240, 100), &DataRow::new(), &config, 0);
        assert_eq!(doc.zones(), &[ZoneOutcome::Skipped(SkipReason::NoFont)]);
        assert_eq!(doc.image(), &paper(240, 100));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn preview_encodes_as_data_uri() {
        let mut renderer = Renderer::new("/definitely/not/a/fonts/dir");
        let doc = renderer.render_image(paper(16, 16), &DataRow::new(), &RenderConfig::default(), 0);
        let uri = doc.to_jpeg_data_uri().unwrap();
        assert!(uri.starts_with("data:image/jpeg;base64,/9j/"));
        assert_eq!(doc.flatten().dimensions(), (16, 16));
    }

    #[test]
    fn unreadable_background_is_a_row_error() {
        let mut renderer = Renderer::new("/definitely/not/a/fonts/dir");
        let err = renderer
            .render(
                Path::new("/definitely/missing.png"),
                &DataRow::new(),
                &RenderConfig::default(),
                0,
            )
            .unwrap_err();
        assert!(matches!(err, ScrawlError::Background { .. }));
    }
}
