mod batch;
mod compose;
mod config;
mod data;
mod debug;
mod error;
mod font;
mod glyph;
mod layout;
mod seed;
mod select;
mod types;
mod warp;

pub use batch::{
    BatchController, BatchHandle, BatchSummary, DEFAULT_JPEG_QUALITY, ProgressSink, RowOutcome,
    StopHandle,
};
pub use compose::{PREVIEW_JPEG_QUALITY, RenderedDocument, Renderer, SkipReason, ZoneOutcome};
pub use config::{
    DEFAULT_FONT_WEIGHT, DEFAULT_SEED_KEY, FontMode, GlobalConfig, Physics, RenderConfig,
    TemplateImage, Zone, ZoneSource,
};
pub use data::{BackgroundSet, DataRow, PLACEHOLDER_ID};
pub use debug::DebugLogger;
pub use error::ScrawlError;
pub use font::{FontCatalog, FontProgram, ScaledFont};
pub use glyph::{GlyphPhysics, LineStyle, OVERSAMPLE, draw_line, opacity_alpha};
pub use layout::{
    MIN_FONT_SIZE, PlacedLine, SIZE_STEP, TextMeasure, ZoneLayout, fit_zone, line_spacing_factor,
    size_ceiling, wrap_text,
};
pub use seed::{hash_seed_source, rng_for_seed, seed_for_row, seed_source};
pub use select::{active_pool, pick_weighted};
pub use types::{ParamValue, RenderRng, Rgb, ZoneRect};
pub use warp::{Homography, Point, perturbed_corners, square_corners, warp_perspective};

use std::path::PathBuf;

/// Environment variable that overrides the default fonts directory.
pub const FONT_DIR_ENV: &str = "SCRAWL_FONT_DIR";
pub const DEFAULT_FONT_DIR: &str = "fonts";
pub const DEFAULT_OUTPUT_DIR: &str = "output";

/// Engine settings; `build` yields the controller that owns the renderer.
#[derive(Debug, Clone)]
pub struct ScrawlBuilder {
    font_dir: Option<PathBuf>,
    output_dir: PathBuf,
    jpeg_quality: u8,
    debug_path: Option<PathBuf>,
}

impl ScrawlBuilder {
    pub fn new() -> Self {
        Self {
            font_dir: None,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            debug_path: None,
        }
    }

    // Directory scanned for .ttf/.otf files. Falls back to $SCRAWL_FONT_DIR, then "fonts".
    pub fn font_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.font_dir = Some(dir.into());
        self
    }

    // Batch output directory; created when a batch starts.
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    // Enable the JSONL run journal (one line per row plus a summary).
    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<BatchController, ScrawlError> {
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ScrawlError::InvalidConfiguration(format!(
                "jpeg_quality must be within 1..=100, got {}",
                self.jpeg_quality
            )));
        }
        let font_dir = resolve_font_dir(self.font_dir, std::env::var(FONT_DIR_ENV).ok());
        log::debug!("fonts from {}", font_dir.display());
        let controller = BatchController::new(Renderer::new(font_dir), self.output_dir)
            .with_jpeg_quality(self.jpeg_quality);
        match self.debug_path {
            Some(path) => Ok(controller.with_journal(DebugLogger::new(path)?)),
            None => Ok(controller),
        }
    }
}

impl Default for ScrawlBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve_font_dir(explicit: Option<PathBuf>, from_env: Option<String>) -> PathBuf {
    explicit
        .or_else(|| {
            from_env
                .filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(|| PathBuf::from(DEFAULT_FONT_DIR))
}
