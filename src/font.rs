use crate::error::ScrawlError;
use crate::layout::TextMeasure;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tiny_skia::{PathBuilder, Transform};
use ttf_parser::{GlyphId, OutlineBuilder};

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct FontKey {
    name: String,
    pixel_size: u32,
}

/// Font files found in one directory, plus a process-lifetime cache of
/// size-specific handles.
#[derive(Debug)]
pub struct FontCatalog {
    dir: PathBuf,
    programs: HashMap<String, Option<Arc<FontProgram>>>,
    cache: HashMap<FontKey, Arc<ScaledFont>>,
}

impl FontCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            programs: HashMap::new(),
            cache: HashMap::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Sorted `.ttf`/`.otf` file names; empty when the directory is absent.
    pub fn list_fonts(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_supported_font_path(path))
            .filter_map(|path| {
                path.file_name()
                    .and_then(|v| v.to_str())
                    .map(str::to_string)
            })
            .collect();
        names.sort();
        names
    }

    /// The listed fonts whose files parse, in listing order. Each file is
    /// read once; failures are logged and remembered until [`clear`].
    ///
    /// [`clear`]: FontCatalog::clear
    pub fn loadable_fonts(&mut self) -> Vec<String> {
        self.list_fonts()
            .into_iter()
            .filter(|name| self.load_program(name).is_some())
            .collect()
    }

    /// Returns the cached handle for `(name, pixel_size)`, loading it on first
    /// use. `None` signals a missing or unreadable font; callers substitute.
    pub fn get_font(&mut self, name: &str, pixel_size: u32) -> Option<Arc<ScaledFont>> {
        let pixel_size = pixel_size.max(1);
        let key = FontKey {
            name: name.to_string(),
            pixel_size,
        };
        if let Some(font) = self.cache.get(&key) {
            return Some(font.clone());
        }
        let program = self.load_program(name)?;
        let font = Arc::new(ScaledFont {
            name: name.to_string(),
            program,
            pixel_size,
        });
        self.cache.insert(key, font.clone());
        Some(font)
    }

    /// Drops every cached handle and font program.
    pub fn clear(&mut self) {
        self.cache.clear();
        self.programs.clear();
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    fn load_program(&mut self, name: &str) -> Option<Arc<FontProgram>> {
        if let Some(entry) = self.programs.get(name) {
            return entry.clone();
        }
        let loaded = match read_font_file(&self.dir, name) {
            Ok(program) => Some(Arc::new(program)),
            Err(err) => {
                log::warn!("{err}");
                None
            }
        };
        self.programs.insert(name.to_string(), loaded.clone());
        loaded
    }
}

fn read_font_file(dir: &Path, name: &str) -> Result<FontProgram, ScrawlError> {
    if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
        return Err(ScrawlError::Asset(format!(
            "font name '{name}' is not a plain file name"
        )));
    }
    let path = dir.join(name);
    let data = fs::read(&path).map_err(|err| {
        ScrawlError::Asset(format!("font {} unavailable: {err}", path.display()))
    })?;
    FontProgram::parse(data).map_err(|err| {
        ScrawlError::Asset(format!("font {} could not be parsed: {err}", path.display()))
    })
}

pub(crate) fn is_supported_font_path(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|v| v.to_str()) else {
        return false;
    };
    matches!(ext.to_ascii_lowercase().as_str(), "ttf" | "otf")
}

#[derive(Debug, Clone, Copy)]
struct GlyphEntry {
    id: GlyphId,
    advance: u16,
}

/// One font file, parsed once: vertical metrics, the advance of every mapped
/// character, and outlines in font units filled in as glyphs are drawn.
pub struct FontProgram {
    data: Vec<u8>,
    units_per_em: f32,
    ascender: f32,
    descender: f32,
    glyphs: HashMap<char, GlyphEntry>,
    missing_advance: u16,
    outlines: Mutex<HashMap<char, Option<tiny_skia::Path>>>,
}

impl std::fmt::Debug for FontProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontProgram")
            .field("bytes", &self.data.len())
            .field("units_per_em", &self.units_per_em)
            .field("glyphs", &self.glyphs.len())
            .finish_non_exhaustive()
    }
}

impl FontProgram {
    fn parse(data: Vec<u8>) -> Result<Self, ttf_parser::FaceParsingError> {
        let face = ttf_parser::Face::parse(&data, 0)?;
        let units_per_em = face.units_per_em().max(1) as f32;
        let ascender = face.ascender() as f32;
        let descender = (face.descender() as f32).abs();
        let missing_advance = face.glyph_hor_advance(GlyphId(0)).unwrap_or(0);
        let mut glyphs = HashMap::new();
        if let Some(cmap) = face.tables().cmap {
            for subtable in cmap.subtables {
                if !subtable.is_unicode() {
                    continue;
                }
                subtable.codepoints(|code| {
                    let (Some(ch), Some(id)) = (char::from_u32(code), subtable.glyph_index(code))
                    else {
                        return;
                    };
                    glyphs.entry(ch).or_insert_with(|| GlyphEntry {
                        id,
                        advance: face.glyph_hor_advance(id).unwrap_or(0),
                    });
                });
            }
        }
        Ok(Self {
            data,
            units_per_em,
            ascender,
            descender,
            glyphs,
            missing_advance,
            outlines: Mutex::new(HashMap::new()),
        })
    }

    /// Horizontal advance in font units; unmapped characters use `.notdef`.
    fn advance(&self, ch: char) -> f32 {
        self.glyphs
            .get(&ch)
            .map_or(self.missing_advance, |glyph| glyph.advance) as f32
    }

    /// Outline of `ch` in font units, y up. `None` for unmapped or blank glyphs.
    fn outline(&self, ch: char) -> Option<tiny_skia::Path> {
        let glyph = *self.glyphs.get(&ch)?;
        let mut outlines = self.outlines.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = outlines.get(&ch) {
            return cached.clone();
        }
        let path = ttf_parser::Face::parse(&self.data, 0)
            .ok()
            .and_then(|face| {
                let mut builder = GlyphPathBuilder::new();
                face.outline_glyph(glyph.id, &mut builder)?;
                builder.finish()
            });
        outlines.insert(ch, path.clone());
        path
    }
}

/// A font program bound to one pixel size.
#[derive(Debug)]
pub struct ScaledFont {
    name: String,
    program: Arc<FontProgram>,
    pixel_size: u32,
}

impl ScaledFont {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pixel_size(&self) -> u32 {
        self.pixel_size
    }

    fn scale(&self) -> f32 {
        self.pixel_size as f32 / self.program.units_per_em
    }

    pub fn ascent(&self) -> f32 {
        self.program.ascender * self.scale()
    }

    pub fn descent(&self) -> f32 {
        self.program.descender * self.scale()
    }

    pub fn char_width(&self, ch: char) -> f32 {
        self.program.advance(ch) * self.scale()
    }

    /// Outline of `ch` with its pen origin at `(origin_x, origin_y)` in a
    /// y-down raster, stretched independently on each axis.
    pub fn glyph_path(
        &self,
        ch: char,
        origin_x: f32,
        origin_y: f32,
        scale_x: f32,
        scale_y: f32,
    ) -> Option<tiny_skia::Path> {
        let scale = self.scale();
        let ts = Transform::from_row(
            scale * scale_x,
            0.0,
            0.0,
            -scale * scale_y,
            origin_x,
            origin_y,
        );
        self.program.outline(ch)?.transform(ts)
    }
}

impl TextMeasure for ScaledFont {
    fn text_width(&self, text: &str) -> f32 {
        let units: f32 = text.chars().map(|ch| self.program.advance(ch)).sum();
        units * self.scale()
    }

    fn line_height(&self) -> f32 {
        self.ascent() + self.descent()
    }
}

struct GlyphPathBuilder {
    builder: PathBuilder,
}

impl GlyphPathBuilder {
    fn new() -> Self {
        Self {
            builder: PathBuilder::new(),
        }
    }

    fn finish(self) -> Option<tiny_skia::Path> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}
