use crate::types::{RenderRng, ZoneRect, symmetric};
use std::sync::Arc;

/// Smallest font size the fit loop will try.
pub const MIN_FONT_SIZE: u32 = 12;
/// Step between successive candidate sizes.
pub const SIZE_STEP: u32 = 2;

const LINE_SPACING_JITTER: f32 = 0.02;

/// Horizontal metrics needed to wrap and stack lines.
pub trait TextMeasure {
    fn text_width(&self, text: &str) -> f32;
    fn line_height(&self) -> f32;
}

impl<T: TextMeasure + ?Sized> TextMeasure for Arc<T> {
    fn text_width(&self, text: &str) -> f32 {
        (**self).text_width(text)
    }

    fn line_height(&self) -> f32 {
        (**self).line_height()
    }
}

impl<T: TextMeasure + ?Sized> TextMeasure for &T {
    fn text_width(&self, text: &str) -> f32 {
        (**self).text_width(text)
    }

    fn line_height(&self) -> f32 {
        (**self).line_height()
    }
}

/// Greedy word wrap. Explicit newlines start new paragraphs; a blank
/// paragraph yields an empty line. A line always holds at least one word.
pub fn wrap_text<M: TextMeasure + ?Sized>(text: &str, measure: &M, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut words = paragraph.split_whitespace();
        let Some(first) = words.next() else {
            lines.push(String::new());
            continue;
        };
        let mut current = first.to_string();
        for word in words {
            let candidate = format!("{current} {word}");
            if measure.text_width(&candidate) <= max_width {
                current = candidate;
            } else {
                lines.push(std::mem::replace(&mut current, word.to_string()));
            }
        }
        lines.push(current);
    }
    lines
}

/// Per-zone multiplier applied to the font line height.
pub fn line_spacing_factor(rng: &mut RenderRng) -> f32 {
    1.0 + symmetric(rng, LINE_SPACING_JITTER)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    /// Top of the line box in layer coordinates.
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ZoneLayout {
    pub size: u32,
    pub x: f32,
    pub line_height: f32,
    pub lines: Vec<PlacedLine>,
}

impl ZoneLayout {
    pub fn text_height(&self) -> f32 {
        self.line_height * self.lines.len() as f32
    }
}

/// Candidate sizes never exceed this many times the zone height; a line is
/// always taller than half its em.
const SIZE_CEILING_PER_HEIGHT: f32 = 2.0;

/// Largest size worth trying for `rect`, whatever the configured maximum.
pub fn size_ceiling(rect: &ZoneRect) -> u32 {
    (rect.height.max(0.0) * SIZE_CEILING_PER_HEIGHT).ceil() as u32
}

/// Finds the largest size that fits the zone height and places the lines
/// vertically centered in the zone.
///
/// Candidates run `max_size, max_size - 2, ..` down to [`MIN_FONT_SIZE`];
/// when a candidate fits, the size one above it is tried as well, so the
/// result never depends on the parity of `max_size`. `max_size` is first
/// clamped to [`size_ceiling`].
///
/// `measure_at` returns the measuring font at a given size; `None` ends
/// the search. Returns `None` when no size fits.
pub fn fit_zone<M, F>(
    text: &str,
    rect: &ZoneRect,
    max_size: u32,
    spacing_factor: f32,
    mut measure_at: F,
) -> Option<ZoneLayout>
where
    M: TextMeasure,
    F: FnMut(u32) -> Option<M>,
{
    let max_size = max_size.min(size_ceiling(rect));
    let mut size = max_size;
    let mut found = None;
    while size >= MIN_FONT_SIZE {
        let measure = measure_at(size)?;
        if let Some(fit) = fit_at(text, rect, &measure, spacing_factor) {
            found = Some((size, fit));
            break;
        }
        size = size.saturating_sub(SIZE_STEP);
    }
    let (mut size, (mut lines, mut line_height)) = found?;
    if size < max_size {
        let larger = measure_at(size + 1)
            .and_then(|measure| fit_at(text, rect, &measure, spacing_factor));
        if let Some(fit) = larger {
            size += 1;
            (lines, line_height) = fit;
        }
    }

    let total = line_height * lines.len() as f32;
    let top = rect.y + (rect.height - total) / 2.0;
    let lines = lines
        .into_iter()
        .enumerate()
        .map(|(i, text)| PlacedLine {
            text,
            y: top + line_height * i as f32,
        })
        .collect();
    Some(ZoneLayout {
        size,
        x: rect.x,
        line_height,
        lines,
    })
}

/// Wrapped lines and spaced line height when `text` fits `rect` with `measure`.
fn fit_at<M: TextMeasure>(
    text: &str,
    rect: &ZoneRect,
    measure: &M,
    spacing_factor: f32,
) -> Option<(Vec<String>, f32)> {
    let lines = wrap_text(text, measure, rect.width);
    let line_height = measure.line_height() * spacing_factor;
    (line_height * lines.len() as f32 <= rect.height).then_some((lines, line_height))
}
