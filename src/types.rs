use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Generator threaded through a single document render.
///
/// ChaCha8 streams are identical across platforms and crate releases.
pub type RenderRng = ChaCha8Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };
    pub const INK_BLUE: Rgb = Rgb {
        r: 0x14,
        g: 0x14,
        b: 0xA0,
    };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parses `#RRGGBB`, `RRGGBB` or the short `#RGB` form.
    pub fn from_hex(raw: &str) -> Option<Self> {
        let hex = raw.trim().trim_start_matches('#');
        let expanded: String = match hex.len() {
            3 => hex.chars().flat_map(|c| [c, c]).collect(),
            6 => hex.to_string(),
            _ => return None,
        };
        let channel = |idx: usize| u8::from_str_radix(expanded.get(idx..idx + 2)?, 16).ok();
        Some(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Adds independent integer noise in `[-variance, variance]` to each channel.
    pub fn jittered<R: Rng>(self, rng: &mut R, variance: i32) -> Self {
        let variance = variance.abs();
        let mut shift = |value: u8| -> u8 {
            let delta = randint(&mut *rng, -variance, variance);
            (value as i32 + delta).clamp(0, 255) as u8
        };
        let r = shift(self.r);
        let g = shift(self.g);
        let b = shift(self.b);
        Self { r, g, b }
    }
}

impl Default for Rgb {
    fn default() -> Self {
        Rgb::INK_BLUE
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Rgb {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Rgb::from_hex(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid hex color '{raw}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl ZoneRect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn contains(&self, px: f32, py: f32) -> bool {
        px >= self.x && py >= self.y && px < self.x + self.width && py < self.y + self.height
    }
}

/// A numeric setting that is either fixed or drawn per document from `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Range { min: f32, max: f32 },
    Scalar(f32),
}

impl ParamValue {
    pub const ZERO: ParamValue = ParamValue::Scalar(0.0);

    /// Scalars are returned as-is and do not advance the generator.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f32 {
        match *self {
            ParamValue::Scalar(value) => value,
            ParamValue::Range { min, max } => uniform(rng, min, max),
        }
    }

    pub fn upper_bound(&self) -> f32 {
        match *self {
            ParamValue::Scalar(value) => value,
            ParamValue::Range { min, max } => min.max(max),
        }
    }
}

impl Default for ParamValue {
    fn default() -> Self {
        ParamValue::ZERO
    }
}

impl From<f32> for ParamValue {
    fn from(value: f32) -> Self {
        ParamValue::Scalar(value)
    }
}

/// Uniform draw from `[lo, hi)`; bounds may arrive in either order.
pub(crate) fn uniform<R: Rng>(rng: &mut R, lo: f32, hi: f32) -> f32 {
    let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
    if !lo.is_finite() || !hi.is_finite() {
        return 0.0;
    }
    if hi - lo <= f32::EPSILON {
        return lo;
    }
    rng.random_range(lo..hi)
}

pub(crate) fn symmetric<R: Rng>(rng: &mut R, span: f32) -> f32 {
    uniform(rng, -span.abs(), span.abs())
}

/// Inclusive integer draw.
pub(crate) fn randint<R: Rng>(rng: &mut R, lo: i32, hi: i32) -> i32 {
    let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
    rng.random_range(lo..=hi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn hex_colors_parse_long_and_short_forms() {
        assert_eq!(Rgb::from_hex("#1414A0"), Some(Rgb::new(0x14, 0x14, 0xA0)));
        assert_eq!(Rgb::from_hex("ff0000"), Some(Rgb::new(255, 0, 0)));
        assert_eq!(Rgb::from_hex("#0f0"), Some(Rgb::new(0, 255, 0)));
        assert_eq!(Rgb::from_hex("#12345"), None);
        assert_eq!(Rgb::from_hex("#zzzzzz"), None);
        assert_eq!(Rgb::new(1, 2, 255).to_hex(), "#0102FF");
    }

    #[test]
    fn jitter_stays_within_variance_and_clamps() {
        let mut rng = RenderRng::seed_from_u64(7);
        for _ in 0..200 {
            let c = Rgb::new(250, 5, 128).jittered(&mut rng, 15);
            assert!(c.r >= 235);
            assert!(c.g <= 20);
            assert!((113..=143).contains(&c.b));
        }
        let untouched = Rgb::new(9, 9, 9).jittered(&mut rng, 0);
        assert_eq!(untouched, Rgb::new(9, 9, 9));
    }

    #[test]
    fn param_values_deserialize_from_scalar_or_range() {
        let scalar: ParamValue = serde_json::from_str("3.5").unwrap();
        assert_eq!(scalar, ParamValue::Scalar(3.5));
        let range: ParamValue = serde_json::from_str(r#"{"min": 1, "max": 4}"#).unwrap();
        assert_eq!(range, ParamValue::Range { min: 1.0, max: 4.0 });
    }

    #[test]
    fn range_samples_stay_inside_bounds() {
        let mut rng = RenderRng::seed_from_u64(11);
        let range = ParamValue::Range { min: 4.0, max: 2.0 };
        for _ in 0..500 {
            let v = range.sample(&mut rng);
            assert!((2.0..4.0).contains(&v), "sample {v} escaped range");
        }
        assert_eq!(ParamValue::Scalar(6.0).sample(&mut rng), 6.0);
        assert_eq!(uniform(&mut rng, 3.0, 3.0), 3.0);
    }

    #[test]
    fn zone_rect_contains_is_half_open() {
        let rect = ZoneRect::new(10.0, 10.0, 300.0, 100.0);
        assert!(rect.contains(10.0, 10.0));
        assert!(rect.contains(309.9, 109.9));
        assert!(!rect.contains(310.0, 50.0));
        assert!(!rect.contains(5.0, 50.0));
    }
}
