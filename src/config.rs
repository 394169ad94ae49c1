use crate::error::ScrawlError;
use crate::types::{ParamValue, Rgb, ZoneRect};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Weight assumed for fonts that have no entry in the weight map.
pub const DEFAULT_FONT_WEIGHT: u32 = 5;
pub const DEFAULT_SEED_KEY: &str = "default";

/// Top-level render request: document-wide settings plus the zones to fill.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderConfig {
    pub globals: GlobalConfig,
    #[serde(default)]
    pub zones: Vec<Zone>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<TemplateImage>,
}

impl RenderConfig {
    pub fn from_json(raw: &str) -> Result<Self, ScrawlError> {
        let config: RenderConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ScrawlError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ScrawlError> {
        for (idx, zone) in self.zones.iter().enumerate() {
            if !(zone.rect.width > 0.0 && zone.rect.height > 0.0) {
                return Err(ScrawlError::InvalidConfiguration(format!(
                    "zone {idx} has non-positive size {}x{}",
                    zone.rect.width, zone.rect.height
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FontMode {
    PerCharacter,
    #[default]
    PerDocument,
    Fixed(String),
}

impl From<String> for FontMode {
    fn from(raw: String) -> Self {
        match raw.trim() {
            "random" => FontMode::PerCharacter,
            "random_per_doc" | "" => FontMode::PerDocument,
            _ => FontMode::Fixed(raw),
        }
    }
}

impl From<FontMode> for String {
    fn from(mode: FontMode) -> Self {
        match mode {
            FontMode::PerCharacter => "random".to_string(),
            FontMode::PerDocument => "random_per_doc".to_string(),
            FontMode::Fixed(name) => name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(rename = "seed", default = "default_seed_key")]
    pub seed_key: String,
    #[serde(rename = "font", default)]
    pub font_mode: FontMode,
    #[serde(rename = "fonts_config", default)]
    pub font_weights: BTreeMap<String, u32>,
    #[serde(default = "default_size")]
    pub size: ParamValue,
    #[serde(default)]
    pub color: Rgb,
    #[serde(rename = "color_var", default)]
    pub color_variance: ParamValue,
    #[serde(flatten)]
    pub physics: Physics,
}

impl GlobalConfig {
    /// Weight map lookup; `None` means the font has no explicit entry.
    pub fn explicit_weight(&self, font: &str) -> Option<u32> {
        self.font_weights.get(font).copied()
    }

    pub fn weight_or_default(&self, font: &str) -> u32 {
        self.explicit_weight(font).unwrap_or(DEFAULT_FONT_WEIGHT)
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            seed_key: default_seed_key(),
            font_mode: FontMode::default(),
            font_weights: BTreeMap::new(),
            size: default_size(),
            color: Rgb::default(),
            color_variance: ParamValue::ZERO,
            physics: Physics::default(),
        }
    }
}

fn default_seed_key() -> String {
    DEFAULT_SEED_KEY.to_string()
}

fn default_size() -> ParamValue {
    ParamValue::Scalar(20.0)
}

fn default_opacity() -> ParamValue {
    ParamValue::Scalar(8.0)
}

/// Per-glyph randomness sliders, each sampled once per document.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Physics {
    #[serde(default)]
    pub shakiness: ParamValue,
    #[serde(default = "default_opacity")]
    pub opacity: ParamValue,
    #[serde(default)]
    pub slant: ParamValue,
    #[serde(default)]
    pub blur: ParamValue,
    #[serde(default)]
    pub kerning: ParamValue,
    #[serde(default)]
    pub height_var: ParamValue,
    #[serde(default)]
    pub width_var: ParamValue,
    #[serde(default)]
    pub distortion: ParamValue,
}

impl Default for Physics {
    fn default() -> Self {
        Self {
            shakiness: ParamValue::ZERO,
            opacity: default_opacity(),
            slant: ParamValue::ZERO,
            blur: ParamValue::ZERO,
            kerning: ParamValue::ZERO,
            height_var: ParamValue::ZERO,
            width_var: ParamValue::ZERO,
            distortion: ParamValue::ZERO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneSource {
    Column(String),
    Literal(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ZoneWire", into = "ZoneWire")]
pub struct Zone {
    pub rect: ZoneRect,
    pub font: Option<String>,
    pub size: Option<ParamValue>,
    pub source: ZoneSource,
}

impl Zone {
    pub fn from_column(rect: ZoneRect, column: impl Into<String>) -> Self {
        Self {
            rect,
            font: None,
            size: None,
            source: ZoneSource::Column(column.into()),
        }
    }

    pub fn literal(rect: ZoneRect, text: impl Into<String>) -> Self {
        Self {
            rect,
            font: None,
            size: None,
            source: ZoneSource::Literal(text.into()),
        }
    }

    pub fn with_font(mut self, font: impl Into<String>) -> Self {
        self.font = Some(font.into());
        self
    }

    pub fn with_size(mut self, size: f32) -> Self {
        self.size = Some(ParamValue::Scalar(size));
        self
    }

    /// Column key for column-sourced zones.
    pub fn column(&self) -> Option<&str> {
        match &self.source {
            ZoneSource::Column(key) => Some(key.as_str()),
            ZoneSource::Literal(_) => None,
        }
    }
}

/// On-the-wire zone shape as posted by the editor, including the legacy
/// `column` key and the `w`/`h` spellings used by saved projects.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ZoneWire {
    x: f32,
    y: f32,
    #[serde(alias = "w")]
    width: f32,
    #[serde(alias = "h")]
    height: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    font: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    size: Option<ParamValue>,
    #[serde(rename = "sourceType", default, skip_serializing_if = "Option::is_none")]
    source_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    column: Option<String>,
}

impl TryFrom<ZoneWire> for Zone {
    type Error = String;

    fn try_from(wire: ZoneWire) -> Result<Self, Self::Error> {
        if !(wire.width > 0.0 && wire.height > 0.0) {
            return Err(format!(
                "zone at ({}, {}) has non-positive size {}x{}",
                wire.x, wire.y, wire.width, wire.height
            ));
        }
        let source = match wire.source_type.as_deref().map(str::trim) {
            Some("text") => ZoneSource::Literal(wire.content.unwrap_or_default()),
            Some("excel") | Some("column") | None => {
                ZoneSource::Column(wire.content.or(wire.column).unwrap_or_default())
            }
            Some(other) => return Err(format!("unknown zone sourceType '{other}'")),
        };
        let font = wire.font.filter(|name| !name.trim().is_empty());
        Ok(Zone {
            rect: ZoneRect::new(wire.x, wire.y, wire.width, wire.height),
            font,
            size: wire.size,
            source,
        })
    }
}

impl From<Zone> for ZoneWire {
    fn from(zone: Zone) -> Self {
        let (source_type, content) = match zone.source {
            ZoneSource::Column(key) => ("excel", key),
            ZoneSource::Literal(text) => ("text", text),
        };
        ZoneWire {
            x: zone.rect.x,
            y: zone.rect.y,
            width: zone.rect.width,
            height: zone.rect.height,
            font: zone.font,
            size: zone.size,
            source_type: Some(source_type.to_string()),
            content: Some(content),
            column: None,
        }
    }
}

/// Background reference stored in templates: a bare path in older files,
/// an object with `path`/`data` in newer ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateImage {
    Path(String),
    Embedded {
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        data: Option<String>,
    },
}

impl TemplateImage {
    pub fn path(&self) -> Option<&str> {
        match self {
            TemplateImage::Path(path) => Some(path.as_str()),
            TemplateImage::Embedded { path, .. } => path.as_deref(),
        }
        .filter(|path| !path.is_empty())
    }
}
