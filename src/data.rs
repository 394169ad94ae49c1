use crate::config::{Zone, ZoneSource};
use crate::error::ScrawlError;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Identifier used by placeholder rows so repeated previews stay stable.
pub const PLACEHOLDER_ID: &str = "preview";

const BACKGROUND_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// One table row: ordered `column -> value` cells, all strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataRow {
    cells: Vec<(String, String)>,
}

impl DataRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut row = DataRow::new();
        for (key, value) in pairs {
            row.insert(key, value);
        }
        row
    }

    /// Builds a row from a JSON object; `null` becomes the empty string and
    /// scalars are stringified.
    pub fn from_json_object(object: &serde_json::Map<String, serde_json::Value>) -> Self {
        DataRow::from_pairs(object.iter().map(|(key, value)| {
            let text = match value {
                serde_json::Value::Null => String::new(),
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), text)
        }))
    }

    /// Inserts or replaces a cell, keeping first-insertion column order.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(cell) = self.cells.iter_mut().find(|(k, _)| *k == key) {
            cell.1 = value;
        } else {
            self.cells.push((key, value));
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(key, _)| key == column)
            .map(|(_, value)| value.as_str())
    }

    /// Value of the first column named `id` (any case), if it is non-empty.
    pub fn id(&self) -> Option<&str> {
        self.cells
            .iter()
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("id"))
            .map(|(_, value)| value.trim())
            .filter(|value| !value.is_empty())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Row used when previewing without data: every column-sourced zone shows
    /// its own column name.
    pub fn placeholder(zones: &[Zone]) -> Self {
        let mut row = DataRow::new();
        row.insert("id", PLACEHOLDER_ID);
        for zone in zones {
            if let ZoneSource::Column(key) = &zone.source {
                if !key.is_empty() {
                    row.insert(key.clone(), key.clone());
                }
            }
        }
        row
    }
}

/// Ordered, duplicate-free list of background images.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackgroundSet {
    paths: Vec<PathBuf>,
}

impl BackgroundSet {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for path in paths {
            let path = path.into();
            if seen.insert(path.clone()) {
                out.push(path);
            }
        }
        Self { paths: out }
    }

    pub fn single(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![path.into()],
        }
    }

    /// Collects every raster image directly inside `dir`, sorted by path.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, ScrawlError> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_background_path(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        let set = BackgroundSet::new(paths);
        if set.is_empty() {
            return Err(ScrawlError::EmptyBackgroundSet);
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn first(&self) -> Option<&Path> {
        self.paths.first().map(PathBuf::as_path)
    }

    /// Background for the `index`-th document, rotating through the set.
    pub fn for_index(&self, index: usize) -> Option<&Path> {
        if self.paths.is_empty() {
            return None;
        }
        self.paths.get(index % self.paths.len()).map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }
}

fn is_background_path(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|v| v.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    BACKGROUND_EXTENSIONS.contains(&ext.as_str())
}
