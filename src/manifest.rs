//! Manifest of a batch decode run: one `{template, image, output}` path
//! triple per successfully decoded record, in input order, so a later
//! encode pass can reconstruct the records in bulk.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConvertError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionEntry {
    pub template: PathBuf,
    pub image: PathBuf,
    pub output: PathBuf,
}

/// Append-only, single-writer. No dedup, no ordering beyond input order.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: Vec<ConversionEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Manifest::default()
    }

    pub fn push(&mut self, entry: ConversionEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ConversionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(&self.entries).unwrap_or(Value::Array(Vec::new()))
    }

    pub fn write(&self, path: &Path) -> Result<(), ConvertError> {
        let text = serde_json::to_string_pretty(&self.entries).map_err(|source| {
            ConvertError::Json {
                path: path.to_path_buf(),
                source,
            }
        })?;
        fs::write(path, text).map_err(|source| ConvertError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl FromIterator<ConversionEntry> for Manifest {
    fn from_iter<I: IntoIterator<Item = ConversionEntry>>(iter: I) -> Self {
        Manifest {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(stem: &str) -> ConversionEntry {
        ConversionEntry {
            template: PathBuf::from(format!("{stem}.json")),
            image: PathBuf::from(format!("{stem}.png")),
            output: PathBuf::from(format!("{stem}.dcm")),
        }
    }

    #[test]
    fn keeps_input_order_without_dedup() {
        let mut manifest = Manifest::new();
        manifest.push(entry("b"));
        manifest.push(entry("a"));
        manifest.push(entry("b"));
        assert_eq!(manifest.len(), 3);
        let json = manifest.to_json();
        assert_eq!(json[0]["template"], "b.json");
        assert_eq!(json[1]["template"], "a.json");
        assert_eq!(json[2]["template"], "b.json");
    }

    #[test]
    fn entry_shape_matches_contract() {
        let json = serde_json::to_value(entry("x")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "template": "x.json",
                "image": "x.png",
                "output": "x.dcm"
            })
        );
    }
}
