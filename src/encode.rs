//! Template merge and record encoder: JSON overrides + raster -> record.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::codec::{data_set_from_json, element_from_json};
use crate::error::{ConvertError, ValidationError};
use crate::model::{DataSet, DicomObject, RasterBuffer, Tag};
use crate::pixel::{apply_geometry, derive_geometry};

/// A previously decoded `{"meta": ..., "data": ...}` artifact. Read-only
/// base for any number of merges; merging never mutates it.
#[derive(Debug, Clone)]
pub struct TemplateArtifact {
    pub meta: Map<String, Value>,
    pub data: Map<String, Value>,
}

/// One entry of the override document consumed by the encoder.
#[derive(Debug, Clone, Deserialize)]
pub struct EncodeRequest {
    pub template: PathBuf,
    pub data: Map<String, Value>,
    #[serde(default)]
    pub image: Option<PathBuf>,
    #[serde(default)]
    pub output: Option<PathBuf>,
}

/// Extract one request from its JSON form, reporting absent mandatory
/// keys as named conditions rather than serde messages.
pub fn parse_request(value: &Value, source: &Path) -> Result<EncodeRequest, ConvertError> {
    let object = value
        .as_object()
        .ok_or_else(|| ConvertError::MissingMandatoryField {
            field: "template",
            path: source.to_path_buf(),
        })?;
    for field in ["template", "data"] {
        if !object.contains_key(field) {
            return Err(ConvertError::MissingMandatoryField {
                field,
                path: source.to_path_buf(),
            });
        }
    }
    serde_json::from_value(value.clone()).map_err(|source_err| ConvertError::Json {
        path: source.to_path_buf(),
        source: source_err,
    })
}

/// Load a template artifact. An absent or non-file path is the named
/// `MissingTemplate` condition; a readable file without the mandatory
/// `meta`/`data` keys is `MissingMandatoryField`.
pub fn load_template(path: &Path) -> Result<TemplateArtifact, ConvertError> {
    if !path.exists() || !path.is_file() {
        return Err(ConvertError::MissingTemplate {
            path: path.to_path_buf(),
        });
    }
    let text = fs::read_to_string(path).map_err(|source| ConvertError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&text).map_err(|source| ConvertError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let extract = |field: &'static str| -> Result<Map<String, Value>, ConvertError> {
        value
            .get(field)
            .and_then(Value::as_object)
            .cloned()
            .ok_or(ConvertError::MissingMandatoryField {
                field,
                path: path.to_path_buf(),
            })
    };
    Ok(TemplateArtifact {
        meta: extract("meta")?,
        data: extract("data")?,
    })
}

/// Shallow, tag-keyed override: every key present in `overrides` replaces
/// the template entry wholesale; absent keys are left untouched.
pub fn merge_overrides(
    template_data: &Map<String, Value>,
    overrides: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = template_data.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Decode a merged data map field by field. Each invalid field is dropped
/// with one diagnostic; failures are independent and never abort the
/// record.
pub fn decode_merged_fields(merged: &Map<String, Value>) -> (DataSet, Vec<ValidationError>) {
    let mut data = DataSet::new();
    let mut rejected = Vec::new();

    for (key, value) in merged {
        let outcome = match key.parse::<Tag>() {
            Ok(tag) => element_from_json(tag, value),
            Err(()) => Err(ValidationError::new(
                Tag::new(0, 0),
                format!("'{}' is not a tag", key),
            )),
        };
        match outcome {
            Ok(element) => {
                data.insert(element);
            }
            Err(error) => {
                warn!("Dropping invalid field {}: {} (value: {})", key, error.reason, value);
                rejected.push(error);
            }
        }
    }

    (data, rejected)
}

/// Assemble a record from a template, optional overrides and an optional
/// raster. Returns the record plus the per-field rejections that were
/// recovered from.
pub fn build_record(
    template: &TemplateArtifact,
    overrides: &Map<String, Value>,
    raster: Option<&RasterBuffer>,
) -> Result<(DicomObject, Vec<ValidationError>), ConvertError> {
    let merged = merge_overrides(&template.data, overrides);
    let (mut data, rejected) = decode_merged_fields(&merged);

    // The meta map is not overridable and was produced by our own
    // decoder; any invalid field here means a corrupt template.
    let meta = data_set_from_json(&Value::Object(template.meta.clone())).map_err(|error| {
        ConvertError::InvalidTemplate {
            tag: error.tag,
            reason: error.reason,
        }
    })?;

    if let Some(raster) = raster {
        let geometry = derive_geometry(raster)?;
        apply_geometry(&mut data, &geometry, raster.pixels.clone());
    }

    Ok((DicomObject::new(meta, data), rejected))
}
