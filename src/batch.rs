//! File-level drivers. Records are independent, so batch runs fan out
//! over a rayon worker pool; per-record failures are collected, never
//! propagated to sibling records.

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde_json::Value;
use tracing::info;

use crate::binary;
use crate::decode::decode_record;
use crate::encode::{build_record, load_template, parse_request};
use crate::error::ConvertError;
use crate::manifest::{ConversionEntry, Manifest};
use crate::pixel::{read_raster, write_raster};

pub const JSON_SUFFIX: &str = ".json";
pub const PNG_SUFFIX: &str = ".png";
pub const DCM_SUFFIX: &str = ".dcm";

fn vet_input(path: &Path) -> Result<(), ConvertError> {
    if !path.exists() {
        return Err(ConvertError::NotFound {
            path: path.to_path_buf(),
        });
    }
    if !path.is_file() {
        return Err(ConvertError::NotAFile {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, ConvertError> {
    fs::read(path).map_err(|source| ConvertError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone)]
pub struct DecodeOptions {
    pub output_dir: PathBuf,
    /// Artifact stem override; only sensible for single-record runs.
    pub output_filename: Option<String>,
    pub remove_fields: Vec<String>,
}

/// Decode one record file into `<stem>.json` + `<stem>.png` under the
/// output directory. The returned entry points a later encode pass at
/// the artifacts.
pub fn decode_file(
    input: &Path,
    options: &DecodeOptions,
) -> Result<ConversionEntry, ConvertError> {
    vet_input(input)?;
    let bytes = read_bytes(input)?;
    let object = binary::parse(&bytes)?;

    let identifier = object.sop_instance_uid().map(str::to_string);
    let decoded = decode_record(object, &options.remove_fields)?;

    let stem = match &options.output_filename {
        Some(name) => name.trim_end_matches(JSON_SUFFIX).to_string(),
        None => identifier.ok_or(ConvertError::MissingIdentifier)?,
    };

    fs::create_dir_all(&options.output_dir).map_err(|source| ConvertError::Io {
        path: options.output_dir.clone(),
        source,
    })?;

    let template = options.output_dir.join(format!("{stem}{JSON_SUFFIX}"));
    let image = options.output_dir.join(format!("{stem}{PNG_SUFFIX}"));
    let output = options.output_dir.join(format!("{stem}{DCM_SUFFIX}"));

    let text =
        serde_json::to_string_pretty(&decoded.json).map_err(|source| ConvertError::Json {
            path: template.clone(),
            source,
        })?;
    fs::write(&template, text).map_err(|source| ConvertError::Io {
        path: template.clone(),
        source,
    })?;
    write_raster(&image, &decoded.raster)?;

    info!("Output file has been written at: '{}'", template.display());
    Ok(ConversionEntry {
        template,
        image,
        output,
    })
}

#[derive(Debug)]
pub struct DecodeBatchOutcome {
    pub manifest: Manifest,
    pub failures: Vec<(PathBuf, ConvertError)>,
}

/// Fan a decode run out over the worker pool. Results come back in input
/// order; a failing record is reported and excluded without poisoning
/// the rest.
pub fn decode_batch(inputs: &[PathBuf], options: &DecodeOptions) -> DecodeBatchOutcome {
    let results: Vec<(PathBuf, Result<ConversionEntry, ConvertError>)> = inputs
        .par_iter()
        .map(|input| (input.clone(), decode_file(input, options)))
        .collect();

    let mut manifest = Manifest::new();
    let mut failures = Vec::new();
    for (input, result) in results {
        match result {
            Ok(entry) => manifest.push(entry),
            Err(error) => failures.push((input, error)),
        }
    }
    DecodeBatchOutcome { manifest, failures }
}

#[derive(Debug, Clone)]
pub struct EncodeOptions {
    pub output_dir: PathBuf,
    /// Output filename override; only sensible for single-object inputs.
    pub output_filename: Option<String>,
}

/// Process one override object: load the template, merge, validate,
/// re-arm pixel geometry from the optional image, emit the record.
fn encode_request(
    request_json: &Value,
    source: &Path,
    options: &EncodeOptions,
    filename_override: Option<&str>,
) -> Result<PathBuf, ConvertError> {
    let request = parse_request(request_json, source)?;
    let template = load_template(&request.template)?;

    let raster = match &request.image {
        Some(path) => Some(read_raster(path)?),
        None => None,
    };

    let (object, _rejected) = build_record(&template, &request.data, raster.as_ref())?;
    let bytes = binary::serialize(&object, true, true)?;

    let output = match (&request.output, filename_override) {
        (Some(explicit), _) => options.output_dir.join(explicit),
        (None, Some(name)) => options.output_dir.join(name),
        (None, None) => {
            let identifier = object
                .sop_instance_uid()
                .ok_or(ConvertError::MissingIdentifier)?;
            options.output_dir.join(format!("{identifier}{DCM_SUFFIX}"))
        }
    };

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).map_err(|source| ConvertError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(&output, bytes).map_err(|source| ConvertError::Io {
        path: output.clone(),
        source,
    })?;
    info!("Output file has been written at: '{}'", output.display());
    Ok(output)
}

#[derive(Debug)]
pub struct EncodeBatchOutcome {
    pub outputs: Vec<PathBuf>,
    pub failures: Vec<(usize, ConvertError)>,
}

/// Encode from an override document that is either a single object or an
/// array of objects. An unreadable input file is fatal for the whole
/// run; a single object's failure only excludes that object.
pub fn encode_file(
    input: &Path,
    options: &EncodeOptions,
) -> Result<EncodeBatchOutcome, ConvertError> {
    vet_input(input)?;
    let text = fs::read_to_string(input).map_err(|source| ConvertError::Io {
        path: input.to_path_buf(),
        source,
    })?;
    let document: Value = serde_json::from_str(&text).map_err(|source| ConvertError::Json {
        path: input.to_path_buf(),
        source,
    })?;

    let requests: Vec<Value> = match document {
        Value::Array(items) => items,
        single => vec![single],
    };
    // A caller-supplied filename only makes sense for a single record.
    let filename_override = if requests.len() == 1 {
        options.output_filename.as_deref()
    } else {
        None
    };

    let results: Vec<(usize, Result<PathBuf, ConvertError>)> = requests
        .par_iter()
        .enumerate()
        .map(|(index, request_json)| {
            (
                index,
                encode_request(request_json, input, options, filename_override),
            )
        })
        .collect();

    let mut outputs = Vec::new();
    let mut failures = Vec::new();
    for (index, result) in results {
        match result {
            Ok(path) => outputs.push(path),
            Err(error) => failures.push((index, error)),
        }
    }
    Ok(EncodeBatchOutcome { outputs, failures })
}
