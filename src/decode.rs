//! Record decoder: binary record -> JSON artifact + grayscale raster.

use serde_json::{Map, Value};
use tracing::warn;

use crate::codec::data_set_to_json;
use crate::dict::TAG_DICTIONARY;
use crate::error::ConvertError;
use crate::model::{DicomObject, RasterBuffer, Tag};
use crate::pixel::extract_pixels;

/// One decoded record: the combined `{"data": ..., "meta": ...}` artifact
/// and the raster extracted from the pixel attributes.
#[derive(Debug, Clone)]
pub struct DecodedRecord {
    pub json: Value,
    pub raster: RasterBuffer,
}

/// Drop-list entries name fields by dictionary keyword ("PatientName") or
/// by tag spelling ("0010,0010" / "00100010").
fn resolve_field_name(name: &str) -> Option<Tag> {
    TAG_DICTIONARY
        .tag_by_keyword(name)
        .or_else(|| name.parse().ok())
}

/// Decode one record. Unrecognized or absent drop-list entries produce a
/// warning and are skipped; they never abort the record. A record whose
/// pixel attributes are missing or unsupported fails as a whole.
pub fn decode_record(
    mut object: DicomObject,
    drop_fields: &[String],
) -> Result<DecodedRecord, ConvertError> {
    for name in drop_fields {
        let removed = resolve_field_name(name).and_then(|tag| object.data.remove(tag));
        if removed.is_none() {
            warn!("Unrecognized DICOM field named '{}'", name);
        }
    }

    let raster = extract_pixels(&object.data)?;

    // PixelData stays in the JSON form; the raster is always written as a
    // companion artifact besides it.
    let mut combined = Map::new();
    combined.insert("data".to_string(), data_set_to_json(&object.data));
    combined.insert("meta".to_string(), data_set_to_json(&object.meta));

    Ok(DecodedRecord {
        json: Value::Object(combined),
        raster,
    })
}
