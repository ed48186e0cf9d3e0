//! Attribute <-> JSON codec.
//!
//! JSON shape follows the DICOM JSON model as pydicom emits it:
//! `{"vr": "XX", "Value": [...]}`, binary payloads as `InlineBinary`
//! base64, person names as `{"Alphabetic": ...}` objects, sequences as
//! arrays of nested tag maps. The `Value` key is omitted entirely for
//! empty attributes.
//! https://dicom.nema.org/medical/dicom/current/output/chtml/part18/sect_F.2.html

use base64::Engine;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Map, Value};

use crate::dict::TAG_DICTIONARY;
use crate::error::ValidationError;
use crate::model::{DataElement, DataSet, DicomValue, Tag, Vr};

lazy_static! {
    static ref DA_FORMAT: Regex =
        Regex::new(r"^\d{4}(0[1-9]|1[0-2])(0[1-9]|[12]\d|3[01])$").unwrap();
    static ref TM_FORMAT: Regex =
        Regex::new(r"^([01]\d|2[0-3])([0-5]\d([0-5]\d(\.\d{1,6})?)?)?$").unwrap();
    static ref DT_FORMAT: Regex =
        Regex::new(r"^\d{4}(\d{2}){0,5}(\.\d{1,6})?([+-]\d{4})?$").unwrap();
    static ref AS_FORMAT: Regex = Regex::new(r"^\d{3}[DWMY]$").unwrap();
    static ref UI_FORMAT: Regex = Regex::new(r"^[0-9]+(\.[0-9]+)*$").unwrap();
    static ref CS_FORMAT: Regex = Regex::new(r"^[A-Z0-9 _]{0,16}$").unwrap();
    static ref AT_FORMAT: Regex = Regex::new(r"^[0-9A-Fa-f]{8}$").unwrap();
}

fn base64_engine() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

/// Serialize one attribute into its JSON object form. Total for every
/// supported VR.
pub fn element_to_json(element: &DataElement) -> Value {
    let mut object = Map::new();
    object.insert("vr".to_string(), json!(element.vr.as_str()));

    if element.data.is_empty() {
        return Value::Object(object);
    }

    match &element.data {
        DicomValue::String(values) => {
            let rendered: Vec<Value> = values
                .iter()
                .map(|v| {
                    if element.vr == Vr::PN {
                        json!({ "Alphabetic": v })
                    } else {
                        json!(v)
                    }
                })
                .collect();
            object.insert("Value".to_string(), Value::Array(rendered));
        }
        DicomValue::Float(values) => {
            object.insert("Value".to_string(), json!(values));
        }
        DicomValue::Double(values) => {
            object.insert("Value".to_string(), json!(values));
        }
        DicomValue::I16(values) => {
            object.insert("Value".to_string(), json!(values));
        }
        DicomValue::I32(values) => {
            object.insert("Value".to_string(), json!(values));
        }
        DicomValue::U16(values) => {
            object.insert("Value".to_string(), json!(values));
        }
        DicomValue::U32(values) => {
            object.insert("Value".to_string(), json!(values));
        }
        DicomValue::Bytes(payload) => {
            object.insert(
                "InlineBinary".to_string(),
                json!(base64_engine().encode(payload)),
            );
        }
        DicomValue::Sequence(items) => {
            let rendered: Vec<Value> = items.iter().map(data_set_to_json).collect();
            object.insert("Value".to_string(), Value::Array(rendered));
        }
        DicomValue::Empty => {}
    }

    Value::Object(object)
}

/// Parse one attribute from its JSON object form, using the VR carried in
/// the JSON or, when absent, the dictionary VR for the tag.
pub fn element_from_json(tag: Tag, json: &Value) -> Result<DataElement, ValidationError> {
    let object = json
        .as_object()
        .ok_or_else(|| ValidationError::new(tag, "expected a JSON object"))?;

    let vr = match object.get("vr") {
        Some(Value::String(s)) => Vr::from_str_opt(s)
            .ok_or_else(|| ValidationError::new(tag, format!("unknown VR '{}'", s)))?,
        Some(other) => {
            return Err(ValidationError::new(
                tag,
                format!("'vr' must be a string, got {}", json_kind(other)),
            ))
        }
        None => TAG_DICTIONARY.vr_of(tag),
    };

    if vr.is_binary() {
        if object.get("InlineBinary").is_none() && object.get("Value").is_some() {
            return Err(ValidationError::new(
                tag,
                format!("{} expects an InlineBinary payload, not 'Value'", vr),
            ));
        }
        return match object.get("InlineBinary") {
            None => Ok(DataElement::new(tag, vr, DicomValue::Empty)),
            Some(Value::String(encoded)) => {
                let payload = base64_engine().decode(encoded.as_bytes()).map_err(|_| {
                    ValidationError::new(tag, "InlineBinary is not valid base64")
                })?;
                Ok(DataElement::new(tag, vr, DicomValue::Bytes(payload)))
            }
            Some(other) => Err(ValidationError::new(
                tag,
                format!("InlineBinary must be a string, got {}", json_kind(other)),
            )),
        };
    }

    let values = match object.get("Value") {
        None | Some(Value::Null) => return Ok(DataElement::new(tag, vr, DicomValue::Empty)),
        Some(Value::Array(values)) => values,
        Some(other) => {
            return Err(ValidationError::new(
                tag,
                format!("'Value' must be an array, got {}", json_kind(other)),
            ))
        }
    };
    if values.is_empty() {
        return Ok(DataElement::new(tag, vr, DicomValue::Empty));
    }

    let data = match vr {
        Vr::SQ => {
            let mut items = Vec::with_capacity(values.len());
            for item in values {
                items.push(data_set_from_json(item).map_err(|e| {
                    ValidationError::new(tag, format!("bad sequence item: {}", e.reason))
                })?);
            }
            DicomValue::Sequence(items)
        }
        Vr::FL => DicomValue::Float(parse_numbers(tag, vr, values, |n| {
            n.as_f64().map(|v| v as f32)
        })?),
        Vr::FD | Vr::DS => DicomValue::Double(parse_numbers(tag, vr, values, |n| n.as_f64())?),
        Vr::SS => DicomValue::I16(parse_numbers(tag, vr, values, |n| {
            n.as_i64().and_then(|v| i16::try_from(v).ok())
        })?),
        Vr::SL | Vr::IS => DicomValue::I32(parse_numbers(tag, vr, values, |n| {
            n.as_i64().and_then(|v| i32::try_from(v).ok())
        })?),
        Vr::US => DicomValue::U16(parse_numbers(tag, vr, values, |n| {
            n.as_u64().and_then(|v| u16::try_from(v).ok())
        })?),
        Vr::UL => DicomValue::U32(parse_numbers(tag, vr, values, |n| {
            n.as_u64().and_then(|v| u32::try_from(v).ok())
        })?),
        _ => {
            let mut parsed = Vec::with_capacity(values.len());
            for value in values {
                let s = string_component(tag, vr, value)?;
                check_string_format(tag, vr, &s)?;
                parsed.push(s);
            }
            DicomValue::String(parsed)
        }
    };

    Ok(DataElement::new(tag, vr, data))
}

/// Side-effect-free probe with validation logic identical to
/// [`element_from_json`]. Used by the merge step to decide keep-or-drop
/// before committing a field.
pub fn validate_field(tag: Tag, json: &Value) -> Result<(), ValidationError> {
    element_from_json(tag, json).map(|_| ())
}

/// Serialize a whole attribute map, keys in ascending tag order.
pub fn data_set_to_json(set: &DataSet) -> Value {
    let mut object = Map::new();
    for element in set.iter() {
        object.insert(element.tag.json_key(), element_to_json(element));
    }
    Value::Object(object)
}

/// Strict whole-map parse: the first invalid key or field fails the map.
/// Merge paths that want per-field recovery iterate the map themselves.
pub fn data_set_from_json(json: &Value) -> Result<DataSet, ValidationError> {
    let object = json.as_object().ok_or_else(|| {
        ValidationError::new(Tag::new(0, 0), "expected a JSON object of tag keys")
    })?;

    let mut set = DataSet::new();
    for (key, value) in object {
        let tag: Tag = key.parse().map_err(|_| {
            ValidationError::new(Tag::new(0, 0), format!("'{}' is not a tag", key))
        })?;
        set.insert(element_from_json(tag, value)?);
    }
    Ok(set)
}

fn parse_numbers<T>(
    tag: Tag,
    vr: Vr,
    values: &[Value],
    convert: impl Fn(&serde_json::Number) -> Option<T>,
) -> Result<Vec<T>, ValidationError> {
    let mut parsed = Vec::with_capacity(values.len());
    for value in values {
        let number = value.as_number().ok_or_else(|| {
            ValidationError::new(
                tag,
                format!("{} expects numeric values, got {}", vr, json_kind(value)),
            )
        })?;
        parsed.push(convert(number).ok_or_else(|| {
            ValidationError::new(tag, format!("{} is out of range for {}", number, vr))
        })?);
    }
    Ok(parsed)
}

fn string_component(tag: Tag, vr: Vr, value: &Value) -> Result<String, ValidationError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        // Person names arrive as component-group objects.
        Value::Object(groups) if vr == Vr::PN => match groups.get("Alphabetic") {
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(ValidationError::new(
                tag,
                "PN component must carry an 'Alphabetic' string",
            )),
        },
        other => Err(ValidationError::new(
            tag,
            format!("{} expects string values, got {}", vr, json_kind(other)),
        )),
    }
}

fn check_string_format(tag: Tag, vr: Vr, value: &str) -> Result<(), ValidationError> {
    let ok = match vr {
        Vr::DA => DA_FORMAT.is_match(value),
        Vr::TM => TM_FORMAT.is_match(value),
        Vr::DT => DT_FORMAT.is_match(value),
        Vr::AS => AS_FORMAT.is_match(value),
        Vr::UI => value.len() <= 64 && UI_FORMAT.is_match(value),
        Vr::CS => CS_FORMAT.is_match(value),
        Vr::AT => AT_FORMAT.is_match(value),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(ValidationError::new(
            tag,
            format!("'{}' is not a valid {} value", value, vr),
        ))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
