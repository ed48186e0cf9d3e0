//! End-to-end decode -> edit -> encode flows over real files.

use std::fs;
use std::path::PathBuf;

use serde_json::{json, Value};
use tempfile::TempDir;

use dicomjson::batch::{decode_batch, decode_file, encode_file, DecodeOptions, EncodeOptions};
use dicomjson::binary;
use dicomjson::error::ConvertError;
use dicomjson::model::{
    tags, BitDepth, DataElement, DataSet, DicomObject, DicomValue, RasterBuffer, Tag, Vr,
};
use dicomjson::pixel::{apply_geometry, derive_geometry};

fn string_element(tag: Tag, vr: Vr, value: &str) -> DataElement {
    DataElement::new(tag, vr, DicomValue::String(vec![value.to_string()]))
}

fn sample_record(uid: &str, depth: BitDepth) -> DicomObject {
    let (rows, columns) = (4u32, 6u32);
    let mut pixels = Vec::new();
    for index in 0..rows * columns {
        match depth {
            BitDepth::Bits8 => pixels.push(index as u8),
            BitDepth::Bits16 => pixels.extend(((index * 257) as u16).to_le_bytes()),
        }
    }
    let raster = RasterBuffer::new(rows, columns, depth, pixels).unwrap();
    let geometry = derive_geometry(&raster).unwrap();

    let mut meta = DataSet::new();
    meta.insert(string_element(
        tags::TRANSFER_SYNTAX_UID,
        Vr::UI,
        "1.2.840.10008.1.2.1",
    ));
    meta.insert(string_element(Tag::new(0x0002, 0x0003), Vr::UI, uid));

    let mut data = DataSet::new();
    data.insert(string_element(tags::SOP_INSTANCE_UID, Vr::UI, uid));
    data.insert(string_element(Tag::new(0x0010, 0x0010), Vr::PN, "Doe^Jane"));
    data.insert(string_element(Tag::new(0x0008, 0x0020), Vr::DA, "20240102"));
    data.insert(string_element(Tag::new(0x0008, 0x0060), Vr::CS, "CT"));
    data.insert(DataElement::new(
        Tag::new(0x0020, 0x0011),
        Vr::IS,
        DicomValue::I32(vec![3]),
    ));
    apply_geometry(&mut data, &geometry, raster.pixels.clone());
    DicomObject::new(meta, data)
}

fn write_record(dir: &TempDir, name: &str, record: &DicomObject) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, binary::serialize(record, true, true).unwrap()).unwrap();
    path
}

fn decode_options(dir: &TempDir) -> DecodeOptions {
    DecodeOptions {
        output_dir: dir.path().join("decoded"),
        output_filename: None,
        remove_fields: Vec::new(),
    }
}

fn round_trip(depth: BitDepth) {
    let dir = TempDir::new().unwrap();
    let record = sample_record("1.2.3.100", depth);
    let input = write_record(&dir, "input.dcm", &record);

    let entry = decode_file(&input, &decode_options(&dir)).unwrap();
    let artifact: Value =
        serde_json::from_str(&fs::read_to_string(&entry.template).unwrap()).unwrap();

    // The decoded artifact acts as both template and override source.
    let request = json!({
        "template": entry.template,
        "data": artifact["data"],
        "image": entry.image,
        "output": "rebuilt.dcm"
    });
    let request_path = dir.path().join("request.json");
    fs::write(&request_path, serde_json::to_string(&request).unwrap()).unwrap();

    let outcome = encode_file(
        &request_path,
        &EncodeOptions {
            output_dir: dir.path().join("encoded"),
            output_filename: None,
        },
    )
    .unwrap();
    assert!(outcome.failures.is_empty());
    assert_eq!(outcome.outputs.len(), 1);

    let rebuilt = binary::parse(&fs::read(&outcome.outputs[0]).unwrap()).unwrap();
    // Compare against the parsed original so both sides carry the
    // recomputed meta group length.
    let original = binary::parse(&fs::read(&input).unwrap()).unwrap();
    assert_eq!(rebuilt.data, original.data);
    assert_eq!(rebuilt.meta, original.meta);
}

#[test]
fn eight_bit_record_survives_the_full_round_trip() {
    round_trip(BitDepth::Bits8);
}

#[test]
fn sixteen_bit_record_survives_the_full_round_trip() {
    round_trip(BitDepth::Bits16);
}

#[test]
fn decoded_artifact_names_follow_the_record_identifier() {
    let dir = TempDir::new().unwrap();
    let input = write_record(&dir, "a.dcm", &sample_record("9.8.7", BitDepth::Bits8));
    let entry = decode_file(&input, &decode_options(&dir)).unwrap();
    assert!(entry.template.ends_with("9.8.7.json"));
    assert!(entry.image.ends_with("9.8.7.png"));
    assert!(entry.output.ends_with("9.8.7.dcm"));
    assert!(entry.template.is_file());
    assert!(entry.image.is_file());
}

#[test]
fn batch_decode_reports_bad_records_without_poisoning_the_rest() {
    let dir = TempDir::new().unwrap();
    let good_one = write_record(&dir, "one.dcm", &sample_record("1.1.1", BitDepth::Bits8));
    let missing = dir.path().join("missing.dcm");
    let good_two = write_record(&dir, "two.dcm", &sample_record("2.2.2", BitDepth::Bits8));

    let outcome = decode_batch(
        &[good_one, missing.clone(), good_two],
        &decode_options(&dir),
    );
    assert_eq!(outcome.manifest.len(), 2);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].0, missing);
    assert!(matches!(
        outcome.failures[0].1,
        ConvertError::NotFound { .. }
    ));

    // Manifest keeps input order.
    let names: Vec<String> = outcome
        .manifest
        .entries()
        .iter()
        .map(|e| e.template.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["1.1.1.json", "2.2.2.json"]);
}

#[test]
fn batch_encode_isolates_the_failing_object() {
    let dir = TempDir::new().unwrap();
    let input = write_record(&dir, "input.dcm", &sample_record("3.3.3", BitDepth::Bits8));
    let entry = decode_file(&input, &decode_options(&dir)).unwrap();

    let requests = json!([
        { "template": entry.template, "data": {}, "output": "first.dcm" },
        { "template": entry.template },
        { "template": entry.template, "data": {}, "output": "third.dcm" }
    ]);
    let request_path = dir.path().join("requests.json");
    fs::write(&request_path, serde_json::to_string(&requests).unwrap()).unwrap();

    let outcome = encode_file(
        &request_path,
        &EncodeOptions {
            output_dir: dir.path().join("encoded"),
            output_filename: None,
        },
    )
    .unwrap();

    assert_eq!(outcome.outputs.len(), 2);
    assert_eq!(outcome.failures.len(), 1);
    let (index, failure) = &outcome.failures[0];
    assert_eq!(*index, 1);
    assert!(matches!(
        failure,
        ConvertError::MissingMandatoryField { field, .. } if *field == "data"
    ));
}

#[test]
fn color_image_is_rejected_and_produces_no_output() {
    let dir = TempDir::new().unwrap();
    let input = write_record(&dir, "input.dcm", &sample_record("4.4.4", BitDepth::Bits8));
    let entry = decode_file(&input, &decode_options(&dir)).unwrap();

    let color_path = dir.path().join("color.png");
    image::ImageBuffer::from_pixel(2, 2, image::Rgb([1u8, 2, 3]))
        .save(&color_path)
        .unwrap();

    let request = json!({
        "template": entry.template,
        "data": {},
        "image": color_path,
        "output": "never.dcm"
    });
    let request_path = dir.path().join("request.json");
    fs::write(&request_path, serde_json::to_string(&request).unwrap()).unwrap();

    let encoded_dir = dir.path().join("encoded");
    let outcome = encode_file(
        &request_path,
        &EncodeOptions {
            output_dir: encoded_dir.clone(),
            output_filename: None,
        },
    )
    .unwrap();

    assert!(outcome.outputs.is_empty());
    assert!(matches!(
        outcome.failures[0].1,
        ConvertError::UnsupportedPixelFormat { channels: 3 }
    ));
    assert!(!encoded_dir.join("never.dcm").exists());
}

#[test]
fn removed_fields_stay_out_of_the_rebuilt_record() {
    let dir = TempDir::new().unwrap();
    let input = write_record(&dir, "input.dcm", &sample_record("5.5.5", BitDepth::Bits8));

    let options = DecodeOptions {
        output_dir: dir.path().join("decoded"),
        output_filename: None,
        remove_fields: vec!["PatientName".to_string(), "NoSuchField".to_string()],
    };
    let entry = decode_file(&input, &options).unwrap();
    let artifact: Value =
        serde_json::from_str(&fs::read_to_string(&entry.template).unwrap()).unwrap();
    assert!(artifact["data"].get("00100010").is_none());

    let request = json!({ "template": entry.template, "data": {} });
    let request_path = dir.path().join("request.json");
    fs::write(&request_path, serde_json::to_string(&request).unwrap()).unwrap();
    let outcome = encode_file(
        &request_path,
        &EncodeOptions {
            output_dir: dir.path().join("encoded"),
            output_filename: None,
        },
    )
    .unwrap();

    let rebuilt = binary::parse(&fs::read(&outcome.outputs[0]).unwrap()).unwrap();
    assert!(rebuilt.data.get(Tag::new(0x0010, 0x0010)).is_none());
    assert_eq!(rebuilt.data.first_string(tags::SOP_INSTANCE_UID), Some("5.5.5"));
}

#[test]
fn explicit_output_filename_is_honored_for_single_records() {
    let dir = TempDir::new().unwrap();
    let input = write_record(&dir, "input.dcm", &sample_record("6.6.6", BitDepth::Bits8));

    let options = DecodeOptions {
        output_dir: dir.path().join("decoded"),
        output_filename: Some("renamed".to_string()),
        remove_fields: Vec::new(),
    };
    let entry = decode_file(&input, &options).unwrap();
    assert!(entry.template.ends_with("renamed.json"));

    let request = json!({ "template": entry.template, "data": {} });
    let request_path = dir.path().join("request.json");
    fs::write(&request_path, serde_json::to_string(&request).unwrap()).unwrap();
    let outcome = encode_file(
        &request_path,
        &EncodeOptions {
            output_dir: dir.path().join("encoded"),
            output_filename: Some("renamed.dcm".to_string()),
        },
    )
    .unwrap();
    assert!(outcome.outputs[0].ends_with("renamed.dcm"));
}

#[test]
fn overrides_replace_template_fields_shallowly() {
    let dir = TempDir::new().unwrap();
    let input = write_record(&dir, "input.dcm", &sample_record("7.7.7", BitDepth::Bits8));
    let entry = decode_file(&input, &decode_options(&dir)).unwrap();

    let request = json!({
        "template": entry.template,
        "data": {
            "00100010": { "vr": "PN", "Value": [{ "Alphabetic": "Roe^Richard" }] },
            "00081030": { "vr": "LO", "Value": ["Edited study"] }
        }
    });
    let request_path = dir.path().join("request.json");
    fs::write(&request_path, serde_json::to_string(&request).unwrap()).unwrap();
    let outcome = encode_file(
        &request_path,
        &EncodeOptions {
            output_dir: dir.path().join("encoded"),
            output_filename: None,
        },
    )
    .unwrap();
    assert!(outcome.failures.is_empty());

    let rebuilt = binary::parse(&fs::read(&outcome.outputs[0]).unwrap()).unwrap();
    assert_eq!(
        rebuilt.data.first_string(Tag::new(0x0010, 0x0010)),
        Some("Roe^Richard")
    );
    assert_eq!(
        rebuilt.data.first_string(Tag::new(0x0008, 0x1030)),
        Some("Edited study")
    );
    // Untouched template fields survive.
    assert_eq!(rebuilt.data.first_string(Tag::new(0x0008, 0x0060)), Some("CT"));
    assert_eq!(rebuilt.data.first_u16(tags::ROWS), Some(4));
}

#[test]
fn invalid_override_field_is_dropped_while_siblings_survive() {
    let dir = TempDir::new().unwrap();
    let input = write_record(&dir, "input.dcm", &sample_record("8.8.8", BitDepth::Bits8));
    let entry = decode_file(&input, &decode_options(&dir)).unwrap();

    let request = json!({
        "template": entry.template,
        "data": {
            "00080020": { "vr": "DA", "Value": ["not-a-date"] },
            "00081030": { "vr": "LO", "Value": ["Kept"] }
        }
    });
    let request_path = dir.path().join("request.json");
    fs::write(&request_path, serde_json::to_string(&request).unwrap()).unwrap();
    let outcome = encode_file(
        &request_path,
        &EncodeOptions {
            output_dir: dir.path().join("encoded"),
            output_filename: None,
        },
    )
    .unwrap();
    assert!(outcome.failures.is_empty());

    let rebuilt = binary::parse(&fs::read(&outcome.outputs[0]).unwrap()).unwrap();
    // The malformed override replaced the template date, then failed
    // validation, so the field is gone entirely.
    assert!(rebuilt.data.get(Tag::new(0x0008, 0x0020)).is_none());
    assert_eq!(
        rebuilt.data.first_string(Tag::new(0x0008, 0x1030)),
        Some("Kept")
    );
}
