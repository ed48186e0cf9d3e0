//! Explicit VR little endian record reader and writer.
//!
//! Element structure per
//! https://dicom.nema.org/dicom/2013/output/chtml/part05/chapter_7.html
//! Compressed transfer syntaxes and implicit VR are out of scope; the
//! writer always emits explicit VR little endian with a 128 zero byte
//! preamble.

use encoding_rs::WINDOWS_1252;

use crate::error::ParseError;
use crate::model::{tags, DataElement, DataSet, DicomObject, DicomValue, Tag, Vr};

pub const PREAMBLE_LENGTH: usize = 128;
const PREFIX: &[u8; 4] = b"DICM";
const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

fn take(buffer: &[u8], offset: usize, needed: usize) -> Result<&[u8], ParseError> {
    buffer
        .get(offset..offset + needed)
        .ok_or(ParseError::Truncated { offset, needed })
}

fn read_u16(buffer: &[u8], offset: usize) -> Result<u16, ParseError> {
    let bytes = take(buffer, offset, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

fn read_u32(buffer: &[u8], offset: usize) -> Result<u32, ParseError> {
    let bytes = take(buffer, offset, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_tag(buffer: &[u8], offset: usize) -> Result<Tag, ParseError> {
    let group = read_u16(buffer, offset)?;
    let element = read_u16(buffer, offset + 2)?;
    Ok(Tag::new(group, element))
}

/// Parse a complete record: preamble, DICM prefix, then the element
/// stream. Group 0002 elements form the file meta set, the rest the data
/// set.
pub fn parse(buffer: &[u8]) -> Result<DicomObject, ParseError> {
    let mut offset = 0;

    take(buffer, offset, PREAMBLE_LENGTH)?;
    offset += PREAMBLE_LENGTH;

    if take(buffer, offset, 4)? != PREFIX {
        return Err(ParseError::BadPrefix);
    }
    offset += 4;

    let mut meta = DataSet::new();
    let mut data = DataSet::new();

    while offset < buffer.len() {
        let (element, consumed_bytes) = read_element(buffer, offset)?;
        if element.tag.is_file_meta() {
            meta.insert(element);
        } else {
            data.insert(element);
        }
        offset += consumed_bytes;
    }

    Ok(DicomObject::new(meta, data))
}

fn read_element(buffer: &[u8], start: usize) -> Result<(DataElement, usize), ParseError> {
    let mut length = 0;

    let tag = read_tag(buffer, start)?;
    length += 4;

    let vr_bytes = take(buffer, start + length, 2)?;
    let vr_bytes = [vr_bytes[0], vr_bytes[1]];
    let vr = Vr::from_bytes(vr_bytes).ok_or(ParseError::UnknownVr {
        tag,
        vr: vr_bytes,
        offset: start + length,
    })?;
    length += 2;

    if vr == Vr::SQ {
        // Explicit VR special structure: 2 reserved bytes, then a 4 byte
        // length that may be undefined for sequences.
        length += 2;
        let declared = read_u32(buffer, start + length)?;
        length += 4;

        let (items, consumed_bytes) = read_sequence(buffer, start + length, declared)?;
        length += consumed_bytes;
        return Ok((
            DataElement::new(tag, vr, DicomValue::Sequence(items)),
            length,
        ));
    }

    let data_element_length = if vr.has_extended_length() {
        length += 2;
        let value = read_u32(buffer, start + length)? as usize;
        length += 4;
        value
    } else {
        let value = read_u16(buffer, start + length)? as usize;
        length += 2;
        value
    };

    let value_bytes = take(buffer, start + length, data_element_length)?;
    let data = parse_value(value_bytes, vr)?;
    length += data_element_length;

    Ok((DataElement::new(tag, vr, data), length))
}

fn read_sequence(
    buffer: &[u8],
    start: usize,
    declared: u32,
) -> Result<(Vec<DataSet>, usize), ParseError> {
    let mut items = Vec::new();
    let mut offset = start;

    if declared == UNDEFINED_LENGTH {
        loop {
            if offset >= buffer.len() {
                return Err(ParseError::MissingDelimiter);
            }
            if read_tag(buffer, offset)? == tags::SEQUENCE_DELIMITATION {
                // Delimitation item carries a zero length field.
                offset += 8;
                break;
            }
            let (item, consumed_bytes) = read_item(buffer, offset)?;
            items.push(item);
            offset += consumed_bytes;
        }
    } else {
        let end = start + declared as usize;
        take(buffer, start, declared as usize)?;
        while offset < end {
            let (item, consumed_bytes) = read_item(buffer, offset)?;
            items.push(item);
            offset += consumed_bytes;
        }
    }

    Ok((items, offset - start))
}

fn read_item(buffer: &[u8], start: usize) -> Result<(DataSet, usize), ParseError> {
    let item_tag = read_tag(buffer, start)?;
    if item_tag != tags::ITEM {
        return Err(ParseError::BadItemTag {
            found: item_tag,
            offset: start,
        });
    }
    let item_length = read_u32(buffer, start + 4)?;
    let mut offset = start + 8;

    let mut elements = DataSet::new();
    if item_length == UNDEFINED_LENGTH {
        loop {
            if offset >= buffer.len() {
                return Err(ParseError::MissingDelimiter);
            }
            if read_tag(buffer, offset)? == tags::ITEM_DELIMITATION {
                offset += 8;
                break;
            }
            let (element, consumed_bytes) = read_element(buffer, offset)?;
            elements.insert(element);
            offset += consumed_bytes;
        }
    } else {
        let end = offset + item_length as usize;
        take(buffer, offset, item_length as usize)?;
        while offset < end {
            let (element, consumed_bytes) = read_element(buffer, offset)?;
            elements.insert(element);
            offset += consumed_bytes;
        }
    }

    Ok((elements, offset - start))
}

fn parse_value(buffer: &[u8], vr: Vr) -> Result<DicomValue, ParseError> {
    if buffer.is_empty() {
        return Ok(DicomValue::Empty);
    }

    let check_width = |width: usize| {
        if buffer.len() % width == 0 {
            Ok(())
        } else {
            Err(ParseError::MalformedValue {
                vr,
                reason: format!("{} bytes is not a multiple of {}", buffer.len(), width),
            })
        }
    };

    let value = match vr {
        Vr::UL => {
            check_width(4)?;
            DicomValue::U32(
                buffer
                    .chunks_exact(4)
                    .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect(),
            )
        }
        Vr::US => {
            check_width(2)?;
            DicomValue::U16(
                buffer
                    .chunks_exact(2)
                    .map(|b| u16::from_le_bytes([b[0], b[1]]))
                    .collect(),
            )
        }
        Vr::SL => {
            check_width(4)?;
            DicomValue::I32(
                buffer
                    .chunks_exact(4)
                    .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect(),
            )
        }
        Vr::SS => {
            check_width(2)?;
            DicomValue::I16(
                buffer
                    .chunks_exact(2)
                    .map(|b| i16::from_le_bytes([b[0], b[1]]))
                    .collect(),
            )
        }
        Vr::FL => {
            check_width(4)?;
            DicomValue::Float(
                buffer
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect(),
            )
        }
        Vr::FD => {
            check_width(8)?;
            DicomValue::Double(
                buffer
                    .chunks_exact(8)
                    .map(|b| {
                        f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
                    })
                    .collect(),
            )
        }
        Vr::AT => {
            check_width(4)?;
            DicomValue::String(
                buffer
                    .chunks_exact(4)
                    .map(|b| {
                        let group = u16::from_le_bytes([b[0], b[1]]);
                        let element = u16::from_le_bytes([b[2], b[3]]);
                        format!("{:04X}{:04X}", group, element)
                    })
                    .collect(),
            )
        }
        Vr::DS => {
            let text = decode_text(buffer);
            let mut numbers = Vec::new();
            for component in text.split('\\') {
                let component = component.trim();
                if component.is_empty() {
                    continue;
                }
                numbers.push(component.parse::<f64>().map_err(|_| {
                    ParseError::MalformedValue {
                        vr,
                        reason: format!("'{}' is not a decimal string", component),
                    }
                })?);
            }
            if numbers.is_empty() {
                DicomValue::Empty
            } else {
                DicomValue::Double(numbers)
            }
        }
        Vr::IS => {
            let text = decode_text(buffer);
            let mut numbers = Vec::new();
            for component in text.split('\\') {
                let component = component.trim();
                if component.is_empty() {
                    continue;
                }
                numbers.push(component.parse::<i32>().map_err(|_| {
                    ParseError::MalformedValue {
                        vr,
                        reason: format!("'{}' is not an integer string", component),
                    }
                })?);
            }
            if numbers.is_empty() {
                DicomValue::Empty
            } else {
                DicomValue::I32(numbers)
            }
        }
        Vr::OB | Vr::OD | Vr::OF | Vr::OW | Vr::UN => DicomValue::Bytes(buffer.to_vec()),
        Vr::SQ => {
            return Err(ParseError::MalformedValue {
                vr,
                reason: "sequence value outside sequence structure".to_string(),
            })
        }
        _ => {
            let text = decode_text(buffer);
            if text.trim().is_empty() {
                DicomValue::Empty
            } else {
                DicomValue::String(
                    text.split('\\').map(|s| s.trim().to_string()).collect(),
                )
            }
        }
    };

    Ok(value)
}

// TODO honor (0008,0005) SpecificCharacterSet; ISO-IR 100 is assumed for
// every string value.
fn decode_text(buffer: &[u8]) -> String {
    let (text, _, _) = WINDOWS_1252.decode(buffer);
    text.trim_end_matches('\0').to_string()
}

/// Serialize a record. Only explicit VR little endian is supported; the
/// flags exist so callers state the encoding they expect. The file meta
/// group length (0002,0000) is recomputed, not trusted.
pub fn serialize(
    object: &DicomObject,
    little_endian: bool,
    explicit_vr: bool,
) -> Result<Vec<u8>, ParseError> {
    if !little_endian || !explicit_vr {
        return Err(ParseError::UnsupportedTransferSyntax);
    }

    let mut meta_body = Vec::new();
    for element in object
        .meta
        .iter()
        .filter(|e| e.tag != tags::FILE_META_GROUP_LENGTH)
    {
        write_element(&mut meta_body, element)?;
    }
    let group_length = DataElement::new(
        tags::FILE_META_GROUP_LENGTH,
        Vr::UL,
        DicomValue::U32(vec![meta_body.len() as u32]),
    );

    let mut out = vec![0u8; PREAMBLE_LENGTH];
    out.extend_from_slice(PREFIX);
    write_element(&mut out, &group_length)?;
    out.extend_from_slice(&meta_body);
    for element in object.data.iter() {
        write_element(&mut out, element)?;
    }
    Ok(out)
}

fn write_tag(out: &mut Vec<u8>, tag: Tag) {
    out.extend_from_slice(&tag.group.to_le_bytes());
    out.extend_from_slice(&tag.element.to_le_bytes());
}

fn write_element(out: &mut Vec<u8>, element: &DataElement) -> Result<(), ParseError> {
    write_tag(out, element.tag);
    out.extend_from_slice(element.vr.as_str().as_bytes());

    if element.vr == Vr::SQ {
        // Written with undefined length and explicit item/sequence
        // delimiters, the symmetric form of what the reader accepts.
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&UNDEFINED_LENGTH.to_le_bytes());
        let items: &[DataSet] = match &element.data {
            DicomValue::Sequence(items) => items,
            DicomValue::Empty => &[],
            _ => {
                return Err(ParseError::MalformedValue {
                    vr: element.vr,
                    reason: "SQ attribute without sequence payload".to_string(),
                })
            }
        };
        for item in items {
            write_tag(out, tags::ITEM);
            out.extend_from_slice(&UNDEFINED_LENGTH.to_le_bytes());
            for nested in item.iter() {
                write_element(out, nested)?;
            }
            write_tag(out, tags::ITEM_DELIMITATION);
            out.extend_from_slice(&0u32.to_le_bytes());
        }
        write_tag(out, tags::SEQUENCE_DELIMITATION);
        out.extend_from_slice(&0u32.to_le_bytes());
        return Ok(());
    }

    let value_bytes = encode_value(element)?;
    if element.vr.has_extended_length() {
        out.extend_from_slice(&[0, 0]);
        out.extend_from_slice(&(value_bytes.len() as u32).to_le_bytes());
    } else {
        if value_bytes.len() > u16::MAX as usize {
            return Err(ParseError::ValueTooLong {
                vr: element.vr,
                len: value_bytes.len(),
            });
        }
        out.extend_from_slice(&(value_bytes.len() as u16).to_le_bytes());
    }
    out.extend_from_slice(&value_bytes);
    Ok(())
}

fn encode_value(element: &DataElement) -> Result<Vec<u8>, ParseError> {
    let vr = element.vr;
    let bytes = match &element.data {
        DicomValue::Empty => Vec::new(),
        DicomValue::U16(v) => v.iter().flat_map(|n| n.to_le_bytes()).collect(),
        DicomValue::U32(v) => v.iter().flat_map(|n| n.to_le_bytes()).collect(),
        DicomValue::I16(v) => v.iter().flat_map(|n| n.to_le_bytes()).collect(),
        DicomValue::Float(v) => v.iter().flat_map(|n| n.to_le_bytes()).collect(),
        DicomValue::I32(v) if vr == Vr::IS => {
            let text = v
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<String>>()
                .join("\\");
            pad_text(text.into_bytes(), vr)
        }
        DicomValue::I32(v) => v.iter().flat_map(|n| n.to_le_bytes()).collect(),
        DicomValue::Double(v) if vr == Vr::DS => {
            let text = v
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<String>>()
                .join("\\");
            pad_text(text.into_bytes(), vr)
        }
        DicomValue::Double(v) => v.iter().flat_map(|n| n.to_le_bytes()).collect(),
        DicomValue::Bytes(v) => {
            let mut bytes = v.clone();
            if bytes.len() % 2 == 1 {
                bytes.push(0);
            }
            bytes
        }
        DicomValue::String(v) if vr == Vr::AT => {
            let mut bytes = Vec::with_capacity(v.len() * 4);
            for spelled in v {
                let tag: Tag = spelled.parse().map_err(|_| ParseError::MalformedValue {
                    vr,
                    reason: format!("'{}' is not a tag", spelled),
                })?;
                bytes.extend_from_slice(&tag.group.to_le_bytes());
                bytes.extend_from_slice(&tag.element.to_le_bytes());
            }
            bytes
        }
        DicomValue::String(v) => {
            let joined = v.join("\\");
            let (encoded, _, _) = WINDOWS_1252.encode(&joined);
            pad_text(encoded.into_owned(), vr)
        }
        DicomValue::Sequence(_) => {
            return Err(ParseError::MalformedValue {
                vr,
                reason: "sequence payload on a non-SQ attribute".to_string(),
            })
        }
    };
    Ok(bytes)
}

// Text values are padded to even length, UIDs with NUL, everything else
// with a trailing space.
fn pad_text(mut bytes: Vec<u8>, vr: Vr) -> Vec<u8> {
    if bytes.len() % 2 == 1 {
        bytes.push(if vr == Vr::UI { 0 } else { b' ' });
    }
    bytes
}
