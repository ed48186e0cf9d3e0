//! Pixel geometry bookkeeping and the raster file collaborator.
//!
//! The six geometry attributes and the pixel payload are always written
//! together from a raster buffer; they are never merged field by field
//! from JSON.

use std::path::Path;

use image::{DynamicImage, ImageBuffer, Luma};

use crate::error::ConvertError;
use crate::model::{
    tags, BitDepth, DataElement, DataSet, DicomValue, PixelGeometry, RasterBuffer, Tag, Vr,
};

impl RasterBuffer {
    pub fn new(
        rows: u32,
        columns: u32,
        depth: BitDepth,
        pixels: Vec<u8>,
    ) -> Result<Self, ConvertError> {
        let expected = rows as usize * columns as usize * depth.sample_bytes();
        if pixels.len() != expected {
            return Err(ConvertError::MalformedPixelData {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(RasterBuffer {
            rows,
            columns,
            depth,
            pixels,
        })
    }

    /// Accepts strictly grayscale 8 or 16 bit images. Multi-channel input
    /// and unsupported sample sizes are two distinct failures.
    pub fn from_image(image: DynamicImage) -> Result<Self, ConvertError> {
        match image {
            DynamicImage::ImageLuma8(buffer) => {
                let (columns, rows) = buffer.dimensions();
                RasterBuffer::new(rows, columns, BitDepth::Bits8, buffer.into_raw())
            }
            DynamicImage::ImageLuma16(buffer) => {
                let (columns, rows) = buffer.dimensions();
                let bytes = buffer
                    .into_raw()
                    .iter()
                    .flat_map(|sample| sample.to_le_bytes())
                    .collect();
                RasterBuffer::new(rows, columns, BitDepth::Bits16, bytes)
            }
            other => {
                let color = other.color();
                let channels = color.channel_count();
                if channels > 1 {
                    Err(ConvertError::UnsupportedPixelFormat { channels })
                } else {
                    Err(ConvertError::UnsupportedBitDepth {
                        bits: color.bits_per_pixel() / channels as u16,
                    })
                }
            }
        }
    }
}

/// Compute the invariant-holding geometry for a raster:
/// `BitsAllocated == BitsStored`, `HighBit == BitsStored - 1`,
/// `WindowCenter == 2^(BitsStored-1)`, `WindowWidth == 2^BitsStored - 1`.
pub fn derive_geometry(raster: &RasterBuffer) -> Result<PixelGeometry, ConvertError> {
    if raster.rows > u16::MAX as u32 || raster.columns > u16::MAX as u32 {
        return Err(ConvertError::RasterTooLarge {
            rows: raster.rows,
            columns: raster.columns,
        });
    }
    let bits = raster.depth.bits();
    Ok(PixelGeometry {
        bits_allocated: bits,
        bits_stored: bits,
        high_bit: bits - 1,
        window_center: f64::from(1u32 << (bits - 1)),
        window_width: f64::from((1u32 << bits) - 1),
        rows: raster.rows as u16,
        columns: raster.columns as u16,
    })
}

/// Write the geometry attributes and the pixel payload into `data`,
/// overwriting any prior values. The only path that sets pixel-related
/// attributes.
pub fn apply_geometry(data: &mut DataSet, geometry: &PixelGeometry, pixels: Vec<u8>) {
    let us = |tag: Tag, value: u16| DataElement::new(tag, Vr::US, DicomValue::U16(vec![value]));
    data.insert(us(tags::BITS_ALLOCATED, geometry.bits_allocated));
    data.insert(us(tags::BITS_STORED, geometry.bits_stored));
    data.insert(us(tags::HIGH_BIT, geometry.high_bit));
    data.insert(us(tags::ROWS, geometry.rows));
    data.insert(us(tags::COLUMNS, geometry.columns));
    data.insert(DataElement::new(
        tags::WINDOW_CENTER,
        Vr::DS,
        DicomValue::Double(vec![geometry.window_center]),
    ));
    data.insert(DataElement::new(
        tags::WINDOW_WIDTH,
        Vr::DS,
        DicomValue::Double(vec![geometry.window_width]),
    ));
    data.insert(DataElement::new(
        tags::PIXEL_DATA,
        Vr::OW,
        DicomValue::Bytes(pixels),
    ));
}

/// Reconstruct the raster from Rows, Columns, BitsStored and PixelData.
pub fn extract_pixels(data: &DataSet) -> Result<RasterBuffer, ConvertError> {
    let require = |tag: Tag| {
        data.first_u16(tag)
            .ok_or(ConvertError::MissingPixelData { tag })
    };
    let rows = require(tags::ROWS)?;
    let columns = require(tags::COLUMNS)?;
    let bits = require(tags::BITS_STORED)?;
    let pixels = data
        .bytes(tags::PIXEL_DATA)
        .ok_or(ConvertError::MissingPixelData {
            tag: tags::PIXEL_DATA,
        })?;

    let depth = match bits {
        8 => BitDepth::Bits8,
        16 => BitDepth::Bits16,
        other => return Err(ConvertError::UnsupportedBitDepth { bits: other }),
    };
    RasterBuffer::new(rows as u32, columns as u32, depth, pixels.to_vec())
}

/// Read a raster file (PNG or anything the image crate decodes) into a
/// grayscale buffer.
pub fn read_raster(path: &Path) -> Result<RasterBuffer, ConvertError> {
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
    let image = image::open(path).map_err(|source| ConvertError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    RasterBuffer::from_image(image)
}

pub fn write_raster(path: &Path, raster: &RasterBuffer) -> Result<(), ConvertError> {
    let to_image_error = |path: &Path, source| ConvertError::Image {
        path: path.to_path_buf(),
        source,
    };
    match raster.depth {
        BitDepth::Bits8 => {
            let buffer = ImageBuffer::<Luma<u8>, _>::from_raw(
                raster.columns,
                raster.rows,
                raster.pixels.clone(),
            )
            .ok_or(ConvertError::MalformedPixelData {
                expected: raster.rows as usize * raster.columns as usize,
                actual: raster.pixels.len(),
            })?;
            buffer.save(path).map_err(|e| to_image_error(path, e))
        }
        BitDepth::Bits16 => {
            let samples: Vec<u16> = raster
                .pixels
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            let buffer =
                ImageBuffer::<Luma<u16>, _>::from_raw(raster.columns, raster.rows, samples)
                    .ok_or(ConvertError::MalformedPixelData {
                        expected: raster.rows as usize * raster.columns as usize * 2,
                        actual: raster.pixels.len(),
                    })?;
            buffer.save(path).map_err(|e| to_image_error(path, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster_8bit(rows: u32, columns: u32) -> RasterBuffer {
        RasterBuffer::new(
            rows,
            columns,
            BitDepth::Bits8,
            vec![0; (rows * columns) as usize],
        )
        .unwrap()
    }

    #[test]
    fn geometry_invariants_8bit() {
        let geometry = derive_geometry(&raster_8bit(100, 200)).unwrap();
        assert_eq!(geometry.bits_allocated, 8);
        assert_eq!(geometry.bits_stored, 8);
        assert_eq!(geometry.high_bit, 7);
        assert_eq!(geometry.window_center, 128.0);
        assert_eq!(geometry.window_width, 255.0);
        assert_eq!(geometry.rows, 100);
        assert_eq!(geometry.columns, 200);
    }

    #[test]
    fn geometry_invariants_16bit() {
        let raster =
            RasterBuffer::new(4, 4, BitDepth::Bits16, vec![0; 32]).unwrap();
        let geometry = derive_geometry(&raster).unwrap();
        assert_eq!(geometry.bits_allocated, 16);
        assert_eq!(geometry.high_bit, 15);
        assert_eq!(geometry.window_center, 32768.0);
        assert_eq!(geometry.window_width, 65535.0);
    }

    #[test]
    fn multi_channel_image_is_rejected_as_pixel_format() {
        let rgb = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(
            2,
            2,
            image::Rgb([1u8, 2, 3]),
        ));
        match RasterBuffer::from_image(rgb) {
            Err(ConvertError::UnsupportedPixelFormat { channels: 3 }) => {}
            other => panic!("expected UnsupportedPixelFormat, got {:?}", other),
        }
    }

    #[test]
    fn luma_alpha_counts_as_multi_channel() {
        let la = DynamicImage::ImageLumaA8(ImageBuffer::from_pixel(
            2,
            2,
            image::LumaA([1u8, 255]),
        ));
        match RasterBuffer::from_image(la) {
            Err(ConvertError::UnsupportedPixelFormat { channels: 2 }) => {}
            other => panic!("expected UnsupportedPixelFormat, got {:?}", other),
        }
    }

    #[test]
    fn apply_then_extract_round_trips() {
        let raster = raster_8bit(3, 5);
        let geometry = derive_geometry(&raster).unwrap();
        let mut data = DataSet::new();
        apply_geometry(&mut data, &geometry, raster.pixels.clone());
        assert_eq!(data.first_u16(tags::ROWS), Some(3));
        assert_eq!(data.first_u16(tags::COLUMNS), Some(5));
        let back = extract_pixels(&data).unwrap();
        assert_eq!(back, raster);
    }

    #[test]
    fn extract_names_the_missing_attribute() {
        let mut data = DataSet::new();
        data.insert(DataElement::new(
            tags::ROWS,
            Vr::US,
            DicomValue::U16(vec![3]),
        ));
        match extract_pixels(&data) {
            Err(ConvertError::MissingPixelData { tag }) => assert_eq!(tag, tags::COLUMNS),
            other => panic!("expected MissingPixelData, got {:?}", other),
        }
    }

    #[test]
    fn sixteen_bit_payload_length_is_validated() {
        let result = RasterBuffer::new(2, 2, BitDepth::Bits16, vec![0; 5]);
        assert!(matches!(
            result,
            Err(ConvertError::MalformedPixelData {
                expected: 8,
                actual: 5
            })
        ));
    }
}
