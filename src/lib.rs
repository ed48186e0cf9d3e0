//! Convert DICOM records to an editable JSON artifact plus a grayscale
//! PNG, and back.
//!
//! Decoding walks a parsed record, drops caller-named fields, and emits a
//! `{"meta": {...}, "data": {...}}` artifact in the DICOM JSON attribute
//! model together with the raster held in the pixel attributes. Encoding
//! starts from such an artifact used as a template, shallow-merges JSON
//! overrides onto its data map, validates every field (dropping invalid
//! ones with a diagnostic instead of failing the record), optionally
//! re-derives the pixel geometry from a supplied image, and serializes
//! the result as an explicit VR little endian record.
//!
//! Records in a batch are independent; batch runs fan out over a worker
//! pool and one record's failure never affects its siblings.

pub mod batch;
pub mod binary;
pub mod codec;
pub mod decode;
pub mod dict;
pub mod encode;
pub mod error;
pub mod manifest;
pub mod model;
pub mod pixel;

pub use error::{ConvertError, ParseError, ValidationError};
pub use model::{
    BitDepth, DataElement, DataSet, DicomObject, DicomValue, PixelGeometry, RasterBuffer, Tag, Vr,
};

pub type Result<T> = std::result::Result<T, ConvertError>;
