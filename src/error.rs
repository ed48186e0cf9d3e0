use std::path::PathBuf;

use thiserror::Error;

use crate::model::{Tag, Vr};

/// Failures while walking the binary element stream.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("record truncated at byte {offset}, needed {needed} more")]
    Truncated { offset: usize, needed: usize },
    #[error("missing DICM prefix after the 128 byte preamble")]
    BadPrefix,
    #[error("unknown VR {vr:?} for {tag} at byte {offset}")]
    UnknownVr { tag: Tag, vr: [u8; 2], offset: usize },
    #[error("expected sequence item tag, found {found} at byte {offset}")]
    BadItemTag { found: Tag, offset: usize },
    #[error("sequence delimitation tag not found")]
    MissingDelimiter,
    #[error("malformed {vr} value: {reason}")]
    MalformedValue { vr: Vr, reason: String },
    #[error("{vr} value of {len} bytes does not fit a 2 byte length field")]
    ValueTooLong { vr: Vr, len: usize },
    #[error("only explicit VR little endian emission is supported")]
    UnsupportedTransferSyntax,
}

/// Per-field failure during JSON -> attribute conversion. Recoverable:
/// the merge step drops the field and keeps its siblings.
#[derive(Debug, Clone, Error)]
#[error("invalid value for {tag}: {reason}")]
pub struct ValidationError {
    pub tag: Tag,
    pub reason: String,
}

impl ValidationError {
    pub fn new(tag: Tag, reason: impl Into<String>) -> Self {
        ValidationError {
            tag,
            reason: reason.into(),
        }
    }
}

/// Fatal-per-record conditions. In a batch the failing record is reported
/// and excluded; the other records proceed.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("'{path}' does not exist")]
    NotFound { path: PathBuf },
    #[error("'{path}' is not a file")]
    NotAFile { path: PathBuf },
    #[error("cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid JSON in '{path}': {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("cannot process image '{path}': {source}")]
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("template '{path}' is missing or unreadable")]
    MissingTemplate { path: PathBuf },
    #[error("cannot find mandatory JSON field named '{field}' in '{path}'")]
    MissingMandatoryField { field: &'static str, path: PathBuf },
    #[error("template field {tag} is invalid: {reason}")]
    InvalidTemplate { tag: Tag, reason: String },
    #[error("image has {channels} channels, only single-channel grayscale is supported")]
    UnsupportedPixelFormat { channels: u8 },
    #[error("unsupported sample bit depth {bits}, only 8 and 16 are supported")]
    UnsupportedBitDepth { bits: u16 },
    #[error("missing pixel attribute {tag}")]
    MissingPixelData { tag: Tag },
    #[error("pixel payload is {actual} bytes, geometry implies {expected}")]
    MalformedPixelData { expected: usize, actual: usize },
    #[error("raster of {rows}x{columns} exceeds the 65535 row/column limit")]
    RasterTooLarge { rows: u32, columns: u32 },
    #[error("record has no SOPInstanceUID to derive an output name from")]
    MissingIdentifier,
}

impl ConvertError {
    /// Stable process exit code for each named condition, the contract the
    /// surrounding CLIs map diagnostics onto.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConvertError::NotFound { .. } => 1,
            ConvertError::NotAFile { .. } => 2,
            ConvertError::Io { .. } => 3,
            ConvertError::MissingMandatoryField { .. } => 4,
            ConvertError::MissingTemplate { .. } => 5,
            ConvertError::Json { .. } => 6,
            ConvertError::Parse(_) => 7,
            ConvertError::Image { .. } => 8,
            ConvertError::UnsupportedPixelFormat { .. } => 9,
            ConvertError::UnsupportedBitDepth { .. } => 10,
            ConvertError::MissingPixelData { .. }
            | ConvertError::MalformedPixelData { .. }
            | ConvertError::RasterTooLarge { .. } => 11,
            ConvertError::MissingIdentifier => 12,
            ConvertError::InvalidTemplate { .. } => 13,
        }
    }
}
