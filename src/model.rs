use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Identifier of one attribute inside a data set, the (group, element) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    pub group: u16,
    pub element: u16,
}

impl Tag {
    pub const fn new(group: u16, element: u16) -> Self {
        Tag { group, element }
    }

    /// Key form used in the JSON artifact, e.g. "00080018".
    pub fn json_key(&self) -> String {
        format!("{:04X}{:04X}", self.group, self.element)
    }

    /// Key form used by the tag dictionary, e.g. "0008,0018".
    pub fn dict_key(&self) -> String {
        format!("{:04X},{:04X}", self.group, self.element)
    }

    pub fn is_file_meta(&self) -> bool {
        self.group == 0x0002
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.group, self.element)
    }
}

impl FromStr for Tag {
    type Err = ();

    // Accepts both the JSON key form "00080018" and the dictionary
    // form "0008,0018".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cleaned = s.trim().replace(',', "");
        if cleaned.len() != 8 || !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(());
        }
        let group = u16::from_str_radix(&cleaned[..4], 16).map_err(|_| ())?;
        let element = u16::from_str_radix(&cleaned[4..], 16).map_err(|_| ())?;
        Ok(Tag { group, element })
    }
}

/// Tags this crate manipulates directly.
pub mod tags {
    use super::Tag;

    pub const FILE_META_GROUP_LENGTH: Tag = Tag::new(0x0002, 0x0000);
    pub const TRANSFER_SYNTAX_UID: Tag = Tag::new(0x0002, 0x0010);
    pub const SOP_INSTANCE_UID: Tag = Tag::new(0x0008, 0x0018);
    pub const ROWS: Tag = Tag::new(0x0028, 0x0010);
    pub const COLUMNS: Tag = Tag::new(0x0028, 0x0011);
    pub const BITS_ALLOCATED: Tag = Tag::new(0x0028, 0x0100);
    pub const BITS_STORED: Tag = Tag::new(0x0028, 0x0101);
    pub const HIGH_BIT: Tag = Tag::new(0x0028, 0x0102);
    pub const WINDOW_CENTER: Tag = Tag::new(0x0028, 0x1050);
    pub const WINDOW_WIDTH: Tag = Tag::new(0x0028, 0x1051);
    pub const PIXEL_DATA: Tag = Tag::new(0x7FE0, 0x0010);

    pub const ITEM: Tag = Tag::new(0xFFFE, 0xE000);
    pub const ITEM_DELIMITATION: Tag = Tag::new(0xFFFE, 0xE00D);
    pub const SEQUENCE_DELIMITATION: Tag = Tag::new(0xFFFE, 0xE0DD);
}

/// The 28 standard value representations.
/// https://dicom.nema.org/dicom/2013/output/chtml/part05/sect_6.2.html
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vr {
    AE,
    AS,
    AT,
    CS,
    DA,
    DS,
    DT,
    FL,
    FD,
    IS,
    LO,
    LT,
    OB,
    OD,
    OF,
    OW,
    PN,
    SH,
    SL,
    SQ,
    SS,
    ST,
    TM,
    UI,
    UL,
    UN,
    US,
    UT,
}

impl Vr {
    pub fn as_str(&self) -> &'static str {
        match self {
            Vr::AE => "AE",
            Vr::AS => "AS",
            Vr::AT => "AT",
            Vr::CS => "CS",
            Vr::DA => "DA",
            Vr::DS => "DS",
            Vr::DT => "DT",
            Vr::FL => "FL",
            Vr::FD => "FD",
            Vr::IS => "IS",
            Vr::LO => "LO",
            Vr::LT => "LT",
            Vr::OB => "OB",
            Vr::OD => "OD",
            Vr::OF => "OF",
            Vr::OW => "OW",
            Vr::PN => "PN",
            Vr::SH => "SH",
            Vr::SL => "SL",
            Vr::SQ => "SQ",
            Vr::SS => "SS",
            Vr::ST => "ST",
            Vr::TM => "TM",
            Vr::UI => "UI",
            Vr::UL => "UL",
            Vr::UN => "UN",
            Vr::US => "US",
            Vr::UT => "UT",
        }
    }

    pub fn from_bytes(bytes: [u8; 2]) -> Option<Vr> {
        match &bytes {
            b"AE" => Some(Vr::AE),
            b"AS" => Some(Vr::AS),
            b"AT" => Some(Vr::AT),
            b"CS" => Some(Vr::CS),
            b"DA" => Some(Vr::DA),
            b"DS" => Some(Vr::DS),
            b"DT" => Some(Vr::DT),
            b"FL" => Some(Vr::FL),
            b"FD" => Some(Vr::FD),
            b"IS" => Some(Vr::IS),
            b"LO" => Some(Vr::LO),
            b"LT" => Some(Vr::LT),
            b"OB" => Some(Vr::OB),
            b"OD" => Some(Vr::OD),
            b"OF" => Some(Vr::OF),
            b"OW" => Some(Vr::OW),
            b"PN" => Some(Vr::PN),
            b"SH" => Some(Vr::SH),
            b"SL" => Some(Vr::SL),
            b"SQ" => Some(Vr::SQ),
            b"SS" => Some(Vr::SS),
            b"ST" => Some(Vr::ST),
            b"TM" => Some(Vr::TM),
            b"UI" => Some(Vr::UI),
            b"UL" => Some(Vr::UL),
            b"UN" => Some(Vr::UN),
            b"US" => Some(Vr::US),
            b"UT" => Some(Vr::UT),
            _ => None,
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Vr> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return None;
        }
        Vr::from_bytes([bytes[0], bytes[1]])
    }

    // Explicit VR special structure (with 2 reserved bytes and a 4 byte
    // length) vs the ordinary 2 byte length form.
    pub fn has_extended_length(&self) -> bool {
        matches!(
            self,
            Vr::OB | Vr::OD | Vr::OF | Vr::OW | Vr::UN | Vr::UT | Vr::SQ
        )
    }

    /// VRs whose wire form is character data.
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            Vr::AE
                | Vr::AS
                | Vr::CS
                | Vr::DA
                | Vr::DS
                | Vr::DT
                | Vr::IS
                | Vr::LO
                | Vr::LT
                | Vr::PN
                | Vr::SH
                | Vr::ST
                | Vr::TM
                | Vr::UI
                | Vr::UT
        )
    }

    /// VRs carried as an opaque byte payload (InlineBinary in JSON).
    pub fn is_binary(&self) -> bool {
        matches!(self, Vr::OB | Vr::OD | Vr::OF | Vr::OW | Vr::UN)
    }
}

impl fmt::Display for Vr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value payload of one attribute. Shape depends on the VR.
#[derive(Debug, Clone, PartialEq)]
pub enum DicomValue {
    String(Vec<String>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    Bytes(Vec<u8>),
    Sequence(Vec<DataSet>),
    Empty,
}

impl DicomValue {
    pub fn is_empty(&self) -> bool {
        match self {
            DicomValue::String(v) => v.is_empty(),
            DicomValue::Float(v) => v.is_empty(),
            DicomValue::Double(v) => v.is_empty(),
            DicomValue::I16(v) => v.is_empty(),
            DicomValue::I32(v) => v.is_empty(),
            DicomValue::U16(v) => v.is_empty(),
            DicomValue::U32(v) => v.is_empty(),
            DicomValue::Bytes(v) => v.is_empty(),
            DicomValue::Sequence(v) => v.is_empty(),
            DicomValue::Empty => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataElement {
    pub tag: Tag,
    pub vr: Vr,
    pub data: DicomValue,
}

impl DataElement {
    pub fn new(tag: Tag, vr: Vr, data: DicomValue) -> Self {
        DataElement { tag, vr, data }
    }
}

/// Tag-keyed attribute map. Keys are unique; iteration is in ascending
/// tag order, which is also the order required for binary emission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSet {
    elements: BTreeMap<Tag, DataElement>,
}

impl DataSet {
    pub fn new() -> Self {
        DataSet::default()
    }

    pub fn insert(&mut self, element: DataElement) -> Option<DataElement> {
        self.elements.insert(element.tag, element)
    }

    pub fn get(&self, tag: Tag) -> Option<&DataElement> {
        self.elements.get(&tag)
    }

    pub fn remove(&mut self, tag: Tag) -> Option<DataElement> {
        self.elements.remove(&tag)
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.elements.contains_key(&tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DataElement> {
        self.elements.values()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// First value of a single-valued US attribute.
    pub fn first_u16(&self, tag: Tag) -> Option<u16> {
        match &self.get(tag)?.data {
            DicomValue::U16(v) => v.first().copied(),
            _ => None,
        }
    }

    pub fn first_string(&self, tag: Tag) -> Option<&str> {
        match &self.get(tag)?.data {
            DicomValue::String(v) => v.first().map(|s| s.as_str()),
            _ => None,
        }
    }

    pub fn bytes(&self, tag: Tag) -> Option<&[u8]> {
        match &self.get(tag)?.data {
            DicomValue::Bytes(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}

impl FromIterator<DataElement> for DataSet {
    fn from_iter<I: IntoIterator<Item = DataElement>>(iter: I) -> Self {
        let mut set = DataSet::new();
        for element in iter {
            set.insert(element);
        }
        set
    }
}

/// In-memory form of one record: the file meta group and the data set.
/// Emission always uses explicit VR little endian with a 128 zero byte
/// preamble.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DicomObject {
    pub meta: DataSet,
    pub data: DataSet,
}

impl DicomObject {
    pub fn new(meta: DataSet, data: DataSet) -> Self {
        DicomObject { meta, data }
    }

    /// The record identifier used to name output artifacts.
    pub fn sop_instance_uid(&self) -> Option<&str> {
        self.data.first_string(tags::SOP_INSTANCE_UID)
    }
}

/// Raster sample size. Only 8 and 16 bit grayscale is representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    Bits8,
    Bits16,
}

impl BitDepth {
    pub fn bits(&self) -> u16 {
        match self {
            BitDepth::Bits8 => 8,
            BitDepth::Bits16 => 16,
        }
    }

    pub fn sample_bytes(&self) -> usize {
        match self {
            BitDepth::Bits8 => 1,
            BitDepth::Bits16 => 2,
        }
    }
}

/// 2-D single-channel grayscale raster, row-major, 16 bit samples little
/// endian.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterBuffer {
    pub rows: u32,
    pub columns: u32,
    pub depth: BitDepth,
    pub pixels: Vec<u8>,
}

/// The interdependent pixel description attributes. Always derived as a
/// whole from a raster, never assembled field by field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelGeometry {
    pub bits_allocated: u16,
    pub bits_stored: u16,
    pub high_bit: u16,
    pub window_center: f64,
    pub window_width: f64,
    pub rows: u16,
    pub columns: u16,
}
