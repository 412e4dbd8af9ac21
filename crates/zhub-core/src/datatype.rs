//! ZCL datatype table
//!
//! Every scalar wire type carries a one-byte tag. Fixed-width numeric types
//! come in contiguous runs (`data8..data64`, `map8..map64`, `uint8..uint64`,
//! `int8..int64`, `enum8..enum16`) where each tag is one byte wider than the
//! previous one, so widths are derived from the tag instead of tabulated.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Scalar wire datatype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum DataType {
    NoData = 0x00,
    Data8 = 0x08,
    Data16 = 0x09,
    Data24 = 0x0a,
    Data32 = 0x0b,
    Data40 = 0x0c,
    Data48 = 0x0d,
    Data56 = 0x0e,
    Data64 = 0x0f,
    Bool = 0x10,
    Map8 = 0x18,
    Map16 = 0x19,
    Map24 = 0x1a,
    Map32 = 0x1b,
    Map40 = 0x1c,
    Map48 = 0x1d,
    Map56 = 0x1e,
    Map64 = 0x1f,
    Uint8 = 0x20,
    Uint16 = 0x21,
    Uint24 = 0x22,
    Uint32 = 0x23,
    Uint40 = 0x24,
    Uint48 = 0x25,
    Uint56 = 0x26,
    Uint64 = 0x27,
    Int8 = 0x28,
    Int16 = 0x29,
    Int24 = 0x2a,
    Int32 = 0x2b,
    Int40 = 0x2c,
    Int48 = 0x2d,
    Int56 = 0x2e,
    Int64 = 0x2f,
    Enum8 = 0x30,
    Enum16 = 0x31,
    Semi = 0x38,
    Single = 0x39,
    Double = 0x3a,
    OctStr = 0x41,
    String = 0x42,
    OctStr16 = 0x43,
    String16 = 0x44,
    Array = 0x48,
    Struct = 0x4c,
    Set = 0x50,
    Bag = 0x51,
    TimeOfDay = 0xe0,
    Date = 0xe1,
    Utc = 0xe2,
    ClusterId = 0xe8,
    AttribId = 0xe9,
    BacOid = 0xea,
    Eui64 = 0xf0,
    Key128 = 0xf1,
    Unknown = 0xff,
}

/// Family of a fixed-width numeric datatype
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeClass {
    /// `dataN`: opaque bytes
    Data,
    /// `mapN`: bitmap
    Bitmap,
    /// `uintN`
    Unsigned,
    /// `intN`
    Signed,
    /// `enumN`
    Enum,
}

const SIZE_CLASSES: [(SizeClass, DataType, DataType); 5] = [
    (SizeClass::Data, DataType::Data8, DataType::Data64),
    (SizeClass::Bitmap, DataType::Map8, DataType::Map64),
    (SizeClass::Unsigned, DataType::Uint8, DataType::Uint64),
    (SizeClass::Signed, DataType::Int8, DataType::Int64),
    (SizeClass::Enum, DataType::Enum8, DataType::Enum16),
];

impl DataType {
    /// Every datatype, in tag order
    pub const ALL: [DataType; 56] = [
        DataType::NoData,
        DataType::Data8,
        DataType::Data16,
        DataType::Data24,
        DataType::Data32,
        DataType::Data40,
        DataType::Data48,
        DataType::Data56,
        DataType::Data64,
        DataType::Bool,
        DataType::Map8,
        DataType::Map16,
        DataType::Map24,
        DataType::Map32,
        DataType::Map40,
        DataType::Map48,
        DataType::Map56,
        DataType::Map64,
        DataType::Uint8,
        DataType::Uint16,
        DataType::Uint24,
        DataType::Uint32,
        DataType::Uint40,
        DataType::Uint48,
        DataType::Uint56,
        DataType::Uint64,
        DataType::Int8,
        DataType::Int16,
        DataType::Int24,
        DataType::Int32,
        DataType::Int40,
        DataType::Int48,
        DataType::Int56,
        DataType::Int64,
        DataType::Enum8,
        DataType::Enum16,
        DataType::Semi,
        DataType::Single,
        DataType::Double,
        DataType::OctStr,
        DataType::String,
        DataType::OctStr16,
        DataType::String16,
        DataType::Array,
        DataType::Struct,
        DataType::Set,
        DataType::Bag,
        DataType::TimeOfDay,
        DataType::Date,
        DataType::Utc,
        DataType::ClusterId,
        DataType::AttribId,
        DataType::BacOid,
        DataType::Eui64,
        DataType::Key128,
        DataType::Unknown,
    ];

    /// Wire tag
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Look up a datatype by wire tag
    pub fn from_u8(tag: u8) -> Option<Self> {
        DataType::ALL.iter().copied().find(|dt| dt.as_u8() == tag)
    }

    /// Schema keyword and JSON `type` name
    pub fn name(self) -> &'static str {
        use DataType::*;
        match self {
            NoData => "nodata",
            Data8 => "data8",
            Data16 => "data16",
            Data24 => "data24",
            Data32 => "data32",
            Data40 => "data40",
            Data48 => "data48",
            Data56 => "data56",
            Data64 => "data64",
            Bool => "bool",
            Map8 => "map8",
            Map16 => "map16",
            Map24 => "map24",
            Map32 => "map32",
            Map40 => "map40",
            Map48 => "map48",
            Map56 => "map56",
            Map64 => "map64",
            Uint8 => "uint8",
            Uint16 => "uint16",
            Uint24 => "uint24",
            Uint32 => "uint32",
            Uint40 => "uint40",
            Uint48 => "uint48",
            Uint56 => "uint56",
            Uint64 => "uint64",
            Int8 => "int8",
            Int16 => "int16",
            Int24 => "int24",
            Int32 => "int32",
            Int40 => "int40",
            Int48 => "int48",
            Int56 => "int56",
            Int64 => "int64",
            Enum8 => "enum8",
            Enum16 => "enum16",
            Semi => "semi",
            Single => "single",
            Double => "double",
            OctStr => "octstr",
            String => "string",
            OctStr16 => "octstr16",
            String16 => "string16",
            Array => "array",
            Struct => "struct",
            Set => "set",
            Bag => "bag",
            TimeOfDay => "ToD",
            Date => "date",
            Utc => "UTC",
            ClusterId => "clusterId",
            AttribId => "attribId",
            BacOid => "bacOID",
            Eui64 => "EUI64",
            Key128 => "key128",
            Unknown => "unk",
        }
    }

    /// Case-exact lookup by schema keyword
    pub fn from_name(name: &str) -> Option<Self> {
        DataType::ALL.iter().copied().find(|dt| dt.name() == name)
    }

    /// Family and byte width of fixed-width numeric types
    ///
    /// `width = 1 + (tag - first tag of the family)`.
    pub fn size_class(self) -> Option<(SizeClass, usize)> {
        let tag = self.as_u8();
        SIZE_CLASSES
            .iter()
            .find(|(_, first, last)| (first.as_u8()..=last.as_u8()).contains(&tag))
            .map(|(class, first, _)| (*class, 1 + (tag - first.as_u8()) as usize))
    }

    /// Whether values of this type are sequences with an element tag
    pub fn is_sequence(self) -> bool {
        matches!(self, DataType::Array | DataType::Set | DataType::Bag)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::from_name(s).ok_or_else(|| Error::schema(format!("unknown datatype '{}'", s)))
    }
}

impl TryFrom<u8> for DataType {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        DataType::from_u8(tag).ok_or(Error::UnknownDataType(tag))
    }
}
