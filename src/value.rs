//! Registry value (vk) parsing and data extraction.
//!
//! Value records are hydrated on demand through a key item's value list and
//! bounded cache; the data itself is fetched from the cell source only when
//! asked for.

use crate::bigdata::read_big_data;
use crate::cell_source::CellSource;
use crate::error::{RegistryError, Result};
use crate::utils::{read_ascii_string, read_i32_le, read_u16_le, read_u32_le, read_utf16_string};
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::Cursor;

/// Maximum size for direct cell storage; larger data uses big data blocks.
const MAX_DIRECT_DATA_SIZE: u32 = 16344;

/// Registry value data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// No value type.
    None,

    /// String (null-terminated).
    String,

    /// String with environment variables.
    ExpandString,

    /// Binary data.
    Binary,

    /// 32-bit little-endian integer.
    Dword,

    /// 32-bit big-endian integer.
    DwordBigEndian,

    /// Symbolic link (Unicode).
    Link,

    /// Multiple strings.
    MultiString,

    /// Resource list.
    ResourceList,

    /// Full resource descriptor.
    FullResourceDescriptor,

    /// Resource requirements list.
    ResourceRequirementsList,

    /// 64-bit little-endian integer.
    Qword,

    /// Unknown or non-standard value type.
    Unknown(u32),
}

impl ValueType {
    /// Parses a value type from a u32.
    ///
    /// Types 0-11 are predefined; anything else is preserved as
    /// `ValueType::Unknown`.
    pub fn from_u32(value: u32) -> Self {
        match value {
            0 => ValueType::None,
            1 => ValueType::String,
            2 => ValueType::ExpandString,
            3 => ValueType::Binary,
            4 => ValueType::Dword,
            5 => ValueType::DwordBigEndian,
            6 => ValueType::Link,
            7 => ValueType::MultiString,
            8 => ValueType::ResourceList,
            9 => ValueType::FullResourceDescriptor,
            10 => ValueType::ResourceRequirementsList,
            11 => ValueType::Qword,
            _ => ValueType::Unknown(value),
        }
    }

    /// Returns the REG_* name of this value type.
    pub fn name(&self) -> String {
        match self {
            ValueType::None => "REG_NONE".to_string(),
            ValueType::String => "REG_SZ".to_string(),
            ValueType::ExpandString => "REG_EXPAND_SZ".to_string(),
            ValueType::Binary => "REG_BINARY".to_string(),
            ValueType::Dword => "REG_DWORD".to_string(),
            ValueType::DwordBigEndian => "REG_DWORD_BIG_ENDIAN".to_string(),
            ValueType::Link => "REG_LINK".to_string(),
            ValueType::MultiString => "REG_MULTI_SZ".to_string(),
            ValueType::ResourceList => "REG_RESOURCE_LIST".to_string(),
            ValueType::FullResourceDescriptor => "REG_FULL_RESOURCE_DESCRIPTOR".to_string(),
            ValueType::ResourceRequirementsList => "REG_RESOURCE_REQUIREMENTS_LIST".to_string(),
            ValueType::Qword => "REG_QWORD".to_string(),
            ValueType::Unknown(value) => format!("REG_UNKNOWN_{:#010x}", value),
        }
    }
}

/// Value key (vk) structure.
#[derive(Debug, Clone)]
pub struct ValueKey {
    /// Length of value name.
    pub name_length: u16,

    /// Length of value data.
    pub data_length: u32,

    /// Offset to value data (or inline data if the inline bit is set).
    pub data_offset: u32,

    /// Value data type.
    pub data_type: ValueType,

    /// Flags (0x0001 = name is ASCII).
    pub flags: u16,

    /// Value name; "(default)" for the unnamed value.
    pub name: String,

    /// The data-length high bit: data is stored in the offset field.
    inline: bool,
}

impl ValueKey {
    /// Parses a value key from cell data.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is malformed or truncated.
    pub fn parse(data: &[u8], offset: u32) -> Result<Self> {
        if data.len() < 20 {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: 20,
                actual: data.len(),
            });
        }

        // Verify signature
        if &data[0..2] != b"vk" {
            return Err(RegistryError::InvalidFormat(format!(
                "Expected 'vk' signature at offset {:#x}",
                offset
            )));
        }

        let name_length = read_u16_le(data, 0x02)?;

        // High bit of the data length marks inline storage
        let data_length_raw = read_i32_le(data, 0x04)?;
        let inline = (data_length_raw as u32 & 0x8000_0000) != 0;
        let data_length = (data_length_raw & 0x7FFF_FFFF) as u32;

        let data_offset = read_u32_le(data, 0x08)?;
        let data_type = ValueType::from_u32(read_u32_le(data, 0x0C)?);
        let flags = read_u16_le(data, 0x10)?;

        // Value name starts at offset 0x14
        let name = if name_length > 0 {
            let name_end = 0x14 + name_length as usize;
            if name_end > data.len() {
                return Err(RegistryError::TruncatedData {
                    offset,
                    expected: name_end,
                    actual: data.len(),
                });
            }

            let name_data = &data[0x14..name_end];

            if (flags & 0x0001) != 0 {
                read_ascii_string(name_data)
            } else {
                read_utf16_string(name_data, offset)?
            }
        } else {
            String::from("(default)")
        };

        Ok(ValueKey {
            name_length,
            data_length,
            data_offset,
            data_type,
            flags,
            name,
            inline,
        })
    }

    /// Returns true if the data is stored inline in the offset field.
    pub fn is_inline_data(&self) -> bool {
        self.inline && self.data_length <= 4
    }

    /// Extracts inline data (when stored in the offset field).
    pub fn inline_data(&self) -> Vec<u8> {
        let bytes = self.data_offset.to_le_bytes();
        bytes[..(self.data_length as usize).min(4)].to_vec()
    }

    /// Reads the raw value data bytes from the cell source.
    ///
    /// Handles inline storage and big data blocks (data > 16,344 bytes).
    pub fn read_data(&self, source: &CellSource) -> Result<Vec<u8>> {
        if self.data_length == 0 {
            return Ok(Vec::new());
        }
        if self.is_inline_data() {
            return Ok(self.inline_data());
        }
        if self.data_offset == 0xFFFFFFFF || self.data_offset == 0 {
            return Ok(Vec::new());
        }
        if self.data_length > MAX_DIRECT_DATA_SIZE {
            return read_big_data(source, self.data_offset, self.data_length);
        }

        let cell = source.get(self.data_offset)?;
        let length = self.data_length as usize;

        if cell.data.len() < length {
            return Err(RegistryError::TruncatedData {
                offset: self.data_offset,
                expected: length,
                actual: cell.data.len(),
            });
        }

        // Cells round up to 8 bytes; slack past the data length is padding
        Ok(cell.data[..length].to_vec())
    }

    /// Reads and decodes the value data.
    pub fn data(&self, source: &CellSource) -> Result<ValueData> {
        let raw = self.read_data(source)?;
        ValueData::parse(&raw, self.data_type, self.data_offset)
    }
}

/// Parsed registry value data.
#[derive(Debug, Clone)]
pub enum ValueData {
    /// No data.
    None,

    /// String value.
    String(String),

    /// Expandable string value.
    ExpandString(String),

    /// Binary data.
    Binary(Vec<u8>),

    /// 32-bit integer.
    Dword(u32),

    /// 32-bit big-endian integer.
    DwordBigEndian(u32),

    /// Multiple strings.
    MultiString(Vec<String>),

    /// 64-bit integer.
    Qword(u64),

    /// Unknown or unsupported type.
    Unknown(Vec<u8>),
}

impl ValueData {
    /// Parses value data based on the value type.
    pub fn parse(data: &[u8], value_type: ValueType, offset: u32) -> Result<Self> {
        if data.is_empty() {
            return Ok(ValueData::None);
        }

        match value_type {
            ValueType::None => Ok(ValueData::None),

            ValueType::String | ValueType::ExpandString => {
                let s = read_utf16_string(data, offset)?;
                if value_type == ValueType::String {
                    Ok(ValueData::String(s))
                } else {
                    Ok(ValueData::ExpandString(s))
                }
            }

            ValueType::Binary => Ok(ValueData::Binary(data.to_vec())),

            ValueType::Dword => {
                if data.len() < 4 {
                    return Err(RegistryError::TruncatedData {
                        offset,
                        expected: 4,
                        actual: data.len(),
                    });
                }
                let mut cursor = Cursor::new(data);
                Ok(ValueData::Dword(cursor.read_u32::<LittleEndian>()?))
            }

            ValueType::DwordBigEndian => {
                if data.len() < 4 {
                    return Err(RegistryError::TruncatedData {
                        offset,
                        expected: 4,
                        actual: data.len(),
                    });
                }
                let mut cursor = Cursor::new(data);
                Ok(ValueData::DwordBigEndian(cursor.read_u32::<BigEndian>()?))
            }

            ValueType::Qword => {
                if data.len() < 8 {
                    return Err(RegistryError::TruncatedData {
                        offset,
                        expected: 8,
                        actual: data.len(),
                    });
                }
                let mut cursor = Cursor::new(data);
                Ok(ValueData::Qword(cursor.read_u64::<LittleEndian>()?))
            }

            ValueType::MultiString => {
                let full_string = read_utf16_string(data, offset)?;
                let strings: Vec<String> = full_string
                    .split('\0')
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
                    .collect();
                Ok(ValueData::MultiString(strings))
            }

            // For other types, return raw binary data
            _ => Ok(ValueData::Unknown(data.to_vec())),
        }
    }
}

impl fmt::Display for ValueData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueData::None => write!(f, "(none)"),
            ValueData::String(s) | ValueData::ExpandString(s) => write!(f, "{}", s),
            ValueData::Binary(b) => write!(f, "{:02X?}", b),
            ValueData::Dword(d) => write!(f, "{} (0x{:08X})", d, d),
            ValueData::DwordBigEndian(d) => write!(f, "{} (0x{:08X})", d, d),
            ValueData::Qword(q) => write!(f, "{} (0x{:016X})", q, q),
            ValueData::MultiString(strings) => write!(f, "{}", strings.join(", ")),
            ValueData::Unknown(b) => write!(f, "{:02X?}", b),
        }
    }
}
