//! Utility functions for binary parsing and string conversion.

use crate::error::{RegistryError, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use encoding_rs::{Encoding, UTF_16LE, WINDOWS_1252};
use std::io::Cursor;

/// Offset where hive bins start (after base block)
pub const HBIN_START_OFFSET: u32 = 0x1000;

/// ASCII code page used to interpret compressed (single-byte) key and value
/// names.
///
/// Registry hives written on non-Latin systems store compressed names in the
/// system code page; callers that know it can pass a matching code page to
/// the name accessors. Defaults to Windows-1252.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AsciiCodepage(&'static Encoding);

impl AsciiCodepage {
    /// The Windows-1252 code page, the common default for western hives.
    pub fn windows_1252() -> Self {
        Self(WINDOWS_1252)
    }

    /// Resolves a code page by WHATWG label, e.g. `"windows-1251"`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnsupportedCodepage`] if the label is not a
    /// known encoding.
    pub fn for_label(label: &str) -> Result<Self> {
        Encoding::for_label(label.as_bytes())
            .map(Self)
            .ok_or_else(|| RegistryError::UnsupportedCodepage(label.to_string()))
    }

    /// Decodes single-byte name data with this code page.
    pub(crate) fn decode(&self, data: &[u8], offset: u32) -> Result<String> {
        let (decoded, had_errors) = self.0.decode_without_bom_handling(data);

        if had_errors {
            return Err(RegistryError::InvalidName { offset });
        }
        Ok(decoded.into_owned())
    }
}

impl Default for AsciiCodepage {
    fn default() -> Self {
        Self::windows_1252()
    }
}

/// Reads an ASCII string from a byte slice, trimming null terminators.
///
/// Registry strings are often null-terminated, so we trim trailing nulls.
/// Uses lossy conversion to handle any invalid UTF-8 bytes gracefully.
pub fn read_ascii_string(data: &[u8]) -> String {
    String::from_utf8_lossy(data)
        .trim_end_matches('\0')
        .to_string()
}

/// Reads a UTF-16LE string from a byte slice, trimming null terminators.
///
/// # Errors
///
/// Returns an error if the data length is not even (UTF-16 requires 2-byte
/// units) or if the UTF-16 decoding fails.
pub fn read_utf16_string(data: &[u8], offset: u32) -> Result<String> {
    if data.is_empty() {
        return Ok(String::new());
    }

    // UTF-16 requires even number of bytes
    if data.len() % 2 != 0 {
        return Err(RegistryError::InvalidUtf16 { offset });
    }

    let (decoded, _encoding, had_errors) = UTF_16LE.decode(data);

    if had_errors {
        return Err(RegistryError::InvalidUtf16 { offset });
    }

    // Trim null terminators (common in registry strings)
    Ok(decoded.trim_end_matches('\0').to_string())
}

/// Reads a fixed-length ASCII string (not null-terminated).
pub fn read_fixed_ascii(data: &[u8], len: usize) -> String {
    data.iter()
        .take(len)
        .map(|&b| if b == 0 { ' ' } else { b as char })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Reads a u32 from a byte slice at the given offset.
pub fn read_u32_le(data: &[u8], offset: usize) -> Result<u32> {
    if offset + 4 > data.len() {
        return Err(RegistryError::TruncatedData {
            offset: offset as u32,
            expected: 4,
            actual: data.len().saturating_sub(offset),
        });
    }

    let mut cursor = Cursor::new(&data[offset..offset + 4]);
    Ok(cursor.read_u32::<LittleEndian>()?)
}

/// Reads a u16 from a byte slice at the given offset.
pub fn read_u16_le(data: &[u8], offset: usize) -> Result<u16> {
    if offset + 2 > data.len() {
        return Err(RegistryError::TruncatedData {
            offset: offset as u32,
            expected: 2,
            actual: data.len().saturating_sub(offset),
        });
    }

    let mut cursor = Cursor::new(&data[offset..offset + 2]);
    Ok(cursor.read_u16::<LittleEndian>()?)
}

/// Reads an i32 from a byte slice at the given offset.
pub fn read_i32_le(data: &[u8], offset: usize) -> Result<i32> {
    if offset + 4 > data.len() {
        return Err(RegistryError::TruncatedData {
            offset: offset as u32,
            expected: 4,
            actual: data.len().saturating_sub(offset),
        });
    }

    let mut cursor = Cursor::new(&data[offset..offset + 4]);
    Ok(cursor.read_i32::<LittleEndian>()?)
}

/// Calculates XOR checksum for the first 508 bytes of the base block.
pub fn calculate_checksum(data: &[u8]) -> u32 {
    let mut checksum: u32 = 0;

    // XOR all DWORDs except the checksum field itself (at offset 0x1FC)
    for i in (0..0x1FC).step_by(4) {
        if i + 4 <= data.len() {
            if let Ok(dword) = read_u32_le(data, i) {
                checksum ^= dword;
            }
        }
    }

    checksum
}

/// Converts a relative cell offset to an absolute hive offset.
///
/// Cell offsets in the registry are relative to the first hbin (at 0x1000).
///
/// # Errors
///
/// Returns `RegistryError::InvalidOffset` if the addition would overflow.
#[inline]
pub fn cell_offset_to_absolute(cell_offset: u32) -> Result<u32> {
    cell_offset
        .checked_add(HBIN_START_OFFSET)
        .ok_or_else(|| RegistryError::InvalidOffset {
            offset: cell_offset,
            hive_size: 0,  // Not known at this point
        })
}

/// Converts an absolute hive offset to a relative cell offset.
///
/// # Errors
///
/// Returns `RegistryError::InvalidFormat` if the offset is before hbin start.
#[inline]
pub fn absolute_to_cell_offset(absolute_offset: u32) -> Result<u32> {
    if absolute_offset < HBIN_START_OFFSET {
        return Err(RegistryError::InvalidFormat(
            format!("Absolute offset {:#x} is before hbin start", absolute_offset)
        ));
    }
    Ok(absolute_offset - HBIN_START_OFFSET)
}
