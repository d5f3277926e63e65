//! Named key (nk) cell parsing and key name handling.

use crate::error::{RegistryError, Result};
use crate::utils::{read_u16_le, read_u32_le, read_utf16_string, AsciiCodepage};
use tracing::warn;

/// Minimum size of a named key structure in bytes.
const NAMED_KEY_MIN_SIZE: usize = 76;

/// Offset of the key name in the named key structure.
const KEY_NAME_OFFSET: usize = 0x4C;

/// Flags stored in a named key cell.
#[derive(Debug, Clone, Copy)]
pub struct KeyFlags(pub u16);

impl KeyFlags {
    /// Key is volatile (not stored on disk).
    pub const VOLATILE: u16 = 0x0001;

    /// Key is a mount point for another hive.
    pub const HIVE_EXIT: u16 = 0x0002;

    /// Key is the root key.
    pub const ROOT_KEY: u16 = 0x0004;

    /// Key cannot be deleted.
    pub const NO_DELETE: u16 = 0x0008;

    /// Key is a symbolic link.
    pub const SYM_LINK: u16 = 0x0010;

    /// Key name is in compressed format (single-byte, code-page encoded).
    pub const COMP_NAME: u16 = 0x0020;

    /// Key is a predefined handle.
    pub const PREDEF_HANDLE: u16 = 0x0040;

    /// Creates a new KeyFlags from a u16 value.
    pub fn new(flags: u16) -> Self {
        Self(flags)
    }

    /// Returns true if the specified flag is set.
    pub fn has_flag(&self, flag: u16) -> bool {
        (self.0 & flag) != 0
    }

    /// Returns true if the key name is compressed (single-byte).
    pub fn is_compressed(&self) -> bool {
        self.has_flag(Self::COMP_NAME)
    }

    /// Returns true if this is a volatile key.
    pub fn is_volatile(&self) -> bool {
        self.has_flag(Self::VOLATILE)
    }

    /// Returns true if this is the root key.
    pub fn is_root(&self) -> bool {
        self.has_flag(Self::ROOT_KEY)
    }
}

/// Computes the 32-bit name hash stored by hash leaf (lh) index entries.
///
/// Characters are folded to ASCII upper case before hashing; the hash of a
/// compressed name and of the equivalent UTF-16LE name are identical for
/// ASCII-range names.
pub fn name_hash(name: &[u8], compressed: bool) -> u32 {
    let mut hash: u32 = 0;

    if compressed {
        for &byte in name {
            hash = hash
                .wrapping_mul(37)
                .wrapping_add(u32::from(byte.to_ascii_uppercase()));
        }
    } else {
        for unit in name.chunks_exact(2) {
            let mut c = u32::from(u16::from_le_bytes([unit[0], unit[1]]));
            if (0x61..=0x7A).contains(&c) {
                c -= 0x20;
            }
            hash = hash.wrapping_mul(37).wrapping_add(c);
        }
    }
    hash
}

/// Named key (nk) structure.
///
/// The key name is kept as the raw on-disk bytes; it is either single-byte
/// data in the hive's ASCII code page (when [`KeyFlags::COMP_NAME`] is set)
/// or UTF-16LE. Conversion happens on access so that name comparisons can
/// short-circuit on the stored hash without decoding.
#[derive(Debug, Clone)]
pub struct NamedKey {
    /// Flags for this key.
    pub flags: KeyFlags,

    /// Last written timestamp (Windows FILETIME).
    pub last_written: u64,

    /// Offset to the parent key cell.
    pub parent_offset: u32,

    /// Number of sub keys.
    pub number_of_sub_keys: u32,

    /// Offset to the sub-keys index cell (0xFFFFFFFF = none).
    pub sub_keys_list_offset: u32,

    /// Number of values.
    pub number_of_values: u32,

    /// Offset to the values list cell (0xFFFFFFFF = none).
    pub values_list_offset: u32,

    /// Offset to the security key cell (0xFFFFFFFF = none).
    pub security_key_offset: u32,

    /// Offset to the class name cell (0xFFFFFFFF = none).
    pub class_name_offset: u32,

    /// Size of the class name in bytes (UTF-16LE).
    pub class_name_size: u16,

    /// Raw key name bytes.
    name: Vec<u8>,

    /// Hash of the name, computed at parse time.
    name_hash: u32,
}

impl NamedKey {
    /// Parses a named key from cell data.
    ///
    /// `expected_hash` is the hash stored by the parent's index entry (0 when
    /// the parent index carried none, e.g. for the root key or `li` leaves).
    /// A mismatch against the computed hash is advisory and only logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is malformed or truncated.
    pub fn parse(data: &[u8], offset: u32, expected_hash: u32) -> Result<Self> {
        if data.len() < NAMED_KEY_MIN_SIZE {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: NAMED_KEY_MIN_SIZE,
                actual: data.len(),
            });
        }

        // Verify signature
        if &data[0..2] != b"nk" {
            return Err(RegistryError::InvalidFormat(format!(
                "Expected 'nk' signature at offset {:#x}",
                offset
            )));
        }

        let flags = KeyFlags::new(read_u16_le(data, 0x02)?);

        // Last written timestamp at offset 0x04 (8 bytes)
        let last_written = u64::from(read_u32_le(data, 0x04)?)
            | (u64::from(read_u32_le(data, 0x08)?) << 32);

        let parent_offset = read_u32_le(data, 0x10)?;
        let number_of_sub_keys = read_u32_le(data, 0x14)?;
        let sub_keys_list_offset = read_u32_le(data, 0x1C)?;
        let number_of_values = read_u32_le(data, 0x24)?;
        let values_list_offset = read_u32_le(data, 0x28)?;
        let security_key_offset = read_u32_le(data, 0x2C)?;
        let class_name_offset = read_u32_le(data, 0x30)?;

        let name_size = read_u16_le(data, 0x48)?;
        let class_name_size = read_u16_le(data, 0x4A)?;

        // Key name starts at offset 0x4C
        let name_end = KEY_NAME_OFFSET + name_size as usize;
        if name_end > data.len() {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: name_end,
                actual: data.len(),
            });
        }
        let name = data[KEY_NAME_OFFSET..name_end].to_vec();

        let computed_hash = name_hash(&name, flags.is_compressed());

        if expected_hash != 0 && expected_hash != computed_hash {
            warn!(
                offset = %format!("{:#x}", offset),
                expected = %format!("{:#010x}", expected_hash),
                computed = %format!("{:#010x}", computed_hash),
                "Name hash mismatch with parent index entry"
            );
        }

        Ok(NamedKey {
            flags,
            last_written,
            parent_offset,
            number_of_sub_keys,
            sub_keys_list_offset,
            number_of_values,
            values_list_offset,
            security_key_offset,
            class_name_offset,
            class_name_size,
            name,
            name_hash: computed_hash,
        })
    }

    /// Returns the raw key name bytes.
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// Returns the size of the raw key name in bytes.
    pub fn name_size(&self) -> usize {
        self.name.len()
    }

    /// Returns the hash of the key name.
    pub fn name_hash(&self) -> u32 {
        self.name_hash
    }

    /// Returns the key name decoded to a UTF-8 string.
    ///
    /// Compressed names are decoded with `codepage`; uncompressed names are
    /// UTF-16LE.
    pub fn utf8_name(&self, codepage: AsciiCodepage) -> Result<String> {
        if self.flags.is_compressed() {
            codepage.decode(&self.name, 0)
        } else {
            read_utf16_string(&self.name, 0)
        }
    }

    /// Returns the key name as UTF-16 code units.
    pub fn utf16_name(&self, codepage: AsciiCodepage) -> Result<Vec<u16>> {
        if self.flags.is_compressed() {
            Ok(codepage.decode(&self.name, 0)?.encode_utf16().collect())
        } else {
            Ok(self
                .name
                .chunks_exact(2)
                .map(|unit| u16::from_le_bytes([unit[0], unit[1]]))
                .collect())
        }
    }

    /// Compares the key name with a UTF-8 string, case-insensitive in the
    /// ASCII range.
    ///
    /// When `hash` is non-zero it is checked against the stored name hash
    /// first; a mismatch returns `false` without decoding the name.
    pub fn compare_name_with_utf8(
        &self,
        hash: u32,
        other: &str,
        codepage: AsciiCodepage,
    ) -> Result<bool> {
        if hash != 0 && self.name_hash != 0 && hash != self.name_hash {
            return Ok(false);
        }
        let own = self.utf8_name(codepage)?;
        Ok(own.eq_ignore_ascii_case(other))
    }

    /// Compares the key name with a UTF-16 string, case-insensitive in the
    /// ASCII range.
    ///
    /// Same hash fast path as [`NamedKey::compare_name_with_utf8`].
    pub fn compare_name_with_utf16(
        &self,
        hash: u32,
        other: &[u16],
        codepage: AsciiCodepage,
    ) -> Result<bool> {
        if hash != 0 && self.name_hash != 0 && hash != self.name_hash {
            return Ok(false);
        }
        let own = self.utf16_name(codepage)?;
        Ok(eq_utf16_ignore_ascii_case(&own, other))
    }

    /// Returns the last written timestamp as a Windows FILETIME value.
    pub fn last_written_time(&self) -> u64 {
        self.last_written
    }

    /// Converts the last written timestamp to a UTC datetime.
    pub fn last_written_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        // Windows FILETIME is 100-nanosecond intervals since 1601-01-01
        // Unix epoch is 1970-01-01, difference is 11644473600 seconds
        const FILETIME_UNIX_DIFF: i64 = 11644473600;

        let seconds = (self.last_written / 10_000_000) as i64 - FILETIME_UNIX_DIFF;
        let nanos = ((self.last_written % 10_000_000) * 100) as u32;

        chrono::DateTime::from_timestamp(seconds, nanos)
    }

    /// Returns true if this key has sub keys.
    pub fn has_sub_keys(&self) -> bool {
        self.number_of_sub_keys > 0
    }

    /// Returns true if this key has values.
    pub fn has_values(&self) -> bool {
        self.number_of_values > 0
    }

    /// Returns true if this is the root key.
    pub fn is_root(&self) -> bool {
        self.flags.is_root()
    }
}

fn eq_utf16_ignore_ascii_case(a: &[u16], b: &[u16]) -> bool {
    fn fold(c: u16) -> u16 {
        if (0x61..=0x7A).contains(&c) {
            c - 0x20
        } else {
            c
        }
    }

    a.len() == b.len() && a.iter().zip(b).all(|(&x, &y)| fold(x) == fold(y))
}
