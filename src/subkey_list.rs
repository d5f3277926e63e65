//! Sub-keys index cell parsing (lf, lh, li, ri).
//!
//! A key with sub keys points at an index cell. Leaf indexes (`lf`, `lh`,
//! `li`) reference named key cells directly; an index root (`ri`) references
//! further index cells and may nest.

use crate::error::{RegistryError, Result};
use crate::utils::read_u32_le;

/// Size of the index cell header: 2-byte signature + 2-byte element count.
const SUBKEY_LIST_HEADER_SIZE: usize = 4;

/// Sub-keys index cell types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubkeyListType {
    /// Index leaf (li) - offsets only.
    IndexLeaf,

    /// Fast leaf (lf) - offsets with a name hint (first 4 name characters).
    FastLeaf,

    /// Hash leaf (lh) - offsets with a 32-bit name hash.
    HashLeaf,

    /// Index root (ri) - offsets of further index cells.
    IndexRoot,
}

impl SubkeyListType {
    /// Parses an index cell type from a 2-byte signature.
    ///
    /// Unknown signatures are fatal: the element width cannot be guessed.
    pub fn from_signature(sig: &[u8; 2]) -> Result<Self> {
        match sig {
            b"li" => Ok(SubkeyListType::IndexLeaf),
            b"lf" => Ok(SubkeyListType::FastLeaf),
            b"lh" => Ok(SubkeyListType::HashLeaf),
            b"ri" => Ok(SubkeyListType::IndexRoot),
            _ => Err(RegistryError::InvalidSubkeyList { list_type: *sig }),
        }
    }

    /// Width of one element in bytes.
    pub fn element_size(&self) -> usize {
        match self {
            SubkeyListType::FastLeaf | SubkeyListType::HashLeaf => 8,
            SubkeyListType::IndexLeaf | SubkeyListType::IndexRoot => 4,
        }
    }

    /// Returns true if the pointed-to cells are named keys rather than
    /// further index cells.
    pub fn is_leaf(&self) -> bool {
        !matches!(self, SubkeyListType::IndexRoot)
    }
}

/// Leaf index entry.
#[derive(Debug, Clone, Copy)]
pub struct SubkeyEntry {
    /// Offset of the named key cell.
    pub key_offset: u32,

    /// Stored name hash (`lf`/`lh`), 0 for `li` entries.
    pub name_hash: u32,
}

/// Parsed sub-keys index cell.
///
/// Parsing copies the entries out of the cell buffer, so the result stays
/// usable while further cells are fetched from the same source.
#[derive(Debug, Clone)]
pub enum SubkeyList {
    /// Leaf level: entries reference named key cells.
    Leaf(Vec<SubkeyEntry>),

    /// Index root: offsets reference further index cells.
    IndexRoot(Vec<u32>),
}

impl SubkeyList {
    /// Parses a sub-keys index cell.
    ///
    /// # Errors
    ///
    /// Returns an error on an unknown signature or when the cell is too
    /// small for its declared element count.
    pub fn parse(data: &[u8], offset: u32) -> Result<Self> {
        if data.len() < SUBKEY_LIST_HEADER_SIZE {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: SUBKEY_LIST_HEADER_SIZE,
                actual: data.len(),
            });
        }

        let list_type = SubkeyListType::from_signature(&[data[0], data[1]])?;
        let count = u16::from_le_bytes([data[2], data[3]]) as usize;

        let expected_size = SUBKEY_LIST_HEADER_SIZE + count * list_type.element_size();
        if data.len() < expected_size {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: expected_size,
                actual: data.len(),
            });
        }

        match list_type {
            SubkeyListType::IndexRoot => {
                let mut offsets = Vec::with_capacity(count);
                for i in 0..count {
                    offsets.push(read_u32_le(data, SUBKEY_LIST_HEADER_SIZE + i * 4)?);
                }
                Ok(SubkeyList::IndexRoot(offsets))
            }

            SubkeyListType::IndexLeaf => {
                let mut entries = Vec::with_capacity(count);
                for i in 0..count {
                    entries.push(SubkeyEntry {
                        key_offset: read_u32_le(data, SUBKEY_LIST_HEADER_SIZE + i * 4)?,
                        name_hash: 0,
                    });
                }
                Ok(SubkeyList::Leaf(entries))
            }

            SubkeyListType::FastLeaf | SubkeyListType::HashLeaf => {
                let mut entries = Vec::with_capacity(count);
                for i in 0..count {
                    let entry_pos = SUBKEY_LIST_HEADER_SIZE + i * 8;
                    entries.push(SubkeyEntry {
                        key_offset: read_u32_le(data, entry_pos)?,
                        name_hash: read_u32_le(data, entry_pos + 4)?,
                    });
                }
                Ok(SubkeyList::Leaf(entries))
            }
        }
    }

    /// Returns the number of entries in this index cell.
    pub fn len(&self) -> usize {
        match self {
            SubkeyList::Leaf(entries) => entries.len(),
            SubkeyList::IndexRoot(offsets) => offsets.len(),
        }
    }

    /// Returns true if this index cell has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
