//! Big data block (db) parsing.
//!
//! Registry values larger than 16,344 bytes are stored in big data blocks,
//! which consist of a header cell followed by a list of data segments.

use crate::cell_source::CellSource;
use crate::error::{RegistryError, Result};
use crate::utils::{read_u16_le, read_u32_le};
use tracing::debug;

/// Big data block header structure.
///
/// Format:
/// ```text
/// Offset  Size  Description
/// 0x00    2     Signature ("db")
/// 0x02    2     Number of segments
/// 0x04    4     Offset to segment list
/// ```
#[derive(Debug, Clone)]
pub struct BigDataBlock {
    /// Number of data segments
    pub segment_count: u16,

    /// Offset to the list of segment offsets
    pub segment_list_offset: u32,
}

impl BigDataBlock {
    /// Minimum size of a big data block header
    const MIN_SIZE: usize = 8;

    /// Parses a big data block header from cell data.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is malformed or truncated.
    pub fn parse(data: &[u8], offset: u32) -> Result<Self> {
        if data.len() < Self::MIN_SIZE {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: Self::MIN_SIZE,
                actual: data.len(),
            });
        }

        // Verify signature
        if &data[0..2] != b"db" {
            return Err(RegistryError::InvalidFormat(format!(
                "Expected 'db' signature at offset {:#x}, found {:?}",
                offset,
                &data[0..2]
            )));
        }

        let segment_count = read_u16_le(data, 0x02)?;
        let segment_list_offset = read_u32_le(data, 0x04)?;

        Ok(BigDataBlock {
            segment_count,
            segment_list_offset,
        })
    }
}

/// Reads segmented big-data value content.
///
/// The header cell points at a list of segment cell offsets; segments are
/// concatenated and truncated to `expected_length`.
///
/// # Errors
///
/// Returns an error if the structure is corrupted or a segment is missing.
pub fn read_big_data(
    source: &CellSource,
    offset: u32,
    expected_length: u32,
) -> Result<Vec<u8>> {
    debug!(
        offset = %format!("{:#x}", offset),
        expected_length,
        "Reading big data block"
    );

    let header_cell = source.get(offset)?;
    let header = BigDataBlock::parse(header_cell.data, offset)?;

    let segment_list_cell = source.get(header.segment_list_offset)?;
    let expected_list_size = header.segment_count as usize * 4;

    if segment_list_cell.data.len() < expected_list_size {
        return Err(RegistryError::TruncatedData {
            offset: header.segment_list_offset,
            expected: expected_list_size,
            actual: segment_list_cell.data.len(),
        });
    }

    let mut segment_offsets = Vec::with_capacity(header.segment_count as usize);
    for i in 0..header.segment_count as usize {
        // High bit flags the segment as big-data content; clear it to get
        // the actual offset
        let segment_offset = read_u32_le(segment_list_cell.data, i * 4)? & 0x7FFF_FFFF;
        segment_offsets.push(segment_offset);
    }

    let mut data = Vec::with_capacity(expected_length as usize);
    for segment_offset in segment_offsets {
        let segment = source.get(segment_offset)?;
        data.extend_from_slice(segment.data);

        if data.len() >= expected_length as usize {
            break;
        }
    }

    // Segments round up; trim to the declared length
    data.truncate(expected_length as usize);

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bigdata_minimum_size() {
        let data = vec![0u8; 7];
        let result = BigDataBlock::parse(&data, 0);
        assert!(result.is_err());
    }

    #[test]
    fn test_bigdata_invalid_signature() {
        let mut data = vec![0u8; 8];
        data[0..2].copy_from_slice(b"XX");
        let result = BigDataBlock::parse(&data, 0);
        assert!(result.is_err());
    }

    #[test]
    fn test_bigdata_valid() {
        let mut data = vec![0u8; 8];
        data[0..2].copy_from_slice(b"db");
        data[2..4].copy_from_slice(&5u16.to_le_bytes());
        data[4..8].copy_from_slice(&0x20u32.to_le_bytes());

        let db = BigDataBlock::parse(&data, 0).unwrap();
        assert_eq!(db.segment_count, 5);
        assert_eq!(db.segment_list_offset, 0x20);
    }
}
