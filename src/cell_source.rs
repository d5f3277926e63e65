//! Cell source: resolves 32-bit cell offsets to cell payloads.
//!
//! Cell offsets are relative to the first hive bin at file offset 0x1000 and
//! point at a length-prefixed cell record. The cell source owns the hive
//! data (memory-mapped or in-memory) and the hive-bin index built by
//! scanning all `hbin` headers at open time. The bin index backs
//! [`CellSource::index_of`], the validity probe used to mark advisory
//! corruption instead of failing traversal.

use crate::error::{RegistryError, Result};
use crate::hbin::{HbinHeader, HBIN_HEADER_SIZE};
use crate::header::BASE_BLOCK_SIZE;
use crate::utils::cell_offset_to_absolute;
use memmap2::Mmap;
use std::sync::Arc;
use tracing::debug;

/// A borrowed cell payload.
///
/// The slice excludes the leading 4-byte size field. It borrows from the
/// cell source and stays valid for the source's lifetime; the sub-keys
/// walker still copies index cells before recursing, see
/// [`crate::subkey_list::SubkeyList::parse`].
#[derive(Debug)]
pub struct Cell<'a> {
    /// Offset of this cell (relative to the first hive bin).
    pub offset: u32,

    /// Whether the cell is allocated (negative on-disk size) or free.
    pub is_allocated: bool,

    /// Cell payload, excluding the size field.
    pub data: &'a [u8],
}

/// Represents hive data storage.
pub(crate) enum HiveData {
    /// Memory-mapped file data.
    Mapped(Mmap),
    /// Owned data.
    Owned(Arc<Vec<u8>>),
}

impl HiveData {
    /// Returns a slice of the hive data.
    pub(crate) fn as_slice(&self) -> &[u8] {
        match self {
            HiveData::Mapped(mmap) => mmap,
            HiveData::Owned(data) => data,
        }
    }
}

/// Hive bin range in the bin index.
#[derive(Debug, Clone, Copy)]
struct BinRange {
    /// Bin offset relative to the first hive bin.
    offset: u32,

    /// Bin size in bytes, including the 32-byte header.
    size: u32,
}

/// Maps cell offsets to cell payloads over the hive data.
pub struct CellSource {
    data: HiveData,
    bins: Vec<BinRange>,
}

impl CellSource {
    /// Creates a cell source over hive data, scanning the hive bins.
    ///
    /// Scanning stops at the first region that does not carry an `hbin`
    /// signature (slack space past the last bin).
    ///
    /// # Errors
    ///
    /// Returns an error if the data is smaller than the base block or an
    /// hbin header is malformed.
    pub(crate) fn new(data: HiveData) -> Result<Self> {
        if data.as_slice().len() < BASE_BLOCK_SIZE {
            return Err(RegistryError::HiveTooSmall {
                size: data.as_slice().len(),
                minimum: BASE_BLOCK_SIZE,
            });
        }

        let bins = Self::scan_bins(&data.as_slice()[BASE_BLOCK_SIZE..])?;
        debug!(bins = bins.len(), "scanned hive bins");

        Ok(Self { data, bins })
    }

    fn scan_bins(bins_data: &[u8]) -> Result<Vec<BinRange>> {
        let mut bins = Vec::new();
        let mut offset = 0usize;

        while offset + HBIN_HEADER_SIZE <= bins_data.len() {
            let header = match HbinHeader::parse(&bins_data[offset..], offset as u32) {
                Ok(header) => header,
                // Slack past the last bin
                Err(RegistryError::InvalidSignature { .. }) => break,
                Err(e) => return Err(e),
            };

            if (header.size as usize) < HBIN_HEADER_SIZE {
                return Err(RegistryError::InvalidFormat(format!(
                    "Hbin at offset {:#x} has size {:#x}, smaller than its header",
                    offset, header.size
                )));
            }

            bins.push(BinRange {
                offset: offset as u32,
                size: header.size,
            });
            offset += header.size as usize;
        }

        Ok(bins)
    }

    /// Returns the cell payload at the given offset.
    ///
    /// # Arguments
    ///
    /// * `offset` - Cell offset (relative to first hbin).
    ///
    /// # Errors
    ///
    /// Returns an error if the offset or the cell's declared size falls
    /// outside the hive data.
    pub fn get(&self, offset: u32) -> Result<Cell<'_>> {
        let abs_offset = cell_offset_to_absolute(offset)? as usize;
        let data = self.data.as_slice();

        if abs_offset >= data.len() {
            return Err(RegistryError::invalid_offset(offset, data.len()));
        }

        // Read cell size
        if abs_offset + 4 > data.len() {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: 4,
                actual: data.len() - abs_offset,
            });
        }

        let size_bytes = &data[abs_offset..abs_offset + 4];
        let size = i32::from_le_bytes([size_bytes[0], size_bytes[1], size_bytes[2], size_bytes[3]]);

        let abs_size = size.unsigned_abs() as usize;

        if abs_size < 4 {
            return Err(RegistryError::invalid_cell_size(size, offset));
        }

        let data_start = abs_offset + 4;
        let data_end = abs_offset + abs_size;

        if data_end > data.len() {
            return Err(RegistryError::TruncatedData {
                offset,
                expected: abs_size,
                actual: data.len() - abs_offset,
            });
        }

        Ok(Cell {
            offset,
            is_allocated: size < 0,
            data: &data[data_start..data_end],
        })
    }

    /// Returns the index of the hive bin containing `offset`, or `None` if
    /// the offset is not inside any known bin.
    ///
    /// This is the validity probe used to skip dangling references while
    /// marking the owning key item corrupted. The sentinel 0xFFFFFFFF is
    /// never inside a bin.
    pub fn index_of(&self, offset: u32) -> Option<usize> {
        let index = self
            .bins
            .partition_point(|bin| bin.offset <= offset)
            .checked_sub(1)?;
        let bin = &self.bins[index];

        if offset < bin.offset + bin.size {
            Some(index)
        } else {
            None
        }
    }

    /// Returns the number of hive bins found at scan time.
    pub fn number_of_bins(&self) -> usize {
        self.bins.len()
    }

    /// Full hive data, for the base block parser.
    pub(crate) fn raw(&self) -> &[u8] {
        self.data.as_slice()
    }
}
