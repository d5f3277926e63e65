//! Registry hive handle with memory-mapped file support.

use crate::cell_source::{CellSource, HiveData};
use crate::error::{RegistryError, Result};
use crate::header::{BaseBlock, BASE_BLOCK_SIZE};
use crate::tree::KeyTreeNode;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// An opened registry hive.
///
/// Owns the hive data (memory-mapped or in-memory), the parsed base block
/// and the cell source built over the hive bins. Keys hydrate lazily from
/// the root node, see [`KeyTreeNode`].
pub struct Hive {
    source: CellSource,
    base_block: BaseBlock,
}

impl Hive {
    /// Opens a registry hive file read-only via memory mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, is too small, or its
    /// base block or bin layout is invalid.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use reg_reader::Hive;
    ///
    /// let hive = Hive::open("SYSTEM").unwrap();
    /// ```
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Opening registry hive");
        let file = File::open(&path)?;

        // Validate file size BEFORE creating memory map
        let file_size = file.metadata()?.len() as usize;
        if file_size < BASE_BLOCK_SIZE {
            return Err(RegistryError::HiveTooSmall {
                size: file_size,
                minimum: BASE_BLOCK_SIZE,
            });
        }

        // SAFETY: This is safe because:
        // 1. The file is opened in read-only mode (no write access)
        // 2. The file size has been validated to be at least BASE_BLOCK_SIZE
        // 3. The mmap lifetime is tied to the Hive lifetime
        // 4. All access to the mmap is bounds-checked by the cell source
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        debug!(size = mmap.len(), "Memory mapped hive file");

        Self::from_data(HiveData::Mapped(mmap))
    }

    /// Creates a hive from owned in-memory data.
    pub fn from_vec(data: Vec<u8>) -> Result<Self> {
        Self::from_data(HiveData::Owned(Arc::new(data)))
    }

    fn from_data(data: HiveData) -> Result<Self> {
        let source = CellSource::new(data)?;
        let base_block = BaseBlock::parse(source.raw())?;

        debug!(
            version = %format!("{}.{}", base_block.major_version, base_block.minor_version),
            root = %format!("{:#x}", base_block.root_cell_offset),
            "Parsed base block"
        );

        Ok(Self { source, base_block })
    }

    /// Returns the parsed base block header.
    pub fn base_block(&self) -> &BaseBlock {
        &self.base_block
    }

    /// Returns the cell source for this hive.
    pub fn cell_source(&self) -> &CellSource {
        &self.source
    }

    /// Returns an unhydrated tree node for the root key.
    ///
    /// The root has no parent index entry, so its name hash is 0.
    pub fn root_node(&self) -> KeyTreeNode {
        KeyTreeNode::new(self.base_block.root_cell_offset, 0)
    }
}
