//! Shared helpers for building synthetic hive images in memory.
//!
//! The builder lays out a base block followed by a single hive bin and
//! returns cell offsets as it goes, so tests can wire keys, indexes and
//! values together without fixture files.

// Not every test binary uses every helper
#![allow(dead_code)]

use reg_reader::utils::calculate_checksum;

/// Size of the base block.
const BASE_BLOCK_SIZE: usize = 0x1000;

/// Size of an hbin header.
const HBIN_HEADER_SIZE: usize = 0x20;

/// Builds a hive image of one hive bin with sequentially allocated cells.
#[derive(Default)]
pub struct HiveBuilder {
    cells: Vec<u8>,
}

impl HiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cell offset the next [`HiveBuilder::add_cell`] call will
    /// allocate, for building self- or forward-referencing cells.
    pub fn next_offset(&self) -> u32 {
        (HBIN_HEADER_SIZE + self.cells.len()) as u32
    }

    /// Appends an allocated cell with the given payload, returning its cell
    /// offset (relative to the first hive bin).
    pub fn add_cell(&mut self, payload: &[u8]) -> u32 {
        let offset = HBIN_HEADER_SIZE + self.cells.len();
        let total = 4 + payload.len();
        // Cells are 8-byte aligned
        let padded = (total + 7) & !7;

        self.cells
            .extend_from_slice(&(-(padded as i32)).to_le_bytes());
        self.cells.extend_from_slice(payload);
        self.cells.resize(self.cells.len() + (padded - total), 0);

        offset as u32
    }

    /// Assembles the hive image with `root_offset` as the root key cell.
    pub fn build(&self, root_offset: u32) -> Vec<u8> {
        let content_size = HBIN_HEADER_SIZE + self.cells.len();
        let bin_size = ((content_size + 0xFFF) & !0xFFF).max(0x1000);

        let mut image = vec![0u8; BASE_BLOCK_SIZE];
        image[0..4].copy_from_slice(b"regf");
        image[0x04..0x08].copy_from_slice(&1u32.to_le_bytes());
        image[0x08..0x0C].copy_from_slice(&1u32.to_le_bytes());
        // Version 1.5
        image[0x14..0x18].copy_from_slice(&1u32.to_le_bytes());
        image[0x18..0x1C].copy_from_slice(&5u32.to_le_bytes());
        // File format: direct memory load
        image[0x20..0x24].copy_from_slice(&1u32.to_le_bytes());
        image[0x24..0x28].copy_from_slice(&root_offset.to_le_bytes());
        image[0x28..0x2C].copy_from_slice(&(bin_size as u32).to_le_bytes());

        let checksum = calculate_checksum(&image);
        image[0x1FC..0x200].copy_from_slice(&checksum.to_le_bytes());

        // Hive bin header
        let bin_start = image.len();
        image.resize(bin_start + HBIN_HEADER_SIZE, 0);
        image[bin_start..bin_start + 4].copy_from_slice(b"hbin");
        image[bin_start + 8..bin_start + 12].copy_from_slice(&(bin_size as u32).to_le_bytes());

        image.extend_from_slice(&self.cells);

        // Remaining bin space becomes one free cell
        let remainder = bin_size - content_size;
        if remainder > 0 {
            let free_start = image.len();
            image.resize(bin_start + bin_size, 0);
            image[free_start..free_start + 4]
                .copy_from_slice(&(remainder as i32).to_le_bytes());
        }

        image
    }
}

/// Builds named key (nk) cell payloads.
pub struct NkCell {
    name: String,
    flags: u16,
    timestamp: u64,
    sub_keys: (u32, u32),
    values: (u32, u32),
    security_offset: u32,
    class_name: (u32, u16),
}

impl NkCell {
    /// A key with a compressed (ASCII) name and no references.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            // COMP_NAME
            flags: 0x0020,
            timestamp: 0,
            sub_keys: (0, 0xFFFFFFFF),
            values: (0, 0xFFFFFFFF),
            security_offset: 0xFFFFFFFF,
            class_name: (0xFFFFFFFF, 0),
        }
    }

    /// Stores the name as UTF-16LE instead of compressed ASCII.
    pub fn utf16_name(mut self) -> Self {
        self.flags &= !0x0020;
        self
    }

    pub fn sub_keys(mut self, count: u32, list_offset: u32) -> Self {
        self.sub_keys = (count, list_offset);
        self
    }

    pub fn values(mut self, count: u32, list_offset: u32) -> Self {
        self.values = (count, list_offset);
        self
    }

    pub fn security(mut self, offset: u32) -> Self {
        self.security_offset = offset;
        self
    }

    pub fn class_name(mut self, offset: u32, size: u16) -> Self {
        self.class_name = (offset, size);
        self
    }

    pub fn timestamp(mut self, filetime: u64) -> Self {
        self.timestamp = filetime;
        self
    }

    pub fn bytes(&self) -> Vec<u8> {
        let name_bytes: Vec<u8> = if self.flags & 0x0020 != 0 {
            self.name.as_bytes().to_vec()
        } else {
            self.name
                .encode_utf16()
                .flat_map(|unit| unit.to_le_bytes())
                .collect()
        };

        let mut data = vec![0u8; 0x4C + name_bytes.len()];
        data[0..2].copy_from_slice(b"nk");
        data[0x02..0x04].copy_from_slice(&self.flags.to_le_bytes());
        data[0x04..0x0C].copy_from_slice(&self.timestamp.to_le_bytes());
        data[0x14..0x18].copy_from_slice(&self.sub_keys.0.to_le_bytes());
        data[0x1C..0x20].copy_from_slice(&self.sub_keys.1.to_le_bytes());
        data[0x24..0x28].copy_from_slice(&self.values.0.to_le_bytes());
        data[0x28..0x2C].copy_from_slice(&self.values.1.to_le_bytes());
        data[0x2C..0x30].copy_from_slice(&self.security_offset.to_le_bytes());
        data[0x30..0x34].copy_from_slice(&self.class_name.0.to_le_bytes());
        data[0x48..0x4A].copy_from_slice(&(name_bytes.len() as u16).to_le_bytes());
        data[0x4A..0x4C].copy_from_slice(&self.class_name.1.to_le_bytes());
        data[0x4C..].copy_from_slice(&name_bytes);
        data
    }
}

/// Builds a security key (sk) cell payload around a descriptor.
pub fn sk_cell(descriptor: &[u8]) -> Vec<u8> {
    let mut data = vec![0u8; 0x14 + descriptor.len()];
    data[0..2].copy_from_slice(b"sk");
    data[0x0C..0x10].copy_from_slice(&1u32.to_le_bytes());
    data[0x10..0x14].copy_from_slice(&(descriptor.len() as u32).to_le_bytes());
    data[0x14..].copy_from_slice(descriptor);
    data
}

/// Builds a value key (vk) cell payload with inline DWORD data.
pub fn vk_inline_dword(name: &str, value: u32) -> Vec<u8> {
    vk_cell(name, 4, 0x8000_0004, value.to_le_bytes())
}

/// Builds a value key (vk) cell payload referencing a data cell.
pub fn vk_with_data(name: &str, data_type: u32, data_offset: u32, data_length: u32) -> Vec<u8> {
    vk_cell(name, data_type, data_length, data_offset.to_le_bytes())
}

fn vk_cell(name: &str, data_type: u32, data_length_raw: u32, data_offset: [u8; 4]) -> Vec<u8> {
    let name_bytes = name.as_bytes();
    let mut data = vec![0u8; 0x14 + name_bytes.len()];
    data[0..2].copy_from_slice(b"vk");
    data[0x02..0x04].copy_from_slice(&(name_bytes.len() as u16).to_le_bytes());
    data[0x04..0x08].copy_from_slice(&data_length_raw.to_le_bytes());
    data[0x08..0x0C].copy_from_slice(&data_offset);
    data[0x0C..0x10].copy_from_slice(&data_type.to_le_bytes());
    // ASCII name flag
    data[0x10..0x12].copy_from_slice(&0x0001u16.to_le_bytes());
    data[0x14..].copy_from_slice(name_bytes);
    data
}

/// Builds a values list cell: an array of value-record offsets.
pub fn value_list_cell(offsets: &[u32]) -> Vec<u8> {
    offsets.iter().flat_map(|o| o.to_le_bytes()).collect()
}

/// Builds a leaf index cell (`lf`/`lh`) with (offset, hash) entries.
pub fn leaf_cell(signature: &[u8; 2], entries: &[(u32, u32)]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(signature);
    data.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (offset, hash) in entries {
        data.extend_from_slice(&offset.to_le_bytes());
        data.extend_from_slice(&hash.to_le_bytes());
    }
    data
}

/// Builds an `li` or `ri` index cell holding bare offsets.
pub fn offset_list_cell(signature: &[u8; 2], offsets: &[u32]) -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(signature);
    data.extend_from_slice(&(offsets.len() as u16).to_le_bytes());
    for offset in offsets {
        data.extend_from_slice(&offset.to_le_bytes());
    }
    data
}

/// Encodes a string as UTF-16LE bytes, for class names and string values.
pub fn utf16le(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect()
}
