//! Key items: the hydrated state of one registry key.
//!
//! A key item aggregates the named key, its class name, its security
//! descriptor and the list of value-record offsets. Sub keys are never read
//! eagerly; item hydration only registers the sub-keys index offset on the
//! tree node, and [`KeyItem::read_sub_nodes`] walks the index when the
//! children are first enumerated.
//!
//! References into cells outside any known hive bin do not fail hydration.
//! The dangling entry is skipped and the item is marked corrupted, so a
//! damaged hive stays traversable: such a key is visible and named, but may
//! undercount its values and miss some sub keys.

use crate::cell_source::CellSource;
use crate::error::{RegistryError, Result};
use crate::key::NamedKey;
use crate::security::SecurityKey;
use crate::subkey_list::SubkeyList;
use crate::tree::KeyTreeNode;
use crate::utils::{read_u32_le, read_utf16_string, AsciiCodepage};
use crate::value::ValueKey;
use crate::value_list::{ValueCache, ValueList, MAXIMUM_CACHE_ENTRIES_VALUES};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Maximum sub-keys index nesting the walker follows.
///
/// The format allows `ri` cells to point at further `ri` cells without
/// bound; real hives stay shallow. Deeper nesting is treated as corruption.
const MAXIMUM_SUB_KEYS_DEPTH: u8 = 32;

/// Health of a key item. Corruption is sticky: once set it is never
/// cleared for the lifetime of the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemHealth {
    /// All referenced offsets resolved.
    #[default]
    Intact,

    /// At least one referenced offset was outside every known hive bin, or
    /// the sub-keys index nested too deep; the affected entries were
    /// dropped.
    Corrupted,
}

/// The hydrated state of one registry key.
#[derive(Debug)]
pub struct KeyItem {
    named_key: NamedKey,
    class_name: Option<Vec<u8>>,
    security_descriptor: Option<Vec<u8>>,
    values: ValueList,
    value_cache: RwLock<ValueCache>,
    health: ItemHealth,
}

impl KeyItem {
    /// Reads the key item for `node` from the cell source.
    ///
    /// Reads the named key cell, then its class name and security key, then
    /// registers the sub-keys index as the node's deferred sub-nodes range
    /// and reads the values list. Sub keys themselves are read later by
    /// [`KeyItem::read_sub_nodes`].
    ///
    /// # Errors
    ///
    /// Returns an error if the named key, security key or values list cell
    /// fails to decode. Referenced offsets outside every hive bin are not
    /// errors; they mark the item [`ItemHealth::Corrupted`].
    pub fn read_node_data(source: &CellSource, node: &mut KeyTreeNode) -> Result<KeyItem> {
        let offset = node.offset();

        if offset == 0 || offset == 0xFFFFFFFF {
            return Err(RegistryError::InvalidFormat(format!(
                "Invalid named key offset: {:#x}",
                offset
            )));
        }
        debug!(offset = %format!("{:#x}", offset), "Reading named key");

        let cell = source.get(offset)?;
        let named_key = NamedKey::parse(cell.data, offset, node.name_hash())?;
        let mut health = ItemHealth::Intact;

        let class_name = read_class_name(source, &named_key)?;

        let security_descriptor = if named_key.security_key_offset != 0xFFFFFFFF {
            Some(read_security_descriptor(
                source,
                named_key.security_key_offset,
            )?)
        } else {
            None
        };

        // Sub keys can span huge subtrees; only register where to find them
        if named_key.number_of_sub_keys > 0 && !node.sub_nodes_range_is_set() {
            if source.index_of(named_key.sub_keys_list_offset).is_some() {
                node.set_sub_nodes_range(named_key.sub_keys_list_offset);
            } else {
                warn!(
                    offset = %format!("{:#x}", offset),
                    sub_keys_list_offset = %format!("{:#x}", named_key.sub_keys_list_offset),
                    "Sub keys list offset outside hive bins"
                );
                health = ItemHealth::Corrupted;
            }
        }

        // The values list is small and backs number_of_values(); read the
        // offsets now, the records stay lazy
        let mut values = ValueList::new();
        if named_key.number_of_values > 0 {
            let values_list_offset = named_key.values_list_offset;

            if values_list_offset == 0 || values_list_offset == 0xFFFFFFFF {
                return Err(RegistryError::InvalidFormat(format!(
                    "Invalid values list offset: {:#x}",
                    values_list_offset
                )));
            }
            if source.index_of(values_list_offset).is_none() {
                warn!(
                    offset = %format!("{:#x}", offset),
                    values_list_offset = %format!("{:#x}", values_list_offset),
                    "Values list offset outside hive bins"
                );
                health = ItemHealth::Corrupted;
            } else {
                read_values_list(source, &named_key, &mut values, &mut health)?;
            }
        }

        Ok(KeyItem {
            named_key,
            class_name,
            security_descriptor,
            values,
            value_cache: RwLock::new(ValueCache::new(MAXIMUM_CACHE_ENTRIES_VALUES)),
            health,
        })
    }

    /// Reads the sub-keys index and appends a deferred child node for every
    /// resolvable entry, in on-disk order and depth-first through `ri`
    /// levels.
    ///
    /// Corruption found while walking (dangling child offsets, over-deep
    /// nesting) is surfaced on the node's key item.
    ///
    /// # Errors
    ///
    /// Returns an error on an unknown index signature or a malformed index
    /// cell.
    pub fn read_sub_nodes(source: &CellSource, node: &mut KeyTreeNode) -> Result<()> {
        node.begin_sub_nodes();

        let Some(range_offset) = node.sub_nodes_range() else {
            return Ok(());
        };

        let health = match walk_sub_keys_list(source, node, range_offset, 0) {
            Ok(health) => health,
            Err(e) => {
                // Partially appended children are rolled back
                node.clear_sub_nodes();
                return Err(e);
            }
        };

        if health == ItemHealth::Corrupted {
            if let Some(item) = node.item_mut() {
                item.mark_corrupted();
            }
        }
        Ok(())
    }

    /// Returns the decoded named key.
    pub fn named_key(&self) -> &NamedKey {
        &self.named_key
    }

    /// Returns the raw key name bytes.
    pub fn name(&self) -> &[u8] {
        self.named_key.name()
    }

    /// Returns the size of the raw key name in bytes.
    pub fn name_size(&self) -> usize {
        self.named_key.name_size()
    }

    /// Returns the key name decoded to a UTF-8 string.
    pub fn utf8_name(&self, codepage: AsciiCodepage) -> Result<String> {
        self.named_key.utf8_name(codepage)
    }

    /// Returns the key name as UTF-16 code units.
    pub fn utf16_name(&self, codepage: AsciiCodepage) -> Result<Vec<u16>> {
        self.named_key.utf16_name(codepage)
    }

    /// Compares the key name with a UTF-8 string; see
    /// [`NamedKey::compare_name_with_utf8`] for the hash fast path.
    pub fn compare_name_with_utf8(
        &self,
        hash: u32,
        other: &str,
        codepage: AsciiCodepage,
    ) -> Result<bool> {
        self.named_key.compare_name_with_utf8(hash, other, codepage)
    }

    /// Compares the key name with a UTF-16 string.
    pub fn compare_name_with_utf16(
        &self,
        hash: u32,
        other: &[u16],
        codepage: AsciiCodepage,
    ) -> Result<bool> {
        self.named_key
            .compare_name_with_utf16(hash, other, codepage)
    }

    /// Returns the last written timestamp as a Windows FILETIME value.
    pub fn last_written_time(&self) -> u64 {
        self.named_key.last_written_time()
    }

    /// Returns the raw class name bytes (UTF-16LE), if the key has one.
    pub fn class_name(&self) -> Option<&[u8]> {
        self.class_name.as_deref()
    }

    /// Returns the class name decoded to a UTF-8 string.
    pub fn utf8_class_name(&self) -> Result<Option<String>> {
        match &self.class_name {
            Some(data) => Ok(Some(read_utf16_string(data, 0)?)),
            None => Ok(None),
        }
    }

    /// Returns the security descriptor bytes, if the key has one.
    pub fn security_descriptor(&self) -> Option<&[u8]> {
        self.security_descriptor.as_deref()
    }

    /// Returns the number of readable values.
    ///
    /// On a corrupted item this can undercount the value count declared by
    /// the named key; dangling entries were dropped.
    pub fn number_of_values(&self) -> u32 {
        self.values.number_of_elements()
    }

    /// Returns the lazy value list.
    pub fn value_list(&self) -> &ValueList {
        &self.values
    }

    /// Returns the value record at `index`, parsing it on first access.
    ///
    /// Parsed records go through the item's bounded cache, so re-reading
    /// the same value is cheap.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is out of range or the record fails
    /// to decode.
    pub fn value(&self, source: &CellSource, index: usize) -> Result<Arc<ValueKey>> {
        let offset = self
            .values
            .element_offset(index)
            .ok_or_else(|| RegistryError::NotFound(format!("value at index {}", index)))?;

        self.value_at_offset(source, offset)
    }

    /// Returns the value record with the given name, case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if no value carries the name.
    pub fn value_by_name(&self, source: &CellSource, name: &str) -> Result<Arc<ValueKey>> {
        for offset in self.values.iter() {
            let value = self.value_at_offset(source, offset)?;
            if value.name.eq_ignore_ascii_case(name) {
                return Ok(value);
            }
        }
        Err(RegistryError::not_found("value", name))
    }

    /// Returns true if this item lost references to corruption.
    pub fn is_corrupted(&self) -> bool {
        self.health == ItemHealth::Corrupted
    }

    /// Returns the item health.
    pub fn health(&self) -> ItemHealth {
        self.health
    }

    pub(crate) fn mark_corrupted(&mut self) {
        self.health = ItemHealth::Corrupted;
    }

    fn value_at_offset(&self, source: &CellSource, offset: u32) -> Result<Arc<ValueKey>> {
        {
            let mut cache = self.value_cache.write().expect("value cache lock poisoned");
            if let Some(value) = cache.get(offset) {
                return Ok(value);
            }
        }

        let cell = source.get(offset)?;
        let value = Arc::new(ValueKey::parse(cell.data, offset)?);

        self.value_cache
            .write()
            .expect("value cache lock poisoned")
            .insert(offset, Arc::clone(&value));

        Ok(value)
    }
}

/// Reads a key's class name.
///
/// Both the 0xFFFFFFFF sentinel and the legacy `offset 0, size 0` encoding
/// mean "no class name". A zero offset with a non-zero size, a zero size
/// with a real offset, or a size past the cell end are decode errors.
fn read_class_name(source: &CellSource, named_key: &NamedKey) -> Result<Option<Vec<u8>>> {
    let class_name_offset = named_key.class_name_offset;
    let class_name_size = named_key.class_name_size;

    if class_name_offset == 0xFFFFFFFF {
        return Ok(None);
    }
    if class_name_offset == 0 && class_name_size == 0 {
        return Ok(None);
    }
    if class_name_offset == 0 {
        return Err(RegistryError::InvalidFormat(
            "Invalid class name offset: 0".to_string(),
        ));
    }

    let cell = source.get(class_name_offset)?;

    if class_name_size == 0 {
        return Err(RegistryError::InvalidFormat(format!(
            "Invalid class name size at offset {:#x}",
            class_name_offset
        )));
    }
    if class_name_size as usize > cell.data.len() {
        return Err(RegistryError::TruncatedData {
            offset: class_name_offset,
            expected: class_name_size as usize,
            actual: cell.data.len(),
        });
    }

    // Bytes past class_name_size are cell padding
    Ok(Some(cell.data[..class_name_size as usize].to_vec()))
}

/// Reads a key's security descriptor, taking ownership of the bytes.
fn read_security_descriptor(source: &CellSource, offset: u32) -> Result<Vec<u8>> {
    if offset == 0 {
        return Err(RegistryError::InvalidFormat(
            "Invalid security key offset: 0".to_string(),
        ));
    }

    let cell = source.get(offset)?;
    let security_key = SecurityKey::parse(cell.data, offset)?;

    Ok(security_key.into_descriptor())
}

/// Reads the values list cell: an array of value-record offsets.
///
/// Offsets failing the bin-index probe are skipped and recorded as
/// corruption; the loop continues so later entries stay readable.
fn read_values_list(
    source: &CellSource,
    named_key: &NamedKey,
    values: &mut ValueList,
    health: &mut ItemHealth,
) -> Result<()> {
    let values_list_offset = named_key.values_list_offset;
    let number_of_values = named_key.number_of_values;

    if number_of_values == 0 {
        return Ok(());
    }
    if values_list_offset == 0 || values_list_offset == 0xFFFFFFFF {
        return Err(RegistryError::InvalidFormat(format!(
            "Invalid values list offset: {:#x}",
            values_list_offset
        )));
    }

    let cell = source.get(values_list_offset)?;
    let expected_size = number_of_values as usize * 4;

    if cell.data.len() < expected_size {
        return Err(RegistryError::TruncatedData {
            offset: values_list_offset,
            expected: expected_size,
            actual: cell.data.len(),
        });
    }

    for index in 0..number_of_values as usize {
        let element_offset = read_u32_le(cell.data, index * 4)?;

        if source.index_of(element_offset).is_none() {
            warn!(
                values_list_offset = %format!("{:#x}", values_list_offset),
                element = index,
                element_offset = %format!("{:#x}", element_offset),
                "Value record offset outside hive bins"
            );
            *health = ItemHealth::Corrupted;
        } else {
            values.append_element(element_offset);
        }
    }
    Ok(())
}

/// Walks one sub-keys index cell, recursing through `ri` levels.
///
/// The index entries are copied out of the cell buffer by
/// [`SubkeyList::parse`] before any nested cell fetch, so recursion cannot
/// invalidate them.
fn walk_sub_keys_list(
    source: &CellSource,
    node: &mut KeyTreeNode,
    offset: u32,
    depth: u8,
) -> Result<ItemHealth> {
    if depth >= MAXIMUM_SUB_KEYS_DEPTH {
        warn!(
            offset = %format!("{:#x}", offset),
            depth,
            "Sub keys index nested too deep"
        );
        return Ok(ItemHealth::Corrupted);
    }

    let cell = source.get(offset)?;
    let list = SubkeyList::parse(cell.data, offset)?;
    let mut health = ItemHealth::Intact;

    match list {
        SubkeyList::IndexRoot(offsets) => {
            for child_offset in offsets {
                if source.index_of(child_offset).is_some() {
                    if walk_sub_keys_list(source, node, child_offset, depth + 1)?
                        == ItemHealth::Corrupted
                    {
                        health = ItemHealth::Corrupted;
                    }
                } else {
                    warn!(
                        offset = %format!("{:#x}", offset),
                        child_offset = %format!("{:#x}", child_offset),
                        "Nested index offset outside hive bins"
                    );
                    health = ItemHealth::Corrupted;
                }
            }
        }

        SubkeyList::Leaf(entries) => {
            for entry in entries {
                if source.index_of(entry.key_offset).is_some() {
                    node.append_sub_node(entry.key_offset, entry.name_hash);
                } else {
                    warn!(
                        offset = %format!("{:#x}", offset),
                        key_offset = %format!("{:#x}", entry.key_offset),
                        "Sub key offset outside hive bins"
                    );
                    health = ItemHealth::Corrupted;
                }
            }
        }
    }

    Ok(health)
}
