//! Lazy key tree.
//!
//! A [`KeyTreeNode`] starts as a bare `(offset, name hash)` pair taken from
//! the parent's sub-keys index. The key item is read on first access and the
//! sub-node list is built on first enumeration, so opening a hive never
//! walks whole subtrees. Dropping or evicting a node releases everything it
//! hydrated; the node can be hydrated again afterwards.

use crate::cell_source::CellSource;
use crate::error::Result;
use crate::key_item::KeyItem;

/// A node in the lazy key tree.
#[derive(Debug)]
pub struct KeyTreeNode {
    /// Named key cell offset (relative to first hbin).
    offset: u32,

    /// Name hash from the parent's index entry; 0 when the parent index
    /// carried none.
    name_hash: u32,

    /// Hydrated key item.
    item: Option<KeyItem>,

    /// Deferred sub-keys index offset, registered during item hydration.
    sub_nodes_range: Option<u32>,

    /// Hydrated sub nodes, in on-disk index order.
    sub_nodes: Option<Vec<KeyTreeNode>>,
}

impl KeyTreeNode {
    /// Creates an unhydrated node for the named key cell at `offset`.
    pub fn new(offset: u32, name_hash: u32) -> Self {
        Self {
            offset,
            name_hash,
            item: None,
            sub_nodes_range: None,
            sub_nodes: None,
        }
    }

    /// Returns the named key cell offset.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Returns the name hash from the parent's index entry.
    pub fn name_hash(&self) -> u32 {
        self.name_hash
    }

    /// Returns the key item if this node has been hydrated.
    pub fn item(&self) -> Option<&KeyItem> {
        self.item.as_ref()
    }

    /// Reads the key item for this node, if not already read.
    ///
    /// # Errors
    ///
    /// Returns an error if the named key or one of its auxiliary cells
    /// fails to decode (see [`KeyItem::read_node_data`]).
    pub fn hydrate(&mut self, source: &CellSource) -> Result<&KeyItem> {
        if self.item.is_none() {
            let item = KeyItem::read_node_data(source, self)?;
            self.item = Some(item);
        }
        Ok(self.item.as_ref().expect("key item populated above"))
    }

    /// Enumerates the sub nodes, reading the sub-keys index on first call.
    ///
    /// Hydrates the key item first when needed, since registering the
    /// sub-keys range is part of item hydration.
    ///
    /// # Errors
    ///
    /// Returns an error on an unknown index signature or a malformed index
    /// cell. Invalid child offsets are skipped and recorded as corruption
    /// on the key item instead.
    pub fn sub_nodes(&mut self, source: &CellSource) -> Result<&mut Vec<KeyTreeNode>> {
        if self.item.is_none() {
            self.hydrate(source)?;
        }
        if self.sub_nodes.is_none() {
            KeyItem::read_sub_nodes(source, self)?;
        }
        Ok(self.sub_nodes.as_mut().expect("sub nodes populated above"))
    }

    /// Releases the hydrated item and sub nodes.
    ///
    /// The registered sub-keys range survives eviction; a later
    /// [`KeyTreeNode::hydrate`] rebuilds the rest.
    pub fn evict(&mut self) {
        self.item = None;
        self.sub_nodes = None;
    }

    pub(crate) fn item_mut(&mut self) -> Option<&mut KeyItem> {
        self.item.as_mut()
    }

    pub(crate) fn sub_nodes_range_is_set(&self) -> bool {
        self.sub_nodes_range.is_some()
    }

    pub(crate) fn set_sub_nodes_range(&mut self, offset: u32) {
        self.sub_nodes_range = Some(offset);
    }

    pub(crate) fn sub_nodes_range(&self) -> Option<u32> {
        self.sub_nodes_range
    }

    pub(crate) fn begin_sub_nodes(&mut self) {
        self.sub_nodes = Some(Vec::new());
    }

    pub(crate) fn clear_sub_nodes(&mut self) {
        self.sub_nodes = None;
    }

    /// Appends a deferred child, returning its index.
    pub(crate) fn append_sub_node(&mut self, offset: u32, name_hash: u32) -> usize {
        let sub_nodes = self.sub_nodes.get_or_insert_with(Vec::new);
        sub_nodes.push(KeyTreeNode::new(offset, name_hash));
        sub_nodes.len() - 1
    }
}
