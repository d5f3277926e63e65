//! # Windows Registry Hive Reader
//!
//! A read-only Windows registry hive (REGF) parser with lazy,
//! corruption-tolerant key traversal.
//!
//! ## Features
//!
//! - **Memory-mapped I/O**: zero-copy access to cells in the hive file
//! - **Lazy hydration**: a key's item is read on first access and its sub
//!   keys on first enumeration, so opening a hive never walks whole
//!   subtrees
//! - **Corruption tolerance**: references into unmapped space are skipped
//!   and recorded per key instead of failing the traversal
//! - **Raw key names**: names stay as on-disk bytes (code-page ASCII or
//!   UTF-16LE) until asked for, with hash-gated comparisons that avoid
//!   decoding entirely on mismatch
//!
//! ## Architecture
//!
//! The reader is built in layers:
//!
//! 1. **Base Block (Header)**: hive metadata and root key offset
//! 2. **Cell Source**: maps 32-bit cell offsets to payload slices over the
//!    scanned hive bins (hbin), and answers offset validity probes
//! 3. **Named Keys (nk)** with their class name (cell data) and security
//!    key (sk) companions
//! 4. **Sub-keys Indexes (lf/lh/li/ri)**: walked recursively to append
//!    deferred child nodes to the lazy key tree
//! 5. **Value Keys (vk)**: registered by offset in a per-key value list and
//!    parsed on demand through a bounded cache
//!
//! ## Binary Layout
//!
//! Registry hives follow this structure:
//!
//! ```text
//! [Base Block - 4KB]
//!   - Signature: "regf"
//!   - Version, timestamps, root offset
//!   - Checksum
//!
//! [Hive Bins - variable size, 4KB aligned]
//!   [Hbin Header - 32 bytes]
//!     - Signature: "hbin"
//!     - Offset, size
//!
//!   [Cells - variable size]
//!     [Cell Size - 4 bytes, negative if allocated]
//!     [Cell Data]
//!       - Named keys (nk)
//!       - Value keys (vk)
//!       - Sub-keys indexes (lf/lh/li/ri)
//!       - Security keys (sk)
//!       - Class names, value data, big data (db)
//! ```
//!
//! ## Examples
//!
//! ```no_run
//! use reg_reader::{AsciiCodepage, Hive};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hive = Hive::open("SYSTEM")?;
//! let source = hive.cell_source();
//! let codepage = AsciiCodepage::default();
//!
//! // Hydrate the root key
//! let mut root = hive.root_node();
//! let name = root.hydrate(source)?.utf8_name(codepage)?;
//! println!("Root key: {}", name);
//!
//! // Enumerate sub keys (read on first access)
//! for sub_node in root.sub_nodes(source)?.iter_mut() {
//!     let sub_key = sub_node.hydrate(source)?;
//!     println!("  Sub key: {}", sub_key.utf8_name(codepage)?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Reading values
//!
//! ```no_run
//! use reg_reader::{AsciiCodepage, Hive, ValueData};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hive = Hive::open("SOFTWARE")?;
//! let source = hive.cell_source();
//!
//! let mut root = hive.root_node();
//! let item = root.hydrate(source)?;
//!
//! for index in 0..item.number_of_values() as usize {
//!     let value = item.value(source, index)?;
//!     println!("{} = {}", value.name, value.data(source)?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Corruption handling
//!
//! A hive can reference cells outside every hive bin (torn writes, damaged
//! media). Such references never abort traversal: the dangling entry is
//! dropped and the owning key reports [`ItemHealth::Corrupted`]. The key
//! stays visible and named, but may undercount its values or miss sub
//! keys. Malformed cell contents (bad signatures, truncated structures)
//! are hard errors.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bigdata;
pub mod cell_source;
pub mod error;
pub mod hbin;
pub mod header;
pub mod hive;
pub mod key;
pub mod key_item;
pub mod security;
pub mod subkey_list;
pub mod tree;
pub mod utils;
pub mod value;
pub mod value_list;

// Re-export main types for convenience
pub use cell_source::{Cell, CellSource};
pub use error::{RegistryError, Result};
pub use hbin::HbinHeader;
pub use header::BaseBlock;
pub use hive::Hive;
pub use key::{name_hash, KeyFlags, NamedKey};
pub use key_item::{ItemHealth, KeyItem};
pub use security::SecurityKey;
pub use subkey_list::{SubkeyEntry, SubkeyList, SubkeyListType};
pub use tree::KeyTreeNode;
pub use utils::AsciiCodepage;
pub use value::{ValueData, ValueKey, ValueType};
pub use value_list::{ValueCache, ValueList, MAXIMUM_CACHE_ENTRIES_VALUES};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
