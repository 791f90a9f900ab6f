//! # sa3d_data
//!
//! sa3d_data provides a more intuitive and minimal API built on sa3d_lib.
//!
//! ## Features
//! The high level nature of sa3d_data makes it easier to integrate with application code than sa3d_lib.
//! - Node hierarchies stored in a [NodeTree](crate::node_data::NodeTree) with cached transforms
//! - Automatic resolution of pointers, shared attaches and labels
//! - Conversion between Basic attaches and the buffer meshes used for rendering
//! - Land entries with version independent surface attributes
//!
//! ## Getting Started
//! The easiest way to access important items like [NodeTree](crate::node_data::NodeTree) is to import the [prelude].
/*!
```rust
use sa3d_data::prelude::*;

# fn main() -> Result<(), Box<dyn std::error::Error>> {
let mut tree = NodeTree::new();
let root = tree.add_node(None, "root");
let child = tree.add_node(Some(root), "child");
tree.set_position(child, glam::Vec3::new(0.0, 2.0, 0.0));

let mut writer = EndianWriter::new(Endian::Little, 0x10000000);
let address = tree.write(&mut writer, root, false)?;

// Names are stored as labels keyed by file offset.
let mut context = ReadContext::with_labels(
    writer
        .labels()
        .iter()
        .map(|(name, address)| (address - 0x10000000, name.clone()))
        .collect(),
);
let bytes = writer.into_inner();

let reader = SourceReader::new(&bytes, 0x10000000, Endian::Little);
let tree = NodeTree::read(&reader, address - 0x10000000, AttachFormat::Basic, false, &mut context)?;
let child = tree.node(tree.roots()[0]).children()[0];
assert_eq!("child", tree.node(child).name());
assert_eq!(glam::Vec3::new(0.0, 2.0, 0.0), tree.node(child).position());
# Ok(())
# }
```
 */
//!
//! ## File Differences
//! Reading and writing a file does not guarantee a binary identical result.
//! Arrays are written in a consistent order and computed node attributes are always recalculated.
//! Labels for data without a label are generated from the offset of the data.
pub mod attach_data;
pub mod basic_converter;
pub mod basic_data;
pub mod buffer_data;
pub mod land_entry_data;
pub mod node_data;

use ahash::AHashMap;
use binrw::BinRead;
use sa3d_lib::{ReadError, SourceReader};

/// Common imports for top level types and important traits.
pub mod prelude {
    pub use crate::attach_data::{Attach, AttachData, Bounds};
    pub use crate::basic_converter::{convert_from_basic, convert_to_basic, ConvertOptions};
    pub use crate::basic_data::BasicAttach;
    pub use crate::buffer_data::BufferMesh;
    pub use crate::land_entry_data::{LandEntry, SurfaceAttributes};
    pub use crate::node_data::{NodeId, NodeTree, ReadContext};
    pub use sa3d_lib::{AttachFormat, Endian, EndianWriter, ModelFormat, SourceReader};
}

/// Returns the label for the data at `offset` or a label generated from the offset.
pub(crate) fn label_or_default(labels: &AHashMap<u32, String>, prefix: &str, offset: u32) -> String {
    labels
        .get(&offset)
        .cloned()
        .unwrap_or_else(|| format!("{prefix}_{offset:08X}"))
}

/// Reads `count` records from the array at `pointer`.
/// Null pointers and empty arrays produce an empty [Vec].
pub(crate) fn read_pointer_array<T>(
    reader: &SourceReader,
    field_offset: u32,
    pointer: u32,
    count: usize,
) -> Result<Vec<T>, ReadError>
where
    T: BinRead,
    for<'a> T::Args<'a>: Default,
{
    match reader.relocate(field_offset, pointer)? {
        Some(offset) if count > 0 => reader.read_array(offset, count),
        _ => Ok(Vec::new()),
    }
}

#[cfg(test)]
pub(crate) fn group_hex(a: &str, words_per_line: usize) -> String {
    use itertools::Itertools;

    // ex: "FFFFFFFF FFFFFFFF FFFFFFFF FFFFFFFF..."
    let words = a
        .chars()
        .collect::<Vec<char>>()
        .chunks(8)
        .map(|c| c.iter().collect::<String>())
        .collect::<Vec<String>>();

    words.chunks(words_per_line).map(|c| c.join(" ")).join("\n")
}

#[cfg(test)]
macro_rules! assert_hex_eq {
    ($a:expr, $b:expr) => {{
        let (a, b) = ($a, $b);
        let (a, b): (&[u8], &[u8]) = (&a[..], &b[..]);
        assert!(
            a == b,
            "\n{} !=\n{}",
            crate::group_hex(&hex::encode(a), 8),
            crate::group_hex(&hex::encode(b), 8)
        )
    }};
}

#[cfg(test)]
pub(crate) use assert_hex_eq;
