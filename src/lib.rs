//! # sa3d_lib
//!
//! sa3d_lib is a library for reading and writing the Ninja binary model formats used by
//! Sonic Adventure, Sonic Adventure DX, Sonic Adventure 2 and Sonic Adventure 2 Battle.
//!
//! The library only describes the binary layer.
//! Each structure stored in a file such as `NJS_OBJECT` or `NJS_MATERIAL` has a strongly typed record
//! in the [formats] module that fully represents the bytes on disk.
//! Pointer fields are stored as raw `u32` addresses and resolved with a [SourceReader],
//! which relocates them relative to the image base of the file.
//!
//! For a more convenient representation of node trees, meshes and land entries,
//! see the `sa3d_data` crate.
//!
//! ## Endianness
//! Dreamcast and PC files are little endian while GameCube files are big endian.
//! There is no global endianness setting.
//! The [Endian] is part of the [SourceReader] and [EndianWriter] used for a single read or write pass.
/*!
```rust
use sa3d_lib::{Endian, EndianWriter, SourceReader};

# fn main() -> Result<(), Box<dyn std::error::Error>> {
let mut writer = EndianWriter::new(Endian::Big, 0x8C000000);
writer.write_primitive(0x12345678u32)?;
let bytes = writer.into_inner();

let reader = SourceReader::new(&bytes, 0x8C000000, Endian::Big);
assert_eq!(0x12345678, reader.read_u32(0)?);
# Ok(())
# }
```
 */
pub mod formats;
pub mod primitives;
mod reader;
mod vectors;
mod writer;

pub use binrw::Endian;
pub use primitives::{detect_endian, Primitive};
pub use reader::SourceReader;
pub use vectors::{BoundingSphere, Color};
pub use writer::EndianWriter;

use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The game version a file was created for.
///
/// The version determines the layout of land entries and the default attach format.
/// Variants are ordered by release, so comparisons like `format < ModelFormat::Sa2` are valid.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModelFormat {
    Sa1,
    Sadx,
    Sa2,
    Sa2b,
    /// The buffer format used for converted and edited models.
    Buffer,
}

impl ModelFormat {
    /// The attach format used for the visual models of this version.
    pub fn attach_format(self) -> AttachFormat {
        match self {
            ModelFormat::Sa1 | ModelFormat::Sadx => AttachFormat::Basic,
            ModelFormat::Sa2 => AttachFormat::Chunk,
            ModelFormat::Sa2b => AttachFormat::Gc,
            ModelFormat::Buffer => AttachFormat::Buffer,
        }
    }

    /// Returns `true` if Basic records use the extended SADX layout.
    pub fn is_dx(self) -> bool {
        self == ModelFormat::Sadx
    }
}

/// The encoding of the mesh data referenced by a node.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachFormat {
    Buffer,
    /// `NJS_MODEL` with mesh sets of triangles, quads, n-gons or strips.
    Basic,
    Chunk,
    Gc,
}

/// Errors while reading binary data from a [SourceReader].
#[derive(Debug, Error)]
pub enum ReadError {
    /// The read extends past the end of the source data.
    #[error(
        "Reading {} at offset 0x{:X} exceeds the source length of 0x{:X} bytes.",
        type_name,
        offset,
        source_len
    )]
    OutOfBounds {
        offset: usize,
        type_name: &'static str,
        source_len: usize,
    },

    /// A non null pointer is smaller than the image base and cannot be relocated.
    #[error(
        "Pointer 0x{:08X} at offset 0x{:X} is below the image base 0x{:08X}.",
        pointer,
        offset,
        image_base
    )]
    InvalidPointer {
        offset: usize,
        pointer: u32,
        image_base: u32,
    },

    /// A pointer that must always be set is null.
    #[error("The {} pointer at offset 0x{:X} is null.", name, offset)]
    NullPointer { name: &'static str, offset: usize },

    /// The same node was reached twice while reading a single hierarchy.
    #[error("The node at offset 0x{:X} is referenced more than once.", offset)]
    RepeatedNode { offset: usize },

    /// Reading attaches of the given format is not supported.
    #[error("Reading {:?} attaches is not supported.", format)]
    UnsupportedFormat { format: AttachFormat },

    /// The string data is not valid UTF-8.
    #[error("The string at offset 0x{:X} is not valid UTF-8.", offset)]
    InvalidString { offset: usize },

    /// An error occurred while parsing a record.
    #[error(transparent)]
    BinRead(#[from] binrw::Error),
}

/// Errors while writing binary data to an [EndianWriter].
#[derive(Debug, Error)]
pub enum WriteError {
    /// A pointer references a label that has not been written yet.
    #[error("The label {:?} has not been written.", label)]
    UnregisteredLabel { label: String },

    /// A strip or polygon has more indices than its header can store.
    #[error("The polygon has {} indices, but the maximum is {}.", count, max)]
    PolygonTooLong { count: usize, max: usize },

    /// An error occurred while writing a record.
    #[error(transparent)]
    BinWrite(#[from] binrw::Error),

    /// An error occurred while writing data.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
pub(crate) fn group_hex(a: &str, words_per_line: usize) -> String {
    // ex: "FFFFFFFF FFFFFFFF FFFFFFFF FFFFFFFF..."
    let words = a
        .chars()
        .collect::<Vec<char>>()
        .chunks(8)
        .map(|c| c.iter().collect::<String>())
        .collect::<Vec<String>>();

    words
        .chunks(words_per_line)
        .map(|c| c.join(" "))
        .collect::<Vec<String>>()
        .join("\n")
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_format_ordering() {
        assert!(ModelFormat::Sa1 < ModelFormat::Sa2);
        assert!(ModelFormat::Sadx < ModelFormat::Sa2);
        assert!(ModelFormat::Buffer > ModelFormat::Sa2b);
    }

    #[test]
    fn model_format_attach_format() {
        assert_eq!(AttachFormat::Basic, ModelFormat::Sa1.attach_format());
        assert_eq!(AttachFormat::Basic, ModelFormat::Sadx.attach_format());
        assert_eq!(AttachFormat::Chunk, ModelFormat::Sa2.attach_format());
        assert_eq!(AttachFormat::Gc, ModelFormat::Sa2b.attach_format());
        assert_eq!(AttachFormat::Buffer, ModelFormat::Buffer.attach_format());
    }
}
