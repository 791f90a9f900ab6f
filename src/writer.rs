use std::io::{Cursor, Write};

use ahash::AHashMap;
use binrw::BinWrite;
use log::debug;

use crate::{Endian, Primitive, WriteError};

fn round_up(value: u64, n: u64) -> u64 {
    // Find the next largest multiple of n.
    ((value + n - 1) / n) * n
}

/// An in memory output file with a label table for resolving pointers.
///
/// Addresses returned by the writer are absolute addresses that include the image base,
/// so they can be stored directly in pointer fields.
#[derive(Debug)]
pub struct EndianWriter {
    buffer: Cursor<Vec<u8>>,
    image_base: u32,
    endian: Endian,
    labels: AHashMap<String, u32>,
}

impl EndianWriter {
    pub fn new(endian: Endian, image_base: u32) -> Self {
        Self {
            buffer: Cursor::new(Vec::new()),
            image_base,
            endian,
            labels: AHashMap::new(),
        }
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn image_base(&self) -> u32 {
        self.image_base
    }

    /// The absolute address of the next byte to be written.
    pub fn position(&self) -> u32 {
        self.image_base + self.buffer.position() as u32
    }

    /// Returns the address registered for `label`.
    pub fn label_address(&self, label: &str) -> Option<u32> {
        self.labels.get(label).copied()
    }

    /// Returns the address registered for `label` or an error if the label has not been written.
    pub fn required_label_address(&self, label: &str) -> Result<u32, WriteError> {
        self.label_address(label)
            .ok_or_else(|| WriteError::UnregisteredLabel {
                label: label.to_string(),
            })
    }

    /// Associates `label` with `address`.
    /// Labels that are already registered keep their original address.
    pub fn register_label(&mut self, label: &str, address: u32) {
        if self.labels.contains_key(label) {
            debug!("Label {:?} is already registered", label);
        } else {
            self.labels.insert(label.to_string(), address);
        }
    }

    pub fn labels(&self) -> &AHashMap<String, u32> {
        &self.labels
    }

    /// Writes zeros until the position is a multiple of `alignment` relative to the start of the data.
    pub fn align(&mut self, alignment: u64) -> Result<(), WriteError> {
        let pos = self.buffer.position();
        let aligned = round_up(pos, alignment);
        let padding = vec![0u8; (aligned - pos) as usize];
        self.buffer.write_all(&padding)?;
        Ok(())
    }

    pub fn write_primitive<T: Primitive>(&mut self, value: T) -> Result<(), WriteError> {
        self.buffer.write_all(&value.encode(self.endian))?;
        Ok(())
    }

    /// Writes an optional pointer, using zero for [None].
    pub fn write_pointer(&mut self, address: Option<u32>) -> Result<(), WriteError> {
        self.write_primitive(address.unwrap_or(0))
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), WriteError> {
        self.buffer.write_all(bytes)?;
        Ok(())
    }

    /// Writes `text` followed by a null terminator and returns the address of the string.
    pub fn write_c_string(&mut self, text: &str) -> Result<u32, WriteError> {
        let address = self.position();
        self.buffer.write_all(text.as_bytes())?;
        self.buffer.write_all(&[0u8])?;
        Ok(address)
    }

    /// Writes a fixed size record and returns its address.
    pub fn write<T>(&mut self, value: &T) -> Result<u32, WriteError>
    where
        T: BinWrite,
        for<'a> T::Args<'a>: Default,
    {
        let address = self.position();
        value.write_options(&mut self.buffer, self.endian, Default::default())?;
        Ok(address)
    }

    /// Writes contiguous records and returns the address of the first element.
    pub fn write_array<T>(&mut self, values: &[T]) -> Result<u32, WriteError>
    where
        T: BinWrite,
        for<'a> T::Args<'a>: Default,
    {
        let address = self.position();
        for value in values {
            value.write_options(&mut self.buffer, self.endian, Default::default())?;
        }
        Ok(address)
    }

    /// Writes a labelled array once and returns its address.
    /// Arrays with an already registered `label` are not written again.
    /// Empty arrays are not written and return [None].
    pub fn write_labelled_array<T>(
        &mut self,
        label: &str,
        values: &[T],
    ) -> Result<Option<u32>, WriteError>
    where
        T: BinWrite,
        for<'a> T::Args<'a>: Default,
    {
        if values.is_empty() {
            return Ok(None);
        }

        if let Some(address) = self.label_address(label) {
            debug!("Reusing array {:?} at 0x{:08X}", label, address);
            return Ok(Some(address));
        }

        self.align(4)?;
        let address = self.write_array(values)?;
        self.register_label(label, address);
        Ok(Some(address))
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assert_hex_eq;
    use hexlit::hex;

    #[test]
    fn write_primitives_big_endian() {
        let mut writer = EndianWriter::new(Endian::Big, 0);
        writer.write_primitive(1u16).unwrap();
        writer.write_primitive(2u32).unwrap();
        writer.write_primitive(1.0f32).unwrap();
        assert_hex_eq!(hex!(0001 00000002 3f800000), writer.into_inner());
    }

    #[test]
    fn position_includes_image_base() {
        let mut writer = EndianWriter::new(Endian::Little, 0x8C000000);
        assert_eq!(0x8C000000, writer.position());
        writer.write_primitive(0u32).unwrap();
        assert_eq!(0x8C000004, writer.position());
    }

    #[test]
    fn align_pads_with_zeros() {
        let mut writer = EndianWriter::new(Endian::Little, 0x10);
        writer.write_bytes(&[1u8]).unwrap();
        writer.align(4).unwrap();
        writer.align(4).unwrap();
        assert_eq!(0x14, writer.position());
        assert_hex_eq!(hex!(01000000), writer.into_inner());
    }

    #[test]
    fn write_c_string_address() {
        let mut writer = EndianWriter::new(Endian::Little, 0x100);
        writer.write_bytes(&[0xFF]).unwrap();
        assert_eq!(0x101, writer.write_c_string("ab").unwrap());
        assert_hex_eq!(hex!(ff616200), writer.into_inner());
    }

    #[test]
    fn register_label_keeps_first_address() {
        let mut writer = EndianWriter::new(Endian::Little, 0);
        writer.register_label("a", 4);
        writer.register_label("a", 8);
        assert_eq!(Some(4), writer.label_address("a"));
        assert_eq!(Some(&4), writer.labels().get("a"));
        assert_eq!(1, writer.labels().len());
        assert_eq!(None, writer.label_address("b"));
        assert!(matches!(
            writer.required_label_address("b"),
            Err(WriteError::UnregisteredLabel { label }) if label == "b"
        ));
    }

    #[test]
    fn write_labelled_array_once() {
        let mut writer = EndianWriter::new(Endian::Little, 0x1000);
        let first = writer.write_labelled_array("values", &[1u16, 2u16]).unwrap();
        let second = writer.write_labelled_array("values", &[1u16, 2u16]).unwrap();
        let empty = writer.write_labelled_array::<u16>("empty", &[]).unwrap();

        assert_eq!(Some(0x1000), first);
        assert_eq!(first, second);
        assert_eq!(None, empty);
        assert_hex_eq!(hex!(0100 0200), writer.into_inner());
    }
}
