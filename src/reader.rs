use binrw::{io::Cursor, BinRead};

use crate::{Endian, Primitive, ReadError};

/// Bounds checked, endian aware reads from an in memory file.
///
/// Offsets passed to the read methods are file offsets.
/// Pointers stored in the file are absolute addresses and are converted to file offsets
/// by subtracting the image base in [SourceReader::read_pointer].
#[derive(Debug, Clone, Copy)]
pub struct SourceReader<'a> {
    data: &'a [u8],
    image_base: u32,
    endian: Endian,
}

macro_rules! read_primitive_fn {
    ($($name:ident: $ty:ty),*) => {
        $(
            #[doc = concat!("Reads a `", stringify!($ty), "` at `offset`.")]
            pub fn $name(&self, offset: u32) -> Result<$ty, ReadError> {
                self.read_primitive::<$ty>(offset)
            }
        )*
    };
}

impl<'a> SourceReader<'a> {
    pub fn new(data: &'a [u8], image_base: u32, endian: Endian) -> Self {
        Self {
            data,
            image_base,
            endian,
        }
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn image_base(&self) -> u32 {
        self.image_base
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    fn bytes<T>(&self, offset: u32, len: usize) -> Result<&'a [u8], ReadError> {
        let start = offset as usize;
        start
            .checked_add(len)
            .and_then(|end| self.data.get(start..end))
            .ok_or(ReadError::OutOfBounds {
                offset: start,
                type_name: std::any::type_name::<T>(),
                source_len: self.data.len(),
            })
    }

    /// Decodes a primitive at `offset` using the reader's endianness.
    pub fn read_primitive<T: Primitive>(&self, offset: u32) -> Result<T, ReadError> {
        let bytes = self.bytes::<T>(offset, T::SIZE)?;
        Ok(T::decode(bytes, self.endian))
    }

    read_primitive_fn!(
        read_u16: u16,
        read_i16: i16,
        read_u32: u32,
        read_i32: i32,
        read_u64: u64,
        read_i64: i64,
        read_f32: f32,
        read_f64: f64
    );

    /// Reads the pointer at `offset` and converts it to a file offset.
    /// Null pointers are returned as [None].
    /**
    ```rust
    use sa3d_lib::{Endian, SourceReader};

    let data = [0x10, 0x00, 0x00, 0x8C, 0x00, 0x00, 0x00, 0x00];
    let reader = SourceReader::new(&data, 0x8C000000, Endian::Little);
    assert_eq!(Some(0x10), reader.read_pointer(0).unwrap());
    assert_eq!(None, reader.read_pointer(4).unwrap());
    ```
    */
    pub fn read_pointer(&self, offset: u32) -> Result<Option<u32>, ReadError> {
        let pointer = self.read_u32(offset)?;
        self.relocate(offset, pointer)
    }

    /// Converts an absolute `pointer` read from `offset` to a file offset.
    pub fn relocate(&self, offset: u32, pointer: u32) -> Result<Option<u32>, ReadError> {
        if pointer == 0 {
            return Ok(None);
        }

        pointer
            .checked_sub(self.image_base)
            .map(Some)
            .ok_or(ReadError::InvalidPointer {
                offset: offset as usize,
                pointer,
                image_base: self.image_base,
            })
    }

    /// Reads a null terminated UTF-8 string starting at `offset`.
    pub fn read_c_string(&self, offset: u32) -> Result<String, ReadError> {
        let start = offset as usize;
        let remaining = self.data.get(start..).ok_or(ReadError::OutOfBounds {
            offset: start,
            type_name: "CString",
            source_len: self.data.len(),
        })?;

        // Strings must be terminated.
        let len = remaining
            .iter()
            .position(|b| *b == 0)
            .ok_or(ReadError::OutOfBounds {
                offset: start,
                type_name: "CString",
                source_len: self.data.len(),
            })?;

        std::str::from_utf8(&remaining[..len])
            .map(str::to_string)
            .map_err(|_| ReadError::InvalidString { offset: start })
    }

    /// Reads a fixed length UTF-8 string starting at `offset`.
    /// Trailing null bytes are removed.
    pub fn read_string(&self, offset: u32, len: usize) -> Result<String, ReadError> {
        let bytes = self.bytes::<String>(offset, len)?;
        let end = bytes.iter().position(|b| *b == 0).unwrap_or(len);
        std::str::from_utf8(&bytes[..end])
            .map(str::to_string)
            .map_err(|_| ReadError::InvalidString {
                offset: offset as usize,
            })
    }

    /// Reads a fixed size record at `offset` using the reader's endianness.
    pub fn read<T>(&self, offset: u32) -> Result<T, ReadError>
    where
        T: BinRead,
        for<'b> T::Args<'b>: Default,
    {
        let start = offset as usize;
        let remaining = self.data.get(start..).ok_or(ReadError::OutOfBounds {
            offset: start,
            type_name: std::any::type_name::<T>(),
            source_len: self.data.len(),
        })?;

        let mut cursor = Cursor::new(remaining);
        T::read_options(&mut cursor, self.endian, Default::default()).map_err(|e| {
            if e.is_eof() {
                ReadError::OutOfBounds {
                    offset: start,
                    type_name: std::any::type_name::<T>(),
                    source_len: self.data.len(),
                }
            } else {
                ReadError::BinRead(e)
            }
        })
    }

    /// Reads `count` contiguous records starting at `offset`.
    pub fn read_array<T>(&self, offset: u32, count: usize) -> Result<Vec<T>, ReadError>
    where
        T: BinRead,
        for<'b> T::Args<'b>: Default,
    {
        let start = offset as usize;
        let remaining = self.data.get(start..).ok_or(ReadError::OutOfBounds {
            offset: start,
            type_name: std::any::type_name::<T>(),
            source_len: self.data.len(),
        })?;

        let mut cursor = Cursor::new(remaining);
        let mut elements = Vec::with_capacity(count.min(remaining.len()));
        for _ in 0..count {
            let element = T::read_options(&mut cursor, self.endian, Default::default())
                .map_err(|e| {
                    if e.is_eof() {
                        ReadError::OutOfBounds {
                            offset: start + cursor.position() as usize,
                            type_name: std::any::type_name::<T>(),
                            source_len: self.data.len(),
                        }
                    } else {
                        ReadError::BinRead(e)
                    }
                })?;
            elements.push(element);
        }
        Ok(elements)
    }
}
