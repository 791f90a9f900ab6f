//! Endian aware encoding and decoding of integer and floating point primitives.
use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::{Endian, ReadError};

/// A fixed size number that can be encoded and decoded with either [Endian].
pub trait Primitive: Sized + Copy {
    /// The size of the encoded value in bytes.
    const SIZE: usize;

    /// Decodes the value from the first [Primitive::SIZE] bytes of `bytes`.
    ///
    /// # Panics
    /// Panics if `bytes` is shorter than [Primitive::SIZE].
    fn decode(bytes: &[u8], endian: Endian) -> Self;

    /// Encodes the value as exactly [Primitive::SIZE] bytes.
    fn encode(self, endian: Endian) -> Vec<u8>;
}

macro_rules! primitive_impl {
    ($($ty:ty => $read:ident, $write:ident);* $(;)?) => {
        $(
            impl Primitive for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn decode(bytes: &[u8], endian: Endian) -> Self {
                    match endian {
                        Endian::Big => BigEndian::$read(bytes),
                        Endian::Little => LittleEndian::$read(bytes),
                    }
                }

                fn encode(self, endian: Endian) -> Vec<u8> {
                    let mut bytes = vec![0u8; Self::SIZE];
                    match endian {
                        Endian::Big => BigEndian::$write(&mut bytes, self),
                        Endian::Little => LittleEndian::$write(&mut bytes, self),
                    }
                    bytes
                }
            }
        )*
    };
}

primitive_impl!(
    u16 => read_u16, write_u16;
    i16 => read_i16, write_i16;
    u32 => read_u32, write_u32;
    i32 => read_i32, write_i32;
    u64 => read_u64, write_u64;
    i64 => read_i64, write_i64;
    f32 => read_f32, write_f32;
    f64 => read_f64, write_f64;
);

/// Guesses the endianness of `data` from the field of type `T` at `offset`.
///
/// Header fields like counts and flags are small numbers,
/// so the interpretation with the smaller value is assumed to be correct.
/// Ties are resolved as [Endian::Little].
/**
```rust
use sa3d_lib::{detect_endian, Endian};

let data = [0u8, 0u8, 0u8, 2u8, 2u8, 0u8];
assert_eq!(Endian::Big, detect_endian::<u32>(&data, 0).unwrap());
assert_eq!(Endian::Little, detect_endian::<u16>(&data, 4).unwrap());
```
*/
pub fn detect_endian<T: Primitive + PartialOrd>(
    data: &[u8],
    offset: usize,
) -> Result<Endian, ReadError> {
    let bytes = offset
        .checked_add(T::SIZE)
        .and_then(|end| data.get(offset..end))
        .ok_or(ReadError::OutOfBounds {
            offset,
            type_name: std::any::type_name::<T>(),
            source_len: data.len(),
        })?;

    let big = T::decode(bytes, Endian::Big);
    let little = T::decode(bytes, Endian::Little);
    if big < little {
        Ok(Endian::Big)
    } else {
        Ok(Endian::Little)
    }
}
