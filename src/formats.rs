//! Binary records for the supported structures.
//!
//! Each record has the exact size and field order of the data on disk.
//! Pointer fields are raw absolute addresses and should be resolved with
//! [SourceReader::relocate](crate::SourceReader::relocate).

/// Implements endian aware reading and writing for a `modular-bitfield` type
/// stored as a single integer of type `$repr`.
macro_rules! bitfield_binrw_impl {
    ($ty:ty, $repr:ty) => {
        impl binrw::BinRead for $ty {
            type Args<'a> = ();

            fn read_options<R: binrw::io::Read + binrw::io::Seek>(
                reader: &mut R,
                endian: binrw::Endian,
                args: Self::Args<'_>,
            ) -> binrw::BinResult<Self> {
                let value = <$repr as binrw::BinRead>::read_options(reader, endian, args)?;
                Ok(Self::from_bytes(value.to_le_bytes()))
            }
        }

        impl binrw::BinWrite for $ty {
            type Args<'a> = ();

            fn write_options<W: binrw::io::Write + binrw::io::Seek>(
                &self,
                writer: &mut W,
                endian: binrw::Endian,
                args: Self::Args<'_>,
            ) -> binrw::BinResult<()> {
                binrw::BinWrite::write_options(
                    &<$repr>::from_le_bytes(self.into_bytes()),
                    writer,
                    endian,
                    args,
                )
            }
        }
    };
}

/// Implements endian aware reading and writing for a `bitflags` type.
/// Unknown bits are preserved.
macro_rules! bitflags_binrw_impl {
    ($ty:ty, $repr:ty) => {
        impl binrw::BinRead for $ty {
            type Args<'a> = ();

            fn read_options<R: binrw::io::Read + binrw::io::Seek>(
                reader: &mut R,
                endian: binrw::Endian,
                args: Self::Args<'_>,
            ) -> binrw::BinResult<Self> {
                let value = <$repr as binrw::BinRead>::read_options(reader, endian, args)?;
                Ok(Self::from_bits_retain(value))
            }
        }

        impl binrw::BinWrite for $ty {
            type Args<'a> = ();

            fn write_options<W: binrw::io::Write + binrw::io::Seek>(
                &self,
                writer: &mut W,
                endian: binrw::Endian,
                args: Self::Args<'_>,
            ) -> binrw::BinResult<()> {
                binrw::BinWrite::write_options(&self.bits(), writer, endian, args)
            }
        }
    };
}

pub(crate) use bitfield_binrw_impl;
pub(crate) use bitflags_binrw_impl;

pub mod basic;
pub mod buffer;
pub mod land_entry;
pub mod node;
