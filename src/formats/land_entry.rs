//! Land entry records and the surface flag encodings for each game.
use binrw::{BinRead, BinWrite};
use bitflags::bitflags;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::bitflags_binrw_impl;
use crate::BoundingSphere;

bitflags! {
    /// The surface flags of an SA1 or SADX land entry.
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Sa1SurfaceFlags: u32 {
        const SOLID = 0x1;
        const WATER = 0x2;
        const NO_FRICTION = 0x4;
        const NO_ACCELERATION = 0x8;
        const LOW_ACCELERATION = 0x10;
        const USE_SKY_DRAW_DISTANCE = 0x20;
        const CANNOT_LAND = 0x40;
        const INCREASED_ACCELERATION = 0x80;
        const DIGGABLE = 0x100;
        const UNCLIMBABLE = 0x1000;
        const CHAOS0_LAND = 0x2000;
        const STAIRS = 0x4000;
        const HURT = 0x10000;
        const FOOTPRINTS = 0x100000;
        const DYNAMIC_COLLISION = 0x8000000;
        const USE_ROTATION = 0x20000000;
        const VISIBLE = 0x80000000;
    }
}

bitflags_binrw_impl!(Sa1SurfaceFlags, u32);

bitflags! {
    /// The surface flags of an SA2 or SA2B land entry.
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Sa2SurfaceFlags: u32 {
        const SOLID = 0x1;
        const WATER = 0x2;
        const NO_FRICTION = 0x4;
        const NO_ACCELERATION = 0x8;
        const LOW_ACCELERATION = 0x10;
        const DIGGABLE = 0x20;
        const UNCLIMBABLE = 0x80;
        const STAIRS = 0x100;
        const HURT = 0x400;
        const FOOTPRINTS = 0x800;
        const CANNOT_LAND = 0x1000;
        const NO_SHADOWS = 0x8000;
        const NO_FOG = 0x400000;
        const VISIBLE = 0x80000000;
    }
}

bitflags_binrw_impl!(Sa2SurfaceFlags, u32);

/// A land entry for SA1 and SADX with a size of 0x24 bytes.
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq)]
pub struct Sa1LandEntryRecord {
    pub bounds: BoundingSphere,
    #[brw(pad_before = 8)]
    pub model: u32,
    pub block_bit: u32,
    pub flags: Sa1SurfaceFlags,
}

impl Sa1LandEntryRecord {
    pub const SIZE: u32 = 0x24;
}

/// A land entry for SA2 and later versions with a size of 0x20 bytes.
///
/// The flags use [Sa2SurfaceFlags] for SA2 and SA2B.
/// Buffer land entries store the flags in their version independent form.
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq)]
pub struct Sa2LandEntryRecord {
    pub bounds: BoundingSphere,
    pub model: u32,
    pub block_bit: u32,
    pub unknown: u32,
    pub flags: u32,
}

impl Sa2LandEntryRecord {
    pub const SIZE: u32 = 0x20;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert_hex_eq, Endian, EndianWriter, SourceReader};
    use hexlit::hex;

    #[test]
    fn read_write_sa1_land_entry_little_endian() {
        let data = hex!(
            00000000 0000803f 00000000 00002041
            00000000 00000000
            40000000 01000000 01000080
        );

        let reader = SourceReader::new(&data, 0, Endian::Little);
        let record = reader.read::<Sa1LandEntryRecord>(0).unwrap();
        assert_eq!([0.0, 1.0, 0.0], record.bounds.center);
        assert_eq!(10.0, record.bounds.radius);
        assert_eq!(0x40, record.model);
        assert_eq!(1, record.block_bit);
        assert_eq!(
            Sa1SurfaceFlags::SOLID | Sa1SurfaceFlags::VISIBLE,
            record.flags
        );

        let mut writer = EndianWriter::new(Endian::Little, 0);
        writer.write(&record).unwrap();
        assert_eq!(Sa1LandEntryRecord::SIZE as usize, data.len());
        assert_hex_eq!(data.to_vec(), writer.into_inner());
    }

    #[test]
    fn read_write_sa2_land_entry_big_endian() {
        let data = hex!(
            3f800000 00000000 00000000 40000000
            8c000100 00000002 00000003 80008001
        );

        let reader = SourceReader::new(&data, 0x8C000000, Endian::Big);
        let record = reader.read::<Sa2LandEntryRecord>(0).unwrap();
        assert_eq!(0x8C000100, record.model);
        assert_eq!(2, record.block_bit);
        assert_eq!(3, record.unknown);
        assert_eq!(
            Sa2SurfaceFlags::SOLID | Sa2SurfaceFlags::NO_SHADOWS | Sa2SurfaceFlags::VISIBLE,
            reader.read::<Sa2SurfaceFlags>(0x1C).unwrap()
        );
        assert_eq!(0x80008001, record.flags);

        let mut writer = EndianWriter::new(Endian::Big, 0x8C000000);
        writer.write(&record).unwrap();
        assert_eq!(Sa2LandEntryRecord::SIZE as usize, data.len());
        assert_hex_eq!(data.to_vec(), writer.into_inner());
    }

    #[test]
    fn unknown_surface_bits_are_kept() {
        let data = hex!(00000200);
        let reader = SourceReader::new(&data, 0, Endian::Big);
        let flags = reader.read::<Sa1SurfaceFlags>(0).unwrap();
        assert_eq!(0x200, flags.bits());
        assert!(!flags.contains(Sa1SurfaceFlags::SOLID));
    }
}
