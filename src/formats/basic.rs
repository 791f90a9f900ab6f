//! Records for Basic attaches, the `NJS_MODEL` format used by SA1 and SADX.
//!
//! The SADX variants of [BasicModelRecord] and [MeshSetRecord] end with an additional
//! pointer that is always null in practice.
//! The records here describe the shared layout, and the sizes for each variant are
//! available from [BasicModelRecord::size] and [MeshSetRecord::size].
use binrw::{BinRead, BinWrite};
use modular_bitfield::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::bitfield_binrw_impl;
use crate::{BoundingSphere, Color};

/// The primitive type for all polygons in a mesh set.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BitfieldSpecifier)]
#[bits = 2]
pub enum BasicPolyType {
    Triangles = 0,
    Quads = 1,
    NPoly = 2,
    Strips = 3,
}

/// The packed `type_matid` field of a mesh set.
#[bitfield(bits = 16)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshSetType {
    pub material_id: B14,
    pub poly_type: BasicPolyType,
}

bitfield_binrw_impl!(MeshSetType, u16);

/// An `NJS_MODEL` with a size of 0x28 bytes or 0x2C bytes for SADX.
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq)]
pub struct BasicModelRecord {
    pub positions: u32,
    pub normals: u32,
    pub position_count: u32,
    pub mesh_sets: u32,
    pub materials: u32,
    pub mesh_set_count: u16,
    pub material_count: u16,
    pub bounds: BoundingSphere,
}

impl BasicModelRecord {
    pub fn size(dx: bool) -> u32 {
        if dx {
            0x2C
        } else {
            0x28
        }
    }
}

/// An `NJS_MESHSET` with a size of 0x18 bytes or 0x1C bytes for SADX.
/// The number of polygon normals matches the number of polygons.
/// Colors and texcoords have one entry per polygon corner.
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq)]
pub struct MeshSetRecord {
    pub type_matid: MeshSetType,
    pub polygon_count: u16,
    pub polygons: u32,
    /// Unused polygon attributes.
    pub attributes: u32,
    pub polygon_normals: u32,
    pub colors: u32,
    pub texcoords: u32,
}

impl MeshSetRecord {
    pub fn size(dx: bool) -> u32 {
        if dx {
            0x1C
        } else {
            0x18
        }
    }
}

/// The blend factor for alpha blending.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BitfieldSpecifier)]
#[bits = 3]
pub enum BlendMode {
    Zero = 0,
    One = 1,
    Other = 2,
    OtherInverted = 3,
    SrcAlpha = 4,
    SrcAlphaInverted = 5,
    DstAlpha = 6,
    DstAlphaInverted = 7,
}

/// Texture sampling.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, BitfieldSpecifier)]
#[bits = 2]
pub enum FilterMode {
    PointSampled = 0,
    Bilinear = 1,
    Trilinear = 2,
    Reserved = 3,
}

/// The attribute word of an `NJS_MATERIAL`.
#[bitfield(bits = 32)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialFlags {
    /// Game specific flags.
    pub user_flags: B8,
    pub mipmap_d_adjust: B4,
    pub super_sample: bool,
    pub filter_mode: FilterMode,
    pub clamp_v: bool,
    pub clamp_u: bool,
    pub flip_v: bool,
    pub flip_u: bool,
    pub ignore_specular: bool,
    pub use_alpha: bool,
    pub use_texture: bool,
    pub environment_map: bool,
    pub double_sided: bool,
    pub flat_shading: bool,
    pub ignore_lighting: bool,
    pub destination_alpha: BlendMode,
    pub source_alpha: BlendMode,
}

bitfield_binrw_impl!(MaterialFlags, u32);

/// An `NJS_MATERIAL` with a size of 0x14 bytes.
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq)]
pub struct MaterialRecord {
    pub diffuse: Color,
    pub specular: Color,
    pub exponent: f32,
    pub texture_id: u32,
    pub flags: MaterialFlags,
}

impl MaterialRecord {
    pub const SIZE: u32 = 0x14;
}

/// The header preceding the indices of each strip or n-gon.
#[bitfield(bits = 16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripHeader {
    pub count: B14,
    #[skip]
    __: B1,
    pub reversed: bool,
}

bitfield_binrw_impl!(StripHeader, u16);

/// A texture coordinate stored as a pair of integers scaled by 255.
#[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BasicTexcoord {
    pub u: i16,
    pub v: i16,
}

impl BasicTexcoord {
    const SCALE: f32 = 255.0;

    /**
    ```rust
    use sa3d_lib::formats::basic::BasicTexcoord;

    let texcoord = BasicTexcoord::from_uv([1.0, -0.5]);
    assert_eq!(BasicTexcoord { u: 255, v: -128 }, texcoord);
    ```
    */
    pub fn from_uv(uv: [f32; 2]) -> Self {
        Self {
            u: (uv[0] * Self::SCALE).round() as i16,
            v: (uv[1] * Self::SCALE).round() as i16,
        }
    }

    pub fn to_uv(self) -> [f32; 2] {
        [self.u as f32 / Self::SCALE, self.v as f32 / Self::SCALE]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert_hex_eq, Endian, EndianWriter, SourceReader};
    use hexlit::hex;

    #[test]
    fn mesh_set_type_bits() {
        let value = MeshSetType::from_bytes(0xC005u16.to_le_bytes());
        assert_eq!(5, value.material_id());
        assert_eq!(BasicPolyType::Strips, value.poly_type());

        let value = MeshSetType::new()
            .with_material_id(2)
            .with_poly_type(BasicPolyType::Quads);
        assert_eq!(0x4002, u16::from_le_bytes(value.into_bytes()));
    }

    #[test]
    fn strip_header_bits() {
        let header = StripHeader::from_bytes(0x8004u16.to_le_bytes());
        assert_eq!(4, header.count());
        assert!(header.reversed());

        let header = StripHeader::from_bytes(0x0003u16.to_le_bytes());
        assert_eq!(3, header.count());
        assert!(!header.reversed());
    }

    #[test]
    fn material_flag_bits() {
        let flags = MaterialFlags::from_bytes(0x96302000u32.to_le_bytes());
        assert_eq!(FilterMode::Bilinear, flags.filter_mode());
        assert!(flags.use_alpha());
        assert!(flags.use_texture());
        assert!(flags.ignore_lighting());
        assert!(!flags.double_sided());
        assert_eq!(BlendMode::SrcAlpha, flags.source_alpha());
        assert_eq!(BlendMode::SrcAlphaInverted, flags.destination_alpha());
        assert_eq!(0, flags.user_flags());
    }

    #[test]
    fn read_write_material_record_little_endian() {
        let data = hex!(
            b2b2b2ff ffffffff 0000a041 02000000 00203096
        );

        let reader = SourceReader::new(&data, 0, Endian::Little);
        let record = reader.read::<MaterialRecord>(0).unwrap();
        assert_eq!(Color::new(0xB2, 0xB2, 0xB2, 0xFF), record.diffuse);
        assert_eq!(Color::WHITE, record.specular);
        assert_eq!(20.0, record.exponent);
        assert_eq!(2, record.texture_id);
        assert!(record.flags.use_texture());

        let mut writer = EndianWriter::new(Endian::Little, 0);
        writer.write(&record).unwrap();
        assert_eq!(MaterialRecord::SIZE as usize, data.len());
        assert_hex_eq!(data.to_vec(), writer.into_inner());
    }

    #[test]
    fn read_write_mesh_set_record_big_endian() {
        let data = hex!(
            c0010002 8c000100 00000000 8c000200 00000000 8c000300
        );

        let reader = SourceReader::new(&data, 0x8C000000, Endian::Big);
        let record = reader.read::<MeshSetRecord>(0).unwrap();
        assert_eq!(1, record.type_matid.material_id());
        assert_eq!(BasicPolyType::Strips, record.type_matid.poly_type());
        assert_eq!(2, record.polygon_count);
        assert_eq!(0x8C000100, record.polygons);
        assert_eq!(0x8C000200, record.polygon_normals);
        assert_eq!(0, record.colors);
        assert_eq!(0x8C000300, record.texcoords);

        let mut writer = EndianWriter::new(Endian::Big, 0x8C000000);
        writer.write(&record).unwrap();
        assert_eq!(MeshSetRecord::size(false) as usize, data.len());
        assert_hex_eq!(data.to_vec(), writer.into_inner());
    }

    #[test]
    fn read_model_record_little_endian() {
        let data = hex!(
            00010000 40010000 03000000 80010000 a0010000 0100 0200
            00000000 0000803f 00000000 00000040
        );

        let reader = SourceReader::new(&data, 0, Endian::Little);
        let record = reader.read::<BasicModelRecord>(0).unwrap();
        assert_eq!(0x100, record.positions);
        assert_eq!(0x140, record.normals);
        assert_eq!(3, record.position_count);
        assert_eq!(0x180, record.mesh_sets);
        assert_eq!(0x1A0, record.materials);
        assert_eq!(1, record.mesh_set_count);
        assert_eq!(2, record.material_count);
        assert_eq!([0.0, 1.0, 0.0], record.bounds.center);
        assert_eq!(2.0, record.bounds.radius);
        assert_eq!(BasicModelRecord::size(false) as usize, data.len());
    }

    #[test]
    fn texcoord_scale() {
        assert_eq!([1.0, 0.0], BasicTexcoord { u: 255, v: 0 }.to_uv());
        assert_eq!(
            BasicTexcoord { u: 51, v: -255 },
            BasicTexcoord::from_uv([0.2, -1.0])
        );
    }
}
