//! Records for Buffer attaches.
//!
//! Buffer attaches store meshes in the same layout used for rendering.
//! Each mesh references arrays of vertices, corners and triangle indices into the corners.
//! Only the first mesh of an attach is expected to have vertices.
use binrw::{BinRead, BinWrite};
use modular_bitfield::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::{
    basic::{BlendMode, FilterMode},
    bitfield_binrw_impl,
};
use crate::{BoundingSphere, Color};

/// A Buffer attach header with a size of 0x18 bytes.
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq)]
pub struct BufferAttachRecord {
    pub meshes: u32,
    pub mesh_count: u32,
    pub bounds: BoundingSphere,
}

impl BufferAttachRecord {
    pub const SIZE: u32 = 0x18;
}

#[bitfield(bits = 16)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferMeshFlags {
    /// Vertices are blended with the weighted vertices of previous meshes.
    pub continue_weight: bool,
    pub has_normals: bool,
    pub has_colors: bool,
    #[skip]
    __: B13,
}

bitfield_binrw_impl!(BufferMeshFlags, u16);

/// The rendering state of a [BufferMeshRecord].
#[bitfield(bits = 32)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferMaterialFlags {
    /// The raw bits of the material attributes.
    pub attributes: B6,
    pub use_alpha: bool,
    pub culling: bool,
    pub clamp_u: bool,
    pub clamp_v: bool,
    pub mirror_u: bool,
    pub mirror_v: bool,
    pub anisotropic_filtering: bool,
    pub texture_filtering: FilterMode,
    pub source_blend_mode: BlendMode,
    pub destination_blend_mode: BlendMode,
    pub mipmap_distance_adjust: B4,
    #[skip]
    __: B7,
}

bitfield_binrw_impl!(BufferMaterialFlags, u32);

/// A material with a size of 0x18 bytes.
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq)]
pub struct BufferMaterialRecord {
    pub ambient: Color,
    pub diffuse: Color,
    pub specular: Color,
    pub specular_exponent: f32,
    pub texture_index: u32,
    pub flags: BufferMaterialFlags,
}

/// A mesh with a size of 0x30 bytes.
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq)]
pub struct BufferMeshRecord {
    pub flags: BufferMeshFlags,
    pub vertex_count: u16,
    pub vertices: u32,
    pub corner_count: u32,
    pub corners: u32,
    pub index_count: u32,
    /// `u32` indices into the corners with three indices per triangle.
    pub indices: u32,
    pub material: BufferMaterialRecord,
}

impl BufferMeshRecord {
    pub const SIZE: u32 = 0x30;
}

/// A vertex with a size of 0x20 bytes.
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq)]
pub struct BufferVertexRecord {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    #[brw(pad_after = 2)]
    pub index: u16,
    pub weight: f32,
}

/// A triangle corner with a size of 0x10 bytes.
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq)]
pub struct BufferCornerRecord {
    #[brw(pad_after = 2)]
    pub vertex_index: u16,
    pub color: Color,
    pub texcoord: [f32; 2],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assert_hex_eq, Endian, EndianWriter, SourceReader};
    use hexlit::hex;

    #[test]
    fn read_write_vertex_record_little_endian() {
        let data = hex!(
            0000803f 00000040 00004040
            00000000 0000803f 00000000
            0500 0000 0000003f
        );

        let reader = SourceReader::new(&data, 0, Endian::Little);
        let record = reader.read::<BufferVertexRecord>(0).unwrap();
        assert_eq!(
            BufferVertexRecord {
                position: [1.0, 2.0, 3.0],
                normal: [0.0, 1.0, 0.0],
                index: 5,
                weight: 0.5
            },
            record
        );

        let mut writer = EndianWriter::new(Endian::Little, 0);
        writer.write(&record).unwrap();
        assert_hex_eq!(data.to_vec(), writer.into_inner());
    }

    #[test]
    fn read_write_corner_record_big_endian() {
        let data = hex!(0003 0000 ff102030 3f800000 bf000000);

        let reader = SourceReader::new(&data, 0, Endian::Big);
        let record = reader.read::<BufferCornerRecord>(0).unwrap();
        assert_eq!(
            BufferCornerRecord {
                vertex_index: 3,
                color: Color::new(0x10, 0x20, 0x30, 0xFF),
                texcoord: [1.0, -0.5]
            },
            record
        );

        let mut writer = EndianWriter::new(Endian::Big, 0);
        writer.write(&record).unwrap();
        assert_hex_eq!(data.to_vec(), writer.into_inner());
    }

    #[test]
    fn write_mesh_record_size() {
        let record = BufferMeshRecord {
            flags: BufferMeshFlags::new().with_has_normals(true),
            vertex_count: 3,
            vertices: 0x100,
            corner_count: 3,
            corners: 0x160,
            index_count: 3,
            indices: 0x190,
            material: BufferMaterialRecord {
                ambient: Color::BLACK,
                diffuse: Color::WHITE,
                specular: Color::WHITE,
                specular_exponent: 11.0,
                texture_index: 0,
                flags: BufferMaterialFlags::new()
                    .with_culling(true)
                    .with_source_blend_mode(BlendMode::SrcAlpha)
                    .with_destination_blend_mode(BlendMode::SrcAlphaInverted),
            },
        };

        let mut writer = EndianWriter::new(Endian::Little, 0);
        writer.write(&record).unwrap();
        let bytes = writer.into_inner();
        assert_eq!(BufferMeshRecord::SIZE as usize, bytes.len());

        let reader = SourceReader::new(&bytes, 0, Endian::Little);
        assert_eq!(record, reader.read::<BufferMeshRecord>(0).unwrap());
    }

    #[test]
    fn material_flag_bits() {
        let flags = BufferMaterialFlags::new()
            .with_use_alpha(true)
            .with_texture_filtering(FilterMode::Trilinear)
            .with_mipmap_distance_adjust(3);
        assert_eq!(0x0060_4040u32, u32::from_le_bytes(flags.into_bytes()));
    }
}
