//! Buffer meshes are the rendering representation of an [Attach](crate::attach_data::Attach).
//!
//! The vertices of a mesh are written to slots in a shared vertex buffer using [BufferVertex::index].
//! Corners reference vertex slots rather than positions in the vertex list,
//! so later meshes of an attach can reuse the vertices of the first mesh.
use ahash::AHashMap;
use bitflags::bitflags;
use glam::{Vec2, Vec3};
use itertools::Itertools;
use sa3d_lib::{
    formats::{
        basic::{BlendMode, FilterMode},
        buffer::{
            BufferAttachRecord, BufferCornerRecord, BufferMaterialFlags, BufferMaterialRecord,
            BufferMeshFlags, BufferMeshRecord, BufferVertexRecord,
        },
    },
    Color, EndianWriter, ReadError, SourceReader, WriteError,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{attach_data::Bounds, read_pointer_array};

bitflags! {
    /// Lighting and shading options for a [BufferMaterial].
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MaterialAttributes: u8 {
        const FLAT = 0x1;
        const NO_AMBIENT = 0x2;
        const NO_DIFFUSE = 0x4;
        const NO_SPECULAR = 0x8;
        const USE_TEXTURE = 0x10;
        const NORMAL_MAPPING = 0x20;
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct BufferMaterial {
    pub ambient: Color,
    pub diffuse: Color,
    pub specular: Color,
    pub specular_exponent: f32,
    pub texture_index: u32,
    pub texture_filtering: FilterMode,
    pub mipmap_distance_adjust: u8,
    pub anisotropic_filtering: bool,
    pub clamp_u: bool,
    pub clamp_v: bool,
    pub mirror_u: bool,
    pub mirror_v: bool,
    pub use_alpha: bool,
    pub source_blend_mode: BlendMode,
    pub destination_blend_mode: BlendMode,
    /// Back faces are not rendered.
    pub culling: bool,
    pub attributes: MaterialAttributes,
}

impl Default for BufferMaterial {
    fn default() -> Self {
        Self {
            ambient: Color::BLACK,
            diffuse: Color::WHITE,
            specular: Color::WHITE,
            specular_exponent: 11.0,
            texture_index: 0,
            texture_filtering: FilterMode::Bilinear,
            mipmap_distance_adjust: 0,
            anisotropic_filtering: false,
            clamp_u: false,
            clamp_v: false,
            mirror_u: false,
            mirror_v: false,
            use_alpha: false,
            source_blend_mode: BlendMode::SrcAlpha,
            destination_blend_mode: BlendMode::SrcAlphaInverted,
            culling: false,
            attributes: MaterialAttributes::empty(),
        }
    }
}

impl From<&BufferMaterialRecord> for BufferMaterial {
    fn from(r: &BufferMaterialRecord) -> Self {
        Self {
            ambient: r.ambient,
            diffuse: r.diffuse,
            specular: r.specular,
            specular_exponent: r.specular_exponent,
            texture_index: r.texture_index,
            texture_filtering: r.flags.texture_filtering(),
            mipmap_distance_adjust: r.flags.mipmap_distance_adjust(),
            anisotropic_filtering: r.flags.anisotropic_filtering(),
            clamp_u: r.flags.clamp_u(),
            clamp_v: r.flags.clamp_v(),
            mirror_u: r.flags.mirror_u(),
            mirror_v: r.flags.mirror_v(),
            use_alpha: r.flags.use_alpha(),
            source_blend_mode: r.flags.source_blend_mode(),
            destination_blend_mode: r.flags.destination_blend_mode(),
            culling: r.flags.culling(),
            attributes: MaterialAttributes::from_bits_retain(r.flags.attributes()),
        }
    }
}

impl From<&BufferMaterial> for BufferMaterialRecord {
    fn from(m: &BufferMaterial) -> Self {
        Self {
            ambient: m.ambient,
            diffuse: m.diffuse,
            specular: m.specular,
            specular_exponent: m.specular_exponent,
            texture_index: m.texture_index,
            flags: BufferMaterialFlags::new()
                .with_attributes(m.attributes.bits() & 0x3F)
                .with_use_alpha(m.use_alpha)
                .with_culling(m.culling)
                .with_clamp_u(m.clamp_u)
                .with_clamp_v(m.clamp_v)
                .with_mirror_u(m.mirror_u)
                .with_mirror_v(m.mirror_v)
                .with_anisotropic_filtering(m.anisotropic_filtering)
                .with_texture_filtering(m.texture_filtering)
                .with_source_blend_mode(m.source_blend_mode)
                .with_destination_blend_mode(m.destination_blend_mode)
                .with_mipmap_distance_adjust(m.mipmap_distance_adjust.min(0xF)),
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferVertex {
    pub position: Vec3,
    /// Vertices without normals use [Vec3::Y].
    pub normal: Vec3,
    /// The slot in the vertex buffer written by this vertex.
    pub index: u16,
    /// The blend weight for the vertex or `1.0` for unweighted vertices.
    pub weight: f32,
}

impl BufferVertex {
    pub fn new(position: Vec3, normal: Vec3, index: u16) -> Self {
        Self {
            position,
            normal,
            index,
            weight: 1.0,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferCorner {
    /// The vertex buffer slot for this corner.
    pub vertex_index: u16,
    pub color: Color,
    pub texcoord: Vec2,
}

impl BufferCorner {
    pub fn new(vertex_index: u16) -> Self {
        Self {
            vertex_index,
            color: Color::WHITE,
            texcoord: Vec2::ZERO,
        }
    }

    fn key(&self) -> (u16, u32, u32, u32) {
        (
            self.vertex_index,
            self.color.to_argb(),
            self.texcoord.x.to_bits(),
            self.texcoord.y.to_bits(),
        )
    }
}

/// A single draw call with its vertices, triangle corners and material.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BufferMesh {
    /// The vertices to write to the vertex buffer before drawing.
    /// This is usually empty for all but the first mesh of an attach.
    pub vertices: Vec<BufferVertex>,
    pub corners: Vec<BufferCorner>,
    /// Indices into [corners](#structfield.corners) with three indices per triangle.
    pub triangle_list: Vec<u32>,
    pub material: BufferMaterial,
    pub has_normals: bool,
    pub has_colors: bool,
    /// Weighted vertices are blended with the vertex buffer instead of replacing it.
    pub continue_weight: bool,
}

impl BufferMesh {
    /// Returns `true` if the mesh blends weighted vertices.
    pub fn has_weights(&self) -> bool {
        self.continue_weight || self.vertices.iter().any(|v| v.weight != 1.0)
    }

    /// The corners for each triangle in the triangle list.
    /// Triangles with out of range indices are skipped.
    pub fn triangle_corners(&self) -> Vec<[BufferCorner; 3]> {
        self.triangle_list
            .iter()
            .tuples()
            .filter_map(|(a, b, c)| {
                Some([
                    *self.corners.get(*a as usize)?,
                    *self.corners.get(*b as usize)?,
                    *self.corners.get(*c as usize)?,
                ])
            })
            .collect()
    }

    /// Removes duplicate corners, degenerate triangles and unused corners.
    /// Vertices are not modified.
    pub fn optimize(&mut self) {
        let mut unique_corners = Vec::new();
        let mut corner_indices = AHashMap::new();
        let remap: Vec<u32> = self
            .corners
            .iter()
            .map(|c| {
                *corner_indices.entry(c.key()).or_insert_with(|| {
                    unique_corners.push(*c);
                    unique_corners.len() as u32 - 1
                })
            })
            .collect();

        let mut triangle_list: Vec<u32> = self
            .triangle_list
            .iter()
            .tuples()
            .filter_map(|(a, b, c)| {
                Some([
                    *remap.get(*a as usize)?,
                    *remap.get(*b as usize)?,
                    *remap.get(*c as usize)?,
                ])
            })
            .filter(|[a, b, c]| {
                let a = unique_corners[*a as usize].vertex_index;
                let b = unique_corners[*b as usize].vertex_index;
                let c = unique_corners[*c as usize].vertex_index;
                a != b && b != c && a != c
            })
            .flatten()
            .collect();

        // Corners are reordered by first use.
        let mut used_indices = vec![None; unique_corners.len()];
        let mut corners = Vec::new();
        for index in &mut triangle_list {
            let old_index = *index as usize;
            *index = *used_indices[old_index].get_or_insert_with(|| {
                corners.push(unique_corners[old_index]);
                corners.len() as u32 - 1
            });
        }

        self.corners = corners;
        self.triangle_list = triangle_list;
    }
}

/// Runs [BufferMesh::optimize] on copies of `meshes`.
pub fn optimize_meshes(meshes: &[BufferMesh]) -> Vec<BufferMesh> {
    meshes
        .iter()
        .cloned()
        .map(|mut m| {
            m.optimize();
            m
        })
        .collect()
}

pub(crate) fn read_buffer_attach(
    reader: &SourceReader,
    offset: u32,
) -> Result<(Vec<BufferMesh>, Bounds), ReadError> {
    let record: BufferAttachRecord = reader.read(offset)?;
    let mesh_records: Vec<BufferMeshRecord> =
        read_pointer_array(reader, offset, record.meshes, record.mesh_count as usize)?;

    let meshes = mesh_records
        .iter()
        .map(|m| read_buffer_mesh(reader, offset, m))
        .collect::<Result<Vec<_>, _>>()?;

    Ok((meshes, record.bounds.into()))
}

fn read_buffer_mesh(
    reader: &SourceReader,
    offset: u32,
    record: &BufferMeshRecord,
) -> Result<BufferMesh, ReadError> {
    let vertices: Vec<BufferVertexRecord> = read_pointer_array(
        reader,
        offset,
        record.vertices,
        record.vertex_count as usize,
    )?;
    let corners: Vec<BufferCornerRecord> =
        read_pointer_array(reader, offset, record.corners, record.corner_count as usize)?;
    let triangle_list: Vec<u32> =
        read_pointer_array(reader, offset, record.indices, record.index_count as usize)?;

    Ok(BufferMesh {
        vertices: vertices
            .into_iter()
            .map(|v| BufferVertex {
                position: v.position.into(),
                normal: v.normal.into(),
                index: v.index,
                weight: v.weight,
            })
            .collect(),
        corners: corners
            .into_iter()
            .map(|c| BufferCorner {
                vertex_index: c.vertex_index,
                color: c.color,
                texcoord: c.texcoord.into(),
            })
            .collect(),
        triangle_list,
        material: (&record.material).into(),
        has_normals: record.flags.has_normals(),
        has_colors: record.flags.has_colors(),
        continue_weight: record.flags.continue_weight(),
    })
}

pub(crate) fn write_buffer_attach(
    writer: &mut EndianWriter,
    label: &str,
    meshes: &[BufferMesh],
    bounds: Bounds,
) -> Result<u32, WriteError> {
    let records = meshes
        .iter()
        .enumerate()
        .map(|(i, mesh)| write_buffer_mesh_data(writer, label, i, mesh))
        .collect::<Result<Vec<_>, _>>()?;

    let meshes_address = writer.write_labelled_array(&format!("{label}_meshes"), &records)?;

    writer.align(4)?;
    let address = writer.write(&BufferAttachRecord {
        meshes: meshes_address.unwrap_or(0),
        mesh_count: records.len() as u32,
        bounds: bounds.into(),
    })?;
    writer.register_label(label, address);
    Ok(address)
}

fn write_buffer_mesh_data(
    writer: &mut EndianWriter,
    label: &str,
    index: usize,
    mesh: &BufferMesh,
) -> Result<BufferMeshRecord, WriteError> {
    let vertices: Vec<_> = mesh
        .vertices
        .iter()
        .map(|v| BufferVertexRecord {
            position: v.position.to_array(),
            normal: v.normal.to_array(),
            index: v.index,
            weight: v.weight,
        })
        .collect();
    let corners: Vec<_> = mesh
        .corners
        .iter()
        .map(|c| BufferCornerRecord {
            vertex_index: c.vertex_index,
            color: c.color,
            texcoord: c.texcoord.to_array(),
        })
        .collect();

    let vertices_address =
        writer.write_labelled_array(&format!("{label}_vertices_{index}"), &vertices)?;
    let corners_address =
        writer.write_labelled_array(&format!("{label}_corners_{index}"), &corners)?;
    let indices_address =
        writer.write_labelled_array(&format!("{label}_indices_{index}"), &mesh.triangle_list)?;

    Ok(BufferMeshRecord {
        flags: BufferMeshFlags::new()
            .with_continue_weight(mesh.continue_weight)
            .with_has_normals(mesh.has_normals)
            .with_has_colors(mesh.has_colors),
        vertex_count: vertices.len() as u16,
        vertices: vertices_address.unwrap_or(0),
        corner_count: corners.len() as u32,
        corners: corners_address.unwrap_or(0),
        index_count: mesh.triangle_list.len() as u32,
        indices: indices_address.unwrap_or(0),
        material: (&mesh.material).into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sa3d_lib::Endian;

    fn corner(vertex_index: u16, u: f32) -> BufferCorner {
        BufferCorner {
            vertex_index,
            color: Color::WHITE,
            texcoord: Vec2::new(u, 0.0),
        }
    }

    #[test]
    fn optimize_duplicate_corners() {
        let mut mesh = BufferMesh {
            corners: vec![
                corner(0, 0.0),
                corner(1, 0.0),
                corner(2, 0.0),
                corner(2, 0.0),
                corner(1, 0.0),
                corner(3, 0.0),
            ],
            triangle_list: vec![0, 1, 2, 3, 4, 5],
            ..Default::default()
        };
        mesh.optimize();

        assert_eq!(
            vec![corner(0, 0.0), corner(1, 0.0), corner(2, 0.0), corner(3, 0.0)],
            mesh.corners
        );
        assert_eq!(vec![0, 1, 2, 2, 1, 3], mesh.triangle_list);
    }

    #[test]
    fn optimize_degenerate_triangles() {
        let mut mesh = BufferMesh {
            corners: vec![
                corner(0, 0.0),
                corner(0, 0.5),
                corner(1, 0.0),
                corner(2, 0.0),
                corner(3, 0.0),
            ],
            triangle_list: vec![0, 1, 2, 2, 3, 4],
            ..Default::default()
        };
        mesh.optimize();

        // The first triangle references vertex 0 twice.
        assert_eq!(
            vec![corner(1, 0.0), corner(2, 0.0), corner(3, 0.0)],
            mesh.corners
        );
        assert_eq!(vec![0, 1, 2], mesh.triangle_list);
    }

    #[test]
    fn optimize_keeps_vertices() {
        let vertices = vec![
            BufferVertex::new(Vec3::ZERO, Vec3::Y, 0),
            BufferVertex::new(Vec3::X, Vec3::Y, 1),
        ];
        let mut mesh = BufferMesh {
            vertices: vertices.clone(),
            ..Default::default()
        };
        mesh.optimize();
        assert_eq!(vertices, mesh.vertices);
        assert!(mesh.corners.is_empty());
    }

    #[test]
    fn mesh_weights() {
        let mut mesh = BufferMesh {
            vertices: vec![BufferVertex::new(Vec3::ZERO, Vec3::Y, 0)],
            ..Default::default()
        };
        assert!(!mesh.has_weights());

        mesh.vertices[0].weight = 0.5;
        assert!(mesh.has_weights());

        mesh.vertices[0].weight = 1.0;
        mesh.continue_weight = true;
        assert!(mesh.has_weights());
    }

    #[test]
    fn material_record_conversion() {
        let material = BufferMaterial {
            diffuse: Color::new(1, 2, 3, 4),
            texture_index: 7,
            texture_filtering: FilterMode::Trilinear,
            mipmap_distance_adjust: 5,
            clamp_v: true,
            mirror_u: true,
            use_alpha: true,
            culling: true,
            attributes: MaterialAttributes::FLAT | MaterialAttributes::USE_TEXTURE,
            ..Default::default()
        };

        let record = BufferMaterialRecord::from(&material);
        assert_eq!(0x11, record.flags.attributes());
        assert_eq!(material, BufferMaterial::from(&record));
    }

    #[test]
    fn read_write_buffer_attach() {
        let meshes = vec![
            BufferMesh {
                vertices: vec![
                    BufferVertex::new(Vec3::ZERO, Vec3::Y, 0),
                    BufferVertex::new(Vec3::X, Vec3::Y, 1),
                    BufferVertex::new(Vec3::Z, Vec3::Y, 2),
                ],
                corners: vec![corner(0, 0.0), corner(1, 1.0), corner(2, 0.5)],
                triangle_list: vec![0, 1, 2],
                has_normals: true,
                ..Default::default()
            },
            BufferMesh {
                corners: vec![corner(2, 0.0), corner(1, 0.0), corner(0, 0.0)],
                triangle_list: vec![0, 1, 2],
                has_colors: true,
                material: BufferMaterial {
                    diffuse: Color::new(0xF9, 0xF9, 0xF9, 0xFF),
                    ..Default::default()
                },
                ..Default::default()
            },
        ];
        let bounds = Bounds {
            center: Vec3::new(0.5, 0.0, 0.5),
            radius: 1.0,
        };

        let mut writer = EndianWriter::new(Endian::Big, 0x8C000000);
        let address = write_buffer_attach(&mut writer, "attach", &meshes, bounds).unwrap();
        assert_eq!(Some(address), writer.label_address("attach"));
        assert_eq!(None, writer.label_address("attach_vertices_1"));

        let bytes = writer.into_inner();
        let reader = SourceReader::new(&bytes, 0x8C000000, Endian::Big);
        let (new_meshes, new_bounds) = read_buffer_attach(&reader, address - 0x8C000000).unwrap();
        assert_eq!(meshes, new_meshes);
        assert_eq!(bounds, new_bounds);
    }
}
