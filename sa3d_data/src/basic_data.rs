//! Basic attaches are the polygon based `NJS_MODEL` format used by SA1 and SADX.
//!
//! Labels for each array are stored alongside the data,
//! so writing an attach that was read from a file uses the same names.
use ahash::AHashMap;
use glam::{Vec2, Vec3};
use sa3d_lib::{
    formats::basic::{
        BasicModelRecord, BasicPolyType, BasicTexcoord, BlendMode, FilterMode, MaterialFlags,
        MaterialRecord, MeshSetRecord, MeshSetType, StripHeader,
    },
    Color, EndianWriter, ReadError, SourceReader, WriteError,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{attach_data::Bounds, label_or_default, read_pointer_array};

/// A polygon with indices into the positions of a [BasicAttach].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BasicPolygon {
    Triangle([u16; 3]),
    Quad([u16; 4]),
    Strip { indices: Vec<u16>, reversed: bool },
    NPoly { indices: Vec<u16>, reversed: bool },
}

impl BasicPolygon {
    /// The vertex indices for each corner of the polygon.
    pub fn indices(&self) -> &[u16] {
        match self {
            BasicPolygon::Triangle(i) => i.as_slice(),
            BasicPolygon::Quad(i) => i.as_slice(),
            BasicPolygon::Strip { indices, .. } => indices,
            BasicPolygon::NPoly { indices, .. } => indices,
        }
    }

    pub fn poly_type(&self) -> BasicPolyType {
        match self {
            BasicPolygon::Triangle(_) => BasicPolyType::Triangles,
            BasicPolygon::Quad(_) => BasicPolyType::Quads,
            BasicPolygon::Strip { .. } => BasicPolyType::Strips,
            BasicPolygon::NPoly { .. } => BasicPolyType::NPoly,
        }
    }

    /// Triangulates the polygon and returns the positions of each triangle's corners in [indices](#method.indices).
    /**
    ```rust
    use sa3d_data::basic_data::BasicPolygon;

    let strip = BasicPolygon::Strip {
        indices: vec![10, 11, 12, 13, 14],
        reversed: false,
    };
    assert_eq!(vec![[0, 1, 2], [2, 1, 3], [2, 3, 4]], strip.triangle_corners());

    let quad = BasicPolygon::Quad([10, 11, 12, 13]);
    assert_eq!(vec![[0, 1, 2], [2, 1, 3]], quad.triangle_corners());
    ```
    */
    pub fn triangle_corners(&self) -> Vec<[usize; 3]> {
        match self {
            BasicPolygon::Triangle(_) => vec![[0, 1, 2]],
            BasicPolygon::Quad(_) => vec![[0, 1, 2], [2, 1, 3]],
            BasicPolygon::Strip { indices, reversed } | BasicPolygon::NPoly { indices, reversed } => {
                strip_triangles(indices.len(), *reversed)
            }
        }
    }
}

fn strip_triangles(count: usize, reversed: bool) -> Vec<[usize; 3]> {
    let mut reversed = reversed;
    (2..count)
        .map(|i| {
            let triangle = if reversed {
                [i - 1, i - 2, i]
            } else {
                [i - 2, i - 1, i]
            };
            reversed = !reversed;
            triangle
        })
        .collect()
}

/// A material with the options of an `NJS_MATERIAL`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct BasicMaterial {
    pub diffuse: Color,
    pub specular: Color,
    pub exponent: f32,
    pub texture_id: u32,
    pub user_flags: u8,
    pub mipmap_d_adjust: u8,
    pub super_sample: bool,
    pub filter_mode: FilterMode,
    pub clamp_u: bool,
    pub clamp_v: bool,
    pub flip_u: bool,
    pub flip_v: bool,
    pub ignore_specular: bool,
    pub use_alpha: bool,
    pub use_texture: bool,
    pub environment_map: bool,
    pub double_sided: bool,
    pub flat_shading: bool,
    pub ignore_lighting: bool,
    pub source_alpha: BlendMode,
    pub destination_alpha: BlendMode,
}

impl Default for BasicMaterial {
    fn default() -> Self {
        Self {
            diffuse: Color::WHITE,
            specular: Color::WHITE,
            exponent: 11.0,
            texture_id: 0,
            user_flags: 0,
            mipmap_d_adjust: 0,
            super_sample: false,
            filter_mode: FilterMode::Bilinear,
            clamp_u: false,
            clamp_v: false,
            flip_u: false,
            flip_v: false,
            ignore_specular: false,
            use_alpha: false,
            use_texture: true,
            environment_map: false,
            double_sided: false,
            flat_shading: false,
            ignore_lighting: false,
            source_alpha: BlendMode::SrcAlpha,
            destination_alpha: BlendMode::SrcAlphaInverted,
        }
    }
}

impl From<&MaterialRecord> for BasicMaterial {
    fn from(r: &MaterialRecord) -> Self {
        let f = r.flags;
        Self {
            diffuse: r.diffuse,
            specular: r.specular,
            exponent: r.exponent,
            texture_id: r.texture_id,
            user_flags: f.user_flags(),
            mipmap_d_adjust: f.mipmap_d_adjust(),
            super_sample: f.super_sample(),
            filter_mode: f.filter_mode(),
            clamp_u: f.clamp_u(),
            clamp_v: f.clamp_v(),
            flip_u: f.flip_u(),
            flip_v: f.flip_v(),
            ignore_specular: f.ignore_specular(),
            use_alpha: f.use_alpha(),
            use_texture: f.use_texture(),
            environment_map: f.environment_map(),
            double_sided: f.double_sided(),
            flat_shading: f.flat_shading(),
            ignore_lighting: f.ignore_lighting(),
            source_alpha: f.source_alpha(),
            destination_alpha: f.destination_alpha(),
        }
    }
}

impl From<&BasicMaterial> for MaterialRecord {
    fn from(m: &BasicMaterial) -> Self {
        Self {
            diffuse: m.diffuse,
            specular: m.specular,
            exponent: m.exponent,
            texture_id: m.texture_id,
            flags: MaterialFlags::new()
                .with_user_flags(m.user_flags)
                .with_mipmap_d_adjust(m.mipmap_d_adjust.min(0xF))
                .with_super_sample(m.super_sample)
                .with_filter_mode(m.filter_mode)
                .with_clamp_u(m.clamp_u)
                .with_clamp_v(m.clamp_v)
                .with_flip_u(m.flip_u)
                .with_flip_v(m.flip_v)
                .with_ignore_specular(m.ignore_specular)
                .with_use_alpha(m.use_alpha)
                .with_use_texture(m.use_texture)
                .with_environment_map(m.environment_map)
                .with_double_sided(m.double_sided)
                .with_flat_shading(m.flat_shading)
                .with_ignore_lighting(m.ignore_lighting)
                .with_source_alpha(m.source_alpha)
                .with_destination_alpha(m.destination_alpha),
        }
    }
}

/// A group of polygons with the same type and material.
/// Colors and texcoords have one element for each polygon corner.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct BasicMesh {
    pub material_index: u16,
    /// The type for all [polygons](#structfield.polygons).
    pub poly_type: BasicPolyType,
    pub polygons: Vec<BasicPolygon>,
    pub polygon_normals: Option<Vec<Vec3>>,
    pub colors: Option<Vec<Color>>,
    pub texcoords: Option<Vec<Vec2>>,
    pub polygon_label: String,
    pub normal_label: String,
    pub color_label: String,
    pub texcoord_label: String,
}

impl BasicMesh {
    /// The total number of polygon corners.
    pub fn corner_count(&self) -> usize {
        self.polygons.iter().map(|p| p.indices().len()).sum()
    }
}

/// A polygon based attach with shared positions and normals.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BasicAttach {
    pub positions: Vec<Vec3>,
    /// One normal for each position or [None] if the attach has no normals.
    pub normals: Option<Vec<Vec3>>,
    pub meshes: Vec<BasicMesh>,
    pub materials: Vec<BasicMaterial>,
    pub position_label: String,
    pub normal_label: String,
    pub mesh_label: String,
    pub material_label: String,
}

impl BasicAttach {
    /// Reads the `NJS_MODEL` at `offset` and its bounds.
    pub fn read(
        reader: &SourceReader,
        offset: u32,
        dx: bool,
        labels: &AHashMap<u32, String>,
    ) -> Result<(Self, Bounds), ReadError> {
        let record: BasicModelRecord = reader.read(offset)?;
        let position_count = record.position_count as usize;

        let positions = read_vectors(reader, offset, record.positions, position_count)?;
        let normals = match reader.relocate(offset, record.normals)? {
            Some(_) => Some(read_vectors(reader, offset, record.normals, position_count)?),
            None => None,
        };

        let materials: Vec<MaterialRecord> = read_pointer_array(
            reader,
            offset,
            record.materials,
            record.material_count as usize,
        )?;

        let mut meshes = Vec::new();
        if let Some(mesh_offset) = reader.relocate(offset, record.mesh_sets)? {
            for i in 0..record.mesh_set_count as u32 {
                let mesh_set_offset = mesh_offset + i * MeshSetRecord::size(dx);
                let mesh_set: MeshSetRecord = reader.read(mesh_set_offset)?;
                meshes.push(read_mesh(reader, mesh_set_offset, &mesh_set, labels)?);
            }
        }

        let attach = Self {
            positions,
            normals,
            meshes,
            materials: materials.iter().map(BasicMaterial::from).collect(),
            position_label: pointer_label(reader, labels, "vertex", offset, record.positions)?,
            normal_label: pointer_label(reader, labels, "normal", offset, record.normals)?,
            mesh_label: pointer_label(reader, labels, "meshlist", offset, record.mesh_sets)?,
            material_label: pointer_label(reader, labels, "matlist", offset, record.materials)?,
        };

        Ok((attach, record.bounds.into()))
    }

    /// Writes the arrays and `NJS_MODEL` for the attach and returns the address of the model.
    /// Arrays with an already registered label are not written again.
    pub fn write(
        &self,
        writer: &mut EndianWriter,
        label: &str,
        bounds: Bounds,
        dx: bool,
    ) -> Result<u32, WriteError> {
        let positions: Vec<_> = self.positions.iter().map(|p| p.to_array()).collect();
        let positions_address =
            writer.write_labelled_array(&array_label(&self.position_label, "vertex", label), &positions)?;

        let normals: Vec<_> = self
            .normals
            .iter()
            .flatten()
            .map(|n| n.to_array())
            .collect();
        let normals_address =
            writer.write_labelled_array(&array_label(&self.normal_label, "normal", label), &normals)?;

        let mesh_sets = self
            .meshes
            .iter()
            .enumerate()
            .map(|(i, m)| write_mesh_data(writer, m, &format!("{label}_{i}")))
            .collect::<Result<Vec<_>, _>>()?;
        let mesh_sets_address = write_mesh_sets(
            writer,
            &array_label(&self.mesh_label, "meshlist", label),
            &mesh_sets,
            dx,
        )?;

        let materials: Vec<_> = self.materials.iter().map(MaterialRecord::from).collect();
        let materials_address =
            writer.write_labelled_array(&array_label(&self.material_label, "matlist", label), &materials)?;

        writer.align(4)?;
        let address = writer.write(&BasicModelRecord {
            positions: positions_address.unwrap_or(0),
            normals: normals_address.unwrap_or(0),
            position_count: positions.len() as u32,
            mesh_sets: mesh_sets_address.unwrap_or(0),
            materials: materials_address.unwrap_or(0),
            mesh_set_count: mesh_sets.len() as u16,
            material_count: materials.len() as u16,
            bounds: bounds.into(),
        })?;
        if dx {
            writer.write_primitive(0u32)?;
        }
        writer.register_label(label, address);

        Ok(address)
    }
}

/// Generates a label for arrays without one from the label of the attach.
fn array_label(array_label: &str, prefix: &str, label: &str) -> String {
    if array_label.is_empty() {
        format!("{prefix}_{label}")
    } else {
        array_label.to_string()
    }
}

fn pointer_label(
    reader: &SourceReader,
    labels: &AHashMap<u32, String>,
    prefix: &str,
    field_offset: u32,
    pointer: u32,
) -> Result<String, ReadError> {
    Ok(reader
        .relocate(field_offset, pointer)?
        .map(|offset| label_or_default(labels, prefix, offset))
        .unwrap_or_default())
}

fn read_vectors(
    reader: &SourceReader,
    field_offset: u32,
    pointer: u32,
    count: usize,
) -> Result<Vec<Vec3>, ReadError> {
    let values: Vec<[f32; 3]> = read_pointer_array(reader, field_offset, pointer, count)?;
    Ok(values.into_iter().map(Vec3::from).collect())
}

fn read_mesh(
    reader: &SourceReader,
    offset: u32,
    record: &MeshSetRecord,
    labels: &AHashMap<u32, String>,
) -> Result<BasicMesh, ReadError> {
    let poly_type = record.type_matid.poly_type();
    let polygons = match reader.relocate(offset, record.polygons)? {
        Some(polygon_offset) => {
            read_polygons(reader, polygon_offset, poly_type, record.polygon_count)?
        }
        None => Vec::new(),
    };
    let corner_count: usize = polygons.iter().map(|p| p.indices().len()).sum();

    let polygon_normals = match reader.relocate(offset, record.polygon_normals)? {
        Some(_) => Some(read_vectors(
            reader,
            offset,
            record.polygon_normals,
            polygons.len(),
        )?),
        None => None,
    };

    let colors = match reader.relocate(offset, record.colors)? {
        Some(color_offset) => Some(reader.read_array(color_offset, corner_count)?),
        None => None,
    };

    let texcoords = match reader.relocate(offset, record.texcoords)? {
        Some(texcoord_offset) => Some(
            reader
                .read_array::<BasicTexcoord>(texcoord_offset, corner_count)?
                .into_iter()
                .map(|t| Vec2::from(t.to_uv()))
                .collect(),
        ),
        None => None,
    };

    Ok(BasicMesh {
        material_index: record.type_matid.material_id(),
        poly_type,
        polygons,
        polygon_normals,
        colors,
        texcoords,
        polygon_label: pointer_label(reader, labels, "poly", offset, record.polygons)?,
        normal_label: pointer_label(reader, labels, "polynormal", offset, record.polygon_normals)?,
        color_label: pointer_label(reader, labels, "vcolor", offset, record.colors)?,
        texcoord_label: pointer_label(reader, labels, "uv", offset, record.texcoords)?,
    })
}

fn read_polygons(
    reader: &SourceReader,
    offset: u32,
    poly_type: BasicPolyType,
    count: u16,
) -> Result<Vec<BasicPolygon>, ReadError> {
    let count = count as usize;
    match poly_type {
        BasicPolyType::Triangles => Ok(reader
            .read_array::<u16>(offset, count * 3)?
            .chunks_exact(3)
            .map(|i| BasicPolygon::Triangle([i[0], i[1], i[2]]))
            .collect()),
        BasicPolyType::Quads => Ok(reader
            .read_array::<u16>(offset, count * 4)?
            .chunks_exact(4)
            .map(|i| BasicPolygon::Quad([i[0], i[1], i[2], i[3]]))
            .collect()),
        BasicPolyType::Strips | BasicPolyType::NPoly => {
            let mut polygons = Vec::with_capacity(count);
            let mut polygon_offset = offset;
            for _ in 0..count {
                let header: StripHeader = reader.read(polygon_offset)?;
                let index_count = header.count() as usize;
                let indices = reader.read_array::<u16>(polygon_offset + 2, index_count)?;
                polygon_offset += 2 + 2 * index_count as u32;

                let reversed = header.reversed();
                polygons.push(if poly_type == BasicPolyType::Strips {
                    BasicPolygon::Strip { indices, reversed }
                } else {
                    BasicPolygon::NPoly { indices, reversed }
                });
            }
            Ok(polygons)
        }
    }
}

const MAX_STRIP_LENGTH: usize = 0x3FFF;

fn encode_polygons(polygons: &[BasicPolygon]) -> Result<Vec<u16>, WriteError> {
    let mut values = Vec::new();
    for polygon in polygons {
        match polygon {
            BasicPolygon::Triangle(_) | BasicPolygon::Quad(_) => {}
            BasicPolygon::Strip { indices, reversed } | BasicPolygon::NPoly { indices, reversed } => {
                if indices.len() > MAX_STRIP_LENGTH {
                    return Err(WriteError::PolygonTooLong {
                        count: indices.len(),
                        max: MAX_STRIP_LENGTH,
                    });
                }
                let header = StripHeader::new()
                    .with_count(indices.len() as u16)
                    .with_reversed(*reversed);
                values.push(u16::from_le_bytes(header.into_bytes()));
            }
        }
        values.extend_from_slice(polygon.indices());
    }
    Ok(values)
}

fn write_mesh_data(
    writer: &mut EndianWriter,
    mesh: &BasicMesh,
    label: &str,
) -> Result<MeshSetRecord, WriteError> {
    let polygons = writer.write_labelled_array(
        &array_label(&mesh.polygon_label, "poly", label),
        &encode_polygons(&mesh.polygons)?,
    )?;

    let normals: Vec<_> = mesh
        .polygon_normals
        .iter()
        .flatten()
        .map(|n| n.to_array())
        .collect();
    let polygon_normals =
        writer.write_labelled_array(&array_label(&mesh.normal_label, "polynormal", label), &normals)?;

    let colors = writer.write_labelled_array(
        &array_label(&mesh.color_label, "vcolor", label),
        mesh.colors.as_deref().unwrap_or_default(),
    )?;

    let texcoords: Vec<_> = mesh
        .texcoords
        .iter()
        .flatten()
        .map(|t| BasicTexcoord::from_uv(t.to_array()))
        .collect();
    let texcoords =
        writer.write_labelled_array(&array_label(&mesh.texcoord_label, "uv", label), &texcoords)?;

    Ok(MeshSetRecord {
        type_matid: MeshSetType::new()
            .with_material_id(mesh.material_index.min(0x3FFF))
            .with_poly_type(mesh.poly_type),
        polygon_count: mesh.polygons.len() as u16,
        polygons: polygons.unwrap_or(0),
        attributes: 0,
        polygon_normals: polygon_normals.unwrap_or(0),
        colors: colors.unwrap_or(0),
        texcoords: texcoords.unwrap_or(0),
    })
}

fn write_mesh_sets(
    writer: &mut EndianWriter,
    label: &str,
    mesh_sets: &[MeshSetRecord],
    dx: bool,
) -> Result<Option<u32>, WriteError> {
    if mesh_sets.is_empty() {
        return Ok(None);
    }
    if let Some(address) = writer.label_address(label) {
        return Ok(Some(address));
    }

    writer.align(4)?;
    let address = writer.position();
    for mesh_set in mesh_sets {
        writer.write(mesh_set)?;
        if dx {
            writer.write_primitive(0u32)?;
        }
    }
    writer.register_label(label, address);
    Ok(Some(address))
}
