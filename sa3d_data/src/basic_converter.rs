//! Conversions between [BasicAttach] and the [BufferMesh] used for rendering and editing.
//!
//! [convert_from_basic] fills the [mesh_data](crate::attach_data::Attach::mesh_data) of every Basic attach in a hierarchy.
//! [convert_to_basic] replaces the attach data with Basic attaches encoded from the buffer meshes.
//! Buffer meshes only store triangles, so strips and quads are triangulated
//! and written back as triangle lists.
use glam::{Vec2, Vec3};
use log::{debug, warn};
use sa3d_lib::{formats::basic::BasicPolyType, AttachFormat, Color};
use thiserror::Error;

use crate::{
    attach_data::{AttachData, Bounds},
    basic_data::{BasicAttach, BasicMaterial, BasicMesh, BasicPolygon},
    buffer_data::{
        optimize_meshes, BufferCorner, BufferMaterial, BufferMesh, BufferVertex, MaterialAttributes,
    },
    node_data::{NodeId, NodeTree},
};

/// Options for [convert_to_basic].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConvertOptions {
    /// Remove duplicate corners and degenerate triangles before converting.
    pub optimize: bool,
    /// Convert weighted attaches by discarding the weights instead of returning an error.
    pub ignore_weights: bool,
    /// Convert attaches that are already Basic and regenerate all labels.
    pub force_update: bool,
}

/// Errors while converting the attaches of a hierarchy.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Node {:?} has a parent and cannot be the root of a conversion.", node)]
    NotRoot { node: NodeId },

    #[error("Attach {:?} has format {:?}, but all attaches must be Basic.", label, format)]
    MixedFormats { label: String, format: AttachFormat },

    #[error(
        "Attach {:?} has weighted vertices, which cannot be stored in a Basic attach.",
        label
    )]
    WeightLoss { label: String },
}

fn check_root(tree: &NodeTree, root: NodeId) -> Result<(), ConvertError> {
    if tree.node(root).parent().is_some() {
        Err(ConvertError::NotRoot { node: root })
    } else {
        Ok(())
    }
}

/// Encodes the buffer meshes of every attach in the hierarchy of `root` as Basic attaches.
///
/// Nothing changes if all attaches are already Basic unless [ConvertOptions::force_update] is set.
/// The weights are checked for every attach before any attach is modified.
pub fn convert_to_basic(
    tree: &mut NodeTree,
    root: NodeId,
    options: ConvertOptions,
) -> Result<(), ConvertError> {
    check_root(tree, root)?;

    let attaches = tree.hierarchy_attaches(root);
    if !options.force_update
        && attaches
            .iter()
            .all(|a| tree.attach(*a).format() == AttachFormat::Basic)
    {
        debug!("Attaches are already Basic");
        return Ok(());
    }

    for id in &attaches {
        let attach = tree.attach(*id);
        if attach.has_weights() {
            if options.ignore_weights {
                warn!("Discarding vertex weights for attach {:?}", attach.label);
            } else {
                return Err(ConvertError::WeightLoss {
                    label: attach.label.clone(),
                });
            }
        }
    }

    for id in attaches {
        let attach = tree.attach_mut(id);

        // Basic attaches read from a file have no buffer meshes yet.
        if let AttachData::Basic(basic) = &attach.data {
            if attach.mesh_data.is_empty() {
                attach.mesh_data = basic_to_buffer(basic, false);
            }
        }

        let previous = match &attach.data {
            AttachData::Basic(basic) if !options.force_update => Some(basic),
            _ => None,
        };
        let basic = if options.optimize {
            buffer_to_basic(&optimize_meshes(&attach.mesh_data), previous, &attach.label)
        } else {
            buffer_to_basic(&attach.mesh_data, previous, &attach.label)
        };

        attach.bounds = Bounds::from_points(&basic.positions);
        attach.data = AttachData::Basic(basic);
    }

    Ok(())
}

/// Fills the buffer meshes of every attach in the hierarchy of `root` from its Basic data.
///
/// The attach data is left unchanged, so the attaches can still be written as Basic.
pub fn convert_from_basic(
    tree: &mut NodeTree,
    root: NodeId,
    optimize: bool,
) -> Result<(), ConvertError> {
    check_root(tree, root)?;

    let attaches = tree.hierarchy_attaches(root);
    for id in &attaches {
        let attach = tree.attach(*id);
        if attach.format() != AttachFormat::Basic {
            return Err(ConvertError::MixedFormats {
                label: attach.label.clone(),
                format: attach.format(),
            });
        }
    }

    for id in attaches {
        let attach = tree.attach_mut(id);
        if let AttachData::Basic(basic) = &attach.data {
            attach.mesh_data = basic_to_buffer(basic, optimize);
        }
    }

    Ok(())
}

/// Creates one buffer mesh for each mesh of `basic`.
///
/// All vertices are stored in the first mesh.
/// An attach with positions but no meshes produces a single mesh with only vertices.
pub fn basic_to_buffer(basic: &BasicAttach, optimize: bool) -> Vec<BufferMesh> {
    let mut vertices: Vec<_> = basic
        .positions
        .iter()
        .enumerate()
        .map(|(i, position)| {
            let normal = basic
                .normals
                .as_ref()
                .and_then(|n| n.get(i))
                .copied()
                .unwrap_or(Vec3::Y);
            BufferVertex::new(*position, normal, i as u16)
        })
        .collect();
    let has_normals = basic.normals.is_some();

    if basic.meshes.is_empty() {
        if vertices.is_empty() {
            return Vec::new();
        }
        return vec![BufferMesh {
            vertices,
            has_normals,
            ..Default::default()
        }];
    }

    basic
        .meshes
        .iter()
        .map(|mesh| {
            let material = match basic.materials.get(mesh.material_index as usize) {
                Some(material) => BufferMaterial::from(material),
                None => {
                    warn!(
                        "Material index {} is out of range for {} materials",
                        mesh.material_index,
                        basic.materials.len()
                    );
                    fallback_material()
                }
            };

            let mut corners = Vec::with_capacity(mesh.corner_count());
            let mut triangle_list = Vec::new();
            for polygon in &mesh.polygons {
                let first_corner = corners.len();
                triangle_list.extend(
                    polygon
                        .triangle_corners()
                        .into_iter()
                        .flatten()
                        .map(|c| (first_corner + c) as u32),
                );

                for vertex_index in polygon.indices() {
                    let i = corners.len();
                    corners.push(BufferCorner {
                        vertex_index: *vertex_index,
                        color: mesh
                            .colors
                            .as_ref()
                            .and_then(|c| c.get(i))
                            .copied()
                            .unwrap_or(Color::WHITE),
                        texcoord: mesh
                            .texcoords
                            .as_ref()
                            .and_then(|t| t.get(i))
                            .copied()
                            .unwrap_or(Vec2::ZERO),
                    });
                }
            }

            let mut buffer_mesh = BufferMesh {
                // Only the first mesh takes the vertices.
                vertices: std::mem::take(&mut vertices),
                corners,
                triangle_list,
                material,
                has_normals,
                has_colors: mesh.colors.is_some(),
                continue_weight: false,
            };
            if optimize {
                buffer_mesh.optimize();
            }
            buffer_mesh
        })
        .collect()
}

fn fallback_material() -> BufferMaterial {
    BufferMaterial {
        diffuse: Color::new(0xF9, 0xF9, 0xF9, 0xFF),
        ..Default::default()
    }
}

/// Encodes `meshes` as a Basic attach with one triangle list mesh and material for each buffer mesh.
///
/// Array labels are taken from `previous` when present and generated from `label` otherwise.
/// Buffer meshes without triangles are skipped.
pub fn buffer_to_basic(
    meshes: &[BufferMesh],
    previous: Option<&BasicAttach>,
    label: &str,
) -> BasicAttach {
    let vertex_count = meshes
        .iter()
        .flat_map(|m| &m.vertices)
        .map(|v| v.index as usize + 1)
        .max()
        .unwrap_or(0);

    // The first vertex written to a slot is the unweighted base vertex.
    let mut positions = vec![Vec3::ZERO; vertex_count];
    let mut normals = vec![Vec3::Y; vertex_count];
    let mut assigned = vec![false; vertex_count];
    for vertex in meshes.iter().flat_map(|m| &m.vertices) {
        let i = vertex.index as usize;
        if !assigned[i] {
            positions[i] = vertex.position;
            normals[i] = vertex.normal;
            assigned[i] = true;
        }
    }
    let has_normals = normals.iter().any(|n| *n != Vec3::Y);
    let normals = has_normals.then_some(normals);

    let mut basic_meshes = Vec::new();
    let mut materials = Vec::new();
    for mesh in meshes {
        let triangles = mesh.triangle_corners();
        if triangles.is_empty() {
            continue;
        }

        let i = basic_meshes.len();
        let previous_mesh = previous.and_then(|p| p.meshes.get(i));
        let mesh_label = |previous_label: Option<&String>, prefix: &str| {
            previous_label
                .filter(|l| !l.is_empty())
                .cloned()
                .unwrap_or_else(|| format!("{prefix}_{label}_{i}"))
        };

        let colors: Vec<_> = triangles.iter().flatten().map(|c| c.color).collect();
        let has_colors = colors.iter().any(|c| *c != Color::WHITE);
        let texcoords: Vec<_> = triangles.iter().flatten().map(|c| c.texcoord).collect();
        let has_texcoords = texcoords.iter().any(|t| *t != Vec2::ZERO);

        basic_meshes.push(BasicMesh {
            material_index: i as u16,
            poly_type: BasicPolyType::Triangles,
            polygons: triangles
                .iter()
                .map(|[a, b, c]| BasicPolygon::Triangle([a.vertex_index, b.vertex_index, c.vertex_index]))
                .collect(),
            polygon_normals: None,
            colors: has_colors.then_some(colors),
            texcoords: has_texcoords.then_some(texcoords),
            polygon_label: mesh_label(previous_mesh.map(|m| &m.polygon_label), "poly"),
            normal_label: mesh_label(previous_mesh.map(|m| &m.normal_label), "polynormal"),
            color_label: mesh_label(previous_mesh.map(|m| &m.color_label), "vcolor"),
            texcoord_label: mesh_label(previous_mesh.map(|m| &m.texcoord_label), "uv"),
        });
        materials.push(BasicMaterial::from(&mesh.material));
    }

    let attach_label = |previous_label: Option<&String>, prefix: &str| {
        previous_label
            .filter(|l| !l.is_empty())
            .cloned()
            .unwrap_or_else(|| format!("{prefix}_{label}"))
    };

    BasicAttach {
        positions,
        normals,
        meshes: basic_meshes,
        materials,
        position_label: attach_label(previous.map(|p| &p.position_label), "vertex"),
        normal_label: attach_label(previous.map(|p| &p.normal_label), "normal"),
        mesh_label: attach_label(previous.map(|p| &p.mesh_label), "meshlist"),
        material_label: attach_label(previous.map(|p| &p.material_label), "matlist"),
    }
}

impl From<&BufferMaterial> for BasicMaterial {
    fn from(m: &BufferMaterial) -> Self {
        Self {
            diffuse: m.diffuse,
            specular: m.specular,
            exponent: m.specular_exponent,
            texture_id: m.texture_index,
            user_flags: 0,
            mipmap_d_adjust: m.mipmap_distance_adjust,
            super_sample: m.anisotropic_filtering,
            filter_mode: m.texture_filtering,
            clamp_u: m.clamp_u,
            clamp_v: m.clamp_v,
            flip_u: m.mirror_u,
            flip_v: m.mirror_v,
            ignore_specular: m.attributes.contains(MaterialAttributes::NO_SPECULAR),
            use_alpha: m.use_alpha,
            use_texture: m.attributes.contains(MaterialAttributes::USE_TEXTURE),
            environment_map: m.attributes.contains(MaterialAttributes::NORMAL_MAPPING),
            double_sided: !m.culling,
            flat_shading: m.attributes.contains(MaterialAttributes::FLAT),
            ignore_lighting: m.attributes.contains(MaterialAttributes::NO_DIFFUSE),
            source_alpha: m.source_blend_mode,
            destination_alpha: m.destination_blend_mode,
        }
    }
}

impl From<&BasicMaterial> for BufferMaterial {
    fn from(m: &BasicMaterial) -> Self {
        let mut attributes = MaterialAttributes::empty();
        attributes.set(MaterialAttributes::NO_DIFFUSE, m.ignore_lighting);
        attributes.set(MaterialAttributes::NO_SPECULAR, m.ignore_specular);
        attributes.set(MaterialAttributes::USE_TEXTURE, m.use_texture);
        attributes.set(MaterialAttributes::NORMAL_MAPPING, m.environment_map);
        attributes.set(MaterialAttributes::FLAT, m.flat_shading);

        Self {
            ambient: Color::BLACK,
            diffuse: m.diffuse,
            specular: m.specular,
            specular_exponent: m.exponent,
            texture_index: m.texture_id,
            texture_filtering: m.filter_mode,
            mipmap_distance_adjust: m.mipmap_d_adjust,
            anisotropic_filtering: m.super_sample,
            clamp_u: m.clamp_u,
            clamp_v: m.clamp_v,
            mirror_u: m.flip_u,
            mirror_v: m.flip_v,
            use_alpha: m.use_alpha,
            source_blend_mode: m.source_alpha,
            destination_blend_mode: m.destination_alpha,
            culling: !m.double_sided,
            attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attach_data::Attach;
    use pretty_assertions::assert_eq;
    use sa3d_lib::formats::basic::{BlendMode, FilterMode};

    fn quad_attach() -> BasicAttach {
        BasicAttach {
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::new(1.0, 1.0, 0.0)],
            normals: None,
            meshes: vec![BasicMesh {
                material_index: 0,
                poly_type: BasicPolyType::Quads,
                polygons: vec![BasicPolygon::Quad([0, 1, 2, 3])],
                polygon_normals: None,
                colors: None,
                texcoords: Some(vec![
                    Vec2::new(0.0, 0.0),
                    Vec2::new(1.0, 0.0),
                    Vec2::new(0.0, 1.0),
                    Vec2::new(1.0, 1.0),
                ]),
                polygon_label: "poly_quad".to_string(),
                normal_label: String::new(),
                color_label: String::new(),
                texcoord_label: "uv_quad".to_string(),
            }],
            materials: vec![BasicMaterial::default()],
            position_label: "vertex_quad".to_string(),
            normal_label: String::new(),
            mesh_label: "meshlist_quad".to_string(),
            material_label: "matlist_quad".to_string(),
        }
    }

    fn basic_tree(basic: BasicAttach) -> (NodeTree, NodeId) {
        let mut tree = NodeTree::new();
        let root = tree.add_node(None, "root");
        let attach = tree.add_attach(Attach {
            label: "quad".to_string(),
            bounds: Bounds::default(),
            mesh_data: Vec::new(),
            data: AttachData::Basic(basic),
        });
        tree.set_attach(root, Some(attach));
        (tree, root)
    }

    #[test]
    fn basic_to_buffer_quad() {
        let meshes = basic_to_buffer(&quad_attach(), false);
        assert_eq!(1, meshes.len());

        let mesh = &meshes[0];
        assert_eq!(4, mesh.vertices.len());
        assert!(mesh.vertices.iter().all(|v| v.normal == Vec3::Y));
        assert!(!mesh.has_normals);
        assert!(!mesh.has_colors);
        assert_eq!(vec![0, 1, 2, 2, 1, 3], mesh.triangle_list);
        assert_eq!(Vec2::new(1.0, 1.0), mesh.corners[3].texcoord);
        assert_eq!(Color::WHITE, mesh.corners[3].color);
    }

    #[test]
    fn basic_to_buffer_vertices_in_first_mesh() {
        let mut basic = quad_attach();
        basic.meshes.push(basic.meshes[0].clone());

        let meshes = basic_to_buffer(&basic, false);
        assert_eq!(4, meshes[0].vertices.len());
        assert!(meshes[1].vertices.is_empty());
        assert_eq!(6, meshes[1].triangle_list.len());
    }

    #[test]
    fn basic_to_buffer_no_meshes() {
        let mut basic = quad_attach();
        basic.meshes.clear();
        let meshes = basic_to_buffer(&basic, false);
        assert_eq!(1, meshes.len());
        assert_eq!(4, meshes[0].vertices.len());
        assert!(meshes[0].corners.is_empty());

        assert!(basic_to_buffer(&BasicAttach::default(), false).is_empty());
    }

    #[test]
    fn basic_to_buffer_fallback_material() {
        let mut basic = quad_attach();
        basic.materials.clear();
        let meshes = basic_to_buffer(&basic, false);
        assert_eq!(Color::new(0xF9, 0xF9, 0xF9, 0xFF), meshes[0].material.diffuse);
    }

    #[test]
    fn buffer_to_basic_labels() {
        let meshes = basic_to_buffer(&quad_attach(), false);

        let generated = buffer_to_basic(&meshes, None, "quad");
        assert_eq!("vertex_quad", generated.position_label);
        assert_eq!("poly_quad_0", generated.meshes[0].polygon_label);
        assert_eq!("uv_quad_0", generated.meshes[0].texcoord_label);

        let previous = quad_attach();
        let preserved = buffer_to_basic(&meshes, Some(&previous), "other");
        assert_eq!("vertex_quad", preserved.position_label);
        assert_eq!("normal_other", preserved.normal_label);
        assert_eq!("poly_quad", preserved.meshes[0].polygon_label);
        assert_eq!("vcolor_other_0", preserved.meshes[0].color_label);
    }

    #[test]
    fn buffer_to_basic_triangles() {
        let basic = buffer_to_basic(&basic_to_buffer(&quad_attach(), false), None, "quad");
        assert_eq!(quad_attach().positions, basic.positions);
        assert_eq!(None, basic.normals);
        assert_eq!(BasicPolyType::Triangles, basic.meshes[0].poly_type);
        assert_eq!(
            vec![
                BasicPolygon::Triangle([0, 1, 2]),
                BasicPolygon::Triangle([2, 1, 3])
            ],
            basic.meshes[0].polygons
        );
        assert_eq!(None, basic.meshes[0].colors);
        assert_eq!(
            Some(vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(0.0, 1.0),
                Vec2::new(0.0, 1.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(1.0, 1.0),
            ]),
            basic.meshes[0].texcoords
        );
    }

    #[test]
    fn buffer_to_basic_skips_empty_meshes() {
        let mut meshes = basic_to_buffer(&quad_attach(), false);
        meshes.push(BufferMesh::default());
        let basic = buffer_to_basic(&meshes, None, "quad");
        assert_eq!(1, basic.meshes.len());
        assert_eq!(1, basic.materials.len());
    }

    #[test]
    fn material_mapping() {
        let material = BufferMaterial {
            diffuse: Color::new(1, 2, 3, 4),
            specular: Color::new(5, 6, 7, 8),
            specular_exponent: 2.5,
            texture_index: 12,
            texture_filtering: FilterMode::Trilinear,
            mipmap_distance_adjust: 3,
            anisotropic_filtering: true,
            clamp_u: true,
            clamp_v: false,
            mirror_u: false,
            mirror_v: true,
            use_alpha: true,
            source_blend_mode: BlendMode::One,
            destination_blend_mode: BlendMode::Zero,
            culling: true,
            attributes: MaterialAttributes::NO_DIFFUSE
                | MaterialAttributes::USE_TEXTURE
                | MaterialAttributes::FLAT,
            ..Default::default()
        };

        let basic = BasicMaterial::from(&material);
        assert!(!basic.double_sided);
        assert!(basic.ignore_lighting);
        assert!(!basic.ignore_specular);
        assert!(basic.flat_shading);
        assert!(basic.flip_v);
        assert!(basic.super_sample);
        assert_eq!(12, basic.texture_id);

        assert_eq!(material, BufferMaterial::from(&basic));
    }

    #[test]
    fn convert_from_basic_fills_mesh_data() {
        let (mut tree, root) = basic_tree(quad_attach());
        convert_from_basic(&mut tree, root, false).unwrap();

        let attach = tree.node_attach(root).unwrap();
        assert_eq!(AttachFormat::Basic, attach.format());
        assert_eq!(1, attach.mesh_data.len());
        assert_eq!(6, attach.mesh_data[0].triangle_list.len());
    }

    #[test]
    fn convert_from_basic_mixed_formats() {
        let mut tree = NodeTree::new();
        let root = tree.add_node(None, "root");
        let attach = tree.add_attach(Attach::new("buffer", Vec::new()));
        tree.set_attach(root, Some(attach));

        assert!(matches!(
            convert_from_basic(&mut tree, root, false),
            Err(ConvertError::MixedFormats {
                format: AttachFormat::Buffer,
                ..
            })
        ));
    }

    #[test]
    fn convert_requires_root() {
        let (mut tree, root) = basic_tree(quad_attach());
        let child = tree.add_node(Some(root), "child");
        assert!(matches!(
            convert_from_basic(&mut tree, child, false),
            Err(ConvertError::NotRoot { .. })
        ));
        assert!(matches!(
            convert_to_basic(&mut tree, child, ConvertOptions::default()),
            Err(ConvertError::NotRoot { .. })
        ));
    }

    #[test]
    fn convert_to_basic_unchanged() {
        let (mut tree, root) = basic_tree(quad_attach());
        convert_to_basic(&mut tree, root, ConvertOptions::default()).unwrap();

        let attach = tree.node_attach(root).unwrap();
        assert_eq!(AttachData::Basic(quad_attach()), attach.data);
        assert!(attach.mesh_data.is_empty());
    }

    #[test]
    fn convert_to_basic_force_update() {
        let (mut tree, root) = basic_tree(quad_attach());
        let options = ConvertOptions {
            force_update: true,
            ..Default::default()
        };
        convert_to_basic(&mut tree, root, options).unwrap();

        let attach = tree.node_attach(root).unwrap();
        let AttachData::Basic(basic) = &attach.data else {
            panic!("expected a Basic attach");
        };
        assert_eq!(BasicPolyType::Triangles, basic.meshes[0].poly_type);
        assert_eq!("poly_quad_0", basic.meshes[0].polygon_label);
        assert_eq!(Vec3::new(0.5, 0.5, 0.0), attach.bounds.center);
    }

    #[test]
    fn convert_to_basic_weights() {
        let mut tree = NodeTree::new();
        let root = tree.add_node(None, "root");
        let mut meshes = basic_to_buffer(&quad_attach(), false);
        meshes[0].vertices[0].weight = 0.5;
        let attach = tree.add_attach(Attach::new("weighted", meshes));
        tree.set_attach(root, Some(attach));

        assert!(matches!(
            convert_to_basic(&mut tree, root, ConvertOptions::default()),
            Err(ConvertError::WeightLoss { label }) if label == "weighted"
        ));
        assert_eq!(AttachFormat::Buffer, tree.attach(attach).format());

        let options = ConvertOptions {
            ignore_weights: true,
            ..Default::default()
        };
        convert_to_basic(&mut tree, root, options).unwrap();
        assert_eq!(AttachFormat::Basic, tree.attach(attach).format());
    }
}
