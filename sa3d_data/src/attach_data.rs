//! The mesh data referenced by nodes.
//!
//! Every [Attach] has a list of [BufferMesh] for rendering and editing.
//! The [AttachData] stores the attach in its original format so it can be written again.
//! Use the [basic_converter](crate::basic_converter) to keep the two representations in sync.
use ahash::AHashMap;
use glam::Vec3;
use log::debug;
use sa3d_lib::{AttachFormat, BoundingSphere, EndianWriter, ReadError, SourceReader, WriteError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    basic_data::BasicAttach,
    buffer_data::{read_buffer_attach, write_buffer_attach, BufferMesh},
    label_or_default,
};

/// A bounding sphere.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub center: Vec3,
    pub radius: f32,
}

impl Bounds {
    /// Calculates a sphere centered on the axis aligned bounding box of `points`.
    /**
    ```rust
    use sa3d_data::attach_data::Bounds;
    use glam::Vec3;

    let bounds = Bounds::from_points(&[Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)]);
    assert_eq!(Vec3::ZERO, bounds.center);
    assert_eq!(1.0, bounds.radius);
    ```
    */
    pub fn from_points(points: &[Vec3]) -> Self {
        if points.is_empty() {
            return Self::default();
        }

        let min = points.iter().copied().fold(Vec3::splat(f32::MAX), Vec3::min);
        let max = points.iter().copied().fold(Vec3::splat(f32::MIN), Vec3::max);
        let center = (min + max) / 2.0;
        let radius = points
            .iter()
            .map(|p| p.distance(center))
            .fold(0.0, f32::max);

        Self { center, radius }
    }
}

impl From<BoundingSphere> for Bounds {
    fn from(b: BoundingSphere) -> Self {
        Self {
            center: b.center.into(),
            radius: b.radius,
        }
    }
}

impl From<Bounds> for BoundingSphere {
    fn from(b: Bounds) -> Self {
        Self {
            center: b.center.to_array(),
            radius: b.radius,
        }
    }
}

/// The format specific data of an [Attach].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum AttachData {
    /// The attach is stored using the [BufferMesh] data directly.
    Buffer,
    Basic(BasicAttach),
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Attach {
    /// The unique name used for resolving pointers to this attach.
    pub label: String,
    pub bounds: Bounds,
    pub mesh_data: Vec<BufferMesh>,
    pub data: AttachData,
}

impl Attach {
    /// Creates a Buffer attach with bounds calculated from the vertices of `mesh_data`.
    pub fn new(label: impl Into<String>, mesh_data: Vec<BufferMesh>) -> Self {
        let positions: Vec<_> = mesh_data
            .iter()
            .flat_map(|m| m.vertices.iter().map(|v| v.position))
            .collect();

        Self {
            label: label.into(),
            bounds: Bounds::from_points(&positions),
            mesh_data,
            data: AttachData::Buffer,
        }
    }

    pub fn format(&self) -> AttachFormat {
        match self.data {
            AttachData::Buffer => AttachFormat::Buffer,
            AttachData::Basic(_) => AttachFormat::Basic,
        }
    }

    /// Returns `true` if any mesh has weighted vertices.
    pub fn has_weights(&self) -> bool {
        self.mesh_data.iter().any(BufferMesh::has_weights)
    }

    /// Reads the attach at `offset` in the given `format`.
    /// Basic attaches are read without buffer meshes.
    pub fn read(
        reader: &SourceReader,
        offset: u32,
        format: AttachFormat,
        dx: bool,
        labels: &AHashMap<u32, String>,
    ) -> Result<Self, ReadError> {
        let label = label_or_default(labels, "attach", offset);
        match format {
            AttachFormat::Buffer => {
                let (mesh_data, bounds) = read_buffer_attach(reader, offset)?;
                Ok(Self {
                    label,
                    bounds,
                    mesh_data,
                    data: AttachData::Buffer,
                })
            }
            AttachFormat::Basic => {
                let (basic, bounds) = BasicAttach::read(reader, offset, dx, labels)?;
                Ok(Self {
                    label,
                    bounds,
                    mesh_data: Vec::new(),
                    data: AttachData::Basic(basic),
                })
            }
            AttachFormat::Chunk | AttachFormat::Gc => Err(ReadError::UnsupportedFormat { format }),
        }
    }

    /// Writes the attach in its current format and returns its address.
    /// Attaches with an already registered label are not written again.
    pub fn write(&self, writer: &mut EndianWriter, dx: bool) -> Result<u32, WriteError> {
        if let Some(address) = writer.label_address(&self.label) {
            debug!("Attach {:?} is already written", self.label);
            return Ok(address);
        }

        match &self.data {
            AttachData::Buffer => {
                write_buffer_attach(writer, &self.label, &self.mesh_data, self.bounds)
            }
            AttachData::Basic(basic) => basic.write(writer, &self.label, self.bounds, dx),
        }
    }
}
