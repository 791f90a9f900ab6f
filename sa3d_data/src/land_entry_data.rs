//! Land entries are the collision and visual geometry of a level.
//!
//! Each entry references a model with a single node.
//! The surface flags use a different encoding for each game,
//! so [SurfaceAttributes] stores the flags in a version independent form.
use bitflags::bitflags;
use glam::{Quat, Vec3};
use log::warn;
use sa3d_lib::{
    formats::land_entry::{
        Sa1LandEntryRecord, Sa1SurfaceFlags, Sa2LandEntryRecord, Sa2SurfaceFlags,
    },
    AttachFormat, EndianWriter, ModelFormat, ReadError, SourceReader, WriteError,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    attach_data::{Attach, Bounds},
    node_data::{NodeId, NodeTree, ReadContext},
};

bitflags! {
    /// The surface flags of a land entry for all versions.
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SurfaceAttributes: u32 {
        const SOLID = 1 << 0;
        const WATER = 1 << 1;
        const NO_FRICTION = 1 << 2;
        const NO_ACCELERATION = 1 << 3;
        const LOW_ACCELERATION = 1 << 4;
        const USE_SKY_DRAW_DISTANCE = 1 << 5;
        const CANNOT_LAND = 1 << 6;
        const INCREASED_ACCELERATION = 1 << 7;
        const DIGGABLE = 1 << 8;
        const UNCLIMBABLE = 1 << 9;
        const CHAOS0_LAND = 1 << 10;
        const STAIRS = 1 << 11;
        const HURT = 1 << 12;
        const FOOTPRINTS = 1 << 13;
        const DYNAMIC_COLLISION = 1 << 14;
        const USE_ROTATION = 1 << 15;
        const NO_SHADOWS = 1 << 16;
        const NO_FOG = 1 << 17;
        const VISIBLE = 1 << 31;
    }
}

const SA1_FLAGS: [(SurfaceAttributes, Sa1SurfaceFlags); 17] = [
    (SurfaceAttributes::SOLID, Sa1SurfaceFlags::SOLID),
    (SurfaceAttributes::WATER, Sa1SurfaceFlags::WATER),
    (SurfaceAttributes::NO_FRICTION, Sa1SurfaceFlags::NO_FRICTION),
    (SurfaceAttributes::NO_ACCELERATION, Sa1SurfaceFlags::NO_ACCELERATION),
    (SurfaceAttributes::LOW_ACCELERATION, Sa1SurfaceFlags::LOW_ACCELERATION),
    (
        SurfaceAttributes::USE_SKY_DRAW_DISTANCE,
        Sa1SurfaceFlags::USE_SKY_DRAW_DISTANCE,
    ),
    (SurfaceAttributes::CANNOT_LAND, Sa1SurfaceFlags::CANNOT_LAND),
    (
        SurfaceAttributes::INCREASED_ACCELERATION,
        Sa1SurfaceFlags::INCREASED_ACCELERATION,
    ),
    (SurfaceAttributes::DIGGABLE, Sa1SurfaceFlags::DIGGABLE),
    (SurfaceAttributes::UNCLIMBABLE, Sa1SurfaceFlags::UNCLIMBABLE),
    (SurfaceAttributes::CHAOS0_LAND, Sa1SurfaceFlags::CHAOS0_LAND),
    (SurfaceAttributes::STAIRS, Sa1SurfaceFlags::STAIRS),
    (SurfaceAttributes::HURT, Sa1SurfaceFlags::HURT),
    (SurfaceAttributes::FOOTPRINTS, Sa1SurfaceFlags::FOOTPRINTS),
    (
        SurfaceAttributes::DYNAMIC_COLLISION,
        Sa1SurfaceFlags::DYNAMIC_COLLISION,
    ),
    (SurfaceAttributes::USE_ROTATION, Sa1SurfaceFlags::USE_ROTATION),
    (SurfaceAttributes::VISIBLE, Sa1SurfaceFlags::VISIBLE),
];

const SA2_FLAGS: [(SurfaceAttributes, Sa2SurfaceFlags); 14] = [
    (SurfaceAttributes::SOLID, Sa2SurfaceFlags::SOLID),
    (SurfaceAttributes::WATER, Sa2SurfaceFlags::WATER),
    (SurfaceAttributes::NO_FRICTION, Sa2SurfaceFlags::NO_FRICTION),
    (SurfaceAttributes::NO_ACCELERATION, Sa2SurfaceFlags::NO_ACCELERATION),
    (SurfaceAttributes::LOW_ACCELERATION, Sa2SurfaceFlags::LOW_ACCELERATION),
    (SurfaceAttributes::DIGGABLE, Sa2SurfaceFlags::DIGGABLE),
    (SurfaceAttributes::UNCLIMBABLE, Sa2SurfaceFlags::UNCLIMBABLE),
    (SurfaceAttributes::STAIRS, Sa2SurfaceFlags::STAIRS),
    (SurfaceAttributes::HURT, Sa2SurfaceFlags::HURT),
    (SurfaceAttributes::FOOTPRINTS, Sa2SurfaceFlags::FOOTPRINTS),
    (SurfaceAttributes::CANNOT_LAND, Sa2SurfaceFlags::CANNOT_LAND),
    (SurfaceAttributes::NO_SHADOWS, Sa2SurfaceFlags::NO_SHADOWS),
    (SurfaceAttributes::NO_FOG, Sa2SurfaceFlags::NO_FOG),
    (SurfaceAttributes::VISIBLE, Sa2SurfaceFlags::VISIBLE),
];

/// The surface flag layouts used by the games.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceFlagEncoding {
    /// SA1 and SADX.
    Sa1,
    /// SA2 and SA2B.
    Sa2,
}

impl SurfaceFlagEncoding {
    /// Returns [None] for [ModelFormat::Buffer], which stores [SurfaceAttributes] bits directly.
    pub fn from_format(format: ModelFormat) -> Option<Self> {
        match format {
            ModelFormat::Sa1 | ModelFormat::Sadx => Some(Self::Sa1),
            ModelFormat::Sa2 | ModelFormat::Sa2b => Some(Self::Sa2),
            ModelFormat::Buffer => None,
        }
    }
}

/// Surface flag bits without a [SurfaceAttributes] equivalent.
///
/// The bits are only written back for the same [SurfaceFlagEncoding].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnmappedSurfaceFlags {
    pub encoding: SurfaceFlagEncoding,
    pub bits: u32,
}

impl UnmappedSurfaceFlags {
    fn new(encoding: SurfaceFlagEncoding, bits: u32) -> Option<Self> {
        (bits != 0).then_some(Self { encoding, bits })
    }
}

impl SurfaceAttributes {
    /// Decodes SA1 and SADX flags.
    /// Bits without an attribute are returned by [unmapped_sa1](#method.unmapped_sa1).
    pub fn from_sa1(flags: Sa1SurfaceFlags) -> Self {
        SA1_FLAGS
            .iter()
            .filter(|(_, sa1)| flags.contains(*sa1))
            .fold(Self::empty(), |result, (attribute, _)| result | *attribute)
    }

    /// Encodes the attributes for SA1 and SADX.
    /// Attributes without an SA1 flag are removed.
    pub fn to_sa1(self) -> Sa1SurfaceFlags {
        let (flags, supported) = SA1_FLAGS.iter().filter(|(a, _)| self.contains(*a)).fold(
            (Sa1SurfaceFlags::empty(), Self::empty()),
            |(flags, supported), (attribute, sa1)| (flags | *sa1, supported | *attribute),
        );
        if supported != self {
            warn!(
                "Surface attributes {:?} are not supported by SA1",
                self.difference(supported)
            );
        }
        flags
    }

    /// The bits of `flags` that [from_sa1](#method.from_sa1) ignores.
    pub fn unmapped_sa1(flags: Sa1SurfaceFlags) -> u32 {
        let mapped = SA1_FLAGS.iter().fold(0, |mask, (_, sa1)| mask | sa1.bits());
        flags.bits() & !mapped
    }

    /// Decodes SA2 and SA2B flags.
    /// Bits without an attribute are returned by [unmapped_sa2](#method.unmapped_sa2).
    pub fn from_sa2(flags: Sa2SurfaceFlags) -> Self {
        SA2_FLAGS
            .iter()
            .filter(|(_, sa2)| flags.contains(*sa2))
            .fold(Self::empty(), |result, (attribute, _)| result | *attribute)
    }

    /// The bits of `flags` that [from_sa2](#method.from_sa2) ignores.
    pub fn unmapped_sa2(flags: Sa2SurfaceFlags) -> u32 {
        let mapped = SA2_FLAGS.iter().fold(0, |mask, (_, sa2)| mask | sa2.bits());
        flags.bits() & !mapped
    }

    /// Encodes the attributes for SA2 and SA2B.
    /// Attributes without an SA2 flag are removed.
    pub fn to_sa2(self) -> Sa2SurfaceFlags {
        let (flags, supported) = SA2_FLAGS.iter().filter(|(a, _)| self.contains(*a)).fold(
            (Sa2SurfaceFlags::empty(), Self::empty()),
            |(flags, supported), (attribute, sa2)| (flags | *sa2, supported | *attribute),
        );
        if supported != self {
            warn!(
                "Surface attributes {:?} are not supported by SA2",
                self.difference(supported)
            );
        }
        flags
    }
}

/// A model with surface attributes and a cached world space bounding sphere.
///
/// The transform and attach should be modified using the setters,
/// which recalculate the [bounds](#method.bounds).
#[derive(Debug, Clone)]
pub struct LandEntry {
    model: NodeTree,
    root: NodeId,
    bounds: Bounds,
    pub surface_attributes: SurfaceAttributes,
    /// Flag bits read from a file that have no matching attribute.
    pub unmapped_flags: Option<UnmappedSurfaceFlags>,
    pub block_bit: u32,
    /// Only stored by SA2 and later versions.
    pub unknown: u32,
}

impl LandEntry {
    /// Creates an entry with a new single node model named `name`.
    pub fn new(
        name: impl Into<String>,
        attach: Attach,
        surface_attributes: SurfaceAttributes,
    ) -> Self {
        let mut model = NodeTree::new();
        let root = model.add_node(None, name);
        let attach = model.add_attach(attach);
        model.set_attach(root, Some(attach));

        let mut entry = Self {
            model,
            root,
            bounds: Bounds::default(),
            surface_attributes,
            unmapped_flags: None,
            block_bit: 0,
            unknown: 0,
        };
        entry.update_bounds();
        entry
    }

    pub fn model(&self) -> &NodeTree {
        &self.model
    }

    /// The node of the [model](#method.model) for this entry.
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn attach(&self) -> Option<&Attach> {
        self.model.node_attach(self.root)
    }

    /// The bounding sphere of the attach after applying the position and scale of the model.
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn set_attach(&mut self, attach: Option<Attach>) {
        match (attach, self.model.node(self.root).attach()) {
            (Some(attach), Some(id)) => *self.model.attach_mut(id) = attach,
            (Some(attach), None) => {
                let id = self.model.add_attach(attach);
                self.model.set_attach(self.root, Some(id));
            }
            (None, _) => self.model.set_attach(self.root, None),
        }
        self.update_bounds();
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.model.set_position(self.root, position);
        self.update_bounds();
    }

    /// Sets the euler angles in radians.
    pub fn set_rotation(&mut self, rotation: Vec3) {
        self.model.set_rotation(self.root, rotation);
        self.update_bounds();
    }

    pub fn set_quaternion(&mut self, quaternion: Quat) {
        self.model.set_quaternion(self.root, quaternion);
        self.update_bounds();
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.model.set_scale(self.root, scale);
        self.update_bounds();
    }

    fn update_bounds(&mut self) {
        let node = self.model.node(self.root);
        let attach_bounds = self.attach().map(|a| a.bounds).unwrap_or_default();
        self.bounds = Bounds {
            center: attach_bounds.center + node.position(),
            radius: attach_bounds.radius * node.scale().max_element(),
        };
    }

    /// Reads the land entry at `offset` and its model.
    ///
    /// The model is read with `attach_format` and shares the attaches already in `context`.
    pub fn read(
        reader: &SourceReader,
        offset: u32,
        format: ModelFormat,
        attach_format: AttachFormat,
        context: &mut ReadContext,
    ) -> Result<Self, ReadError> {
        let encoding = SurfaceFlagEncoding::from_format(format);
        let (bounds, model_field, model, block_bit, unknown, surface_attributes, unmapped) =
            match format {
                ModelFormat::Sa1 | ModelFormat::Sadx => {
                    let record: Sa1LandEntryRecord = reader.read(offset)?;
                    (
                        record.bounds,
                        offset + 0x18,
                        record.model,
                        record.block_bit,
                        0,
                        SurfaceAttributes::from_sa1(record.flags),
                        SurfaceAttributes::unmapped_sa1(record.flags),
                    )
                }
                ModelFormat::Sa2 | ModelFormat::Sa2b | ModelFormat::Buffer => {
                    let record: Sa2LandEntryRecord = reader.read(offset)?;
                    let (surface_attributes, unmapped) = if format == ModelFormat::Buffer {
                        (SurfaceAttributes::from_bits_retain(record.flags), 0)
                    } else {
                        let flags = Sa2SurfaceFlags::from_bits_retain(record.flags);
                        (
                            SurfaceAttributes::from_sa2(flags),
                            SurfaceAttributes::unmapped_sa2(flags),
                        )
                    };
                    (
                        record.bounds,
                        offset + 0x10,
                        record.model,
                        record.block_bit,
                        record.unknown,
                        surface_attributes,
                        unmapped,
                    )
                }
            };

        let model_offset =
            reader
                .relocate(model_field, model)?
                .ok_or(ReadError::NullPointer {
                    name: "model",
                    offset: model_field as usize,
                })?;

        let model = NodeTree::read_single(
            reader,
            model_offset,
            attach_format,
            format.is_dx(),
            context,
        )?;
        let root = model.roots()[0];

        Ok(Self {
            model,
            root,
            bounds: bounds.into(),
            surface_attributes,
            unmapped_flags: encoding.and_then(|e| UnmappedSurfaceFlags::new(e, unmapped)),
            block_bit,
            unknown,
        })
    }

    /// Writes the land entry record and returns its address.
    /// The model must already be written to `writer`.
    pub fn write(&self, writer: &mut EndianWriter, format: ModelFormat) -> Result<u32, WriteError> {
        let model = writer.required_label_address(self.model.node(self.root).name())?;

        writer.align(4)?;
        match format {
            ModelFormat::Sa1 | ModelFormat::Sadx => writer.write(&Sa1LandEntryRecord {
                bounds: self.bounds.into(),
                model,
                block_bit: self.block_bit,
                flags: self.surface_attributes.to_sa1()
                    | Sa1SurfaceFlags::from_bits_retain(self.unmapped_bits(format)),
            }),
            ModelFormat::Sa2 | ModelFormat::Sa2b | ModelFormat::Buffer => {
                let flags = if format == ModelFormat::Buffer {
                    self.surface_attributes.bits()
                } else {
                    self.surface_attributes.to_sa2().bits()
                } | self.unmapped_bits(format);
                writer.write(&Sa2LandEntryRecord {
                    bounds: self.bounds.into(),
                    model,
                    block_bit: self.block_bit,
                    unknown: self.unknown,
                    flags,
                })
            }
        }
    }

    fn unmapped_bits(&self, format: ModelFormat) -> u32 {
        match self.unmapped_flags {
            Some(flags) if SurfaceFlagEncoding::from_format(format) == Some(flags.encoding) => {
                flags.bits
            }
            Some(flags) => {
                warn!(
                    "Unmapped {:?} surface flags 0x{:X} are not supported by {:?}",
                    flags.encoding, flags.bits, format
                );
                0
            }
            None => 0,
        }
    }

    /// Writes the model followed by the land entry record and returns the address of the record.
    pub fn write_with_model(
        &self,
        writer: &mut EndianWriter,
        format: ModelFormat,
    ) -> Result<u32, WriteError> {
        self.model.write(writer, self.root, format.is_dx())?;
        self.write(writer, format)
    }

    /// Copies the entry with a new model tree.
    /// The attach is cloned and the observer of the model is not copied.
    pub fn shallow_copy(&self) -> Self {
        self.clone()
    }
}
