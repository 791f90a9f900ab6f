//! The `NJS_OBJECT` node record.
use std::f32::consts::TAU;

use binrw::{BinRead, BinWrite};
use modular_bitfield::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::bitfield_binrw_impl;

/// The evaluation flags of a node.
///
/// The first five flags and [skip_children](#method.skip_children) describe the record itself
/// and are recalculated when writing.
#[bitfield(bits = 32)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAttributes {
    /// The position is zero.
    pub no_position: bool,
    /// The rotation is zero.
    pub no_rotation: bool,
    /// The scale is one.
    pub no_scale: bool,
    pub skip_draw: bool,
    /// The node has no children.
    pub skip_children: bool,
    /// Rotations are applied in Z, Y, X order instead of X, Y, Z order.
    pub rotate_zyx: bool,
    pub no_animate: bool,
    pub no_morph: bool,
    pub clip: bool,
    pub modifier: bool,
    pub use_quaternion: bool,
    pub rotate_base: bool,
    pub rotate_set: bool,
    /// The node influences weighted vertices.
    pub envelope: bool,
    #[skip]
    __: B18,
}

bitfield_binrw_impl!(NodeAttributes, u32);

/// An `NJS_OBJECT` with a size of 0x34 bytes.
/// Node trees are stored as a child pointer to the first child and a sibling pointer to the next sibling.
#[derive(BinRead, BinWrite, Debug, Clone, PartialEq)]
pub struct NodeRecord {
    pub attributes: NodeAttributes,
    pub attach: u32,
    pub position: [f32; 3],
    /// Euler angles in BAMS.
    pub rotation: [i32; 3],
    pub scale: [f32; 3],
    pub child: u32,
    pub sibling: u32,
}

impl NodeRecord {
    pub const SIZE: u32 = 0x34;
}

/// Converts a binary angle measurement with 0x10000 units per turn to radians.
/**
```rust
use sa3d_lib::formats::node::bams_to_radians;

assert_eq!(std::f32::consts::PI, bams_to_radians(0x8000));
```
*/
pub fn bams_to_radians(value: i32) -> f32 {
    value as f32 * TAU / 65536.0
}

/// Converts radians to the nearest binary angle measurement.
pub fn radians_to_bams(value: f32) -> i32 {
    (value * 65536.0 / TAU).round() as i32
}
