//! Node hierarchies for models and their transforms.
//!
//! Nodes and attaches are stored in a [NodeTree] and referenced with [NodeId] and [AttachId].
//! Each node caches its local and world matrix.
//! Changing a transform through the tree recalculates the matrices for the node and its descendants.
//!
//! The top level nodes of a file are siblings without a parent.
//! Each of these nodes is a root in [NodeTree::roots].
use std::fmt;

use ahash::{AHashMap, AHashSet};
use glam::{Mat3, Mat4, Quat, Vec3};
use log::debug;
use sa3d_lib::{
    formats::node::{bams_to_radians, radians_to_bams, NodeAttributes, NodeRecord},
    AttachFormat, EndianWriter, ReadError, SourceReader, WriteError,
};
use thiserror::Error;

use crate::{attach_data::Attach, label_or_default};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttachId(usize);

impl AttachId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// The node field modified by a setter on [NodeTree].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeProperty {
    Name,
    Parent,
    Position,
    Rotation,
    Quaternion,
    Scale,
    Attach,
    RotateZyx,
    Animate,
    Morph,
}

/// A notification sent to the observer of a [NodeTree].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeChange {
    pub node: NodeId,
    pub property: NodeProperty,
}

/// Errors while modifying the structure of a [NodeTree].
#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error("Node {:?} cannot be parented to its descendant {:?}.", node, parent)]
    Cycle { node: NodeId, parent: NodeId },
}

/// Labels and parsed attaches shared by every read from the same file.
#[derive(Debug, Clone, Default)]
pub struct ReadContext {
    /// Label names for data at known file offsets.
    pub labels: AHashMap<u32, String>,
    /// Attaches parsed so far by file offset.
    pub attaches: AHashMap<u32, Attach>,
}

impl ReadContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_labels(labels: AHashMap<u32, String>) -> Self {
        Self {
            labels,
            attaches: AHashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    name: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    position: Vec3,
    rotation: Vec3,
    quaternion: Quat,
    scale: Vec3,
    attributes: NodeAttributes,
    attach: Option<AttachId>,
    local_matrix: Mat4,
    world_matrix: Mat4,
}

impl Node {
    fn new(name: String, parent: Option<NodeId>) -> Self {
        Self {
            name,
            parent,
            children: Vec::new(),
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            quaternion: Quat::IDENTITY,
            scale: Vec3::ONE,
            attributes: NodeAttributes::new(),
            attach: None,
            local_matrix: Mat4::IDENTITY,
            world_matrix: Mat4::IDENTITY,
        }
    }

    /// The name of the node, which is also its label in files.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// The euler angles in radians.
    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }

    /// The rotation calculated from the [rotation](#method.rotation) and rotation order.
    pub fn quaternion(&self) -> Quat {
        self.quaternion
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn attributes(&self) -> NodeAttributes {
        self.attributes
    }

    pub fn attach(&self) -> Option<AttachId> {
        self.attach
    }

    pub fn rotate_zyx(&self) -> bool {
        self.attributes.rotate_zyx()
    }

    pub fn animate(&self) -> bool {
        !self.attributes.no_animate()
    }

    pub fn morph(&self) -> bool {
        !self.attributes.no_morph()
    }

    pub fn local_matrix(&self) -> Mat4 {
        self.local_matrix
    }

    /// The transform relative to the root of the hierarchy.
    pub fn world_matrix(&self) -> Mat4 {
        self.world_matrix
    }
}

/// Converts euler angles in radians to a quaternion.
///
/// With `rotate_zyx`, the rotation is `X * Y * Z`, so Z is applied first.
/// Otherwise the rotation is `Z * Y * X`.
pub fn euler_to_quat(rotation: Vec3, rotate_zyx: bool) -> Quat {
    let x = Quat::from_rotation_x(rotation.x);
    let y = Quat::from_rotation_y(rotation.y);
    let z = Quat::from_rotation_z(rotation.z);
    if rotate_zyx {
        x * y * z
    } else {
        z * y * x
    }
}

/// Converts a quaternion to euler angles in radians using the same order as [euler_to_quat].
pub fn quat_to_euler(quaternion: Quat, rotate_zyx: bool) -> Vec3 {
    let m = Mat3::from_quat(quaternion.normalize());
    if rotate_zyx {
        let y = m.z_axis.x.clamp(-1.0, 1.0).asin();
        let x = (-m.z_axis.y).atan2(m.z_axis.z);
        let z = (-m.y_axis.x).atan2(m.x_axis.x);
        Vec3::new(x, y, z)
    } else {
        let y = -m.x_axis.z.clamp(-1.0, 1.0).asin();
        let x = m.y_axis.z.atan2(m.z_axis.z);
        let z = m.x_axis.y.atan2(m.x_axis.x);
        Vec3::new(x, y, z)
    }
}

/// Nodes and attaches for one or more hierarchies.
///
/// All modifications should use the setters on the tree,
/// which keep the cached matrices up to date and notify the observer.
#[derive(Default)]
pub struct NodeTree {
    nodes: Vec<Node>,
    attaches: Vec<Attach>,
    roots: Vec<NodeId>,
    observer: Option<Box<dyn FnMut(&NodeChange)>>,
}

impl fmt::Debug for NodeTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeTree")
            .field("nodes", &self.nodes)
            .field("attaches", &self.attaches)
            .field("roots", &self.roots)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

/// Clones the nodes and attaches without the observer.
impl Clone for NodeTree {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            attaches: self.attaches.clone(),
            roots: self.roots.clone(),
            observer: None,
        }
    }
}

struct ReadState {
    visited: AHashSet<u32>,
    attaches: AHashMap<u32, AttachId>,
}

impl NodeTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node with default transforms as the last child of `parent`
    /// or as a new root if `parent` is [None].
    pub fn add_node(&mut self, parent: Option<NodeId>, name: impl Into<String>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(name.into(), parent));
        match parent {
            Some(parent) => self.nodes[parent.0].children.push(id),
            None => self.roots.push(id),
        }
        self.update_transforms(id);
        id
    }

    pub fn add_attach(&mut self, attach: Attach) -> AttachId {
        self.attaches.push(attach);
        AttachId(self.attaches.len() - 1)
    }

    /// # Panics
    /// Panics if `id` does not belong to this tree.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// # Panics
    /// Panics if `id` does not belong to this tree.
    pub fn attach(&self, id: AttachId) -> &Attach {
        &self.attaches[id.0]
    }

    pub fn attach_mut(&mut self, id: AttachId) -> &mut Attach {
        &mut self.attaches[id.0]
    }

    pub fn attaches(&self) -> &[Attach] {
        &self.attaches
    }

    /// The attach assigned to the node `id`.
    pub fn node_attach(&self, id: NodeId) -> Option<&Attach> {
        self.nodes[id.0].attach.map(|a| &self.attaches[a.0])
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Finds the first node with the given `name`.
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().position(|n| n.name == name).map(NodeId)
    }

    /// The next child of the same parent or the next root for top level nodes.
    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let siblings = match self.nodes[id.0].parent {
            Some(parent) => &self.nodes[parent.0].children,
            None => &self.roots,
        };
        let index = siblings.iter().position(|s| *s == id)?;
        siblings.get(index + 1).copied()
    }

    /// Lists `root`, its descendants and the siblings following `root` with their descendants in depth first order.
    pub fn hierarchy(&self, root: NodeId) -> Vec<NodeId> {
        let mut nodes = Vec::new();
        let mut next = Some(root);
        while let Some(id) = next {
            let mut stack = vec![id];
            while let Some(id) = stack.pop() {
                nodes.push(id);
                stack.extend(self.nodes[id.0].children.iter().rev());
            }
            next = self.next_sibling(id);
        }
        nodes
    }

    /// Lists the attaches in [hierarchy](#method.hierarchy) without duplicates.
    pub fn hierarchy_attaches(&self, root: NodeId) -> Vec<AttachId> {
        let mut attaches = Vec::new();
        for id in self.hierarchy(root) {
            if let Some(attach) = self.nodes[id.0].attach {
                if !attaches.contains(&attach) {
                    attaches.push(attach);
                }
            }
        }
        attaches
    }

    /// Sets the callback for changes made through the setters.
    pub fn set_observer(&mut self, observer: impl FnMut(&NodeChange) + 'static) {
        self.observer = Some(Box::new(observer));
    }

    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    fn notify(&mut self, node: NodeId, property: NodeProperty) {
        if let Some(observer) = self.observer.as_mut() {
            observer(&NodeChange { node, property });
        }
    }

    fn update_transforms(&mut self, id: NodeId) {
        let node = &mut self.nodes[id.0];
        node.local_matrix =
            Mat4::from_scale_rotation_translation(node.scale, node.quaternion, node.position);

        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let parent_world = self.nodes[id.0]
                .parent
                .map(|p| self.nodes[p.0].world_matrix)
                .unwrap_or(Mat4::IDENTITY);

            let node = &mut self.nodes[id.0];
            node.world_matrix = parent_world * node.local_matrix;
            stack.extend(node.children.iter().copied());
        }
    }

    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) {
        self.nodes[id.0].name = name.into();
        self.notify(id, NodeProperty::Name);
    }

    /// Moves `id` to the end of the children of `parent` or to the end of the roots.
    pub fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) -> Result<(), HierarchyError> {
        let mut ancestor = parent;
        while let Some(a) = ancestor {
            if a == id {
                return Err(HierarchyError::Cycle {
                    node: id,
                    parent: parent.unwrap_or(id),
                });
            }
            ancestor = self.nodes[a.0].parent;
        }

        match self.nodes[id.0].parent {
            Some(old) => self.nodes[old.0].children.retain(|c| *c != id),
            None => self.roots.retain(|r| *r != id),
        }
        match parent {
            Some(new) => self.nodes[new.0].children.push(id),
            None => self.roots.push(id),
        }
        self.nodes[id.0].parent = parent;

        self.update_transforms(id);
        self.notify(id, NodeProperty::Parent);
        Ok(())
    }

    pub fn set_position(&mut self, id: NodeId, position: Vec3) {
        self.nodes[id.0].position = position;
        self.update_transforms(id);
        self.notify(id, NodeProperty::Position);
    }

    /// Sets the euler angles in radians and updates the quaternion.
    pub fn set_rotation(&mut self, id: NodeId, rotation: Vec3) {
        let node = &mut self.nodes[id.0];
        node.rotation = rotation;
        node.quaternion = euler_to_quat(rotation, node.attributes.rotate_zyx());
        self.update_transforms(id);
        self.notify(id, NodeProperty::Rotation);
        self.notify(id, NodeProperty::Quaternion);
    }

    /// Sets the rotation and updates the euler angles.
    pub fn set_quaternion(&mut self, id: NodeId, quaternion: Quat) {
        let node = &mut self.nodes[id.0];
        node.quaternion = quaternion.normalize();
        node.rotation = quat_to_euler(node.quaternion, node.attributes.rotate_zyx());
        self.update_transforms(id);
        self.notify(id, NodeProperty::Rotation);
        self.notify(id, NodeProperty::Quaternion);
    }

    pub fn set_scale(&mut self, id: NodeId, scale: Vec3) {
        self.nodes[id.0].scale = scale;
        self.update_transforms(id);
        self.notify(id, NodeProperty::Scale);
    }

    pub fn set_attach(&mut self, id: NodeId, attach: Option<AttachId>) {
        self.nodes[id.0].attach = attach;
        self.notify(id, NodeProperty::Attach);
    }

    /// Changes the rotation order.
    /// The euler angles are recalculated so the orientation of the node does not change.
    pub fn set_rotate_zyx(&mut self, id: NodeId, rotate_zyx: bool) {
        let node = &mut self.nodes[id.0];
        if node.attributes.rotate_zyx() == rotate_zyx {
            return;
        }
        node.attributes.set_rotate_zyx(rotate_zyx);
        node.rotation = quat_to_euler(node.quaternion, rotate_zyx);
        self.update_transforms(id);
        self.notify(id, NodeProperty::RotateZyx);
        self.notify(id, NodeProperty::Rotation);
    }

    pub fn set_animate(&mut self, id: NodeId, animate: bool) {
        self.nodes[id.0].attributes.set_no_animate(!animate);
        self.notify(id, NodeProperty::Animate);
    }

    pub fn set_morph(&mut self, id: NodeId, morph: bool) {
        self.nodes[id.0].attributes.set_no_morph(!morph);
        self.notify(id, NodeProperty::Morph);
    }

    /// Reads the `NJS_OBJECT` at `offset` and all of its children and following siblings.
    ///
    /// Attaches are read in `attach_format`.
    /// Attaches referenced more than once are read once and shared by all nodes referencing them.
    pub fn read(
        reader: &SourceReader,
        offset: u32,
        attach_format: AttachFormat,
        dx: bool,
        context: &mut ReadContext,
    ) -> Result<Self, ReadError> {
        let mut tree = Self::new();
        let mut state = ReadState {
            visited: AHashSet::new(),
            attaches: AHashMap::new(),
        };
        tree.read_siblings(
            reader,
            Some(offset),
            None,
            attach_format,
            dx,
            context,
            &mut state,
        )?;
        Ok(tree)
    }

    /// Reads only the `NJS_OBJECT` at `offset` and its attach.
    /// The child and sibling pointers are ignored.
    pub fn read_single(
        reader: &SourceReader,
        offset: u32,
        attach_format: AttachFormat,
        dx: bool,
        context: &mut ReadContext,
    ) -> Result<Self, ReadError> {
        let mut tree = Self::new();
        let mut state = ReadState {
            visited: AHashSet::new(),
            attaches: AHashMap::new(),
        };
        tree.read_node_record(reader, offset, None, attach_format, dx, context, &mut state)?;
        Ok(tree)
    }

    #[allow(clippy::too_many_arguments)]
    fn read_siblings(
        &mut self,
        reader: &SourceReader,
        offset: Option<u32>,
        parent: Option<NodeId>,
        attach_format: AttachFormat,
        dx: bool,
        context: &mut ReadContext,
        state: &mut ReadState,
    ) -> Result<(), ReadError> {
        let mut next = offset;
        while let Some(offset) = next {
            let (id, record) =
                self.read_node_record(reader, offset, parent, attach_format, dx, context, state)?;

            let child = reader.relocate(offset, record.child)?;
            self.read_siblings(
                reader,
                child,
                Some(id),
                attach_format,
                dx,
                context,
                state,
            )?;

            next = reader.relocate(offset, record.sibling)?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn read_node_record(
        &mut self,
        reader: &SourceReader,
        offset: u32,
        parent: Option<NodeId>,
        attach_format: AttachFormat,
        dx: bool,
        context: &mut ReadContext,
        state: &mut ReadState,
    ) -> Result<(NodeId, NodeRecord), ReadError> {
        if !state.visited.insert(offset) {
            return Err(ReadError::RepeatedNode {
                offset: offset as usize,
            });
        }

        let record: NodeRecord = reader.read(offset)?;
        let id = self.add_node(parent, label_or_default(&context.labels, "object", offset));

        let attach = match reader.relocate(offset, record.attach)? {
            Some(attach_offset) => Some(self.read_attach(
                reader,
                attach_offset,
                attach_format,
                dx,
                context,
                state,
            )?),
            None => None,
        };

        let node = &mut self.nodes[id.0];
        node.position = record.position.into();
        node.rotation = Vec3::from(record.rotation.map(bams_to_radians));
        node.scale = record.scale.into();
        node.attributes = record.attributes;
        node.quaternion = euler_to_quat(node.rotation, record.attributes.rotate_zyx());
        node.attach = attach;
        self.update_transforms(id);

        Ok((id, record))
    }

    fn read_attach(
        &mut self,
        reader: &SourceReader,
        offset: u32,
        attach_format: AttachFormat,
        dx: bool,
        context: &mut ReadContext,
        state: &mut ReadState,
    ) -> Result<AttachId, ReadError> {
        if let Some(id) = state.attaches.get(&offset) {
            return Ok(*id);
        }

        let attach = match context.attaches.get(&offset) {
            Some(attach) => {
                debug!("Reusing attach at offset 0x{:X}", offset);
                attach.clone()
            }
            None => {
                let attach = Attach::read(reader, offset, attach_format, dx, &context.labels)?;
                context.attaches.insert(offset, attach.clone());
                attach
            }
        };

        let id = self.add_attach(attach);
        state.attaches.insert(offset, id);
        Ok(id)
    }

    /// Writes `root` with its children, following siblings and attaches and returns the address of `root`.
    ///
    /// Nodes and attaches are written after the data they point to.
    /// Nodes with an already registered label are not written again.
    pub fn write(&self, writer: &mut EndianWriter, root: NodeId, dx: bool) -> Result<u32, WriteError> {
        if let Some(address) = self.written_address(writer, root) {
            return Ok(address);
        }

        // The last sibling is written first so each record can point to the next one.
        let mut siblings = Vec::new();
        let mut sibling = None;
        let mut next = self.next_sibling(root);
        while let Some(id) = next {
            if let Some(address) = self.written_address(writer, id) {
                sibling = Some(address);
                break;
            }
            siblings.push(id);
            next = self.next_sibling(id);
        }

        for id in siblings.into_iter().rev() {
            sibling = Some(self.write_node(writer, id, sibling, dx)?);
        }
        self.write_node(writer, root, sibling, dx)
    }

    fn written_address(&self, writer: &EndianWriter, id: NodeId) -> Option<u32> {
        let name = &self.nodes[id.0].name;
        let address = writer.label_address(name);
        if address.is_some() {
            debug!("Node {:?} is already written", name);
        }
        address
    }

    fn write_node(
        &self,
        writer: &mut EndianWriter,
        id: NodeId,
        sibling: Option<u32>,
        dx: bool,
    ) -> Result<u32, WriteError> {
        let node = &self.nodes[id.0];
        let child = node
            .children
            .first()
            .map(|c| self.write(writer, *c, dx))
            .transpose()?;
        let attach = node
            .attach
            .map(|a| self.attaches[a.0].write(writer, dx))
            .transpose()?;

        let rotation = node.rotation.to_array().map(radians_to_bams);

        let mut attributes = node.attributes;
        attributes.set_no_position(node.position == Vec3::ZERO);
        attributes.set_no_rotation(rotation == [0; 3]);
        attributes.set_no_scale(node.scale == Vec3::ONE);
        attributes.set_skip_children(node.children.is_empty());

        writer.align(4)?;
        let address = writer.write(&NodeRecord {
            attributes,
            attach: attach.unwrap_or(0),
            position: node.position.to_array(),
            rotation,
            scale: node.scale.to_array(),
            child: child.unwrap_or(0),
            sibling: sibling.unwrap_or(0),
        })?;
        writer.register_label(&node.name, address);

        Ok(address)
    }
}
