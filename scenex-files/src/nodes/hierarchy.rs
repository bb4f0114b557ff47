use crate::ParserError;
use crate::common::reader::{Parseable, read_counted_array};
use crate::common::types::{NodeId, Rgb8, UNDEFINED_ID, Vector3};
use crate::common::writer::{Writable, write_counted_array};
use crate::nodes::{NodeKind, WireNode};
use scenex_files_derive_parseable::{Emit, Parse};
use std::io::{Read, Write};

/// Places one geometry into a hierarchy node. `rotation_euler` is in degrees (x = roll, y = pitch, z = yaw).
#[derive(Debug, Copy, Clone, PartialEq, Parse, Emit)]
pub struct GeometryPartRef {
    pub geometry_id: NodeId,
    pub location: Vector3,
    pub rotation_euler: Vector3,
    pub scale: Vector3,
    pub color: Rgb8,
}

impl GeometryPartRef {
    pub fn identity(geometry_id: NodeId) -> Self {
        Self {
            geometry_id,
            location: Vector3::ZERO,
            rotation_euler: Vector3::ZERO,
            scale: Vector3::ONE,
            color: Rgb8::WHITE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HierarchyNode {
    pub id: NodeId,
    pub parent_id: NodeId,
    pub metadata_id: NodeId,
    pub geometry_parts: Vec<GeometryPartRef>,
    /// Informational only, the tree is wired through `parent_id`.
    pub child_ids: Vec<NodeId>,
}

impl HierarchyNode {
    pub fn new(id: NodeId, parent_id: NodeId) -> Self {
        Self {
            id,
            parent_id,
            metadata_id: UNDEFINED_ID,
            geometry_parts: vec![],
            child_ids: vec![],
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_id == UNDEFINED_ID
    }
}

impl WireNode for HierarchyNode {
    const KIND: NodeKind = NodeKind::Hierarchy;

    fn id(&self) -> NodeId {
        self.id
    }

    fn read<R: Read>(rdr: &mut R) -> Result<Self, ParserError> {
        Ok(HierarchyNode {
            id: NodeId::parse(rdr)?,
            parent_id: NodeId::parse(rdr)?,
            metadata_id: NodeId::parse(rdr)?,
            geometry_parts: read_counted_array(rdr, "geometry parts")?,
            child_ids: read_counted_array(rdr, "child ids")?,
        })
    }

    fn write<W: Write>(&self, w: &mut W) -> Result<(), ParserError> {
        self.id.write(w)?;
        self.parent_id.write(w)?;
        self.metadata_id.write(w)?;
        write_counted_array(w, &self.geometry_parts, "geometry parts")?;
        write_counted_array(w, &self.child_ids, "child ids")
    }
}
