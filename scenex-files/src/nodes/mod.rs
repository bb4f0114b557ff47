use crate::ParserError;
use crate::common::types::NodeId;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::io::{Cursor, Read, Write};

pub mod geometry;
pub mod hierarchy;
pub mod metadata;


pub use geometry::{GeometryLod, GeometryNode, VertexNormalTangent};
pub use hierarchy::{GeometryPartRef, HierarchyNode};
pub use metadata::MetadataNode;

/// The three independent record families. Every node stream carries exactly one of them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum NodeKind {
    Hierarchy = 0,
    Geometry = 1,
    Metadata = 2,
}

impl NodeKind {
    pub const ALL: [NodeKind; 3] = [NodeKind::Hierarchy, NodeKind::Geometry, NodeKind::Metadata];

    pub fn from_tag(tag: u8) -> Result<NodeKind, ParserError> {
        NodeKind::try_from(tag).map_err(|_| ParserError::UnknownNodeKind(tag))
    }

    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Hierarchy => "hierarchy",
            NodeKind::Geometry => "geometry",
            NodeKind::Metadata => "metadata",
        }
    }
}

/// Outcome of decoding one record out of a byte window. A short window is not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Node { node: T, consumed: usize },
    NeedMoreData,
}

impl<T> Decoded<T> {
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Decoded<U> {
        match self {
            Decoded::Node { node, consumed } => Decoded::Node {
                node: f(node),
                consumed,
            },
            Decoded::NeedMoreData => Decoded::NeedMoreData,
        }
    }
}

pub trait WireNode: Sized {
    const KIND: NodeKind;

    fn id(&self) -> NodeId;

    fn read<R: Read>(rdr: &mut R) -> Result<Self, ParserError>;

    fn write<W: Write>(&self, w: &mut W) -> Result<(), ParserError>;

    /// Decodes the record starting at `offset`. Running out of bytes anywhere inside the record yields
    /// [`Decoded::NeedMoreData`], structurally invalid records are errors.
    fn decode(buffer: &[u8], offset: usize) -> Result<Decoded<Self>, ParserError> {
        if offset >= buffer.len() {
            return Ok(Decoded::NeedMoreData);
        }

        let mut cursor = Cursor::new(&buffer[offset..]);
        match Self::read(&mut cursor) {
            Ok(node) => Ok(Decoded::Node {
                node,
                consumed: cursor.position() as usize,
            }),
            Err(err) if err.is_eof() => Ok(Decoded::NeedMoreData),
            Err(err) => Err(err),
        }
    }

    fn encode(&self) -> Result<Vec<u8>, ParserError> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        Ok(buf)
    }
}

/// A decoded record of any kind, as handed from the stream decoders to the assembler.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyNode {
    Hierarchy(HierarchyNode),
    Geometry(GeometryNode),
    Metadata(MetadataNode),
}

impl AnyNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            AnyNode::Hierarchy(_) => NodeKind::Hierarchy,
            AnyNode::Geometry(_) => NodeKind::Geometry,
            AnyNode::Metadata(_) => NodeKind::Metadata,
        }
    }

    pub fn id(&self) -> NodeId {
        match self {
            AnyNode::Hierarchy(node) => node.id(),
            AnyNode::Geometry(node) => node.id(),
            AnyNode::Metadata(node) => node.id(),
        }
    }

    pub fn decode(kind: NodeKind, buffer: &[u8], offset: usize) -> Result<Decoded<AnyNode>, ParserError> {
        Ok(match kind {
            NodeKind::Hierarchy => HierarchyNode::decode(buffer, offset)?.map(AnyNode::Hierarchy),
            NodeKind::Geometry => GeometryNode::decode(buffer, offset)?.map(AnyNode::Geometry),
            NodeKind::Metadata => MetadataNode::decode(buffer, offset)?.map(AnyNode::Metadata),
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> Result<(), ParserError> {
        match self {
            AnyNode::Hierarchy(node) => node.write(w),
            AnyNode::Geometry(node) => node.write(w),
            AnyNode::Metadata(node) => node.write(w),
        }
    }
}

impl From<HierarchyNode> for AnyNode {
    fn from(value: HierarchyNode) -> Self {
        AnyNode::Hierarchy(value)
    }
}

impl From<GeometryNode> for AnyNode {
    fn from(value: GeometryNode) -> Self {
        AnyNode::Geometry(value)
    }
}

impl From<MetadataNode> for AnyNode {
    fn from(value: MetadataNode) -> Self {
        AnyNode::Metadata(value)
    }
}
