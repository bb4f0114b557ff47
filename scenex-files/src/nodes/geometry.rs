use crate::ParserError;
use crate::common::reader::{Parseable, read_array, read_count, read_counted_array};
use crate::common::types::{NodeId, Vector3};
use crate::common::writer::{Writable, write_counted_array};
use crate::nodes::{NodeKind, WireNode};
use byteorder::{ReadBytesExt, WriteBytesExt};
use scenex_files_derive_parseable::{Emit, Parse};
use std::io::{Read, Write};

#[derive(Debug, Copy, Clone, PartialEq, Default, Parse, Emit)]
pub struct VertexNormalTangent {
    pub position: Vector3,
    pub normal: Vector3,
    pub tangent: Vector3,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeometryLod {
    pub vertices: Vec<VertexNormalTangent>,
    /// Triangle list.
    pub indices: Vec<u32>,
}

impl GeometryLod {
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

impl Parseable<GeometryLod> for GeometryLod {
    fn parse<R: Read>(rdr: &mut R) -> Result<GeometryLod, ParserError> {
        let vertices = read_counted_array(rdr, "vertices")?;
        let index_count = read_count(rdr, "indices")?;
        if index_count % 3 != 0 {
            return Err(ParserError::FormatError {
                reason: "Index count is not a multiple of three",
            });
        }

        Ok(GeometryLod {
            vertices,
            indices: read_array(rdr, index_count)?,
        })
    }
}

impl Writable for GeometryLod {
    fn write<W: Write>(&self, w: &mut W) -> Result<(), ParserError> {
        if self.indices.len() % 3 != 0 {
            return Err(ParserError::FormatError {
                reason: "Index count is not a multiple of three",
            });
        }

        write_counted_array(w, &self.vertices, "vertices")?;
        write_counted_array(w, &self.indices, "indices")
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GeometryNode {
    pub id: NodeId,
    /// Index 0 is the most detailed representation.
    pub lods: Vec<GeometryLod>,
}

impl WireNode for GeometryNode {
    const KIND: NodeKind = NodeKind::Geometry;

    fn id(&self) -> NodeId {
        self.id
    }

    fn read<R: Read>(rdr: &mut R) -> Result<Self, ParserError> {
        let id = NodeId::parse(rdr)?;
        // The producer writes the LOD count as a single signed byte.
        let lod_count = rdr.read_i8()?;
        if lod_count < 0 {
            return Err(ParserError::InvalidCount {
                field: "lods",
                count: lod_count as i64,
            });
        }

        let lods = read_array(rdr, lod_count as usize)?;
        Ok(GeometryNode { id, lods })
    }

    fn write<W: Write>(&self, w: &mut W) -> Result<(), ParserError> {
        let lod_count = i8::try_from(self.lods.len()).map_err(|_| ParserError::InvalidCount {
            field: "lods",
            count: self.lods.len() as i64,
        })?;

        self.id.write(w)?;
        w.write_i8(lod_count)?;
        for lod in &self.lods {
            lod.write(w)?;
        }
        Ok(())
    }
}
