use crate::render::types::{BoundingBox, Mesh, RenderMesh, VertexBuffers};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::Vec3;
use scenex_files::nodes::{GeometryLod, GeometryNode};
use std::io::{Cursor, Read, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeshCodecError {
    #[error("LOD {lod} references vertex {index}, but only has {vertex_count} vertices")]
    IndexOutOfRange { lod: usize, index: u32, vertex_count: usize },
    #[error("{0} LODs do not fit into a render payload")]
    TooManyLods(usize),
    #[error("the render payload is violating the expected format, because: {0}")]
    Malformed(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Turns decoded geometry into the renderer's opaque payload and back.
pub trait MeshCodec: Send + Sync {
    fn encode(&self, geometry: &GeometryNode) -> Result<Vec<u8>, MeshCodecError>;

    fn decode(&self, payload: &[u8]) -> Result<RenderMesh, MeshCodecError>;
}

/// Little-endian packed vertex streams: lod count, LOD 0 bounds, then per LOD the vertex count, one
/// position/normal/tangent/bitangent quadruple per vertex, the index count and the indices.
#[derive(Debug, Default, Clone, Copy)]
pub struct PackedMeshCodec;

impl PackedMeshCodec {
    pub fn build_render_mesh(geometry: &GeometryNode) -> Result<RenderMesh, MeshCodecError> {
        let lods = geometry
            .lods
            .iter()
            .enumerate()
            .map(|(lod, source)| Self::build_lod(lod, source))
            .collect::<Result<Vec<_>, _>>()?;

        let bounds = lods
            .first()
            .map(|mesh| BoundingBox::from_points(&mesh.vertex_buffers.position_buffer))
            .unwrap_or_default();

        Ok(RenderMesh { lods, bounds })
    }

    fn build_lod(lod: usize, source: &GeometryLod) -> Result<Mesh, MeshCodecError> {
        let vertex_count = source.vertices.len();
        if let Some(index) = source.indices.iter().find(|index| **index as usize >= vertex_count) {
            return Err(MeshCodecError::IndexOutOfRange {
                lod,
                index: *index,
                vertex_count,
            });
        }

        let mut vertex_buffers = VertexBuffers {
            position_buffer: Vec::with_capacity(vertex_count),
            normals_buffer: Vec::with_capacity(vertex_count),
            tangents_buffer: Vec::with_capacity(vertex_count),
            bitangents_buffer: Vec::with_capacity(vertex_count),
        };

        for vertex in &source.vertices {
            let normal = Vec3::from_array(vertex.normal.into()).normalize_or_zero();
            let tangent = Vec3::from_array(vertex.tangent.into()).normalize_or_zero();
            vertex_buffers
                .position_buffer
                .push(Vec3::from_array(vertex.position.into()));
            vertex_buffers.normals_buffer.push(normal);
            vertex_buffers.tangents_buffer.push(tangent);
            vertex_buffers.bitangents_buffer.push(normal.cross(tangent));
        }

        Ok(Mesh {
            vertex_buffers,
            index_buffer: source.indices.clone(),
        })
    }

    fn write_vec3<W: Write>(w: &mut W, value: Vec3) -> std::io::Result<()> {
        w.write_f32::<LittleEndian>(value.x)?;
        w.write_f32::<LittleEndian>(value.y)?;
        w.write_f32::<LittleEndian>(value.z)
    }

    fn read_vec3<R: Read>(rdr: &mut R) -> std::io::Result<Vec3> {
        Ok(Vec3::new(
            rdr.read_f32::<LittleEndian>()?,
            rdr.read_f32::<LittleEndian>()?,
            rdr.read_f32::<LittleEndian>()?,
        ))
    }

    fn read_len<R: Read>(rdr: &mut R, remaining: usize, element_size: usize) -> Result<usize, MeshCodecError> {
        let len = rdr.read_u32::<LittleEndian>()? as usize;
        if len.saturating_mul(element_size) > remaining {
            return Err(MeshCodecError::Malformed("element count exceeds the payload"));
        }
        Ok(len)
    }
}

impl MeshCodec for PackedMeshCodec {
    fn encode(&self, geometry: &GeometryNode) -> Result<Vec<u8>, MeshCodecError> {
        let render_mesh = Self::build_render_mesh(geometry)?;
        let lod_count =
            u8::try_from(render_mesh.lods.len()).map_err(|_| MeshCodecError::TooManyLods(render_mesh.lods.len()))?;

        let mut buf = Vec::new();
        buf.write_u8(lod_count)?;
        Self::write_vec3(&mut buf, render_mesh.bounds.min)?;
        Self::write_vec3(&mut buf, render_mesh.bounds.max)?;

        for mesh in &render_mesh.lods {
            let buffers = &mesh.vertex_buffers;
            buf.write_u32::<LittleEndian>(mesh.vertex_count() as u32)?;
            for vertex in 0..mesh.vertex_count() {
                Self::write_vec3(&mut buf, buffers.position_buffer[vertex])?;
                Self::write_vec3(&mut buf, buffers.normals_buffer[vertex])?;
                Self::write_vec3(&mut buf, buffers.tangents_buffer[vertex])?;
                Self::write_vec3(&mut buf, buffers.bitangents_buffer[vertex])?;
            }

            buf.write_u32::<LittleEndian>(mesh.index_buffer.len() as u32)?;
            for index in &mesh.index_buffer {
                buf.write_u32::<LittleEndian>(*index)?;
            }
        }

        Ok(buf)
    }

    fn decode(&self, payload: &[u8]) -> Result<RenderMesh, MeshCodecError> {
        let mut rdr = Cursor::new(payload);
        let remaining = |rdr: &Cursor<&[u8]>| payload.len().saturating_sub(rdr.position() as usize);

        let lod_count = rdr.read_u8()?;
        let bounds = BoundingBox {
            min: Self::read_vec3(&mut rdr)?,
            max: Self::read_vec3(&mut rdr)?,
        };

        let mut lods = Vec::with_capacity(lod_count as usize);
        for _ in 0..lod_count {
            let available = remaining(&rdr);
            let vertex_count = Self::read_len(&mut rdr, available, 48)?;
            let mut vertex_buffers = VertexBuffers {
                position_buffer: Vec::with_capacity(vertex_count),
                normals_buffer: Vec::with_capacity(vertex_count),
                tangents_buffer: Vec::with_capacity(vertex_count),
                bitangents_buffer: Vec::with_capacity(vertex_count),
            };
            for _ in 0..vertex_count {
                vertex_buffers.position_buffer.push(Self::read_vec3(&mut rdr)?);
                vertex_buffers.normals_buffer.push(Self::read_vec3(&mut rdr)?);
                vertex_buffers.tangents_buffer.push(Self::read_vec3(&mut rdr)?);
                vertex_buffers.bitangents_buffer.push(Self::read_vec3(&mut rdr)?);
            }

            let available = remaining(&rdr);
            let index_count = Self::read_len(&mut rdr, available, 4)?;
            let mut index_buffer = Vec::with_capacity(index_count);
            for _ in 0..index_count {
                index_buffer.push(rdr.read_u32::<LittleEndian>()?);
            }

            lods.push(Mesh {
                vertex_buffers,
                index_buffer,
            });
        }

        if remaining(&rdr) != 0 {
            return Err(MeshCodecError::Malformed("trailing bytes after the last LOD"));
        }

        Ok(RenderMesh { lods, bounds })
    }
}
