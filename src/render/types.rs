use glam::Vec3;
use std::fmt::{Debug, Formatter};

#[derive(Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertex_buffers: VertexBuffers,
    pub index_buffer: Vec<u32>,
}

impl Debug for Mesh {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{ vertex_buffers: {:?}, ", self.vertex_buffers)?;
        write!(f, "index_buffer: [{}] }}", self.index_buffer.len())
    }
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.vertex_buffers.position_buffer.len()
    }
}

/// One entry per vertex in every buffer.
#[derive(Clone, Default, PartialEq)]
pub struct VertexBuffers {
    pub position_buffer: Vec<Vec3>,
    pub normals_buffer: Vec<Vec3>,
    pub tangents_buffer: Vec<Vec3>,
    pub bitangents_buffer: Vec<Vec3>,
}

impl Debug for VertexBuffers {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{ position_buffer: [{}], ", self.position_buffer.len())?;
        write!(f, "normals_buffer: [{}], ", self.normals_buffer.len())?;
        write!(f, "tangents_buffer: [{}], ", self.tangents_buffer.len())?;
        write!(f, "bitangents_buffer: [{}] }}", self.bitangents_buffer.len())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub fn from_points(points: &[Vec3]) -> BoundingBox {
        let Some(first) = points.first() else {
            return BoundingBox::default();
        };

        points.iter().fold(
            BoundingBox {
                min: *first,
                max: *first,
            },
            |bounds, point| BoundingBox {
                min: bounds.min.min(*point),
                max: bounds.max.max(*point),
            },
        )
    }
}

/// What the renderer consumes for one geometry node: its LODs, most detailed first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderMesh {
    pub lods: Vec<Mesh>,
    /// Bounds of LOD 0.
    pub bounds: BoundingBox,
}
