#![allow(dead_code)]

use parking_lot::Mutex;
use scenex::assembler::GraphAssembler;
use scenex::content::AssetContent;
use scenex::io::node_stream::{NodeStreamHandler, StreamError};
use scenex::io::sink::{OutputProvider, OutputSink, SharedBuffer, SinkError};
use scenex::render::mesh_codec::PackedMeshCodec;
use scenex::settings::AssemblerSettings;
use scenex_files::common::types::{NodeId, Rgb8, UNDEFINED_ID, Vector3};
use scenex_files::nodes::{
    AnyNode, GeometryLod, GeometryNode, GeometryPartRef, HierarchyNode, MetadataNode, NodeKind, VertexNormalTangent,
};
use scenex_files::stream::encode_stream;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

pub fn hierarchy(id: NodeId, parent_id: NodeId, metadata_id: NodeId, geometries: &[NodeId]) -> HierarchyNode {
    HierarchyNode {
        id,
        parent_id,
        metadata_id,
        geometry_parts: geometries
            .iter()
            .enumerate()
            .map(|(index, geometry_id)| GeometryPartRef {
                geometry_id: *geometry_id,
                location: Vector3::new(index as f32, id as f32, -1.5),
                rotation_euler: Vector3::new(15.0, 30.0, 45.0 * index as f32),
                scale: Vector3::new(1.0, 2.0, 0.5),
                color: Rgb8 {
                    r: id as u8,
                    g: index as u8,
                    b: 200,
                },
            })
            .collect(),
        child_ids: vec![],
    }
}

pub fn geometry(id: NodeId, lods: usize) -> GeometryNode {
    let vertex = |x: f32, y: f32| VertexNormalTangent {
        position: Vector3::new(x, y, id as f32),
        normal: Vector3::new(0.0, 0.0, 2.0),
        tangent: Vector3::new(1.0, 0.0, 0.0),
    };

    GeometryNode {
        id,
        lods: (0..lods)
            .map(|lod| {
                let size = 1.0 / (lod + 1) as f32;
                GeometryLod {
                    vertices: vec![vertex(0.0, 0.0), vertex(size, 0.0), vertex(0.0, size), vertex(size, size)],
                    indices: vec![0, 1, 2, 2, 1, 3],
                }
            })
            .collect(),
    }
}

pub fn metadata(id: NodeId, name: &str) -> MetadataNode {
    MetadataNode::new(id, json!({ "name": name, "tags": ["a", "b"], "weight": 1.5 }))
}

/// Root 1, children 2 and 3, grandchild 4 below 3. Geometry 10 is shared between two nodes.
pub struct Scene {
    pub hierarchy: Vec<HierarchyNode>,
    pub geometry: Vec<GeometryNode>,
    pub metadata: Vec<MetadataNode>,
}

impl Scene {
    pub fn new() -> Self {
        Self {
            hierarchy: vec![
                hierarchy(1, UNDEFINED_ID, 20, &[10]),
                hierarchy(2, 1, UNDEFINED_ID, &[10, 11]),
                hierarchy(3, 1, 21, &[]),
                hierarchy(4, 3, 20, &[12]),
            ],
            geometry: vec![geometry(10, 1), geometry(11, 2), geometry(12, 3)],
            metadata: vec![metadata(20, "root"), metadata(21, "branch")],
        }
    }

    pub fn nodes(&self) -> Vec<AnyNode> {
        self.hierarchy
            .iter()
            .cloned()
            .map(AnyNode::from)
            .chain(self.geometry.iter().cloned().map(AnyNode::from))
            .chain(self.metadata.iter().cloned().map(AnyNode::from))
            .collect()
    }

    /// The uncompressed hierarchy, geometry and metadata streams.
    pub fn streams(&self) -> Result<[Vec<u8>; 3], anyhow::Error> {
        Ok([
            encode_stream(&self.hierarchy)?,
            encode_stream(&self.geometry)?,
            encode_stream(&self.metadata)?,
        ])
    }
}

pub fn assemble(nodes: Vec<AnyNode>) -> Result<Arc<AssetContent>, anyhow::Error> {
    let assembler = GraphAssembler::new(Arc::new(PackedMeshCodec), AssemblerSettings::default())?;
    for node in nodes {
        assembler.submit(node);
    }
    assembler.wait_quiescent();
    assert_eq!(assembler.failed_integrations(), 0);
    Ok(assembler.content())
}

#[derive(Default)]
pub struct Collect {
    pub versions: Vec<(NodeKind, u32)>,
    pub nodes: Vec<AnyNode>,
    pub error_codes: Vec<u16>,
}

impl NodeStreamHandler for Collect {
    fn on_version(&mut self, kind: NodeKind, version: u32) {
        self.versions.push((kind, version));
    }

    fn on_node(&mut self, node: AnyNode) {
        self.nodes.push(node);
    }

    fn on_error(&mut self, error: &StreamError) {
        self.error_codes.push(error.code());
    }
}

/// One buffer per requested output, keyed by the geometry id the output was requested for.
#[derive(Clone, Default)]
pub struct BufferOutputs {
    pub buffers: Arc<Mutex<BTreeMap<Option<NodeId>, SharedBuffer>>>,
}

impl BufferOutputs {
    pub fn provider(&self) -> OutputProvider {
        let buffers = self.buffers.clone();
        Arc::new(move |geometry| {
            let buffer = SharedBuffer::default();
            buffers.lock().insert(geometry, buffer.clone());
            Ok(OutputSink::Buffer(buffer))
        })
    }

    /// Like [`Self::provider`], but refuses to hand out a destination for `failing`.
    pub fn provider_failing_for(&self, failing: NodeId) -> OutputProvider {
        let inner = self.provider();
        Arc::new(move |geometry| {
            if geometry == Some(failing) {
                return Err(SinkError::Unavailable(format!("geometry {failing:#x}")));
            }
            inner(geometry)
        })
    }

    pub fn get(&self, geometry: Option<NodeId>) -> Option<Vec<u8>> {
        self.buffers.lock().get(&geometry).map(|buffer| buffer.lock().clone())
    }

    pub fn len(&self) -> usize {
        self.buffers.lock().len()
    }
}

#[derive(Debug, PartialEq)]
pub struct NodeShape {
    pub parent: NodeId,
    pub children: Vec<NodeId>,
    pub metadata: Option<serde_json::Value>,
    /// geometry id, transform bits, color
    pub parts: Vec<(NodeId, Vec<u32>, Rgb8)>,
}

/// Everything that makes two graphs the same graph, independent of construction order.
pub fn shape(content: &AssetContent) -> (Option<NodeId>, BTreeMap<NodeId, NodeShape>) {
    let nodes = content
        .hierarchy()
        .sorted()
        .iter()
        .map(|node| {
            let mut children = node.children().iter().map(|child| child.id).collect::<Vec<_>>();
            children.sort();

            let mut parts = node
                .geometries()
                .iter()
                .map(|part| {
                    let bits: Vec<u32> = part.transform.to_cols_array().iter().map(|f| f.to_bits()).collect();
                    (part.geometry.id, bits, part.color)
                })
                .collect::<Vec<_>>();
            parts.sort_by_key(|part| (part.0, part.1.clone()));

            let shape = NodeShape {
                parent: node.parent_id(),
                children,
                metadata: node.metadata().upgrade().map(|metadata| (*metadata.json()).clone()),
                parts,
            };
            (node.id, shape)
        })
        .collect();

    (content.root().map(|root| root.id), nodes)
}

pub fn payloads(content: &AssetContent) -> BTreeMap<NodeId, Option<Vec<u8>>> {
    content
        .geometries()
        .sorted()
        .iter()
        .map(|geometry| (geometry.id, geometry.render_payload().map(|payload| (*payload).clone())))
        .collect()
}
