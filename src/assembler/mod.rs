use crate::content::AssetContent;
use crate::content::nodes::{FinalGeometryPart, NodeRef, part_transform};
use crate::io::node_stream::NodeStreamHandler;
use crate::render::mesh_codec::{MeshCodec, MeshCodecError};
use crate::settings::AssemblerSettings;
use itertools::Itertools;
use log::{debug, error, trace, warn};
use scenex_files::common::types::{NodeId, defined};
use scenex_files::nodes::{AnyNode, GeometryNode, HierarchyNode, MetadataNode};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use thiserror::Error;

pub mod resolver;

#[derive(Error, Debug)]
pub enum AssemblerError {
    #[error("could not start the integration pool")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Error, Debug)]
pub enum IntegrationError {
    #[error("hierarchy node {0:#x} names itself as its parent")]
    SelfParent(NodeId),
    #[error("encoding the render payload of geometry {id:#x} failed")]
    MeshCodec {
        id: NodeId,
        #[source]
        source: MeshCodecError,
    },
}

struct Shared {
    content: Arc<AssetContent>,
    codec: Arc<dyn MeshCodec>,
    in_flight: AtomicUsize,
    failed: AtomicUsize,
}

/// Decrements the in-flight counter even if an integration panics.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Builds one [`AssetContent`] out of decoded nodes of all three kinds, in whatever order they arrive.
/// Integration runs on a bounded worker pool since encoding render payloads is the expensive part.
pub struct GraphAssembler {
    shared: Arc<Shared>,
    pool: rayon::ThreadPool,
    settings: AssemblerSettings,
}

impl GraphAssembler {
    pub fn new(codec: Arc<dyn MeshCodec>, settings: AssemblerSettings) -> Result<Self, AssemblerError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.worker_threads)
            .thread_name(|index| format!("assembler-{index}"))
            .panic_handler(|_| error!("A graph integration task panicked"))
            .build()?;

        Ok(Self {
            shared: Arc::new(Shared {
                content: Arc::new(AssetContent::new()),
                codec,
                in_flight: AtomicUsize::new(0),
                failed: AtomicUsize::new(0),
            }),
            pool,
            settings,
        })
    }

    pub fn content(&self) -> Arc<AssetContent> {
        self.shared.content.clone()
    }

    /// Queues the node for integration and returns immediately.
    pub fn submit(&self, node: impl Into<AnyNode>) {
        let node = node.into();
        trace!("Submitting {} node {:#x}", node.kind().name(), node.id());

        self.shared.in_flight.fetch_add(1, Ordering::AcqRel);
        let shared = self.shared.clone();
        self.pool.spawn(move || {
            let _in_flight = InFlight(&shared.in_flight);
            if let Err(err) = integrate(&shared.content, shared.codec.as_ref(), node) {
                error!("Integration failed: {err}");
                shared.failed.fetch_add(1, Ordering::AcqRel);
            }
        });
    }

    /// True once every submitted node has been integrated (or failed to).
    pub fn is_quiescent(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire) == 0
    }

    pub fn wait_quiescent(&self) {
        let started = Instant::now();
        while !self.is_quiescent() {
            std::thread::sleep(self.settings.poll_interval);
        }
        debug!("Assembler drained after {:?}", started.elapsed());
    }

    pub fn failed_integrations(&self) -> usize {
        self.shared.failed.load(Ordering::Acquire)
    }
}

/// Forwards every node of a stream into the assembler.
pub struct AssemblerFeed<'a>(pub &'a GraphAssembler);

impl NodeStreamHandler for AssemblerFeed<'_> {
    fn on_node(&mut self, node: AnyNode) {
        self.0.submit(node)
    }
}

/// Integrates one node synchronously.
pub fn integrate(content: &AssetContent, codec: &dyn MeshCodec, node: AnyNode) -> Result<(), IntegrationError> {
    match node {
        AnyNode::Metadata(metadata) => {
            integrate_metadata(content, metadata);
            Ok(())
        }
        AnyNode::Geometry(geometry) => integrate_geometry(content, codec, &geometry),
        AnyNode::Hierarchy(hierarchy) => integrate_hierarchy(content, &hierarchy),
    }
}

fn integrate_metadata(content: &AssetContent, metadata: MetadataNode) {
    let node = content.metadata().resolve(metadata.id);
    if !node.declare() {
        warn!("Metadata {:#x} was declared twice, keeping the first", metadata.id);
        return;
    }
    node.set_json(metadata.json);
}

fn integrate_geometry(content: &AssetContent, codec: &dyn MeshCodec, geometry: &GeometryNode) -> Result<(), IntegrationError> {
    let node = content.geometries().resolve(geometry.id);
    if !node.declare() {
        warn!("Geometry {:#x} was declared twice, keeping the first", geometry.id);
        return Ok(());
    }

    let payload = codec.encode(geometry).map_err(|source| IntegrationError::MeshCodec {
        id: geometry.id,
        source,
    })?;
    node.set_render_payload(payload);
    Ok(())
}

fn integrate_hierarchy(content: &AssetContent, hierarchy: &HierarchyNode) -> Result<(), IntegrationError> {
    if hierarchy.parent_id == hierarchy.id {
        return Err(IntegrationError::SelfParent(hierarchy.id));
    }

    let node = content.hierarchy().resolve(hierarchy.id);
    if !node.declare() {
        warn!("Hierarchy node {:#x} was declared twice, keeping the first", hierarchy.id);
        return Ok(());
    }

    match defined(hierarchy.parent_id) {
        None => content.declare_root(&node),
        Some(parent_id) => {
            let parent = content.hierarchy().resolve(parent_id);
            node.set_parent(NodeRef::to(&parent, parent_id));
            parent.add_child(node.clone());
        }
    }

    if let Some(metadata_id) = defined(hierarchy.metadata_id) {
        let metadata = content.metadata().resolve(metadata_id);
        node.set_metadata(NodeRef::to(&metadata, metadata_id));
    }

    let parts = hierarchy
        .geometry_parts
        .iter()
        .map(|part| {
            let geometry = content.geometries().resolve(part.geometry_id);
            FinalGeometryPart {
                geometry: NodeRef::to(&geometry, part.geometry_id),
                transform: part_transform(part),
                color: part.color,
            }
        })
        .collect_vec();
    node.set_geometries(parts);
    Ok(())
}
