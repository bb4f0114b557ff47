use crate::assembler::resolver::NodeRegistry;
use crate::content::nodes::{FinalGeometryNode, FinalHierarchyNode, FinalMetadataNode};
use log::warn;
use parking_lot::RwLock;
use scenex_files::common::types::NodeId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

pub mod container;
pub mod nodes;

/// The assembled scene graph. Hierarchy, geometry and metadata ids are independent id spaces.
pub struct AssetContent {
    hierarchy: NodeRegistry<FinalHierarchyNode>,
    geometries: NodeRegistry<FinalGeometryNode>,
    metadata: NodeRegistry<FinalMetadataNode>,
    root: RwLock<Weak<FinalHierarchyNode>>,
    root_declarations: AtomicUsize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentStats {
    pub hierarchy_nodes: usize,
    pub geometry_nodes: usize,
    pub metadata_nodes: usize,
    /// Nodes that were referenced but whose own record never arrived.
    pub placeholders: usize,
    pub root: Option<NodeId>,
    /// Levels below and including the root, 0 without a root.
    pub depth: usize,
}

impl Default for AssetContent {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetContent {
    pub fn new() -> Self {
        Self {
            hierarchy: NodeRegistry::new(),
            geometries: NodeRegistry::new(),
            metadata: NodeRegistry::new(),
            root: RwLock::new(Weak::new()),
            root_declarations: AtomicUsize::new(0),
        }
    }

    pub fn root(&self) -> Option<Arc<FinalHierarchyNode>> {
        self.root.read().upgrade()
    }

    /// How many hierarchy nodes declared themselves root. Anything but 1 is an anomaly of the input, the
    /// last declaration wins.
    pub fn root_declarations(&self) -> usize {
        self.root_declarations.load(Ordering::Acquire)
    }

    pub(crate) fn declare_root(&self, node: &Arc<FinalHierarchyNode>) {
        let mut root = self.root.write();
        if let Some(previous) = root.upgrade() {
            warn!(
                "Hierarchy node {:#x} declared itself root, replacing root {:#x}",
                node.id, previous.id
            );
        }
        *root = Arc::downgrade(node);
        self.root_declarations.fetch_add(1, Ordering::AcqRel);
    }

    pub fn hierarchy(&self) -> &NodeRegistry<FinalHierarchyNode> {
        &self.hierarchy
    }

    pub fn geometries(&self) -> &NodeRegistry<FinalGeometryNode> {
        &self.geometries
    }

    pub fn metadata(&self) -> &NodeRegistry<FinalMetadataNode> {
        &self.metadata
    }

    /// Re-resolves geometry and metadata references that point at nodes this graph didn't have when they were
    /// created, e.g. after merging geometry containers into a hierarchy-only container.
    pub fn relink(&self) -> usize {
        let relinked = self
            .hierarchy
            .sorted()
            .iter()
            .map(|node| node.update_references(|id| self.geometries.get(id), |id| self.metadata.get(id)))
            .sum();
        log::debug!("Relinked {relinked} references");
        relinked
    }

    pub fn depth(&self) -> usize {
        let Some(root) = self.root() else {
            return 0;
        };

        let mut depth = 0;
        let mut level = vec![root];
        while !level.is_empty() {
            depth += 1;
            level = level.iter().flat_map(|node| node.children()).collect();
        }
        depth
    }

    pub fn stats(&self) -> ContentStats {
        let placeholders = self.hierarchy.sorted().iter().filter(|node| !node.is_declared()).count()
            + self.geometries.sorted().iter().filter(|node| !node.is_declared()).count()
            + self.metadata.sorted().iter().filter(|node| !node.is_declared()).count();

        ContentStats {
            hierarchy_nodes: self.hierarchy.len(),
            geometry_nodes: self.geometries.len(),
            metadata_nodes: self.metadata.len(),
            placeholders,
            root: self.root().map(|root| root.id),
            depth: self.depth(),
        }
    }
}
