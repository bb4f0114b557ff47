use dashmap::DashMap;
use itertools::Itertools;
use scenex_files::common::types::NodeId;
use std::sync::Arc;

/// Something that can stand in for a node before its own record was decoded.
pub trait GraphNode: Send + Sync {
    fn placeholder(id: NodeId) -> Self;

    fn id(&self) -> NodeId;
}

/// Id -> node map with get-or-create semantics. Nodes are never removed or replaced, so a resolved `Arc` stays
/// the node for that id for the lifetime of the registry.
pub struct NodeRegistry<T: GraphNode> {
    nodes: DashMap<NodeId, Arc<T>>,
}

impl<T: GraphNode> Default for NodeRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: GraphNode> NodeRegistry<T> {
    pub fn new() -> Self {
        Self {
            nodes: DashMap::with_capacity(100),
        }
    }

    /// Returns the node for `id`, creating a placeholder if nobody has referenced it yet. Racing callers for
    /// the same unseen id observe the same node.
    pub(crate) fn resolve(&self, id: NodeId) -> Arc<T> {
        // Easy path: only takes the shard's read lock
        if let Some(node) = self.nodes.get(&id) {
            return node.value().clone();
        }

        // The entry API holds the shard's write lock between the check and the insert.
        self.nodes
            .entry(id)
            .or_insert_with(|| Arc::new(T::placeholder(id)))
            .value()
            .clone()
    }

    pub fn get(&self, id: NodeId) -> Option<Arc<T>> {
        self.nodes.get(&id).map(|node| node.value().clone())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Snapshot of all nodes in ascending id order.
    pub fn sorted(&self) -> Vec<Arc<T>> {
        self.nodes
            .iter()
            .map(|entry| entry.value().clone())
            .sorted_by_key(|node| node.id())
            .collect_vec()
    }
}
