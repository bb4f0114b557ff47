use crate::assembler::resolver::GraphNode;
use arc_swap::{ArcSwap, ArcSwapOption};
use glam::{Affine3A, EulerRot, Quat, Vec3, Vec3A};
use parking_lot::{Mutex, RwLock};
use scenex_files::common::types::{NodeId, Rgb8, Transform34, UNDEFINED_ID, Vector3};
use scenex_files::nodes::GeometryPartRef;
use scenex_files::nodes::metadata::empty_object;
use serde_json::Value;
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// A non-owning reference that remembers the id it was resolved from, so it can be written out (or
/// re-resolved) even if the target never materialized.
pub struct NodeRef<T> {
    pub id: NodeId,
    pub node: Weak<T>,
}

impl<T> NodeRef<T> {
    pub fn none() -> Self {
        Self {
            id: UNDEFINED_ID,
            node: Weak::new(),
        }
    }

    pub fn to(node: &Arc<T>, id: NodeId) -> Self {
        Self {
            id,
            node: Arc::downgrade(node),
        }
    }

    pub fn dangling(id: NodeId) -> Self {
        Self { id, node: Weak::new() }
    }

    pub fn upgrade(&self) -> Option<Arc<T>> {
        self.node.upgrade()
    }

    pub fn is_none(&self) -> bool {
        self.id == UNDEFINED_ID
    }

    /// Names a node that isn't reachable.
    pub fn is_dangling(&self) -> bool {
        !self.is_none() && self.node.strong_count() == 0
    }
}

impl<T> Clone for NodeRef<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            node: self.node.clone(),
        }
    }
}

impl<T> Debug for NodeRef<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_none() {
            write!(f, "None")
        } else {
            write!(f, "{:#x}{}", self.id, if self.is_dangling() { " (dangling)" } else { "" })
        }
    }
}

pub fn part_transform(part: &GeometryPartRef) -> Affine3A {
    let rotation = Quat::from_euler(
        EulerRot::ZYX,
        part.rotation_euler.z.to_radians(),
        part.rotation_euler.y.to_radians(),
        part.rotation_euler.x.to_radians(),
    );

    Affine3A::from_scale_rotation_translation(
        Vec3::from_array(part.scale.into()),
        rotation,
        Vec3::from_array(part.location.into()),
    )
}

pub fn affine_to_wire(transform: &Affine3A) -> Transform34 {
    let column = |v: Vec3A| Vector3::from(v.to_array());
    Transform34 {
        x_axis: column(transform.matrix3.x_axis),
        y_axis: column(transform.matrix3.y_axis),
        z_axis: column(transform.matrix3.z_axis),
        translation: column(transform.translation),
    }
}

pub fn affine_from_wire(transform: &Transform34) -> Affine3A {
    let column = |v: Vector3| Vec3A::from_array(v.into());
    Affine3A::from_cols(
        column(transform.x_axis),
        column(transform.y_axis),
        column(transform.z_axis),
        column(transform.translation),
    )
}

#[derive(Debug, Clone)]
pub struct FinalGeometryPart {
    pub geometry: NodeRef<FinalGeometryNode>,
    pub transform: Affine3A,
    pub color: Rgb8,
}

pub struct FinalHierarchyNode {
    pub id: NodeId,
    parent: RwLock<NodeRef<FinalHierarchyNode>>,
    /// Also the per-parent lock serializing child registration.
    children: Mutex<Vec<Arc<FinalHierarchyNode>>>,
    metadata: RwLock<NodeRef<FinalMetadataNode>>,
    geometries: RwLock<Vec<FinalGeometryPart>>,
    declared: AtomicBool,
}

impl FinalHierarchyNode {
    pub fn parent(&self) -> Option<Arc<FinalHierarchyNode>> {
        self.parent.read().upgrade()
    }

    /// [`UNDEFINED_ID`] for the root and for nodes that were only referenced so far.
    pub fn parent_id(&self) -> NodeId {
        self.parent.read().id
    }

    pub fn children(&self) -> Vec<Arc<FinalHierarchyNode>> {
        self.children.lock().clone()
    }

    pub fn child_count(&self) -> usize {
        self.children.lock().len()
    }

    pub fn metadata(&self) -> NodeRef<FinalMetadataNode> {
        self.metadata.read().clone()
    }

    pub fn geometries(&self) -> Vec<FinalGeometryPart> {
        self.geometries.read().clone()
    }

    /// Whether this node's own record was integrated, as opposed to it only being referenced as a parent.
    pub fn is_declared(&self) -> bool {
        self.declared.load(Ordering::Acquire)
    }

    /// Claims the declaration. Only the first caller gets `true`, ids are write-once.
    pub(crate) fn declare(&self) -> bool {
        !self.declared.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn set_parent(&self, parent: NodeRef<FinalHierarchyNode>) {
        *self.parent.write() = parent;
    }

    pub(crate) fn add_child(&self, child: Arc<FinalHierarchyNode>) {
        self.children.lock().push(child);
    }

    pub(crate) fn set_metadata(&self, metadata: NodeRef<FinalMetadataNode>) {
        *self.metadata.write() = metadata;
    }

    pub(crate) fn set_geometries(&self, parts: Vec<FinalGeometryPart>) {
        *self.geometries.write() = parts;
    }

    pub(crate) fn update_references<F, G>(&self, resolve_geometry: F, resolve_metadata: G) -> usize
    where
        F: Fn(NodeId) -> Option<Arc<FinalGeometryNode>>,
        G: Fn(NodeId) -> Option<Arc<FinalMetadataNode>>,
    {
        let mut relinked = 0;
        for part in self.geometries.write().iter_mut() {
            if !part.geometry.is_dangling() {
                continue;
            }
            if let Some(geometry) = resolve_geometry(part.geometry.id) {
                part.geometry = NodeRef::to(&geometry, part.geometry.id);
                relinked += 1;
            }
        }

        let mut metadata = self.metadata.write();
        if metadata.is_dangling() {
            if let Some(node) = resolve_metadata(metadata.id) {
                *metadata = NodeRef::to(&node, metadata.id);
                relinked += 1;
            }
        }
        relinked
    }
}

impl GraphNode for FinalHierarchyNode {
    fn placeholder(id: NodeId) -> Self {
        Self {
            id,
            parent: RwLock::new(NodeRef::none()),
            children: Mutex::new(vec![]),
            metadata: RwLock::new(NodeRef::none()),
            geometries: RwLock::new(vec![]),
            declared: AtomicBool::new(false),
        }
    }

    fn id(&self) -> NodeId {
        self.id
    }
}

impl Debug for FinalHierarchyNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinalHierarchyNode")
            .field("id", &self.id)
            .field("parent", &*self.parent.read())
            .field("children", &self.child_count())
            .field("metadata", &*self.metadata.read())
            .field("geometries", &self.geometries.read().len())
            .field("declared", &self.is_declared())
            .finish()
    }
}

pub struct FinalGeometryNode {
    pub id: NodeId,
    render_payload: ArcSwapOption<Vec<u8>>,
    declared: AtomicBool,
}

impl FinalGeometryNode {
    /// `None` while the node is a placeholder (or its mesh failed to encode).
    pub fn render_payload(&self) -> Option<Arc<Vec<u8>>> {
        self.render_payload.load_full()
    }

    pub fn is_declared(&self) -> bool {
        self.declared.load(Ordering::Acquire)
    }

    pub(crate) fn declare(&self) -> bool {
        !self.declared.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn set_render_payload(&self, payload: Vec<u8>) {
        self.render_payload.store(Some(Arc::new(payload)));
    }
}

impl GraphNode for FinalGeometryNode {
    fn placeholder(id: NodeId) -> Self {
        Self {
            id,
            render_payload: ArcSwapOption::empty(),
            declared: AtomicBool::new(false),
        }
    }

    fn id(&self) -> NodeId {
        self.id
    }
}

impl Debug for FinalGeometryNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{ id: {:#x}, ", self.id)?;
        match self.render_payload() {
            Some(payload) => write!(f, "render_payload: [{}] }}", payload.len()),
            None => write!(f, "render_payload: None }}"),
        }
    }
}

pub struct FinalMetadataNode {
    pub id: NodeId,
    json: ArcSwap<Value>,
    declared: AtomicBool,
}

impl FinalMetadataNode {
    /// An empty object while the node is a placeholder.
    pub fn json(&self) -> Arc<Value> {
        self.json.load_full()
    }

    pub fn is_declared(&self) -> bool {
        self.declared.load(Ordering::Acquire)
    }

    pub(crate) fn declare(&self) -> bool {
        !self.declared.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn set_json(&self, json: Value) {
        self.json.store(Arc::new(json));
    }
}

impl GraphNode for FinalMetadataNode {
    fn placeholder(id: NodeId) -> Self {
        Self {
            id,
            json: ArcSwap::from_pointee(empty_object()),
            declared: AtomicBool::new(false),
        }
    }

    fn id(&self) -> NodeId {
        self.id
    }
}

impl Debug for FinalMetadataNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{ id: {:#x}, json: {} }}", self.id, self.json())
    }
}
