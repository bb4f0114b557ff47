use scenex_files_derive_parseable::{Emit, Parse};

/// Node ids live in one id space per node kind: the same integer may name a hierarchy node and a geometry node.
pub type NodeId = u64;

/// Reserved id meaning "no value", e.g. the parent of the root or a hierarchy node without metadata.
pub const UNDEFINED_ID: NodeId = 0xFFFF_FFFF_0000_0000;

pub const fn is_defined(id: NodeId) -> bool {
    id != UNDEFINED_ID
}

/// Maps the sentinel to `None`.
pub const fn defined(id: NodeId) -> Option<NodeId> {
    if is_defined(id) { Some(id) } else { None }
}

#[derive(Debug, Copy, Clone, PartialEq, Default, Parse, Emit)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Vector3 = Vector3::new(0.0, 0.0, 0.0);
    pub const ONE: Vector3 = Vector3::new(1.0, 1.0, 1.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl From<Vector3> for [f32; 3] {
    fn from(value: Vector3) -> Self {
        [value.x, value.y, value.z]
    }
}

impl From<[f32; 3]> for Vector3 {
    fn from(value: [f32; 3]) -> Self {
        Self::new(value[0], value[1], value[2])
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Parse, Emit)]
pub struct Rgb8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb8 {
    pub const WHITE: Rgb8 = Rgb8 { r: 255, g: 255, b: 255 };
}

/// Column-major 3x4 affine matrix: the three basis vectors followed by the translation.
#[derive(Debug, Copy, Clone, PartialEq, Parse, Emit)]
pub struct Transform34 {
    pub x_axis: Vector3,
    pub y_axis: Vector3,
    pub z_axis: Vector3,
    pub translation: Vector3,
}

impl Default for Transform34 {
    fn default() -> Self {
        Self {
            x_axis: Vector3::new(1.0, 0.0, 0.0),
            y_axis: Vector3::new(0.0, 1.0, 0.0),
            z_axis: Vector3::new(0.0, 0.0, 1.0),
            translation: Vector3::ZERO,
        }
    }
}
