pub mod mesh_codec;
pub mod types;
