pub mod bundle;
pub mod compression;
pub mod node_stream;
pub mod sink;
