pub mod assembler;
pub mod content;
pub mod factory;
pub mod io;
pub mod render;
pub mod settings;
