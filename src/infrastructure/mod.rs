// Infrastructure layer
pub mod esbuild;
pub mod file_system;

pub use esbuild::*;
pub use file_system::*;
