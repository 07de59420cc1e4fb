use crate::core::models::*;
use crate::utils::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// File system operations interface
#[async_trait]
pub trait FileSystemService: Send + Sync {
    async fn exists(&self, path: &Path) -> bool;
    async fn modified(&self, path: &Path) -> Result<SystemTime>;
    async fn is_dir(&self, path: &Path) -> Result<bool>;
    /// Write `content` to `path`. Parent directories are never created.
    async fn write_file(&self, path: &Path, content: &[u8]) -> Result<()>;
}

/// An analyzed bundle, ready for code generation
pub trait BundleHandle: Send + Sync + 'static {
    /// Absolute paths of every module read to produce this bundle
    fn modules(&self) -> &[PathBuf];
}

/// External bundler interface
#[async_trait]
pub trait Bundler: Send + Sync + 'static {
    type Bundle: BundleHandle;

    /// Resolve the dependency graph starting at `options.entry`
    async fn analyze(&self, options: &BundlerOptions) -> Result<Self::Bundle>;

    /// Produce code (and optionally a source map) for an analyzed bundle
    async fn generate(&self, bundle: Self::Bundle, options: &OutputOptions) -> Result<BundleOutput>;
}
