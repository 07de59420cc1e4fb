use crate::core::interfaces::FileSystemService;
use crate::utils::{BundleServeError, Result};
use std::path::Path;
use std::time::SystemTime;
use tokio::fs;

pub struct TokioFileSystemService;

#[async_trait::async_trait]
impl FileSystemService for TokioFileSystemService {
    async fn exists(&self, path: &Path) -> bool {
        fs::metadata(path).await.is_ok()
    }

    async fn modified(&self, path: &Path) -> Result<SystemTime> {
        let metadata = fs::metadata(path).await.map_err(BundleServeError::Io)?;
        metadata.modified().map_err(BundleServeError::Io)
    }

    async fn is_dir(&self, path: &Path) -> Result<bool> {
        match fs::metadata(path).await {
            Ok(metadata) => Ok(metadata.is_dir()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(BundleServeError::Io(err)),
        }
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> Result<()> {
        fs::write(path, content).await.map_err(BundleServeError::Io)
    }
}
