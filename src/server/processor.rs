use crate::core::interfaces::{Bundler, FileSystemService};
use crate::core::models::{BundleOutput, MiddlewareConfig, OutputOptions};
use crate::utils::{BundleServeError, Logger, Result, Timer};
use axum::extract::Request;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;

pub const JAVASCRIPT_CONTENT_TYPE: &str = "application/javascript";

/// 200 response carrying JavaScript with the configured cache lifetime
pub fn javascript_response(config: &MiddlewareConfig, body: impl IntoResponse) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, JAVASCRIPT_CONTENT_TYPE.to_string()),
            (header::CACHE_CONTROL, config.cache_control()),
        ],
        body,
    )
        .into_response()
}

/// Path of the source map written next to `dest`
pub fn map_path(dest: &Path) -> PathBuf {
    let mut path = dest.as_os_str().to_os_string();
    path.push(".map");
    PathBuf::from(path)
}

/// Generates a bundle, answers the request and writes the artifact to disk
pub struct BundleProcessor<B: Bundler> {
    config: Arc<MiddlewareConfig>,
    bundler: Arc<B>,
    fs: Arc<dyn FileSystemService>,
}

impl<B: Bundler> BundleProcessor<B> {
    pub fn new(
        config: Arc<MiddlewareConfig>,
        bundler: Arc<B>,
        fs: Arc<dyn FileSystemService>,
    ) -> Self {
        Self { config, bundler, fs }
    }

    /// Runs detached from the request: the response goes out through
    /// `respond` as soon as one exists, and the disk write completes even if
    /// the receiver is gone.
    pub async fn process(
        &self,
        bundle: B::Bundle,
        options: OutputOptions,
        req: Request,
        next: Next,
        respond: oneshot::Sender<Response>,
    ) {
        let debug = self.config.debug;
        let _timer = Timer::start("bundle generation");

        let output = match self.bundler.generate(bundle, &options).await {
            Ok(output) => output,
            Err(err) => {
                Logger::error(&err.format_detailed());
                let _ = respond.send(next.run(req).await);
                return;
            }
        };
        if debug {
            Logger::kv("Bundling", "finished");
        }

        let mut respond = Some(respond);
        if self.config.serve.serves_compiled() {
            if debug {
                Logger::kv("Serving", "ourselves");
            }
            if let Some(tx) = respond.take() {
                let _ = tx.send(javascript_response(&self.config, output.code.clone()));
            }
        }

        if debug {
            Logger::kv("Writing out", "started");
        }
        match self.write_bundle(&output, &options.dest).await {
            Ok(()) => {
                if debug {
                    Logger::kv("Writing out", "finished");
                }
            }
            Err(err) => Logger::error(&err.to_string()),
        }

        // Not served inline: whatever happened to the write, the next handler answers.
        if let Some(tx) = respond {
            if tx.is_closed() {
                return;
            }
            if debug {
                Logger::kv("Serving", "by next()");
            }
            let _ = tx.send(next.run(req).await);
        }
    }

    /// Write the code to `dest` and the source map, if any, to `<dest>.map`
    pub async fn write_bundle(&self, output: &BundleOutput, dest: &Path) -> Result<()> {
        let parent = dest
            .parent()
            .ok_or_else(|| {
                BundleServeError::write("destination has no parent directory", dest.to_path_buf())
            })?;

        if !self.fs.is_dir(parent).await? {
            return Err(BundleServeError::write(
                "Directory to write to does not exist (not a directory)",
                dest.to_path_buf(),
            ));
        }

        self.fs.write_file(dest, output.code.as_bytes()).await?;
        if let Some(map) = &output.map {
            self.fs.write_file(&map_path(dest), map.as_bytes()).await?;
        }

        Ok(())
    }
}
