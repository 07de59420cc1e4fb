use crate::core::cache::{BuildLocks, StalenessCache};
use crate::core::decision::RebuildDecisionEngine;
use crate::core::interfaces::{BundleHandle, Bundler, FileSystemService};
use crate::core::models::{BundlerOptions, MiddlewareConfig, OutputOptions, ServePolicy};
use crate::infrastructure::TokioFileSystemService;
use crate::server::processor::{javascript_response, BundleProcessor};
use crate::utils::{Logger, Result};
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::{from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Requests for files with this extension are handled here
pub const SCRIPT_EXTENSION: &str = ".js";

/// Filesystem locations derived from a request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundlePaths {
    /// Where the generated bundle lives
    pub dest: PathBuf,
    /// Entry point handed to the bundler
    pub entry: PathBuf,
}

fn join_relative(base: &Path, segment: &str) -> PathBuf {
    base.join(segment.trim_start_matches('/'))
}

/// Translate a URL path into destination and entry paths.
///
/// Returns `None` for anything that is not a script request, and for paths
/// that try to climb out of the configured directories.
pub fn resolve_paths(config: &MiddlewareConfig, url_path: &str) -> Option<BundlePaths> {
    let mut path = url_path;
    if let Some(prefix) = &config.prefix {
        if let Some(rest) = path.strip_prefix(prefix.as_str()) {
            path = rest;
        }
    }

    if !path.ends_with(SCRIPT_EXTENSION) {
        return None;
    }

    // A leading destination segment ("/public/app.js") is not repeated on disk.
    let dest_segment = format!("/{}", config.dest.trim_matches('/'));
    let relative = match path.strip_prefix(dest_segment.as_str()) {
        Some(rest) if rest.starts_with('/') => rest,
        _ => path,
    };
    let relative = relative.trim_start_matches('/');

    if Path::new(relative)
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return None;
    }

    let stem = &relative[..relative.len() - SCRIPT_EXTENSION.len()];
    let dest = join_relative(&join_relative(&config.root, &config.dest), relative);
    let entry = join_relative(
        &join_relative(&config.root, &config.src),
        &format!("{}{}", stem, config.bundle_extension),
    );

    Some(BundlePaths { dest, entry })
}

/// Rebuilds stale bundles in front of the next handler
pub struct BundleMiddleware<B: Bundler> {
    config: Arc<MiddlewareConfig>,
    bundler: Arc<B>,
    fs: Arc<dyn FileSystemService>,
    cache: Arc<StalenessCache>,
    locks: BuildLocks,
    engine: RebuildDecisionEngine<B>,
}

impl<B: Bundler> BundleMiddleware<B> {
    pub fn new(config: MiddlewareConfig, bundler: B) -> Self {
        Self::with_file_system(config, bundler, Arc::new(TokioFileSystemService))
    }

    pub fn with_file_system(
        config: MiddlewareConfig,
        bundler: B,
        fs: Arc<dyn FileSystemService>,
    ) -> Self {
        let config = Arc::new(config);
        let bundler = Arc::new(bundler);
        let cache = Arc::new(StalenessCache::new());
        let engine = RebuildDecisionEngine::new(
            bundler.clone(),
            fs.clone(),
            cache.clone(),
            config.rebuild,
            config.debug,
        );

        Self {
            config,
            bundler,
            fs,
            cache,
            locks: BuildLocks::new(),
            engine,
        }
    }

    pub fn config(&self) -> &MiddlewareConfig {
        &self.config
    }

    pub fn cache(&self) -> &StalenessCache {
        &self.cache
    }

    /// Install in front of every route and the fallback of `router`
    pub fn wrap<S>(self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(from_fn_with_state(Arc::new(self), handle_request::<B>))
    }

    /// Middleware entry point
    pub async fn handle(self: Arc<Self>, req: Request, next: Next) -> Response {
        if req.method() != Method::GET && req.method() != Method::HEAD {
            return next.run(req).await;
        }

        let Some(paths) = resolve_paths(&self.config, req.uri().path()) else {
            return next.run(req).await;
        };

        let debug = self.config.debug;
        if debug {
            Logger::kv("source", paths.entry.display());
            Logger::kv("dest", paths.dest.display());
        }

        let bundler_options = BundlerOptions {
            entry: paths.entry.clone(),
            options: self.config.bundler_options.clone(),
        };
        let output_options = OutputOptions {
            dest: paths.dest.clone(),
            options: self.config.output_options.clone(),
        };

        let guard = self.locks.acquire(&paths.dest).await;
        match self.prepare_rebuild(&paths.dest, &bundler_options).await {
            Ok(Some(bundle)) => {
                let (tx, rx) = oneshot::channel();
                let processor = BundleProcessor::new(
                    self.config.clone(),
                    self.bundler.clone(),
                    self.fs.clone(),
                );

                // Detached: dropping this request does not cancel the build.
                tokio::spawn(async move {
                    let _guard = guard;
                    processor.process(bundle, output_options, req, next, tx).await;
                });

                return rx.await.unwrap_or_else(|_| {
                    Logger::error("bundle processing ended without a response");
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                });
            }
            Ok(None) => {}
            Err(err) => Logger::error(&err.format_detailed()),
        }
        drop(guard);

        if self.config.serve == ServePolicy::Always {
            return self.serve_from_disk(&paths.dest).await;
        }

        next.run(req).await
    }

    /// Bundle to generate from, or `None` when the output is up to date
    async fn prepare_rebuild(
        &self,
        dest: &Path,
        options: &BundlerOptions,
    ) -> Result<Option<B::Bundle>> {
        let decision = self.engine.decide(dest, options).await?;
        if !decision.needed {
            return Ok(None);
        }

        if self.config.debug {
            Logger::kv("Needs rebuild", "true");
            Logger::kv("Bundling", "started");
        }

        let bundle = match decision.bundle {
            Some(bundle) => bundle,
            None => self.bundler.analyze(options).await?,
        };
        // Whatever gets generated now defines the dependency list from here on.
        self.cache.insert(dest.to_path_buf(), bundle.modules().to_vec());

        Ok(Some(bundle))
    }

    async fn serve_from_disk(&self, dest: &Path) -> Response {
        match tokio::fs::read(dest).await {
            Ok(bytes) => {
                if self.config.debug {
                    Logger::kv("Serving", "ourselves");
                }
                javascript_response(&self.config, bytes)
            }
            Err(err) => {
                Logger::error(&format!("cannot serve {}: {}", dest.display(), err));
                if err.kind() == std::io::ErrorKind::NotFound {
                    StatusCode::NOT_FOUND.into_response()
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR.into_response()
                }
            }
        }
    }
}

async fn handle_request<B: Bundler>(
    State(middleware): State<Arc<BundleMiddleware<B>>>,
    req: Request,
    next: Next,
) -> Response {
    middleware.handle(req, next).await
}
