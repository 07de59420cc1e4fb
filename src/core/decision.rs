use crate::core::cache::StalenessCache;
use crate::core::interfaces::{BundleHandle, Bundler, FileSystemService};
use crate::core::models::{BundlerOptions, RebuildPolicy};
use crate::utils::{Logger, Result};
use futures::future::try_join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Outcome of a staleness check.
///
/// `bundle` is set when the check had to analyze the entry point, so the
/// caller can generate from it instead of analyzing twice.
#[derive(Debug)]
pub struct RebuildDecision<H> {
    pub needed: bool,
    pub bundle: Option<H>,
}

impl<H> RebuildDecision<H> {
    fn needed() -> Self {
        Self { needed: true, bundle: None }
    }

    fn fresh() -> Self {
        Self { needed: false, bundle: None }
    }
}

pub struct RebuildDecisionEngine<B: Bundler> {
    bundler: Arc<B>,
    fs: Arc<dyn FileSystemService>,
    cache: Arc<StalenessCache>,
    policy: RebuildPolicy,
    debug: bool,
}

impl<B: Bundler> RebuildDecisionEngine<B> {
    pub fn new(
        bundler: Arc<B>,
        fs: Arc<dyn FileSystemService>,
        cache: Arc<StalenessCache>,
        policy: RebuildPolicy,
        debug: bool,
    ) -> Self {
        Self {
            bundler,
            fs,
            cache,
            policy,
            debug,
        }
    }

    /// Decide whether `output` has to be rebuilt from `options.entry`.
    ///
    /// A missing output always needs a rebuild. With the `deps-change`
    /// policy the first check for an output analyzes the bundle and caches
    /// its module list; later checks compare against the cached list only.
    /// Errors on the analyzing path are returned, errors on the cached path
    /// are logged and count as "rebuild needed".
    pub async fn decide(
        &self,
        output: &Path,
        options: &BundlerOptions,
    ) -> Result<RebuildDecision<B::Bundle>> {
        if !self.fs.exists(output).await {
            return Ok(RebuildDecision::needed());
        }

        match self.policy {
            RebuildPolicy::Always => return Ok(RebuildDecision::needed()),
            RebuildPolicy::Never => return Ok(RebuildDecision::fresh()),
            RebuildPolicy::DepsChange => {}
        }

        let Some(dependencies) = self.cache.get(output) else {
            let bundle = self.bundler.analyze(options).await?;
            let dependencies = bundle.modules().to_vec();
            if self.debug {
                Logger::key("Bundle loaded");
            }
            self.cache.insert(output.to_path_buf(), dependencies.clone());

            let fresh = self.all_files_older(output, &dependencies).await?;
            return Ok(RebuildDecision {
                needed: !fresh,
                bundle: Some(bundle),
            });
        };

        match self.all_files_older(output, &dependencies).await {
            Ok(fresh) => Ok(RebuildDecision {
                needed: !fresh,
                bundle: None,
            }),
            Err(err) => {
                Logger::error(&format!(
                    "staleness check failed for {}: {}",
                    output.display(),
                    err
                ));
                Ok(RebuildDecision::needed())
            }
        }
    }

    /// True when `file` is strictly newer than every one of `files`.
    /// Equal timestamps count as stale.
    pub async fn all_files_older(&self, file: &Path, files: &[PathBuf]) -> Result<bool> {
        let (file_mtime, mtimes) = futures::try_join!(
            self.fs.modified(file),
            try_join_all(files.iter().map(|f| self.fs.modified(f)))
        )?;

        let stale = mtimes.iter().any(|mtime| file_mtime <= *mtime);
        if self.debug {
            Logger::kv("Stats loaded", format!("{} dependencies", mtimes.len()));
            if stale {
                Logger::key("Dependency is newer");
            }
        }

        Ok(!stale)
    }
}
