use crate::core::models::{MiddlewareOptions, OpaqueOptions};
use crate::utils::{BundleServeError, Logger, Result};
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "bundle-serve.json";

/// Config loader that supports config files with CLI override
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `bundle-serve.json` from `root` if it exists
    pub fn load_from_file(root: &Path) -> Result<Option<MiddlewareOptions>> {
        let config_path = root.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            tracing::debug!("No {} found, using defaults", CONFIG_FILE_NAME);
            return Ok(None);
        }

        tracing::debug!("Loading config from {}", config_path.display());

        let content = std::fs::read_to_string(&config_path).map_err(BundleServeError::Io)?;

        let options: MiddlewareOptions = serde_json::from_str(&content).map_err(|e| {
            BundleServeError::config(format!("Failed to parse {}: {}", CONFIG_FILE_NAME, e))
        })?;

        Logger::info(&format!("Loaded {}", config_path.display()));
        Ok(Some(options))
    }

    /// Merge file options with CLI options (CLI takes precedence).
    /// Option objects are merged key by key.
    pub fn merge_with_cli(
        file: Option<MiddlewareOptions>,
        cli: MiddlewareOptions,
    ) -> MiddlewareOptions {
        let base = file.unwrap_or_default();

        MiddlewareOptions {
            bundle_extension: cli.bundle_extension.or(base.bundle_extension),
            src: cli.src.or(base.src),
            dest: cli.dest.or(base.dest),
            root: cli.root.or(base.root),
            prefix: cli.prefix.or(base.prefix),
            rebuild: cli.rebuild.or(base.rebuild),
            serve: cli.serve.or(base.serve),
            bundler_opts: merge_maps(base.bundler_opts, cli.bundler_opts),
            bundle_opts: merge_maps(base.bundle_opts, cli.bundle_opts),
            debug: cli.debug.or(base.debug),
            max_age: cli.max_age.or(base.max_age),
        }
    }

    /// Example config file contents
    pub fn generate_example() -> String {
        let example = MiddlewareOptions {
            src: Some("client".to_string()),
            dest: Some("public".to_string()),
            bundle_extension: Some(".bundle".to_string()),
            serve: Some(Default::default()),
            rebuild: Some(Default::default()),
            max_age: Some(0),
            ..Default::default()
        };
        serde_json::to_string_pretty(&example).unwrap_or_else(|_| {
            r#"{
  "bundleExtension": ".bundle",
  "src": "client",
  "dest": "public",
  "rebuild": "deps-change",
  "serve": "off",
  "maxAge": 0
}"#
            .to_string()
        })
    }
}

fn merge_maps(
    base: Option<OpaqueOptions>,
    overlay: Option<OpaqueOptions>,
) -> Option<OpaqueOptions> {
    match (base, overlay) {
        (Some(mut base), Some(overlay)) => {
            base.extend(overlay);
            Some(base)
        }
        (base, overlay) => overlay.or(base),
    }
}
