// esbuild integration - runs the esbuild CLI as the external bundler

use crate::core::interfaces::{BundleHandle, Bundler};
use crate::core::models::{BundleOutput, BundlerOptions, OpaqueOptions, OutputOptions};
use crate::utils::{BundleServeError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tokio::process::Command;
use which::which;

// Extensions esbuild loads without configuration.
const KNOWN_EXTENSIONS: &[&str] = &[
    "js", "mjs", "cjs", "jsx", "ts", "tsx", "mts", "cts", "json", "css", "txt",
];

// Metafile inputs outside the file namespace look like `(disabled):fs` or `data:...`.
static NAMESPACED_INPUT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\([a-z-]+\)|[a-z][a-z-]*):").expect("valid namespace regex"));

/// Bundle analyzed by esbuild
#[derive(Debug, Clone)]
pub struct EsbuildBundle {
    entry: PathBuf,
    modules: Vec<PathBuf>,
    bundler_options: OpaqueOptions,
}

impl BundleHandle for EsbuildBundle {
    fn modules(&self) -> &[PathBuf] {
        &self.modules
    }
}

#[derive(Debug, Deserialize)]
struct Metafile {
    inputs: BTreeMap<String, Value>,
}

/// esbuild CLI bundler.
///
/// Every run works in a scratch directory; nothing esbuild writes ends up
/// next to the sources.
pub struct EsbuildBundler {
    esbuild_path: PathBuf,
}

impl EsbuildBundler {
    /// Locate esbuild on `PATH`
    pub fn new() -> Result<Self> {
        let esbuild_path = which("esbuild")
            .map_err(|_| BundleServeError::bundler("esbuild not found in PATH"))?;
        Ok(Self { esbuild_path })
    }

    pub fn with_esbuild_path(esbuild_path: PathBuf) -> Self {
        Self { esbuild_path }
    }

    pub fn esbuild_path(&self) -> &Path {
        &self.esbuild_path
    }

    async fn run(&self, entry: &Path, working_dir: &Path, args: &[String]) -> Result<()> {
        let output = Command::new(&self.esbuild_path)
            .args(command_args(entry, args))
            .current_dir(working_dir)
            .output()
            .await
            .map_err(|e| {
                BundleServeError::bundler_for(
                    format!("Failed to execute esbuild: {}", e),
                    entry.to_path_buf(),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BundleServeError::bundler_for(
                format!("esbuild failed: {}", stderr.trim()),
                entry.to_path_buf(),
            ));
        }

        Ok(())
    }
}

/// Full esbuild argument list for bundling `entry` with the extra `args`.
///
/// Entry points with an extension esbuild has no loader for are read as
/// JavaScript unless `args` already configure a loader for it.
pub fn command_args(entry: &Path, args: &[String]) -> Vec<String> {
    let mut command = vec![
        entry.display().to_string(),
        "--bundle".to_string(),
        "--log-level=error".to_string(),
    ];

    if let Some(ext) = entry.extension().and_then(|ext| ext.to_str()) {
        let loader_prefix = format!("--loader:.{}=", ext);
        let configured = args.iter().any(|arg| arg.starts_with(&loader_prefix));
        if !KNOWN_EXTENSIONS.contains(&ext) && !configured {
            command.push(format!("{}js", loader_prefix));
        }
    }

    command.extend(args.iter().cloned());
    command
}

fn scratch_dir() -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix("bundle-serve-")
        .tempdir()
        .map_err(BundleServeError::Io)
}

fn working_dir_for(entry: &Path) -> PathBuf {
    entry
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[async_trait::async_trait]
impl Bundler for EsbuildBundler {
    type Bundle = EsbuildBundle;

    async fn analyze(&self, options: &BundlerOptions) -> Result<EsbuildBundle> {
        let scratch = scratch_dir()?;
        let metafile = scratch.path().join("meta.json");
        let working_dir = working_dir_for(&options.entry);

        let mut args = vec![
            format!("--metafile={}", metafile.display()),
            format!("--outfile={}", scratch.path().join("analysis.js").display()),
        ];
        args.extend(option_flags(&options.options));

        self.run(&options.entry, &working_dir, &args).await?;

        let content = tokio::fs::read_to_string(&metafile).await?;
        let modules = dependencies_from_metafile(&content, &working_dir)?;

        Ok(EsbuildBundle {
            entry: options.entry.clone(),
            modules,
            bundler_options: options.options.clone(),
        })
    }

    async fn generate(
        &self,
        bundle: EsbuildBundle,
        options: &OutputOptions,
    ) -> Result<BundleOutput> {
        let scratch = scratch_dir()?;
        // Keep the destination's file name so a linked source map URL stays valid.
        let file_name = options
            .dest
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| "bundle.js".into());
        let outfile = scratch.path().join(&file_name);
        let working_dir = working_dir_for(&bundle.entry);

        let mut args = vec![format!("--outfile={}", outfile.display())];
        args.extend(option_flags(&bundle.bundler_options));
        args.extend(option_flags(&options.options));

        self.run(&bundle.entry, &working_dir, &args).await?;

        let code = tokio::fs::read_to_string(&outfile).await?;
        let mut map_path = outfile.into_os_string();
        map_path.push(".map");
        let map = match tokio::fs::read_to_string(&map_path).await {
            Ok(map) => {
                let dest_dir = options.dest.parent().unwrap_or_else(|| Path::new("/"));
                Some(relocate_source_map(&map, scratch.path(), dest_dir)?)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => return Err(err.into()),
        };

        Ok(BundleOutput { code, map })
    }
}

/// Absolute paths of every file-namespace input listed in an esbuild metafile
pub fn dependencies_from_metafile(content: &str, working_dir: &Path) -> Result<Vec<PathBuf>> {
    let metafile: Metafile = serde_json::from_str(content)
        .map_err(|e| BundleServeError::bundler(format!("invalid esbuild metafile: {}", e)))?;

    Ok(metafile
        .inputs
        .into_keys()
        .filter(|input| !NAMESPACED_INPUT.is_match(input))
        .map(|input| working_dir.join(input))
        .collect())
}

/// Rewrite the `sources` of a map esbuild wrote into `scratch` so they
/// resolve from `dest_dir`, where the map ends up.
pub fn relocate_source_map(map: &str, scratch: &Path, dest_dir: &Path) -> Result<String> {
    let mut map: Value = serde_json::from_str(map)
        .map_err(|e| BundleServeError::bundler(format!("invalid source map: {}", e)))?;

    if let Some(sources) = map.get_mut("sources").and_then(Value::as_array_mut) {
        for source in sources.iter_mut() {
            let Some(relative) = source.as_str() else {
                continue;
            };
            if NAMESPACED_INPUT.is_match(relative) || relative.starts_with('<') {
                continue;
            }
            let absolute = normalize(&scratch.join(relative));
            *source = Value::String(relative_url(&absolute, &normalize(dest_dir)));
        }
    }

    Ok(serde_json::to_string(&map)?)
}

/// Resolve `.` and `..` components without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

/// `/`-separated path leading from `base` to `path`; both are normalized
fn relative_url(path: &Path, base: &Path) -> String {
    let path: Vec<_> = path.components().collect();
    let base: Vec<_> = base.components().collect();
    let common = path
        .iter()
        .zip(base.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut segments: Vec<String> = vec!["..".to_string(); base.len() - common];
    segments.extend(
        path[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    segments.join("/")
}

/// Turn an opaque option object into esbuild flags
pub fn option_flags(options: &OpaqueOptions) -> Vec<String> {
    let mut flags = Vec::new();

    for (key, value) in options {
        let name = kebab_case(key);
        match value {
            Value::Null | Value::Bool(false) => {}
            Value::Bool(true) => flags.push(format!("--{}", name)),
            Value::String(s) => flags.push(format!("--{}={}", name, s)),
            Value::Number(n) => flags.push(format!("--{}={}", name, n)),
            Value::Array(items) => {
                for item in items {
                    match item {
                        Value::String(s) => flags.push(format!("--{}:{}", name, s)),
                        other => flags.push(format!("--{}:{}", name, other)),
                    }
                }
            }
            Value::Object(entries) => {
                // e.g. {"loader": {".png": "file"}} -> --loader:.png=file
                for (sub_key, sub_value) in entries {
                    let sub_value = match sub_value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    flags.push(format!("--{}:{}={}", name, sub_key, sub_value));
                }
            }
        }
    }

    flags
}

fn kebab_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for ch in key.chars() {
        if ch.is_ascii_uppercase() {
            out.push('-');
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
