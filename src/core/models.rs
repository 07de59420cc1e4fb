use crate::utils::{precondition, BundleServeError, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Opaque option object handed through to the bundler untouched
pub type OpaqueOptions = Map<String, Value>;

/// Generated bundle code with optional source map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOutput {
    pub code: String,
    pub map: Option<String>,
}

/// When an existing output may be rebuilt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RebuildPolicy {
    Never,
    Always,
    #[default]
    DepsChange,
}

impl FromStr for RebuildPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "never" => Ok(Self::Never),
            "always" => Ok(Self::Always),
            "deps-change" => Ok(Self::DepsChange),
            other => Err(format!(
                "unknown rebuild policy '{}' (expected never, always or deps-change)",
                other
            )),
        }
    }
}

impl fmt::Display for RebuildPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => write!(f, "never"),
            Self::Always => write!(f, "always"),
            Self::DepsChange => write!(f, "deps-change"),
        }
    }
}

/// Whether the middleware answers requests itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServePolicy {
    /// Always hand off to the next handler
    #[default]
    Off,
    /// Answer with the freshly generated code, otherwise hand off
    OnCompile,
    /// Answer every script request, from memory or from disk
    Always,
}

impl ServePolicy {
    /// Whether freshly generated code is written into the response
    pub fn serves_compiled(&self) -> bool {
        matches!(self, Self::OnCompile | Self::Always)
    }
}

impl FromStr for ServePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "off" | "false" => Ok(Self::Off),
            "on-compile" => Ok(Self::OnCompile),
            "always" | "true" => Ok(Self::Always),
            other => Err(format!(
                "unknown serve policy '{}' (expected off, on-compile or always)",
                other
            )),
        }
    }
}

impl fmt::Display for ServePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::OnCompile => write!(f, "on-compile"),
            Self::Always => write!(f, "always"),
        }
    }
}

// Config files may spell the serve policy as a boolean.
impl<'de> Deserialize<'de> for ServePolicy {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Name(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => Ok(ServePolicy::Always),
            Raw::Flag(false) => Ok(ServePolicy::Off),
            Raw::Name(name) => name.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Per-request options for the bundler's analysis step
#[derive(Debug, Clone)]
pub struct BundlerOptions {
    pub entry: PathBuf,
    pub options: OpaqueOptions,
}

/// Per-request options for the bundler's generation step
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub dest: PathBuf,
    pub options: OpaqueOptions,
}

/// Middleware settings as supplied by callers or a config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MiddlewareOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_extension: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rebuild: Option<RebuildPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serve: Option<ServePolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundler_opts: Option<OpaqueOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_opts: Option<OpaqueOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age: Option<u64>,
}

/// Resolved, immutable middleware configuration
#[derive(Debug, Clone, PartialEq)]
pub struct MiddlewareConfig {
    pub bundle_extension: String,
    pub src: String,
    pub dest: String,
    pub root: PathBuf,
    pub prefix: Option<String>,
    pub rebuild: RebuildPolicy,
    pub serve: ServePolicy,
    pub bundler_options: OpaqueOptions,
    pub output_options: OpaqueOptions,
    pub debug: bool,
    pub max_age: u64,
}

pub const DEFAULT_BUNDLE_EXTENSION: &str = ".bundle";
pub const DEFAULT_OUTPUT_FORMAT: &str = "iife";

fn default_output_options() -> OpaqueOptions {
    let mut options = Map::new();
    options.insert("format".to_string(), Value::String(DEFAULT_OUTPUT_FORMAT.to_string()));
    options
}

impl MiddlewareConfig {
    /// Apply defaults and validate. Option objects are merged one level deep.
    pub fn from_options(options: MiddlewareOptions) -> Result<Self> {
        let src = options.src.unwrap_or_default();
        precondition(!src.is_empty(), "bundle middleware requires src directory.")?;

        let dest = options
            .dest
            .filter(|dest| !dest.is_empty())
            .unwrap_or_else(|| src.clone());

        let root = match options.root {
            Some(root) => root,
            None => std::env::current_dir().map_err(|e| {
                BundleServeError::config(format!("cannot determine working directory: {}", e))
            })?,
        };

        let mut output_options = default_output_options();
        output_options.extend(options.bundle_opts.unwrap_or_default());

        Ok(Self {
            bundle_extension: options
                .bundle_extension
                .unwrap_or_else(|| DEFAULT_BUNDLE_EXTENSION.to_string()),
            src,
            dest,
            root,
            prefix: options.prefix.filter(|prefix| !prefix.is_empty()),
            rebuild: options.rebuild.unwrap_or_default(),
            serve: options.serve.unwrap_or_default(),
            bundler_options: options.bundler_opts.unwrap_or_default(),
            output_options,
            debug: options.debug.unwrap_or(false),
            max_age: options.max_age.unwrap_or(0),
        })
    }

    /// Value of the `Cache-Control` header on responses served here
    pub fn cache_control(&self) -> String {
        format!("max-age={}", self.max_age)
    }
}
