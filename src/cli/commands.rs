use bundle_serve::core::models::{MiddlewareConfig, MiddlewareOptions, RebuildPolicy, ServePolicy};
use bundle_serve::server::{BundleMiddleware, DevServer};
use anyhow::{bail, Context, Result};
use bundle_serve::utils::{ConfigLoader, Logger, CONFIG_FILE_NAME};
use bundle_serve::EsbuildBundler;
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bundle-serve")]
#[command(about = "Serve JavaScript bundles, rebuilding them when their sources change")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the development server
    Serve {
        #[command(flatten)]
        options: ConfigArgs,
        /// Host to bind
        #[arg(long, default_value = "localhost")]
        host: String,
        /// Port to serve on
        #[arg(short, long, default_value_t = 3000)]
        port: u16,
        /// Path to the esbuild binary (default: looked up in PATH)
        #[arg(long)]
        esbuild: Option<PathBuf>,
    },
    /// Validate the configuration and print the resolved settings
    Check {
        #[command(flatten)]
        options: ConfigArgs,
    },
    /// Write an example bundle-serve.json
    Init {
        /// Directory to write into
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
    },
}

#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Root directory
    #[arg(short, long)]
    root: Option<PathBuf>,
    /// Source directory holding bundle entry points
    #[arg(short, long)]
    src: Option<String>,
    /// Destination directory for generated bundles (default: src)
    #[arg(short, long)]
    dest: Option<String>,
    /// URL prefix stripped before path translation
    #[arg(long)]
    prefix: Option<String>,
    /// Extension of bundle entry points
    #[arg(long)]
    bundle_extension: Option<String>,
    /// never, always or deps-change
    #[arg(long)]
    rebuild: Option<RebuildPolicy>,
    /// off, on-compile or always
    #[arg(long)]
    serve: Option<ServePolicy>,
    /// Cache-Control max-age in seconds
    #[arg(long)]
    max_age: Option<u64>,
    /// Output format passed to the bundler (iife, esm, cjs)
    #[arg(long)]
    format: Option<String>,
    /// Emit source maps next to generated bundles
    #[arg(long)]
    sourcemap: bool,
    /// Log every decision the middleware takes
    #[arg(long)]
    debug: bool,
}

impl ConfigArgs {
    fn root_dir(&self) -> Result<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => std::env::current_dir().context("cannot determine working directory"),
        }
    }

    fn into_options(self, root: PathBuf) -> MiddlewareOptions {
        let mut bundle_opts = serde_json::Map::new();
        if let Some(format) = self.format {
            bundle_opts.insert("format".to_string(), Value::String(format));
        }
        if self.sourcemap {
            bundle_opts.insert("sourcemap".to_string(), Value::Bool(true));
        }

        MiddlewareOptions {
            bundle_extension: self.bundle_extension,
            src: self.src,
            dest: self.dest,
            root: Some(root),
            prefix: self.prefix,
            rebuild: self.rebuild,
            serve: self.serve,
            bundler_opts: None,
            bundle_opts: (!bundle_opts.is_empty()).then_some(bundle_opts),
            debug: self.debug.then_some(true),
            max_age: self.max_age,
        }
    }
}

pub struct CliHandler;

impl CliHandler {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self) -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            Commands::Serve {
                options,
                host,
                port,
                esbuild,
            } => {
                Logger::init(options.debug);
                let config = self.resolve_config(options)?;
                self.handle_serve_command(config, host, port, esbuild).await
            }
            Commands::Check { options } => {
                Logger::init(options.debug);
                let config = self.resolve_config(options)?;
                self.handle_check_command(&config)
            }
            Commands::Init { root } => {
                Logger::init(false);
                self.handle_init_command(root)
            }
        }
    }

    fn resolve_config(&self, args: ConfigArgs) -> Result<MiddlewareConfig> {
        let root = args.root_dir()?;
        let file = ConfigLoader::load_from_file(&root)
            .with_context(|| format!("cannot load {}", root.join(CONFIG_FILE_NAME).display()))?;
        let options = ConfigLoader::merge_with_cli(file, args.into_options(root));
        Ok(MiddlewareConfig::from_options(options)?)
    }

    async fn handle_serve_command(
        &self,
        config: MiddlewareConfig,
        host: String,
        port: u16,
        esbuild: Option<PathBuf>,
    ) -> Result<()> {
        let bundler = match esbuild {
            Some(path) => EsbuildBundler::with_esbuild_path(path),
            None => EsbuildBundler::new()?,
        };
        Logger::info(&format!("Using esbuild at {}", bundler.esbuild_path().display()));

        let middleware = BundleMiddleware::new(config, bundler);
        DevServer::new(middleware, host, port)
            .run()
            .await
            .context("dev server failed")
    }

    fn handle_check_command(&self, config: &MiddlewareConfig) -> Result<()> {
        println!("root:             {}", config.root.display());
        println!("src:              {}", config.src);
        println!("dest:             {}", config.dest);
        println!("prefix:           {}", config.prefix.as_deref().unwrap_or("-"));
        println!("bundle extension: {}", config.bundle_extension);
        println!("rebuild:          {}", config.rebuild);
        println!("serve:            {}", config.serve);
        println!("max-age:          {}", config.max_age);
        println!(
            "output options:   {}",
            serde_json::to_string(&config.output_options)?
        );
        Ok(())
    }

    fn handle_init_command(&self, root: PathBuf) -> Result<()> {
        let path = root.join(CONFIG_FILE_NAME);
        if path.exists() {
            bail!("{} already exists", path.display());
        }
        std::fs::write(&path, ConfigLoader::generate_example())
            .with_context(|| format!("cannot write {}", path.display()))?;
        Logger::info(&format!("Wrote {}", path.display()));
        Ok(())
    }
}
