//! On-demand JavaScript bundle rebuilding for axum.
//!
//! [`BundleMiddleware`] sits in front of a static file handler. For every
//! `GET`/`HEAD` request of a `.js` file it checks whether the bundle on disk
//! is older than any file it was built from, rebuilds it through a
//! [`Bundler`] when it is, and then serves the fresh code, writes it to
//! disk for the next handler, or both.
//!
//! ```no_run
//! use axum::Router;
//! use bundle_serve::{BundleMiddleware, EsbuildBundler, MiddlewareConfig, MiddlewareOptions};
//!
//! # fn main() -> bundle_serve::Result<()> {
//! let config = MiddlewareConfig::from_options(MiddlewareOptions {
//!     src: Some("client".into()),
//!     dest: Some("public".into()),
//!     ..Default::default()
//! })?;
//! let app: Router = BundleMiddleware::new(config, EsbuildBundler::new()?).wrap(Router::new());
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod infrastructure;
pub mod server;
pub mod utils;

pub use crate::core::{
    BundleHandle, BundleOutput, Bundler, BundlerOptions, FileSystemService, MiddlewareConfig,
    MiddlewareOptions, OutputOptions, RebuildDecision, RebuildDecisionEngine, RebuildPolicy,
    ServePolicy, StalenessCache,
};
pub use crate::infrastructure::{EsbuildBundler, TokioFileSystemService};
pub use crate::server::{BundleMiddleware, DevServer};
pub use crate::utils::{BundleServeError, Result};
