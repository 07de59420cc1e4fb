use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

pub struct Logger;

impl Logger {
    /// Install the stderr subscriber. `RUST_LOG` takes precedence over `debug`.
    pub fn init(debug: bool) {
        let default_level = if debug { "bundle_serve=debug" } else { "bundle_serve=info" };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", default_level)));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }

    /// Diagnostic key/value line
    pub fn kv(key: &str, value: impl std::fmt::Display) {
        debug!("  {}: {}", key, value);
    }

    /// Diagnostic line with a key only
    pub fn key(key: &str) {
        debug!("  {}", key);
    }

    pub fn serving(port: u16, host: &str) {
        info!("🚀 bundle-serve listening on http://{}:{}", host, port);
    }

    pub fn info(msg: &str) {
        info!("{}", msg);
    }

    pub fn error(msg: &str) {
        error!("❌ {}", msg);
    }

    pub fn warn(msg: &str) {
        warn!("⚠️  {}", msg);
    }
}

pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        debug!("⏱️  Starting: {}", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!("⏱️  Completed: {} in {:.2?}", self.name, self.elapsed());
    }
}
