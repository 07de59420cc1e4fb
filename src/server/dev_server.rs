use crate::core::interfaces::Bundler;
use crate::server::middleware::BundleMiddleware;
use crate::utils::{Logger, Result};
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Static file server over the destination directory with the bundle
/// middleware in front of it
pub struct DevServer<B: Bundler> {
    middleware: BundleMiddleware<B>,
    host: String,
    port: u16,
}

impl<B: Bundler> DevServer<B> {
    pub fn new(middleware: BundleMiddleware<B>, host: impl Into<String>, port: u16) -> Self {
        Self {
            middleware,
            host: host.into(),
            port,
        }
    }

    /// Router with the static fallback; the middleware runs before it
    pub fn router(self) -> Router {
        let config = self.middleware.config();
        let serve_dir = ServeDir::new(config.root.join(config.dest.trim_start_matches('/')));

        let router = match config.prefix.as_deref() {
            Some(prefix) if prefix.starts_with('/') && prefix.len() > 1 => {
                Router::new().nest_service(prefix.trim_end_matches('/'), serve_dir)
            }
            _ => Router::new().fallback_service(serve_dir),
        };

        self.middleware.wrap(router).layer(TraceLayer::new_for_http())
    }

    pub async fn run(self) -> Result<()> {
        let host = self.host.clone();
        let port = self.port;
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;
        Logger::serving(port, &host);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Logger::info("bundle-serve stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        Logger::warn(&format!("cannot listen for shutdown signal: {}", err));
        std::future::pending::<()>().await;
    }
}
