#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use axum::Router;
use bundle_serve::core::models::{
    BundleOutput, BundlerOptions, MiddlewareConfig, MiddlewareOptions, OutputOptions,
};
use bundle_serve::utils::{BundleServeError, Result};
use bundle_serve::{BundleHandle, BundleMiddleware, Bundler};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

pub const NEXT_BODY: &str = "handled by next";
pub const BUNDLE_CODE: &str = "(function () { console.log('app'); })();";
pub const BUNDLE_MAP: &str = "{\"version\":3,\"mappings\":\"\"}";

pub struct FakeBundle {
    modules: Vec<PathBuf>,
}

impl BundleHandle for FakeBundle {
    fn modules(&self) -> &[PathBuf] {
        &self.modules
    }
}

#[derive(Default)]
pub struct FakeState {
    pub analyses: AtomicUsize,
    pub generations: AtomicUsize,
    pub modules: Mutex<Vec<PathBuf>>,
    pub entries: Mutex<Vec<PathBuf>>,
    pub fail_analyze: AtomicBool,
    pub fail_generate: AtomicBool,
    pub generate_delay: Mutex<Option<Duration>>,
}

impl FakeState {
    pub fn analyses(&self) -> usize {
        self.analyses.load(Ordering::SeqCst)
    }

    pub fn generations(&self) -> usize {
        self.generations.load(Ordering::SeqCst)
    }

    pub fn set_modules(&self, modules: Vec<PathBuf>) {
        *self.modules.lock().unwrap() = modules;
    }
}

#[derive(Clone)]
pub struct FakeBundler {
    pub state: Arc<FakeState>,
}

impl FakeBundler {
    pub fn new(modules: Vec<PathBuf>) -> Self {
        let state = FakeState::default();
        state.set_modules(modules);
        Self { state: Arc::new(state) }
    }
}

#[async_trait::async_trait]
impl Bundler for FakeBundler {
    type Bundle = FakeBundle;

    async fn analyze(&self, options: &BundlerOptions) -> Result<FakeBundle> {
        self.state.analyses.fetch_add(1, Ordering::SeqCst);
        self.state.entries.lock().unwrap().push(options.entry.clone());
        if self.state.fail_analyze.load(Ordering::SeqCst) {
            return Err(BundleServeError::bundler("cannot resolve entry"));
        }
        Ok(FakeBundle {
            modules: self.state.modules.lock().unwrap().clone(),
        })
    }

    async fn generate(
        &self,
        _bundle: FakeBundle,
        _options: &OutputOptions,
    ) -> Result<BundleOutput> {
        self.state.generations.fetch_add(1, Ordering::SeqCst);
        let delay = *self.state.generate_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state.fail_generate.load(Ordering::SeqCst) {
            return Err(BundleServeError::bundler("generation failed"));
        }
        Ok(BundleOutput {
            code: BUNDLE_CODE.to_string(),
            map: Some(BUNDLE_MAP.to_string()),
        })
    }
}

/// A root with `client/` sources dated in the past and an empty `public/`
pub struct Project {
    pub dir: TempDir,
}

impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("client")).unwrap();
        std::fs::create_dir_all(dir.path().join("public")).unwrap();

        let project = Self { dir };
        for source in project.sources() {
            write_with_mtime(&source, "export default 1;", past());
        }
        project
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn sources(&self) -> Vec<PathBuf> {
        vec![self.root().join("client/app.bundle"), self.root().join("client/util.js")]
    }

    pub fn output(&self) -> PathBuf {
        self.root().join("public/app.js")
    }

    pub fn options(&self) -> MiddlewareOptions {
        MiddlewareOptions {
            src: Some("client".to_string()),
            dest: Some("public".to_string()),
            root: Some(self.root().to_path_buf()),
            max_age: Some(60),
            ..Default::default()
        }
    }

    pub fn bundler(&self) -> FakeBundler {
        FakeBundler::new(self.sources())
    }

    pub fn app(&self, options: MiddlewareOptions, bundler: FakeBundler) -> Router {
        let config = MiddlewareConfig::from_options(options).unwrap();
        let router =
            Router::new().fallback(|| async { (StatusCode::OK, NEXT_BODY).into_response() });
        BundleMiddleware::new(config, bundler).wrap(router)
    }
}

pub fn past() -> SystemTime {
    SystemTime::now() - Duration::from_secs(3600)
}

pub fn write_with_mtime(path: &Path, content: &str, mtime: SystemTime) {
    std::fs::write(path, content).unwrap();
    set_mtime(path, mtime);
}

pub fn set_mtime(path: &Path, mtime: SystemTime) {
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(mtime)
        .unwrap();
}

pub fn get(uri: &str) -> Request<Body> {
    request("GET", uri)
}

pub fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Poll until `path` holds `expected`; the write may finish after an inline response.
pub async fn wait_for_content(path: &Path, expected: &str) -> bool {
    for _ in 0..100 {
        if std::fs::read_to_string(path).map(|c| c == expected).unwrap_or(false) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
