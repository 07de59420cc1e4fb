mod common;

use axum::http::{header, StatusCode};
use bundle_serve::core::models::{RebuildPolicy, ServePolicy};
use common::*;
use std::sync::atomic::Ordering;
use std::time::{Duration, SystemTime};
use tower::ServiceExt;

#[tokio::test]
async fn test_missing_output_is_built_and_handed_to_next() {
    let project = Project::new();
    let bundler = project.bundler();
    let app = project.app(project.options(), bundler.clone());

    let response = app.oneshot(get("/app.js")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, NEXT_BODY);
    assert_eq!(bundler.state.analyses(), 1);
    assert_eq!(bundler.state.generations(), 1);
    // next runs only after the write has completed
    assert_eq!(std::fs::read_to_string(project.output()).unwrap(), BUNDLE_CODE);
    assert_eq!(
        std::fs::read_to_string(project.root().join("public/app.js.map")).unwrap(),
        BUNDLE_MAP
    );
    assert_eq!(
        bundler.state.entries.lock().unwrap().as_slice(),
        &[project.root().join("client/app.bundle")]
    );
}

#[tokio::test]
async fn test_missing_output_served_on_compile() {
    let project = Project::new();
    let bundler = project.bundler();
    let options = bundle_serve::MiddlewareOptions {
        serve: Some(ServePolicy::OnCompile),
        ..project.options()
    };
    let app = project.app(options, bundler.clone());

    let response = app.oneshot(get("/app.js")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/javascript");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "max-age=60");
    assert_eq!(body_string(response).await, BUNDLE_CODE);
    assert!(wait_for_content(&project.output(), BUNDLE_CODE).await);
    assert_eq!(bundler.state.generations(), 1);
}

#[tokio::test]
async fn test_fresh_cached_output_skips_bundler() {
    let project = Project::new();
    write_with_mtime(&project.output(), "// built", SystemTime::now());
    let bundler = project.bundler();
    let app = project.app(project.options(), bundler.clone());

    // First request populates the cache through one analysis.
    let response = app.clone().oneshot(get("/app.js")).await.unwrap();
    assert_eq!(body_string(response).await, NEXT_BODY);
    assert_eq!(bundler.state.analyses(), 1);

    let response = app.oneshot(get("/app.js")).await.unwrap();
    assert_eq!(body_string(response).await, NEXT_BODY);
    assert_eq!(bundler.state.analyses(), 1);
    assert_eq!(bundler.state.generations(), 0);
    assert_eq!(std::fs::read_to_string(project.output()).unwrap(), "// built");
}

#[tokio::test]
async fn test_non_script_request_goes_to_next() {
    let project = Project::new();
    let bundler = project.bundler();
    let app = project.app(project.options(), bundler.clone());

    let response = app.oneshot(get("/styles.css")).await.unwrap();

    assert_eq!(body_string(response).await, NEXT_BODY);
    assert_eq!(bundler.state.analyses(), 0);
    assert!(bundler.state.entries.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_non_get_request_goes_to_next() {
    let project = Project::new();
    let bundler = project.bundler();
    let app = project.app(project.options(), bundler.clone());

    let response = app.oneshot(request("POST", "/app.js")).await.unwrap();

    assert_eq!(body_string(response).await, NEXT_BODY);
    assert_eq!(bundler.state.analyses(), 0);
    assert!(!project.output().exists());
}

#[tokio::test]
async fn test_head_request_triggers_build() {
    let project = Project::new();
    let bundler = project.bundler();
    let app = project.app(project.options(), bundler.clone());

    let response = app.oneshot(request("HEAD", "/app.js")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(bundler.state.generations(), 1);
    assert!(project.output().exists());
}

#[tokio::test]
async fn test_missing_destination_directory() {
    let project = Project::new();
    std::fs::remove_dir(project.root().join("public")).unwrap();
    let bundler = project.bundler();
    let app = project.app(project.options(), bundler.clone());

    let response = app.oneshot(get("/app.js")).await.unwrap();

    assert_eq!(body_string(response).await, NEXT_BODY);
    assert_eq!(bundler.state.generations(), 1);
    assert!(!project.root().join("public").exists());
    assert!(!project.root().join("app.js").exists());
}

#[tokio::test]
async fn test_second_request_after_build_goes_to_next() {
    let project = Project::new();
    let bundler = project.bundler();
    let app = project.app(project.options(), bundler.clone());

    let first = app.clone().oneshot(get("/app.js")).await.unwrap();
    assert_eq!(body_string(first).await, NEXT_BODY);

    let second = app.oneshot(get("/app.js")).await.unwrap();
    assert_eq!(body_string(second).await, NEXT_BODY);

    assert_eq!(bundler.state.analyses(), 1);
    assert_eq!(bundler.state.generations(), 1);
}

#[tokio::test]
async fn test_changed_dependency_triggers_rebuild_and_refreshes_list() {
    let project = Project::new();
    let bundler = project.bundler();
    let app = project.app(project.options(), bundler.clone());

    let first = app.clone().oneshot(get("/app.js")).await.unwrap();
    assert_eq!(body_string(first).await, NEXT_BODY);
    assert_eq!(bundler.state.generations(), 1);

    // The entry gains an import and is saved after the bundle was written.
    let added = project.root().join("client/extra.js");
    write_with_mtime(&added, "export const x = 1;", SystemTime::now() - Duration::from_secs(600));
    set_mtime(&project.sources()[0], SystemTime::now() + Duration::from_secs(60));
    let mut modules = project.sources();
    modules.push(added.clone());
    bundler.state.set_modules(modules);

    let second = app.clone().oneshot(get("/app.js")).await.unwrap();
    assert_eq!(body_string(second).await, NEXT_BODY);
    assert_eq!(bundler.state.generations(), 2);
    assert_eq!(bundler.state.analyses(), 2);

    // The refreshed list now includes the new import.
    write_with_mtime(&project.output(), BUNDLE_CODE, SystemTime::now() + Duration::from_secs(120));
    set_mtime(&added, SystemTime::now() + Duration::from_secs(180));
    let third = app.oneshot(get("/app.js")).await.unwrap();
    assert_eq!(body_string(third).await, NEXT_BODY);
    assert_eq!(bundler.state.generations(), 3);
}

#[tokio::test]
async fn test_serve_always_reads_existing_output() {
    let project = Project::new();
    write_with_mtime(&project.output(), "// on disk", SystemTime::now());
    let bundler = project.bundler();
    let options = bundle_serve::MiddlewareOptions {
        serve: Some(ServePolicy::Always),
        ..project.options()
    };
    let app = project.app(options, bundler.clone());

    let response = app.oneshot(get("/app.js")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/javascript");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "max-age=60");
    assert_eq!(body_string(response).await, "// on disk");
    assert_eq!(bundler.state.generations(), 0);
}

#[tokio::test]
async fn test_serve_always_with_failed_analysis_and_no_output() {
    let project = Project::new();
    let bundler = project.bundler();
    bundler.state.fail_analyze.store(true, Ordering::SeqCst);
    let options = bundle_serve::MiddlewareOptions {
        serve: Some(ServePolicy::Always),
        ..project.options()
    };
    let app = project.app(options, bundler.clone());

    let response = app.oneshot(get("/app.js")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(bundler.state.generations(), 0);
}

#[tokio::test]
async fn test_analysis_failure_falls_through_to_next() {
    let project = Project::new();
    let bundler = project.bundler();
    bundler.state.fail_analyze.store(true, Ordering::SeqCst);
    let app = project.app(project.options(), bundler.clone());

    let response = app.oneshot(get("/app.js")).await.unwrap();

    assert_eq!(body_string(response).await, NEXT_BODY);
    assert!(!project.output().exists());
}

#[tokio::test]
async fn test_generation_failure_falls_through_to_next() {
    let project = Project::new();
    let bundler = project.bundler();
    bundler.state.fail_generate.store(true, Ordering::SeqCst);
    let options = bundle_serve::MiddlewareOptions {
        serve: Some(ServePolicy::OnCompile),
        ..project.options()
    };
    let app = project.app(options, bundler.clone());

    let response = app.oneshot(get("/app.js")).await.unwrap();

    assert_eq!(body_string(response).await, NEXT_BODY);
    assert!(!project.output().exists());
}

#[tokio::test]
async fn test_rebuild_always_regenerates_existing_output() {
    let project = Project::new();
    write_with_mtime(&project.output(), "// old", SystemTime::now());
    let bundler = project.bundler();
    let options = bundle_serve::MiddlewareOptions {
        rebuild: Some(RebuildPolicy::Always),
        ..project.options()
    };
    let app = project.app(options, bundler.clone());

    let response = app.oneshot(get("/app.js")).await.unwrap();

    assert_eq!(body_string(response).await, NEXT_BODY);
    assert_eq!(bundler.state.generations(), 1);
    assert_eq!(std::fs::read_to_string(project.output()).unwrap(), BUNDLE_CODE);
}

#[tokio::test]
async fn test_rebuild_never_keeps_stale_output() {
    let project = Project::new();
    write_with_mtime(&project.output(), "// old", past() - Duration::from_secs(60));
    let bundler = project.bundler();
    let options = bundle_serve::MiddlewareOptions {
        rebuild: Some(RebuildPolicy::Never),
        ..project.options()
    };
    let app = project.app(options, bundler.clone());

    let response = app.oneshot(get("/app.js")).await.unwrap();

    assert_eq!(body_string(response).await, NEXT_BODY);
    assert_eq!(bundler.state.analyses(), 0);
    assert_eq!(std::fs::read_to_string(project.output()).unwrap(), "// old");
}

#[tokio::test]
async fn test_prefix_is_stripped() {
    let project = Project::new();
    let bundler = project.bundler();
    let options = bundle_serve::MiddlewareOptions {
        prefix: Some("/assets".to_string()),
        ..project.options()
    };
    let app = project.app(options, bundler.clone());

    let response = app.oneshot(get("/assets/app.js")).await.unwrap();

    assert_eq!(body_string(response).await, NEXT_BODY);
    assert!(project.output().exists());
}

#[tokio::test]
async fn test_concurrent_requests_build_once() {
    let project = Project::new();
    let bundler = project.bundler();
    *bundler.state.generate_delay.lock().unwrap() = Some(Duration::from_millis(100));
    let app = project.app(project.options(), bundler.clone());

    let (first, second) = tokio::join!(
        app.clone().oneshot(get("/app.js")),
        app.clone().oneshot(get("/app.js"))
    );

    assert_eq!(body_string(first.unwrap()).await, NEXT_BODY);
    assert_eq!(body_string(second.unwrap()).await, NEXT_BODY);
    assert_eq!(bundler.state.generations(), 1);
}

#[tokio::test]
async fn test_dropped_request_still_writes_bundle() {
    let project = Project::new();
    let bundler = project.bundler();
    *bundler.state.generate_delay.lock().unwrap() = Some(Duration::from_millis(100));
    let app = project.app(project.options(), bundler.clone());

    let pending =
        tokio::time::timeout(Duration::from_millis(20), app.oneshot(get("/app.js"))).await;
    assert!(pending.is_err());

    assert!(wait_for_content(&project.output(), BUNDLE_CODE).await);
}

#[tokio::test]
async fn test_serve_always_builds_missing_output_and_serves_it() {
    let project = Project::new();
    let bundler = project.bundler();
    let options = bundle_serve::MiddlewareOptions {
        serve: Some(ServePolicy::Always),
        ..project.options()
    };
    let app = project.app(options, bundler.clone());

    let response = app.oneshot(get("/app.js")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/javascript");
    assert_eq!(response.headers()[header::CACHE_CONTROL], "max-age=60");
    assert_eq!(body_string(response).await, BUNDLE_CODE);
    assert!(wait_for_content(&project.output(), BUNDLE_CODE).await);
    assert_eq!(bundler.state.generations(), 1);
}

#[tokio::test]
async fn test_inline_serve_survives_failed_write() {
    let project = Project::new();
    std::fs::remove_dir(project.root().join("public")).unwrap();
    let bundler = project.bundler();
    let options = bundle_serve::MiddlewareOptions {
        serve: Some(ServePolicy::OnCompile),
        ..project.options()
    };
    let app = project.app(options, bundler.clone());

    let response = app.oneshot(get("/app.js")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert_eq!(body, BUNDLE_CODE);
    assert_ne!(body, NEXT_BODY);

    // Give the detached task time to finish its failed write.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!project.root().join("public").exists());
    assert!(!project.output().exists());
    assert_eq!(bundler.state.generations(), 1);
}
