//! End-to-end route tests, in the style of `cli/tests/integration.rs`:
//! drive the router directly with `tower::ServiceExt::oneshot` rather than
//! binding a real socket.

use std::fs;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use bytes::Bytes;
use gobin_builder::Builder;
use gobin_model::Binary;
use gobin_resolver::{RepositoryCoordinate, Resolver, ResolverError};
use gobin_server::{app, AppState};
use gobin_store::{FsStore, Store};
use gobin_templates::Renderer;
use http_body_util::BodyExt;
use tower::ServiceExt;

/// A resolver whose answer is fixed at construction time, so tests never
/// touch the network.
struct FixedResolver(Result<&'static str, ResolverError>);

#[async_trait]
impl Resolver for FixedResolver {
    async fn resolve(&self, _coord: &RepositoryCoordinate) -> Result<String, ResolverError> {
        match &self.0 {
            Ok(version) => Ok(version.to_string()),
            Err(ResolverError::NoVersions) => Err(ResolverError::NoVersions),
            Err(ResolverError::NoVersionMatch) => Err(ResolverError::NoVersionMatch),
            Err(ResolverError::Timeout) => Err(ResolverError::Timeout),
            Err(ResolverError::Transport(_)) => Err(ResolverError::Timeout),
        }
    }
}

fn test_state(resolver: FixedResolver) -> (Arc<AppState>, tempfile::TempDir) {
    let root = tempfile::tempdir().unwrap();
    let template_dir = root.path().join("templates");
    fs::create_dir_all(&template_dir).unwrap();
    fs::write(
        template_dir.join("install.sh"),
        "echo installing {{ Package }} {{ Version }} from {{ URL }}",
    )
    .unwrap();
    fs::write(template_dir.join("install.ps1"), "Write-Host installing {{ Package }}").unwrap();
    fs::write(template_dir.join("error.sh"), "echo {{ Message }}").unwrap();

    let static_dir = root.path().join("static");
    fs::create_dir_all(&static_dir).unwrap();
    fs::write(static_dir.join("hello.txt"), "hello static world").unwrap();

    let store = FsStore::new(root.path().join("store")).unwrap();
    let builder = Builder::new(root.path().join("workspace"));

    let state = Arc::new(AppState {
        resolver: Arc::new(resolver),
        store: Arc::new(store),
        builder: Arc::new(builder),
        templates: Arc::new(Renderer::new(template_dir)),
        base_url: "https://gobin.example".to_string(),
        static_dir,
        store_prefix: "production".to_string(),
    });

    // Returned alongside the state: dropping it removes the directory, so
    // callers must keep it alive for the lifetime of the test.
    (state, root)
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn health_check_returns_ok() {
    let (state, _root) = test_state(FixedResolver(Ok("v1.0.0")));
    let router = app::build_router(state);

    let response = router
        .oneshot(Request::builder().uri("/_health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, ":)");
}

#[tokio::test]
async fn non_get_method_is_rejected() {
    let (state, _root) = test_state(FixedResolver(Ok("v1.0.0")));
    let router = app::build_router(state);

    let response = router
        .oneshot(
            Request::builder().method(Method::POST).uri("/_health").body(Body::empty()).unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn binary_route_requires_query_parameters() {
    let (state, _root) = test_state(FixedResolver(Ok("v1.0.0")));
    let router = app::build_router(state);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/binary/github.com/tj/tool?arch=amd64&version=1.0.0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(response).await.contains("os"));
}

#[tokio::test]
async fn binary_route_serves_from_store_without_building() {
    let (state, _root) = test_state(FixedResolver(Ok("v1.0.0")));

    let bin = Binary {
        path: "github.com/tj/tool".to_string(),
        module: "github.com/tj/tool".to_string(),
        version: "1.0.0".to_string(),
        os: "linux".to_string(),
        arch: "amd64".to_string(),
    };
    let key = bin.store_key(&state.store_prefix);
    state.store.put(&key, Bytes::from_static(b"prebuilt binary bytes")).await.unwrap();

    let router = app::build_router(state);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/binary/github.com/tj/tool?os=linux&arch=amd64&version=1.0.0")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/octet-stream"
    );
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "max-age=31536000, immutable"
    );
    assert_eq!(body_string(response).await, "prebuilt binary bytes");
    // No builder workspace directory is ever created, since the store hit
    // short-circuits before `Builder::compile` runs.
}

#[tokio::test]
async fn install_script_rejects_too_few_segments() {
    let (state, _root) = test_state(FixedResolver(Ok("v1.0.0")));
    let router = app::build_router(state);

    let response = router
        .oneshot(Request::builder().uri("/tj").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn install_script_renders_on_success() {
    let (state, _root) = test_state(FixedResolver(Ok("v1.8.0")));
    let router = app::build_router(state);

    let response = router
        .oneshot(Request::builder().uri("/tj/tool").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "application/x-sh"
    );
    let body = body_string(response).await;
    assert!(body.contains("github.com/tj/tool"));
    assert!(body.contains("v1.8.0"));
}

#[tokio::test]
async fn install_script_renders_error_body_on_no_versions() {
    let (state, _root) = test_state(FixedResolver(Err(ResolverError::NoVersions)));
    let router = app::build_router(state);

    let response = router
        .oneshot(Request::builder().uri("/tj/tool").body(Body::empty()).unwrap())
        .await
        .unwrap();

    // Resolver failures still render a 200 shell script, not an HTTP error,
    // so a piped `curl | sh` always gets readable output.
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("Repository has no tags"));
}

#[tokio::test]
async fn static_file_is_served_before_falling_back_to_script() {
    let (state, _root) = test_state(FixedResolver(Ok("v1.0.0")));
    let router = app::build_router(state);

    let response = router
        .oneshot(Request::builder().uri("/hello.txt").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "hello static world");
}

#[tokio::test]
async fn major_version_two_rewrites_package_path() {
    let (state, _root) = test_state(FixedResolver(Ok("v2.3.0")));
    let router = app::build_router(state);

    let response = router
        .oneshot(Request::builder().uri("/tj/tool").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("github.com/tj/tool/v2"));
}
