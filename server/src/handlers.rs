//! Route handlers, ported behavior-for-behavior from `server/server.go`'s
//! `getScript` and `getBinary`.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};
use std::task::{Context as TaskContext, Poll};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::Response;
use bytes::Bytes;
use gobin_model::Binary;
use gobin_resolver::{RepositoryCoordinate, ResolverError};
use gobin_templates::InstallVars;
use serde::Deserialize;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::GobinError;
use crate::AppState;

const STORE_DEADLINE: Duration = Duration::from_secs(15);

pub async fn health() -> &'static str {
    ":)"
}

#[derive(Deserialize, Default)]
pub struct BinaryQuery {
    #[serde(default)]
    os: Option<String>,
    #[serde(default)]
    arch: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

/// `GET /binary/<pkg>?os=&arch=&version=`.
pub async fn binary(
    State(state): State<Arc<AppState>>,
    Path(pkg): Path<String>,
    Query(query): Query<BinaryQuery>,
    headers: HeaderMap,
) -> Response {
    let pkg = pkg.trim_start_matches('/').to_string();
    if pkg.is_empty() {
        return GobinError::bad_request("package path required");
    }

    let ip = client_ip(&headers);

    let os = match non_empty(query.os) {
        Some(os) => os,
        None => return GobinError::bad_request("`os` parameter required"),
    };
    let arch = match non_empty(query.arch) {
        Some(arch) => arch,
        None => return GobinError::bad_request("`arch` parameter required"),
    };
    let version = match non_empty(query.version) {
        Some(version) => version,
        None => return GobinError::bad_request("`version` parameter required"),
    };

    let module = gobin_pkgpath::parse(&pkg).module;
    let bin = Binary { path: pkg.clone(), module: module.clone(), version, os, arch };
    let key = bin.store_key(&state.store_prefix);

    log::info!(
        "package={pkg} module={module} os={} arch={} version={} ip={ip} requesting binary",
        bin.os,
        bin.arch,
        bin.version
    );

    // Any storage error (including a deadline elapsing) falls through to a
    // build, mirroring the original's `err == nil` check — only a clean hit
    // short-circuits.
    if let Ok(Ok(stream)) = tokio::time::timeout(STORE_DEADLINE, state.store.get(&key)).await {
        log::info!("key={key} serving from storage");
        return immutable_response(Body::from_stream(stream));
    }

    log::info!("key={key} building package");
    let start = Instant::now();
    let artifact = match state.builder.compile(&bin).await {
        Ok(artifact) => artifact,
        Err(err) => {
            log::error!("key={key} build failed: {err}");
            return GobinError::internal();
        },
    };

    let (tx, rx) = mpsc::unbounded_channel::<io::Result<Bytes>>();
    let buffer = Arc::new(StdMutex::new(Vec::new()));
    let mut tee = TeeWriter { tx, buffer: buffer.clone() };

    let state_for_task = state.clone();
    let key_for_task = key.clone();
    tokio::spawn(async move {
        match artifact.stream(&mut tee).await {
            Ok(()) => {
                log::info!(
                    "key={key_for_task} built and streamed in {}ms",
                    start.elapsed().as_millis()
                );
                let data = std::mem::take(&mut *buffer.lock().unwrap());

                let store_start = Instant::now();
                match state_for_task.store.put(&key_for_task, Bytes::from(data)).await {
                    Ok(()) => log::info!(
                        "key={key_for_task} stored in {}ms",
                        store_start.elapsed().as_millis()
                    ),
                    Err(err) => log::error!("key={key_for_task} storing failed: {err}"),
                }

                let purge_start = Instant::now();
                match state_for_task.builder.purge_cache().await {
                    Ok(()) => log::info!(
                        "key={key_for_task} cleared module cache in {}ms",
                        purge_start.elapsed().as_millis()
                    ),
                    Err(err) => log::error!("key={key_for_task} clearing module cache failed: {err}"),
                }
            },
            Err(err) => log::error!("key={key_for_task} streaming build output failed: {err}"),
        }
    });

    immutable_response(Body::from_stream(UnboundedReceiverStream::new(rx)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// `CF-Connecting-IP`, set by the reference deployment's Cloudflare front
/// door. Logged as-is for parity with the original's `log.WithFields`; not
/// used for any access control.
fn client_ip(headers: &HeaderMap) -> &str {
    headers
        .get("CF-Connecting-IP")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

fn immutable_response(body: Body) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CACHE_CONTROL, "max-age=31536000, immutable")
        .body(body)
        .expect("response with a fixed set of valid headers")
}

/// Writes to the HTTP response body and an in-memory buffer at once, so the
/// buffer can be uploaded to the store after a successful stream without
/// re-reading the artifact from disk.
struct TeeWriter {
    tx: mpsc::UnboundedSender<io::Result<Bytes>>,
    buffer: Arc<StdMutex<Vec<u8>>>,
}

impl AsyncWrite for TeeWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut TaskContext<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.buffer.lock().unwrap().extend_from_slice(buf);
        // A send error just means the client disconnected; the build still
        // completes and the artifact is still worth caching.
        let _ = this.tx.send(Ok(Bytes::copy_from_slice(buf)));
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut TaskContext<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Static file fallback, then the install-script route.
pub async fn catch_all(State(state): State<Arc<AppState>>, uri: Uri, headers: HeaderMap) -> Response {
    let path = uri.path();
    let normalized = if path == "/" { "/index.html" } else { path };

    let candidate = state.static_dir.join(normalized.trim_start_matches('/'));
    if let Ok(metadata) = tokio::fs::metadata(&candidate).await {
        if metadata.is_file() {
            return match tokio::fs::read(&candidate).await {
                Ok(bytes) => Response::builder()
                    .status(StatusCode::OK)
                    .header(header::CONTENT_TYPE, "application/octet-stream")
                    .body(Body::from(bytes))
                    .expect("response with a fixed set of valid headers"),
                Err(err) => {
                    log::error!("reading static file {}: {err}", candidate.display());
                    GobinError::internal()
                },
            };
        }
    }

    render_script(&state, path, &headers).await
}

async fn render_script(state: &AppState, path: &str, headers: &HeaderMap) -> Response {
    let trimmed = path.trim_start_matches('/');
    let parsed = gobin_pkgpath::parse(trimmed);

    if !parsed.has_enough_segments() {
        return GobinError::bad_request("package path must have at least an owner and a repo");
    }

    let segments: Vec<&str> = parsed.pkg.split('/').collect();
    let owner = segments[1];
    let repo = segments[2];
    let ip = client_ip(headers);

    log::info!(
        "package={} module={} owner={owner} repo={repo} binary={} version={} ip={ip} resolving version",
        parsed.pkg,
        parsed.module,
        parsed.bin,
        parsed.version
    );

    let coord = RepositoryCoordinate {
        location: "github.com".to_string(),
        owner: owner.to_string(),
        project: repo.to_string(),
        version_expr: parsed.version.clone(),
    };

    let resolved = match state.resolver.resolve(&coord).await {
        Ok(resolved) => resolved,
        Err(ResolverError::NoVersions) => {
            log::warn!("owner={owner} repo={repo} no tags");
            return render_error_script(state, "Repository has no tags");
        },
        Err(ResolverError::NoVersionMatch) => {
            log::warn!("owner={owner} repo={repo} no tag matches {}", parsed.version);
            return render_error_script(
                state,
                "Repository has no tags matching the requested version",
            );
        },
        Err(err) => {
            log::error!("owner={owner} repo={repo} error resolving: {err}");
            return render_error_script(state, "Failed to resolve requested version");
        },
    };

    log::info!("package={} resolved to {resolved}", parsed.pkg);

    // Go-module versioned-import convention: a major version of 2 or above
    // lives at an extra `/v{major}` path segment after the module root.
    let mut pkg = parsed.pkg.clone();
    if let Ok(version) = gobin_version::Version::parse(&resolved) {
        if version.major > 1 {
            let segments: Vec<&str> = pkg.split('/').collect();
            if segments.len() >= 3 {
                let module = segments[..3].join("/");
                let nested = segments[3..].join("/");
                pkg = if nested.is_empty() {
                    format!("{module}/v{}", version.major)
                } else {
                    format!("{module}/v{}/{nested}", version.major)
                };
            }
        }
    }

    let vars = InstallVars {
        url: state.base_url.clone(),
        package: pkg,
        binary: parsed.bin,
        original_version: parsed.version,
        version: resolved,
    };

    let user_agent =
        headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok()).unwrap_or("").to_uppercase();
    let is_powershell = user_agent.contains("POWERSHELL") && user_agent.contains("WINDOWS");

    match state.templates.render_install(&vars, is_powershell) {
        Ok(body) => script_response(body),
        Err(err) => {
            log::error!("rendering install script: {err}");
            GobinError::internal()
        },
    }
}

fn render_error_script(state: &AppState, message: &str) -> Response {
    match state.templates.render_error(message) {
        Ok(body) => script_response(body),
        Err(err) => {
            log::error!("rendering error script: {err}");
            GobinError::internal()
        },
    }
}

fn script_response(body: String) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/x-sh")
        .header(header::CACHE_CONTROL, "no-store")
        .body(Body::from(body))
        .expect("response with a fixed set of valid headers")
}
