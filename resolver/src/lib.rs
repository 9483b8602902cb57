//! Resolves a [`RepositoryCoordinate`] + version expression to a concrete
//! released version tag.
//!
//! Two implementations exist, mirroring the original `gobinaries`
//! service's `resolver/github.go` and `resolver/goproxy.go`:
//! [`VcsHostResolver`] talks to a paginated host tag-listing API (GitHub's),
//! [`ModuleProxyResolver`] talks to a Go module proxy's `@v/list` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use gobin_version::{Range, Version, Versions};
use serde::Deserialize;
use thiserror::Error;

/// Where to resolve a version from: a host, owner, project, and the raw
/// version expression the user typed (e.g. `"1.x"` or `"master"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryCoordinate {
    pub location: String,
    pub owner: String,
    pub project: String,
    pub version_expr: String,
}

/// Errors surfaced by a [`Resolver`].
#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("no versions defined")]
    NoVersions,
    #[error("no matching version")]
    NoVersionMatch,
    #[error("resolver request timed out")]
    Timeout,
    #[error("listing tags: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Something that can turn a [`RepositoryCoordinate`] into a concrete,
/// previously-released version string.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, coord: &RepositoryCoordinate) -> Result<String, ResolverError>;
}

const PER_PAGE: u32 = 100;
const RESOLVE_DEADLINE: Duration = Duration::from_secs(10);

/// Resolves versions by paginating a version-control host's tag-listing API
/// (GitHub's `GET /repos/{owner}/{repo}/tags`).
pub struct VcsHostResolver {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct Tag {
    name: String,
}

impl VcsHostResolver {
    /// Build a resolver authenticating with a single service-wide token,
    /// matching spec.md's "single service-wide credential" (§1).
    pub fn new(token: Option<String>) -> Result<Self, reqwest::Error> {
        Self::with_base_url("https://api.github.com".to_string(), token)
    }

    pub fn with_base_url(base_url: String, token: Option<String>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder().user_agent("gobin");
        if let Some(token) = token {
            let mut headers = reqwest::header::HeaderMap::new();
            let mut value = reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
                .expect("token must be a valid header value");
            value.set_sensitive(true);
            headers.insert(reqwest::header::AUTHORIZATION, value);
            builder = builder.default_headers(headers);
        }
        Ok(VcsHostResolver { client: builder.build()?, base_url })
    }

    async fn list_tags(&self, owner: &str, project: &str) -> Result<Vec<String>, ResolverError> {
        let mut tags = Vec::new();
        let mut page = 1;

        loop {
            let url = format!(
                "{}/repos/{owner}/{project}/tags?per_page={PER_PAGE}&page={page}",
                self.base_url
            );
            let response = self.client.get(&url).send().await?.error_for_status()?;
            let batch: Vec<Tag> = response.json().await?;

            if batch.is_empty() {
                break;
            }

            tags.extend(batch.into_iter().map(|t| t.name));
            page += 1;
        }

        Ok(tags)
    }
}

#[async_trait]
impl Resolver for VcsHostResolver {
    async fn resolve(&self, coord: &RepositoryCoordinate) -> Result<String, ResolverError> {
        let result = tokio::time::timeout(
            RESOLVE_DEADLINE,
            self.list_tags(&coord.owner, &coord.project),
        )
        .await;
        let tags = match result {
            Ok(tags) => tags?,
            Err(_) => return Err(ResolverError::Timeout),
        };

        if tags.is_empty() {
            return Err(ResolverError::NoVersions);
        }

        // Discard tags that don't parse as versions, preserving host order.
        let candidates: Vec<Version> =
            tags.iter().filter_map(|t| Version::parse(t).ok()).collect();

        if candidates.is_empty() {
            return Err(ResolverError::NoVersions);
        }

        // `master` is a special case: the first tag in host-returned order,
        // not necessarily the highest semantic version. Preserved from the
        // original rather than "fixed" to sort (spec.md §9 open question).
        if coord.version_expr == "master" {
            return Ok(candidates[0].to_string());
        }

        let range = Range::parse(&coord.version_expr);
        candidates
            .iter()
            .find(|v| range.matches(v))
            .map(|v| v.to_string())
            .ok_or(ResolverError::NoVersionMatch)
    }
}

/// Resolves versions from a Go module proxy's `@v/list` endpoint.
pub struct ModuleProxyResolver {
    client: reqwest::Client,
    proxy_url: String,
}

impl ModuleProxyResolver {
    pub fn new(proxy_url: String) -> Self {
        ModuleProxyResolver { client: reqwest::Client::new(), proxy_url }
    }
}

#[async_trait]
impl Resolver for ModuleProxyResolver {
    async fn resolve(&self, coord: &RepositoryCoordinate) -> Result<String, ResolverError> {
        let url = format!(
            "{}/{}/{}/{}/@v/list",
            self.proxy_url, coord.location, coord.owner, coord.project
        );

        let fetch = async {
            let body = self.client.get(&url).send().await?.error_for_status()?.text().await?;
            Ok::<_, reqwest::Error>(body)
        };
        let body = match tokio::time::timeout(RESOLVE_DEADLINE, fetch).await {
            Ok(body) => body?,
            Err(_) => return Err(ResolverError::Timeout),
        };

        let mut versions =
            Versions::new(body.lines().filter_map(|line| Version::parse(line).ok()).collect());

        if versions.0.is_empty() {
            return Err(ResolverError::NoVersions);
        }

        versions.sort_descending();

        let range = Range::parse(&coord.version_expr);
        versions
            .0
            .iter()
            .find(|v| range.matches(v))
            .map(|v| v.to_string())
            .ok_or(ResolverError::NoVersionMatch)
    }
}
