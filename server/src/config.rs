//! Process-wide configuration loaded from the environment, in the style of
//! `cli/src/config.rs` and `cli/src/bin/phylum.rs`: `anyhow::Context`
//! attached at the point a variable is read, rather than a derive-based
//! deserializer.

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};

/// Which upstream version resolver to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverKind {
    Github,
    Goproxy,
}

/// Which artifact store backend to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Fs,
    S3,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub github_token: Option<String>,
    pub goproxy_url: Option<String>,
    pub resolver_kind: ResolverKind,
    pub store_kind: StoreKind,
    /// Bucket name for `StoreKind::S3`, root directory for `StoreKind::Fs`.
    pub store_location: String,
    pub store_prefix: String,
    pub port: u16,
    /// Externally visible base URL, used to fill the install script's `URL`
    /// template variable.
    pub url: String,
    pub static_dir: PathBuf,
    pub template_dir: PathBuf,
    pub build_workspace_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let resolver_kind = match env_var("RESOLVER_KIND", "github").as_str() {
            "github" => ResolverKind::Github,
            "goproxy" => ResolverKind::Goproxy,
            other => {
                return Err(anyhow!("RESOLVER_KIND must be `github` or `goproxy`, got {other:?}"))
            },
        };

        let store_kind = match env_var("STORE_KIND", "fs").as_str() {
            "fs" => StoreKind::Fs,
            "s3" => StoreKind::S3,
            other => return Err(anyhow!("STORE_KIND must be `fs` or `s3`, got {other:?}")),
        };

        let goproxy_url = std::env::var("GOPROXY_URL").ok();
        if resolver_kind == ResolverKind::Goproxy && goproxy_url.is_none() {
            return Err(anyhow!("GOPROXY_URL is required when RESOLVER_KIND=goproxy"));
        }

        let store_location = match store_kind {
            StoreKind::Fs => env_var("STORE_ROOT", "./data"),
            StoreKind::S3 => std::env::var("STORE_BUCKET")
                .context("STORE_BUCKET is required when STORE_KIND=s3")?,
        };

        let port: u16 =
            env_var("PORT", "3000").parse().context("PORT must be a valid port number")?;

        let build_workspace_dir = match std::env::var("BUILD_WORKSPACE_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => home::home_dir().context("couldn't determine the user's home directory")?,
        };

        Ok(Config {
            github_token: std::env::var("GITHUB_TOKEN").ok(),
            goproxy_url,
            resolver_kind,
            store_kind,
            store_location,
            store_prefix: env_var("STORE_PREFIX", "production"),
            port,
            url: std::env::var("URL").unwrap_or_else(|_| format!("http://127.0.0.1:{port}")),
            static_dir: PathBuf::from(env_var("STATIC_DIR", "static")),
            template_dir: PathBuf::from(env_var("TEMPLATE_DIR", "templates")),
            build_workspace_dir,
        })
    }
}

fn env_var(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}
