//! The on-demand binary service's HTTP front end: wires a [`Resolver`],
//! [`Store`], [`Builder`], and [`Renderer`] chosen by [`Config`] into an
//! [`axum::Router`].

pub mod app;
pub mod config;
pub mod error;
pub mod handlers;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use gobin_builder::Builder;
use gobin_resolver::{ModuleProxyResolver, Resolver, VcsHostResolver};
use gobin_store::{FsStore, S3Store, Store};
use gobin_templates::Renderer;

pub use config::Config;
use config::{ResolverKind, StoreKind};

/// Shared, immutable-after-construction state handed to every handler.
pub struct AppState {
    pub resolver: Arc<dyn Resolver>,
    pub store: Arc<dyn Store>,
    pub builder: Arc<Builder>,
    pub templates: Arc<Renderer>,
    pub base_url: String,
    pub static_dir: PathBuf,
    pub store_prefix: String,
}

impl AppState {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(AppState {
            resolver: build_resolver(config)?,
            store: build_store(config)?,
            builder: Arc::new(Builder::new(config.build_workspace_dir.clone())),
            templates: Arc::new(Renderer::new(config.template_dir.clone())),
            base_url: config.url.clone(),
            static_dir: config.static_dir.clone(),
            store_prefix: config.store_prefix.clone(),
        })
    }
}

fn build_resolver(config: &Config) -> Result<Arc<dyn Resolver>> {
    match config.resolver_kind {
        ResolverKind::Github => {
            let resolver = VcsHostResolver::new(config.github_token.clone())
                .context("constructing GitHub API client")?;
            Ok(Arc::new(resolver))
        },
        ResolverKind::Goproxy => {
            let url = config
                .goproxy_url
                .clone()
                .context("GOPROXY_URL is required when RESOLVER_KIND=goproxy")?;
            Ok(Arc::new(ModuleProxyResolver::new(url)))
        },
    }
}

fn build_store(config: &Config) -> Result<Arc<dyn Store>> {
    match config.store_kind {
        StoreKind::Fs => {
            let store = FsStore::new(&config.store_location)
                .context("constructing local filesystem store")?;
            Ok(Arc::new(store))
        },
        StoreKind::S3 => {
            let store = S3Store::new(&config.store_location, None)
                .context("constructing S3 store client")?;
            Ok(Arc::new(store))
        },
    }
}
