//! Content-addressed blob storage for compiled binaries.
//!
//! The original `gobinaries` service shipped exactly one backend (Google
//! Cloud Storage, `storage/google.go`); per spec.md §1 the backend is an
//! external collaborator here, so [`Store`] is a trait with two concrete
//! implementations: [`FsStore`] (local filesystem, used for tests and
//! single-node deployments) and [`S3Store`] (built on the `object_store`
//! crate, which speaks S3, GCS, and Azure behind one API).
//!
//! The key scheme — `{prefix}/{path-with-slashes-as-dashes}/{version}-{os}-{arch}`
//! — is the ABI contract of the store (spec.md §4.5); both backends key
//! purely off the string a caller passes in, via [`gobin_model::Binary::store_key`].

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use thiserror::Error;

/// A chunked byte stream returned by [`Store::get`]. Matches spec.md
/// §4.5's "readable stream" — the caller drains it and it closes on drop.
pub type ObjectStream = Pin<Box<dyn Stream<Item = Result<Bytes, StoreError>> + Send>>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no object found for this key")]
    ObjectNotFound,
    #[error("store transport error: {0}")]
    Transport(#[from] object_store::Error),
}

/// Abstract content-addressed blob store.
#[async_trait]
pub trait Store: Send + Sync {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), StoreError>;
    async fn get(&self, key: &str) -> Result<ObjectStream, StoreError>;
}

fn wrap_stream(
    inner: impl Stream<Item = object_store::Result<Bytes>> + Send + 'static,
) -> ObjectStream {
    Box::pin(inner.map(|chunk| chunk.map_err(StoreError::from)))
}

fn not_found_or(err: object_store::Error) -> StoreError {
    match &err {
        object_store::Error::NotFound { .. } => StoreError::ObjectNotFound,
        _ => StoreError::Transport(err),
    }
}

/// Local-filesystem backend, rooted at a configured directory.
pub struct FsStore {
    inner: Arc<LocalFileSystem>,
}

impl FsStore {
    pub fn new(root: impl AsRef<std::path::Path>) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&root).map_err(|err| {
            StoreError::Transport(object_store::Error::Generic {
                store: "LocalFileSystem",
                source: Box::new(err),
            })
        })?;
        let inner = LocalFileSystem::new_with_prefix(root)?;
        Ok(FsStore { inner: Arc::new(inner) })
    }
}

#[async_trait]
impl Store for FsStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), StoreError> {
        let path = ObjectPath::from(key);
        self.inner.put(&path, data.into()).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<ObjectStream, StoreError> {
        let path = ObjectPath::from(key);
        let result = self.inner.get(&path).await.map_err(not_found_or)?;
        Ok(wrap_stream(result.into_stream()))
    }
}

/// S3-compatible backend (also usable for GCS/Azure via `object_store`'s
/// own builders; S3 is wired up here since it is the most common
/// self-hosted target).
pub struct S3Store {
    inner: Arc<dyn ObjectStore>,
}

impl S3Store {
    pub fn new(bucket: &str, region: Option<&str>) -> Result<Self, StoreError> {
        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(region) = region {
            builder = builder.with_region(region);
        }
        let inner = builder.build()?;
        Ok(S3Store { inner: Arc::new(inner) })
    }
}

#[async_trait]
impl Store for S3Store {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), StoreError> {
        let path = ObjectPath::from(key);
        self.inner.put(&path, data.into()).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<ObjectStream, StoreError> {
        let path = ObjectPath::from(key);
        let result = self.inner.get(&path).await.map_err(not_found_or)?;
        Ok(wrap_stream(result.into_stream()))
    }
}

#[cfg(test)]
mod tests {
    use futures_util::TryStreamExt;

    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path()).unwrap();

        let key = "production/github.com-tj-tool/v1.0.0-linux-amd64";
        store.put(key, Bytes::from_static(b"binary bytes")).await.unwrap();

        let stream = store.get(key).await.unwrap();
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        let body: Vec<u8> = chunks.into_iter().flatten().collect();
        assert_eq!(body, b"binary bytes");
    }

    #[tokio::test]
    async fn get_missing_key_is_object_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path()).unwrap();

        let err = store.get("missing/key").await.unwrap_err();
        assert!(matches!(err, StoreError::ObjectNotFound));
    }
}
