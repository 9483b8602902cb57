//! The `Binary` type shared by the builder, the artifact store, and the
//! HTTP front end — the cache key and build input for one request.
//!
//! Mirrors `gobinaries.Binary` in the original service, which the `build`
//! and `storage` packages both imported from the root package.

/// The details of one package binary: what to build/fetch, and for what
/// platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binary {
    /// Importable package path of the executable, e.g.
    /// `github.com/acme/tool/cmd/tool`.
    pub path: String,
    /// Enclosing module root, e.g. `github.com/acme/tool`. Not part of the
    /// store cache key — see [`Binary::store_key`].
    pub module: String,
    /// Concrete released version tag, previously emitted by a resolver.
    pub version: String,
    /// Target operating system (`GOOS`-shaped: `linux`, `darwin`, `windows`, ...).
    pub os: String,
    /// Target CPU architecture (`GOARCH`-shaped: `amd64`, `arm64`, ...).
    pub arch: String,
}

impl Binary {
    /// The store key is a pure function of `(path, version, os, arch)` —
    /// `module` never participates, per spec.md §3's invariant.
    pub fn store_key(&self, prefix: &str) -> String {
        let flattened = self.path.replace('/', "-");
        format!("{prefix}/{flattened}/{}-{}-{}", self.version, self.os, self.arch)
    }
}
