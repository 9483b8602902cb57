//! Cross-compiles a module at a pinned version in a shared, serialized
//! on-disk workspace, streaming the resulting executable to the caller.
//!
//! Ported behavior-for-behavior from the original `gobinaries` service's
//! `build/build.go`: a single process-wide workspace directory gets a
//! fresh `go.mod`, a pinned dependency requirement, then `go build` with
//! the target `GOOS`/`GOARCH` and a version ldflag.
//!
//! [`Builder::compile`] and [`CompiledArtifact::stream`] are split so a
//! caller streaming the result over HTTP can still return a clean error
//! status if compilation itself fails (spec.md §7), only committing to a
//! response body once an executable actually exists on disk.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use gobin_model::Binary;
use log::{debug, info};
use rand::distributions::Alphanumeric;
use rand::Rng;
use thiserror::Error;
use tokio::io::AsyncWrite;
use tokio::process::Command;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Environment variables propagated into the toolchain subprocess from the
/// surrounding process. Everything else is stripped, matching spec.md
/// §4.4's whitelist.
const ENV_WHITELIST: &[&str] = &["PATH", "HOME", "PWD", "GOPATH", "GOLANG_VERSION", "TMPDIR"];

const MODULE_NAME: &str = "github.com/gobinary";

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("user home dir: {0}")]
    HomeDir(std::io::Error),
    #[error("removing go.mod: {0}")]
    RemoveManifest(std::io::Error),
    #[error("initializing module: {0}")]
    InitModule(#[source] CommandError),
    #[error("adding dependency: {0}")]
    AddDependency(#[source] CommandError),
    #[error("creating tempfile: {0}")]
    TempFile(std::io::Error),
    #[error("building: {0}")]
    Compile(#[source] CommandError),
    #[error("opening build output: {0}")]
    OpenOutput(std::io::Error),
    #[error("stating build output: {0}")]
    StatOutput(std::io::Error),
    #[error("build did not produce an executable")]
    NotExecutable,
    #[error("streaming output: {0}")]
    Stream(std::io::Error),
    #[error("removing tempfile: {0}")]
    RemoveTempFile(std::io::Error),
    #[error("clearing module cache: {0}")]
    ClearCache(#[source] CommandError),
}

/// A subprocess failed to spawn, or exited non-zero; carries captured
/// stderr so the caller can surface a meaningful message.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to spawn {program}: {source}")]
    Spawn { program: String, #[source] source: std::io::Error },
    #[error("process exited with {status}: {stderr}")]
    NonZeroExit { status: ExitStatus, stderr: String },
}

/// Owns the single shared build workspace and serializes access to it.
///
/// The workspace is a process-wide resource (one `go.mod`, one module
/// cache); concurrent writers would corrupt the manifest, so every build
/// holds `lock` from [`Builder::compile`] through the returned
/// [`CompiledArtifact`]'s [`CompiledArtifact::stream`], per spec.md §5.
pub struct Builder {
    workspace_dir: PathBuf,
    lock: Arc<Mutex<()>>,
}

/// A successfully compiled executable, not yet streamed out.
///
/// Holding this keeps the workspace lock held, so the caller can decide
/// how to respond to a compile failure (spec.md §7: no bytes sent yet,
/// so a clean error status is still possible) before ever committing to
/// a response body. Dropping it without calling [`Self::stream`] leaks
/// the temp file; the server always streams or the process is shutting
/// down anyway.
pub struct CompiledArtifact {
    dst: PathBuf,
    _guard: OwnedMutexGuard<()>,
}

impl CompiledArtifact {
    /// Stream the artifact to `out`, then remove it. The workspace lock
    /// is released when this returns, whether or not it succeeds.
    pub async fn stream<W>(self, out: &mut W) -> Result<(), BuildError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        stream_and_remove(&self.dst, out).await
    }
}

impl Builder {
    pub fn new(workspace_dir: PathBuf) -> Self {
        Builder { workspace_dir, lock: Arc::new(Mutex::new(())) }
    }

    /// Reset the manifest, pin the dependency, and compile. Nothing is
    /// written to any caller-visible output during this phase, so a
    /// failure here can still be reported as a clean error response.
    pub async fn compile(&self, bin: &Binary) -> Result<CompiledArtifact, BuildError> {
        let guard = self.lock.clone().lock_owned().await;

        self.reset_manifest().await?;
        self.add_dependency(bin).await?;

        let dst = reserve_temp_path();
        self.compile_to(bin, &dst).await?;

        Ok(CompiledArtifact { dst, _guard: guard })
    }

    /// Remove the downloaded module cache. Run after every successful
    /// build so a long-running service doesn't accumulate unbounded disk.
    pub async fn purge_cache(&self) -> Result<(), BuildError> {
        let mut command = self.go_command(&["clean", "--modcache"]);
        run(&mut command).await.map_err(BuildError::ClearCache)
    }

    async fn reset_manifest(&self) -> Result<(), BuildError> {
        let manifest = self.workspace_dir.join("go.mod");
        match tokio::fs::remove_file(&manifest).await {
            Ok(()) => {},
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {},
            Err(err) => return Err(BuildError::RemoveManifest(err)),
        }

        let mut init = self.go_command(&["mod", "init", MODULE_NAME]);
        run(&mut init).await.map_err(BuildError::InitModule)
    }

    async fn add_dependency(&self, bin: &Binary) -> Result<(), BuildError> {
        let requirement = format!("{}@{}", bin.module, bin.version);
        let mut edit = self.go_command(&["mod", "edit", "-require", &requirement]);
        run(&mut edit).await.map_err(BuildError::AddDependency)
    }

    async fn compile_to(&self, bin: &Binary, dst: &Path) -> Result<(), BuildError> {
        let ldflags = format!("-X main.version={}", bin.version);
        let mut command = self.go_command(&[
            "build",
            "-o",
            &dst.to_string_lossy(),
            "-ldflags",
            &ldflags,
            &bin.path,
        ]);
        command.env("GOOS", &bin.os);
        command.env("GOARCH", &bin.arch);

        run(&mut command).await.map_err(BuildError::Compile)?;

        let metadata =
            tokio::fs::metadata(dst).await.map_err(BuildError::StatOutput)?;
        if !is_executable(&metadata) {
            return Err(BuildError::NotExecutable);
        }

        Ok(())
    }

    /// Build a `go` invocation in the workspace, scoped to the whitelisted
    /// environment plus `GO111MODULE=on` (module support is always forced
    /// on, per spec.md §4.4).
    fn go_command(&self, args: &[&str]) -> Command {
        let mut command = Command::new("go");
        command.args(args).current_dir(&self.workspace_dir).stdin(Stdio::null());
        command.kill_on_drop(true);
        command.env_clear();
        for name in ENV_WHITELIST {
            if let Ok(value) = std::env::var(name) {
                command.env(name, value);
            }
        }
        command.env("GO111MODULE", "on");
        command
    }
}

async fn run(command: &mut Command) -> Result<(), CommandError> {
    let program = format!("{:?}", command.as_std().get_program());
    command.stdout(Stdio::null()).stderr(Stdio::piped());

    let output = command
        .output()
        .await
        .map_err(|source| CommandError::Spawn { program: program.clone(), source })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(CommandError::NonZeroExit { status: output.status, stderr });
    }

    debug!("{program} succeeded");
    Ok(())
}

/// Reserve a unique temp-file path without creating the file.
///
/// The original reference implementation created the file, scheduled its
/// removal, then relied on the build to overwrite it — equivalent but
/// needlessly roundabout (spec.md §9). `go build -o` creates the file
/// itself, so we only need a name the toolchain is guaranteed not to
/// collide on.
fn reserve_temp_path() -> PathBuf {
    let suffix: String =
        rand::thread_rng().sample_iter(&Alphanumeric).take(12).map(char::from).collect();
    std::env::temp_dir().join(format!("gobinary-{suffix}"))
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 == 0o111
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    true
}

async fn stream_and_remove<W>(path: &Path, out: &mut W) -> Result<(), BuildError>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut file = tokio::fs::File::open(path).await.map_err(BuildError::OpenOutput)?;
    tokio::io::copy(&mut file, out).await.map_err(BuildError::Stream)?;
    drop(file);
    tokio::fs::remove_file(path).await.map_err(BuildError::RemoveTempFile)?;
    info!("streamed and removed {}", path.display());
    Ok(())
}
