//! Renders install scripts from a small set of named templates
//! (`install.sh`, `install.ps1`, `error.sh`).
//!
//! The templates themselves are an external collaborator (spec.md §1
//! scopes them out of this service); this crate only owns parsing them
//! once and filling in the five variables from spec.md §6.
//!
//! Parsing is lazy and memoized for the process lifetime, matching the
//! original's `sync.Once`-guarded `template.ParseGlob` in `server/server.go`
//! (spec.md §5, "One-time initialization").

use std::path::PathBuf;
use std::sync::OnceLock;

use tera::{Context, Tera};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("failed to parse templates: {0}")]
    Parse(String),
    #[error("failed to render template {name:?}: {reason}")]
    Render { name: &'static str, reason: String },
}

/// The five template variables named in spec.md §6.
#[derive(Debug, Clone)]
pub struct InstallVars {
    pub url: String,
    pub package: String,
    pub binary: String,
    pub original_version: String,
    pub version: String,
}

/// Loads and renders templates out of a configured directory.
pub struct Renderer {
    template_dir: PathBuf,
    tera: OnceLock<Result<Tera, String>>,
}

impl Renderer {
    pub fn new(template_dir: PathBuf) -> Self {
        Renderer { template_dir, tera: OnceLock::new() }
    }

    fn tera(&self) -> Result<&Tera, TemplateError> {
        let result = self.tera.get_or_init(|| {
            let pattern = format!("{}/*", self.template_dir.display());
            Tera::new(&pattern).map_err(|err| err.to_string())
        });
        result.as_ref().map_err(|msg| TemplateError::Parse(msg.clone()))
    }

    /// Render `install.sh` or `install.ps1`, selected by the caller based on
    /// the requester's user-agent (spec.md §4.6).
    pub fn render_install(
        &self,
        vars: &InstallVars,
        is_powershell: bool,
    ) -> Result<String, TemplateError> {
        let name = if is_powershell { "install.ps1" } else { "install.sh" };
        let tera = self.tera()?;

        let mut ctx = Context::new();
        ctx.insert("URL", &vars.url);
        ctx.insert("Package", &vars.package);
        ctx.insert("Binary", &vars.binary);
        ctx.insert("OriginalVersion", &vars.original_version);
        ctx.insert("Version", &vars.version);

        tera.render(name, &ctx)
            .map_err(|err| TemplateError::Render { name, reason: err.to_string() })
    }

    /// Render `error.sh`, the shell-friendly error body spec.md §7 requires
    /// for resolver failures (HTTP 200 with an `echo` of the message).
    pub fn render_error(&self, message: &str) -> Result<String, TemplateError> {
        let tera = self.tera()?;
        let mut ctx = Context::new();
        ctx.insert("Message", message);
        tera.render("error.sh", &ctx)
            .map_err(|err| TemplateError::Render { name: "error.sh", reason: err.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn fixture_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("install.sh"),
            "echo installing {{ Package }} {{ Version }} from {{ URL }} as {{ Binary }} (was {{ OriginalVersion }})",
        )
        .unwrap();
        fs::write(dir.path().join("install.ps1"), "Write-Host installing {{ Package }}").unwrap();
        fs::write(dir.path().join("error.sh"), "echo {{ Message }}").unwrap();
        dir
    }

    #[test]
    fn renders_install_sh_by_default() {
        let dir = fixture_dir();
        let renderer = Renderer::new(dir.path().to_path_buf());
        let vars = InstallVars {
            url: "https://gobin.example".into(),
            package: "github.com/tj/tool".into(),
            binary: "tool".into(),
            original_version: "1.x".into(),
            version: "v1.8.0".into(),
        };
        let out = renderer.render_install(&vars, false).unwrap();
        assert!(out.contains("github.com/tj/tool"));
        assert!(out.contains("v1.8.0"));
    }

    #[test]
    fn renders_powershell_when_requested() {
        let dir = fixture_dir();
        let renderer = Renderer::new(dir.path().to_path_buf());
        let vars = InstallVars {
            url: "https://gobin.example".into(),
            package: "github.com/tj/tool".into(),
            binary: "tool".into(),
            original_version: "1.x".into(),
            version: "v1.8.0".into(),
        };
        let out = renderer.render_install(&vars, true).unwrap();
        assert!(out.contains("Write-Host"));
    }

    #[test]
    fn renders_error_template_with_message() {
        let dir = fixture_dir();
        let renderer = Renderer::new(dir.path().to_path_buf());
        let out = renderer.render_error("Repository has no tags").unwrap();
        assert!(out.contains("Repository has no tags"));
    }

    #[test]
    fn parsing_is_memoized_across_calls() {
        let dir = fixture_dir();
        let renderer = Renderer::new(dir.path().to_path_buf());
        assert!(renderer.render_error("first").is_ok());
        // Removing the directory after the first parse must not affect
        // subsequent renders: Tera is parsed once and memoized.
        fs::remove_dir_all(dir.path()).unwrap();
        assert!(renderer.render_error("second").is_ok());
    }
}
