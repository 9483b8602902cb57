//! Package-path parsing: turn whatever a user typed after the service's
//! base URL into `(pkg, module, version, bin)`.
//!
//! Ported field-for-field from the original `gobinaries` service's
//! `server/util.go` (`parsePackage` / `normalizePackage`).

/// The result of normalizing a package expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPackage {
    /// Canonical package path, always prefixed with `github.com/`.
    pub pkg: String,
    /// Enclosing module root (first three `/`-segments of `pkg`), empty if
    /// `pkg` has fewer than three segments.
    pub module: String,
    /// The version expression requested, or `"master"` if none was given.
    pub version: String,
    /// The final path segment, used as the installed binary's name.
    pub bin: String,
}

/// Parse a package expression such as `"tj/staticgen@1.x"`,
/// `"github.com/tj/staticgen"`, or `"https://github.com/tj/staticgen@v1.0.0"`.
///
/// Total over any non-empty input: there is no error case, matching the
/// original, whose caller instead rejects the result based on segment count
/// (see [`ParsedPackage::has_enough_segments`]).
pub fn parse(path: &str) -> ParsedPackage {
    let (left, version) = match path.split_once('@') {
        Some((left, version)) => (left, version.to_string()),
        None => (path, "master".to_string()),
    };

    let pkg = normalize(left);

    let segments: Vec<&str> = pkg.split('/').collect();
    let module = if segments.len() >= 3 { segments[..3].join("/") } else { String::new() };
    let bin = segments.last().copied().unwrap_or("").to_string();

    ParsedPackage { pkg, module, version, bin }
}

/// Normalize a package path so that `github.com/` is always present and
/// never doubled, implying `https://github.com/` when the caller omits it.
fn normalize(pkg: &str) -> String {
    let pkg = pkg.strip_prefix("https://").unwrap_or(pkg);
    let pkg = pkg.strip_prefix("github.com/").unwrap_or(pkg);
    format!("github.com/{pkg}")
}

impl ParsedPackage {
    /// The HTTP front end rejects requests whose package has fewer than
    /// three `/`-segments before accepting them further (spec.md §4.2).
    pub fn has_enough_segments(&self) -> bool {
        self.pkg.split('/').count() >= 3
    }
}
