//! Spawn policy: shell whitelist, boundary containment, env sanitization
//!
//! Every check here runs before the PTY is touched, and every rejection
//! carries a stable wire code so the bridge can surface it as a typed error.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use splitmux_protocol::ErrorCode;
use tracing::{debug, warn};

/// A policy rejection, carried back over the wire as an `error` frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRejection {
    pub code: ErrorCode,
    pub message: String,
}

impl PolicyRejection {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Per-platform shell allow-list
///
/// A table injected at startup rather than `cfg` branches scattered through
/// the spawn path, so both tables stay testable on any platform.
#[derive(Debug, Clone)]
pub struct ShellPolicy {
    /// Allowed shell basenames, lowercase, without `.exe`
    allowed: &'static [&'static str],
    /// Treat a trailing `.exe` on the requested shell as insignificant
    strip_exe: bool,
}

impl ShellPolicy {
    pub const POSIX: ShellPolicy = ShellPolicy {
        allowed: &["bash", "zsh", "sh"],
        strip_exe: false,
    };

    pub const WINDOWS: ShellPolicy = ShellPolicy {
        allowed: &["powershell", "pwsh", "cmd"],
        strip_exe: true,
    };

    #[cfg(windows)]
    pub fn native() -> Self {
        Self::WINDOWS
    }

    #[cfg(not(windows))]
    pub fn native() -> Self {
        Self::POSIX
    }

    /// Whitelist check: the shell matches by full path, bare name, or path
    /// suffix, case-insensitively. Anything else is arbitrary-binary
    /// execution and gets refused.
    pub fn check(&self, shell: &str) -> Result<(), PolicyRejection> {
        let lowered = shell.to_lowercase();
        let basename = lowered
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(lowered.as_str());
        let basename = if self.strip_exe {
            basename.strip_suffix(".exe").unwrap_or(basename)
        } else {
            basename
        };

        if self.allowed.contains(&basename) {
            Ok(())
        } else {
            Err(PolicyRejection::new(
                ErrorCode::ShellNotAllowed,
                format!("Shell not in allow-list: {shell}"),
            ))
        }
    }
}

/// Boundary containment for shell working directories
///
/// The boundary is set at most once per host lifetime. Containment accepts
/// the boundary subtree plus the boundary's parent and grandparent
/// directories themselves (sibling subtrees stay rejected). The two extra
/// ancestor levels are a compatibility allowance, deliberately loose, not a
/// hardened sandbox.
#[derive(Debug, Default)]
pub struct BoundaryPolicy {
    boundary: Option<PathBuf>,
}

impl BoundaryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_set(&self) -> bool {
        self.boundary.is_some()
    }

    pub fn boundary(&self) -> Option<&Path> {
        self.boundary.as_deref()
    }

    /// Set the boundary. Returns false (and changes nothing) if one is
    /// already set; the boundary is immutable for the host's lifetime.
    pub fn set(&mut self, path: impl Into<PathBuf>) -> bool {
        if self.boundary.is_some() {
            warn!("Boundary already set, ignoring replacement attempt");
            return false;
        }
        let path = path.into();
        let resolved = path.canonicalize().unwrap_or(path);
        debug!(boundary = %resolved.display(), "Boundary set");
        self.boundary = Some(resolved);
        true
    }

    /// Containment check on resolved absolute paths. `..` segments and
    /// symlinks are resolved by canonicalization before comparison, so a
    /// crafted cwd cannot traverse out lexically. No boundary set means no
    /// restriction.
    pub fn check(&self, cwd: &Path) -> Result<(), PolicyRejection> {
        let Some(boundary) = &self.boundary else {
            return Ok(());
        };

        let resolved = cwd.canonicalize().unwrap_or_else(|_| cwd.to_path_buf());
        let cwd_key = fold_path(&resolved);
        let boundary_key = fold_path(boundary);

        if cwd_key.starts_with(&boundary_key) {
            return Ok(());
        }
        // The parent and grandparent directories themselves are tolerated
        if boundary_key
            .ancestors()
            .skip(1)
            .take(2)
            .any(|ancestor| cwd_key == ancestor)
        {
            return Ok(());
        }

        Err(PolicyRejection::new(
            ErrorCode::CwdOutsideBoundary,
            format!(
                "Working directory {} is outside boundary {}",
                resolved.display(),
                boundary.display()
            ),
        ))
    }
}

/// Case-fold a path for comparison (boundary checks are case-insensitive)
fn fold_path(path: &Path) -> PathBuf {
    PathBuf::from(path.to_string_lossy().to_lowercase())
}

/// Sensitive variable names stripped verbatim from the shell's environment
const SENSITIVE_VARS: &[&str] = &[
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
    "GOOGLE_APPLICATION_CREDENTIALS",
    "AZURE_CLIENT_SECRET",
    "DATABASE_URL",
    "DB_PASSWORD",
    "PGPASSWORD",
    "MYSQL_PWD",
    "SSH_AUTH_SOCK",
];

/// Suffixes that mark a variable as sensitive regardless of its prefix
const SENSITIVE_SUFFIXES: &[&str] = &[
    "_TOKEN",
    "_SECRET",
    "_API_KEY",
    "_APIKEY",
    "_PASSWORD",
    "_PRIVATE_KEY",
];

fn is_sensitive(name: &str) -> bool {
    let upper = name.to_uppercase();
    SENSITIVE_VARS.contains(&upper.as_str())
        || SENSITIVE_SUFFIXES.iter().any(|s| upper.ends_with(s))
}

/// Strip credential-bearing variables and force terminal capabilities
pub fn sanitize_env(env: impl IntoIterator<Item = (String, String)>) -> HashMap<String, String> {
    let mut sanitized: HashMap<String, String> = env
        .into_iter()
        .filter(|(name, _)| !is_sensitive(name))
        .collect();

    sanitized.insert("TERM".into(), "xterm-256color".into());
    sanitized.insert("COLORTERM".into(), "truecolor".into());
    sanitized
}
