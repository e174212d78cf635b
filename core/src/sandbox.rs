//! Filesystem policy consulted by platform commands.
//!
//! A pure validator over paths and sizes: allow/deny prefix lists plus an
//! optional maximum file size. This is a path policy, not an OS-level jail.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("path {path} is under denied path {denied}")]
    DeniedPath { path: PathBuf, denied: PathBuf },

    #[error("path {path} is not under any allowed path")]
    OutsideAllowed { path: PathBuf },

    #[error("file size {size} bytes exceeds maximum {max} bytes ({pretty})")]
    FileTooLarge { size: u64, max: u64, pretty: String },

    #[error("invalid file size {0:?}")]
    InvalidSize(String),

    #[error("resolve path {path}: {source}")]
    Resolve {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Configuration for a [`Sandbox`].
#[derive(Debug, Clone, Default)]
pub struct SandboxPolicy {
    pub allowed_paths: Vec<PathBuf>,
    pub denied_paths: Vec<PathBuf>,
    /// Human-readable size, e.g. `10MB`. Empty means unlimited.
    pub max_file_size: String,
}

/// Path allow/deny and file-size policy.
#[derive(Debug, Default)]
pub struct Sandbox {
    allowed: Vec<PathBuf>,
    denied: Vec<PathBuf>,
    max_file_size: u64,
}

impl Sandbox {
    /// Build a sandbox from a policy, resolving every configured path to its
    /// absolute form up front.
    pub fn new(policy: &SandboxPolicy) -> Result<Self, SandboxError> {
        let mut sandbox = Sandbox::default();
        for p in &policy.allowed_paths {
            sandbox.allowed.push(absolutize(p)?);
        }
        for p in &policy.denied_paths {
            sandbox.denied.push(absolutize(p)?);
        }
        if !policy.max_file_size.is_empty() {
            sandbox.max_file_size = parse_file_size(&policy.max_file_size)?;
        }
        Ok(sandbox)
    }

    /// Validate a path. Denied prefixes win; with no allowed prefixes
    /// configured every non-denied path is admitted; otherwise the path must
    /// sit under some allowed prefix.
    pub fn check_path(&self, path: &Path) -> Result<(), SandboxError> {
        let abs = absolutize(path)?;

        for denied in &self.denied {
            if abs.starts_with(denied) {
                return Err(SandboxError::DeniedPath {
                    path: abs,
                    denied: denied.clone(),
                });
            }
        }

        if self.allowed.is_empty() {
            return Ok(());
        }

        if self.allowed.iter().any(|allowed| abs.starts_with(allowed)) {
            return Ok(());
        }

        Err(SandboxError::OutsideAllowed { path: abs })
    }

    /// Validate a size against the configured maximum, if any.
    pub fn check_file_size(&self, size: u64) -> Result<(), SandboxError> {
        if self.max_file_size == 0 || size <= self.max_file_size {
            return Ok(());
        }
        Err(SandboxError::FileTooLarge {
            size,
            max: self.max_file_size,
            pretty: format_file_size(self.max_file_size),
        })
    }

    /// Configured maximum file size in bytes; 0 means unlimited.
    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn allowed_paths(&self) -> &[PathBuf] {
        &self.allowed
    }

    pub fn denied_paths(&self) -> &[PathBuf] {
        &self.denied
    }
}

/// Resolve a path to absolute form lexically (no symlink resolution): the
/// current directory is prepended to relative paths and `.`/`..` components
/// are folded away.
fn absolutize(path: &Path) -> Result<PathBuf, SandboxError> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|source| SandboxError::Resolve {
                path: path.to_path_buf(),
                source,
            })?
            .join(path)
    };

    let mut clean = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // `..` never climbs above the root.
                let at_root = matches!(
                    clean.components().next_back(),
                    Some(Component::RootDir | Component::Prefix(_))
                );
                if !at_root {
                    clean.pop();
                }
            }
            other => clean.push(other),
        }
    }
    Ok(clean)
}

/// Parse a human-readable file size: `B|KB|MB|GB|TB` suffixes,
/// case-insensitive, default bytes. Fractional numbers are accepted.
pub fn parse_file_size(input: &str) -> Result<u64, SandboxError> {
    let text = input.trim().to_uppercase();

    const SUFFIXES: [(&str, u64); 5] = [
        ("TB", 1 << 40),
        ("GB", 1 << 30),
        ("MB", 1 << 20),
        ("KB", 1 << 10),
        ("B", 1),
    ];

    for (suffix, multiplier) in SUFFIXES {
        if let Some(number) = text.strip_suffix(suffix) {
            let number = number.trim();
            let value: f64 = number
                .parse()
                .map_err(|_| SandboxError::InvalidSize(input.to_string()))?;
            if value < 0.0 {
                return Err(SandboxError::InvalidSize(input.to_string()));
            }
            return Ok((value * multiplier as f64) as u64);
        }
    }

    text.parse()
        .map_err(|_| SandboxError::InvalidSize(input.to_string()))
}

/// Format bytes for error messages.
pub fn format_file_size(bytes: u64) -> String {
    const KB: u64 = 1 << 10;
    const MB: u64 = 1 << 20;
    const GB: u64 = 1 << 30;
    const TB: u64 = 1 << 40;
    match bytes {
        b if b >= TB => format!("{:.1}TB", b as f64 / TB as f64),
        b if b >= GB => format!("{:.1}GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.1}MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.1}KB", b as f64 / KB as f64),
        b => format!("{b}B"),
    }
}
