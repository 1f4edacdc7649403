//! XDG-compliant path resolution for the verbum CLI.
//!
//! The library never touches these paths on its own; `Engine` only sees the
//! `data_dir` it is given.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors from path resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum PathError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(verbum::paths::no_home),
        help("Set the HOME environment variable, or pass --data-dir and --config explicitly.")
    )]
    NoHome,

    #[error("failed to create directory: {path}")]
    #[diagnostic(
        code(verbum::paths::create_dir),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type PathResult<T> = std::result::Result<T, PathError>;

/// Global XDG-compliant directories for verbum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerbumPaths {
    /// `$XDG_CONFIG_HOME/verbum/`
    pub config_dir: PathBuf,
    /// `$XDG_DATA_HOME/verbum/`
    pub data_dir: PathBuf,
}

impl VerbumPaths {
    /// Resolve XDG directories from environment variables with standard fallbacks.
    pub fn resolve() -> PathResult<Self> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| PathError::NoHome)?;

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".config"))
            .join("verbum");

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/share"))
            .join("verbum");

        Ok(Self {
            config_dir,
            data_dir,
        })
    }

    /// Both directories rooted under one explicit data directory, as used by
    /// `--data-dir`.
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config_dir: root.clone(),
            data_dir: root,
        }
    }

    /// Create all base directories. Idempotent.
    pub fn ensure_dirs(&self) -> PathResult<()> {
        for dir in [&self.config_dir, &self.data_dir] {
            std::fs::create_dir_all(dir).map_err(|e| PathError::CreateDir {
                path: dir.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Path to the economy config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("economy.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_paths_end_in_verbum() {
        // Env vars are not mutated here (unsafe in edition 2024).
        let paths = VerbumPaths::resolve().unwrap();
        assert!(paths.config_dir.ends_with("verbum"));
        assert!(paths.data_dir.ends_with("verbum"));
        assert!(paths.config_file().starts_with(&paths.config_dir));
    }

    #[test]
    fn rooted_paths_share_one_directory() {
        let paths = VerbumPaths::rooted("/srv/verbum");
        assert_eq!(paths.data_dir, PathBuf::from("/srv/verbum"));
        assert_eq!(paths.config_file(), PathBuf::from("/srv/verbum/economy.toml"));
    }

    #[test]
    fn ensure_dirs_creates_both() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = VerbumPaths {
            config_dir: dir.path().join("cfg"),
            data_dir: dir.path().join("data"),
        };
        paths.ensure_dirs().unwrap();
        assert!(paths.config_dir.is_dir());
        assert!(paths.data_dir.is_dir());
    }
}
