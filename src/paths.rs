//! XDG-compliant path resolution for hakgal.
//!
//! Provides `HakPaths`: where the fact database, the engine config and the
//! constitution live when the caller does not pass explicit paths.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Errors from path resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum PathError {
    #[error("cannot determine home directory")]
    #[diagnostic(
        code(hakgal::paths::no_home),
        help("Set the HOME environment variable or pass --db and --config explicitly.")
    )]
    NoHome,

    #[error("failed to create directory: {path}")]
    #[diagnostic(
        code(hakgal::paths::create_dir),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type PathResult<T> = std::result::Result<T, PathError>;

/// File name of the fact database inside the data directory.
pub const DB_FILE_NAME: &str = "hexagonal_kb.db";

/// Global XDG-compliant directories for hakgal.
#[derive(Debug, Clone)]
pub struct HakPaths {
    /// `$XDG_CONFIG_HOME/hakgal/`
    pub config_dir: PathBuf,
    /// `$XDG_DATA_HOME/hakgal/`
    pub data_dir: PathBuf,
}

impl HakPaths {
    /// Resolve XDG directories from environment variables with standard fallbacks.
    pub fn resolve() -> PathResult<Self> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| PathError::NoHome)?;

        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".config"))
            .join("hakgal");

        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(".local/share"))
            .join("hakgal");

        Ok(Self {
            config_dir,
            data_dir,
        })
    }

    /// Create the base directories. Idempotent.
    pub fn ensure_dirs(&self) -> PathResult<()> {
        for dir in [&self.config_dir, &self.data_dir] {
            std::fs::create_dir_all(dir).map_err(|e| PathError::CreateDir {
                path: dir.display().to_string(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Path to the engine config file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("hakgal.toml")
    }

    /// Default path of the fact database.
    pub fn db_file(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }

    /// Default location of a user-supplied constitution document.
    pub fn constitution_file(&self) -> PathBuf {
        self.config_dir.join("constitution.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_paths_are_namespaced() {
        // Reads the real environment without mutating it (unsafe in edition 2024).
        if std::env::var("HOME").is_err() {
            return;
        }
        let paths = HakPaths::resolve().unwrap();
        assert!(paths.config_dir.ends_with("hakgal"));
        assert!(paths.data_dir.ends_with("hakgal"));
    }

    #[test]
    fn files_derive_from_dirs() {
        let paths = HakPaths {
            config_dir: PathBuf::from("/cfg/hakgal"),
            data_dir: PathBuf::from("/data/hakgal"),
        };
        assert_eq!(paths.config_file(), PathBuf::from("/cfg/hakgal/hakgal.toml"));
        assert_eq!(
            paths.db_file(),
            PathBuf::from("/data/hakgal/hexagonal_kb.db")
        );
        assert_eq!(
            paths.constitution_file(),
            PathBuf::from("/cfg/hakgal/constitution.json")
        );
    }

    #[test]
    fn ensure_dirs_creates_both() {
        let dir = tempfile::TempDir::new().unwrap();
        let paths = HakPaths {
            config_dir: dir.path().join("cfg"),
            data_dir: dir.path().join("data"),
        };
        paths.ensure_dirs().unwrap();
        assert!(paths.config_dir.is_dir());
        assert!(paths.data_dir.is_dir());
    }
}
