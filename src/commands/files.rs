//! File access at the tool boundary.
//!
//! The engine itself never touches the filesystem. Loads receive bytes and
//! exports return bytes; reading and writing them is done here, restricted to
//! a set of trusted directories.

use crate::error::{AnalysisError, Result};
use std::path::{Path, PathBuf};

pub trait FileAccess: Send + Sync {
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Write `bytes` to `path` and return where they landed.
    fn write(&self, path: &str, bytes: &[u8]) -> Result<PathBuf>;
}

/// Filesystem access confined to trusted root directories.
#[derive(Debug, Clone)]
pub struct FsAccess {
    roots: Vec<PathBuf>,
}

impl FsAccess {
    /// Canonicalize `roots`; an empty list trusts the current directory.
    pub fn new(roots: &[PathBuf]) -> Result<Self> {
        let roots = if roots.is_empty() {
            vec![std::env::current_dir()?]
        } else {
            roots.to_vec()
        };
        let roots = roots
            .iter()
            .map(|root| normalize_trusted_root(root))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!("file access restricted to {:?}", roots);
        Ok(Self { roots })
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Relative paths resolve against the first root.
    fn absolute(&self, path: &str) -> Result<PathBuf> {
        if path.trim().is_empty() {
            return Err(AnalysisError::InvalidArgument("file path is empty".to_owned()));
        }
        let p = Path::new(path);
        if p.is_absolute() {
            return Ok(p.to_path_buf());
        }
        self.roots
            .first()
            .map(|root| root.join(p))
            .ok_or_else(|| AnalysisError::Internal("no trusted roots configured".to_owned()))
    }

    fn ensure_trusted(&self, path: &Path, shown: &str) -> Result<()> {
        if self.roots.iter().any(|root| path.starts_with(root)) {
            Ok(())
        } else {
            Err(AnalysisError::InvalidArgument(format!(
                "path '{shown}' is outside the trusted directories"
            )))
        }
    }
}

fn normalize_trusted_root(root: &Path) -> Result<PathBuf> {
    let abs = if root.is_absolute() {
        root.to_path_buf()
    } else {
        std::env::current_dir()?.join(root)
    };
    abs.canonicalize().map_err(|e| {
        AnalysisError::InvalidArgument(format!(
            "trusted directory '{}' is not accessible: {e}",
            root.display()
        ))
    })
}

impl FileAccess for FsAccess {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        let resolved = self
            .absolute(path)?
            .canonicalize()
            .map_err(|e| AnalysisError::InvalidArgument(format!("cannot open '{path}': {e}")))?;
        self.ensure_trusted(&resolved, path)?;
        tracing::info!("Reading file: {}", resolved.display());
        Ok(std::fs::read(&resolved)?)
    }

    fn write(&self, path: &str, bytes: &[u8]) -> Result<PathBuf> {
        let target = self.absolute(path)?;
        let file_name = target
            .file_name()
            .ok_or_else(|| AnalysisError::InvalidArgument(format!("'{path}' names no file")))?
            .to_owned();
        let parent = target.parent().unwrap_or_else(|| Path::new("."));
        let parent = parent.canonicalize().map_err(|e| {
            AnalysisError::InvalidArgument(format!("cannot write '{path}': {e}"))
        })?;
        self.ensure_trusted(&parent, path)?;

        let resolved = parent.join(file_name);
        std::fs::write(&resolved, bytes)?;
        tracing::info!("Wrote {} bytes to {}", bytes.len(), resolved.display());
        Ok(resolved)
    }
}
