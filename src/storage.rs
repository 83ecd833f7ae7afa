//! Per-session work area for artifact files.
//!
//! Every session gets its own temporary directory. Artifact names carry a
//! zero-padded index so a file browser lists them in playback order. The
//! directory and anything left in it is removed when the store is dropped.

use crate::defaults;
use crate::error::{Result, VoxreelError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// Owns the temporary directory of one production session.
#[derive(Debug)]
pub struct ArtifactStore {
    dir: TempDir,
    pad_width: usize,
    extension: String,
    derived: AtomicUsize,
}

impl ArtifactStore {
    /// Creates a work area in the system temp directory.
    ///
    /// Failure is fatal to the session.
    pub fn create(prefix: &str, total_units: usize) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .map_err(|e| VoxreelError::WorkArea {
                message: e.to_string(),
            })?;
        Ok(Self::from_dir(dir, total_units))
    }

    /// Creates a work area below `parent`.
    pub fn create_in(parent: &Path, prefix: &str, total_units: usize) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(parent)
            .map_err(|e| VoxreelError::WorkArea {
                message: format!("{}: {}", parent.display(), e),
            })?;
        Ok(Self::from_dir(dir, total_units))
    }

    fn from_dir(dir: TempDir, total_units: usize) -> Self {
        let digits = total_units.max(1).to_string().len();
        log::debug!("work area {}", dir.path().display());
        Self {
            dir,
            pad_width: digits.max(defaults::INDEX_PAD_WIDTH),
            extension: defaults::ARTIFACT_EXTENSION.to_string(),
            derived: AtomicUsize::new(0),
        }
    }

    /// Sets the extension used for artifact and derived file names.
    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = extension.trim_start_matches('.').to_string();
        self
    }

    /// Directory holding this session's files.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Target path for the artifact of unit `index`, e.g. `chunk_0007.wav`.
    pub fn artifact_path(&self, index: usize) -> PathBuf {
        self.dir.path().join(format!(
            "chunk_{:0width$}.{}",
            index,
            self.extension,
            width = self.pad_width
        ))
    }

    /// Fresh path for a file derived from edits (gaps, split parts).
    pub fn derived_path(&self, label: &str) -> PathBuf {
        let n = self.derived.fetch_add(1, Ordering::Relaxed) + 1;
        self.dir.path().join(format!(
            "{}_{:0width$}.{}",
            label,
            n,
            self.extension,
            width = self.pad_width
        ))
    }
}
