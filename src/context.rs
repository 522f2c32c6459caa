//! Ephemeral build contexts.
//!
//! A [`BuildContext`] is a fresh temporary directory holding the recipe
//! file and every auxiliary file of the active extensions. It is owned by a
//! single build call and removed when dropped or closed.
//!
//! ## Security
//!
//! File paths are re-validated at write time even though the assembler
//! already filtered them: a path that is absolute or climbs out of the
//! root is skipped with a warning and never written.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::constants::{BUILD_CONTEXT_PREFIX, RECIPE_FILE_NAME};
use crate::error::{Error, Result};
use crate::recipe::{Recipe, is_safe_relative_path};

/// Temporary directory holding a materialized recipe.
#[derive(Debug)]
pub struct BuildContext {
    dir: TempDir,
}

impl BuildContext {
    /// Creates an empty context under the system temp directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BuildContext`] if the directory cannot be created.
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(BUILD_CONTEXT_PREFIX)
            .tempdir()
            .map_err(|e| Error::BuildContext {
                path: std::env::temp_dir(),
                reason: e.to_string(),
            })?;
        Ok(Self { dir })
    }

    /// Creates a context and writes `recipe` into it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BuildContext`] on any write failure.
    pub fn materialize(recipe: &Recipe) -> Result<Self> {
        let context = Self::new()?;
        context.write_recipe(recipe)?;
        Ok(context)
    }

    /// Context root.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of the recipe file.
    pub fn recipe_path(&self) -> PathBuf {
        self.dir.path().join(RECIPE_FILE_NAME)
    }

    /// Writes the Dockerfile and every auxiliary file.
    ///
    /// Returns the number of auxiliary files written.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BuildContext`] on any write failure.
    pub fn write_recipe(&self, recipe: &Recipe) -> Result<usize> {
        let root = self.dir.path();
        write_file(&root.join(RECIPE_FILE_NAME), recipe.dockerfile.as_bytes())?;

        let mut written = 0;
        for (relative, content) in &recipe.files {
            if !is_safe_relative_path(relative) {
                warn!(path = %relative, "Skipping file outside the build context");
                continue;
            }
            let target = root.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::BuildContext {
                    path: parent.to_path_buf(),
                    reason: e.to_string(),
                })?;
            }
            write_file(&target, content.as_bytes())?;
            written += 1;
        }

        debug!(root = %root.display(), files = written, "Materialized build context");
        Ok(written)
    }

    /// Removes the directory, logging instead of failing.
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!(path = %path.display(), error = %e, "Failed to remove build context");
        }
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).map_err(|e| Error::BuildContext {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}
