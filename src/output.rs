use crate::errors::{PipelineError, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const RESIZED_DIR_NAME: &str = "resized_images";
pub const MASKS_DIR_NAME: &str = "masks";

/// Where the two artifacts of every item go. Built once per run and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub resized_dir: PathBuf,
    pub masks_dir: PathBuf,
}

impl OutputPaths {
    /// Creates `<root>/resized_images` and `<root>/masks`, parents included.
    ///
    /// Calling it again for the same root is a no-op returning equal paths.
    pub fn prepare(root: &Path) -> Result<Self> {
        let paths = Self::under(root);
        for dir in [&paths.resized_dir, &paths.masks_dir] {
            fs::create_dir_all(dir)
                .map_err(|e| PipelineError::file_system(dir, "output directory creation", e))?;
        }
        Ok(paths)
    }

    /// Computes the layout without touching the filesystem.
    pub fn under(root: &Path) -> Self {
        Self {
            resized_dir: root.join(RESIZED_DIR_NAME),
            masks_dir: root.join(MASKS_DIR_NAME),
        }
    }

    pub fn resized_path(&self, file_name: &str) -> PathBuf {
        self.resized_dir.join(file_name)
    }

    pub fn mask_path(&self, file_name: &str) -> PathBuf {
        self.masks_dir.join(file_name)
    }
}
