//! Scratch files for one counting request
//!
//! Everything lives in a randomly named directory under the upload folder
//! and is removed when the [`RequestWorkspace`] is dropped.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::image_processing::{save_jpeg, Sprite, ROW_COUNT};
use crate::utils::sanitize_filename;

pub const SPRITE_FILE_NAME: &str = "sprite_right.jpg";
const FALLBACK_UPLOAD_NAME: &str = "upload";

/// Where the derived images of one request are written
#[derive(Debug, Clone)]
pub struct SpriteFiles {
    pub sprite: PathBuf,
    /// `right_01.jpg` .. `right_10.jpg`
    pub crops: Vec<PathBuf>,
}

impl SpriteFiles {
    /// Write the sprite and the individual crops as JPEGs
    pub fn write(&self, sprite: &Sprite) -> io::Result<()> {
        save_jpeg(&sprite.image, &self.sprite).map_err(io::Error::other)?;

        for (tile, path) in sprite.tiles.iter().zip(&self.crops) {
            save_jpeg(tile, path).map_err(io::Error::other)?;
        }
        Ok(())
    }
}

pub struct RequestWorkspace {
    dir: TempDir,
}

impl RequestWorkspace {
    /// Create a fresh scratch directory inside `upload_dir`
    pub fn create(upload_dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(upload_dir)?;
        let dir = tempfile::Builder::new().prefix("req_").tempdir_in(upload_dir)?;
        debug!("Created request workspace {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Store the uploaded bytes under a sanitized version of the client's filename
    pub fn save_original(&self, filename: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let mut name = sanitize_filename(filename);
        if name.is_empty() {
            name = FALLBACK_UPLOAD_NAME.to_string();
        }

        let path = self.dir.path().join(format!("original_{}", name));
        fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Target paths for the sprite and its ten crops
    pub fn sprite_files(&self) -> SpriteFiles {
        SpriteFiles {
            sprite: self.dir.path().join(SPRITE_FILE_NAME),
            crops: (1..=ROW_COUNT)
                .map(|row| self.dir.path().join(format!("right_{:02}.jpg", row)))
                .collect(),
        }
    }

    /// Remove the directory now and report failures instead of ignoring them
    pub fn close(self) {
        let path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            warn!("Failed to remove request workspace {}: {}", path.display(), e);
        }
    }
}
