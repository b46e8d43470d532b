//! Per-entity scratch space.
//!
//! Each entity is built inside its own temporary directory holding `data/`
//! (the tree that gets packed into the archive) and `output/` (the files that
//! end up in the bundle). The directory is removed when the context drops,
//! whether the build succeeded or not.

use std::io;
use std::path::{Path, PathBuf};

/// Disposable build directory for one entity.
#[derive(Debug)]
pub struct StagingContext {
    temp_dir: tempfile::TempDir,
    data: PathBuf,
    output: PathBuf,
}

impl StagingContext {
    /// Create a new staging directory under the system temp location.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn new() -> io::Result<Self> {
        let temp_dir = tempfile::Builder::new().prefix("tunein-").tempdir()?;
        Self::with_dir(temp_dir)
    }

    /// Create a staging directory inside `parent`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn new_in(parent: &Path) -> io::Result<Self> {
        std::fs::create_dir_all(parent)?;
        let temp_dir = tempfile::Builder::new()
            .prefix("tunein-")
            .tempdir_in(parent)?;
        Self::with_dir(temp_dir)
    }

    fn with_dir(temp_dir: tempfile::TempDir) -> io::Result<Self> {
        let data = temp_dir.path().join("data");
        let output = temp_dir.path().join("output");
        std::fs::create_dir_all(&data)?;
        std::fs::create_dir_all(&output)?;
        Ok(Self {
            temp_dir,
            data,
            output,
        })
    }

    /// Access the root path
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Tree packed into the archive.
    pub fn data_dir(&self) -> &Path {
        &self.data
    }

    /// Files collected into the bundle.
    pub fn output_dir(&self) -> &Path {
        &self.output
    }

    /// Directory receiving the audio tool outputs.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn sound_dir(&self) -> io::Result<PathBuf> {
        let dir = self.data.join("sound");
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_created() {
        let parent = tempfile::tempdir().unwrap();
        let staging = StagingContext::new_in(parent.path()).unwrap();
        assert!(staging.data_dir().is_dir());
        assert!(staging.output_dir().is_dir());
        assert!(staging.sound_dir().unwrap().ends_with("data/sound"));
        assert!(
            staging
                .path()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("tunein-")
        );
    }

    #[test]
    fn removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let root = {
            let staging = StagingContext::new_in(parent.path()).unwrap();
            std::fs::write(staging.data_dir().join("file.bin"), b"x").unwrap();
            staging.path().to_path_buf()
        };
        assert!(!root.exists());
    }

    #[test]
    fn contexts_are_unique() {
        let parent = tempfile::tempdir().unwrap();
        let a = StagingContext::new_in(parent.path()).unwrap();
        let b = StagingContext::new_in(parent.path()).unwrap();
        assert_ne!(a.path(), b.path());
    }
}
