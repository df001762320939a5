//! Storage layout configuration

use std::path::PathBuf;

use crate::filesys::file::File;

/// On-disk layout of the controller's configuration directory
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Layout rooted at the directory holding `settings_path`.
    pub fn from_settings_path(settings_path: impl Into<PathBuf>) -> Self {
        let path = settings_path.into();
        let base_dir = path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(base_dir)
    }

    pub fn settings_file(&self) -> File {
        File::new(self.base_dir.join("settings.json"))
    }

    /// Sticky provisioning parameters
    pub fn params_file(&self) -> File {
        File::new(self.base_dir.join("params.json"))
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        Self::new("/etc/fieldnet")
    }
}
