//! JSON file helpers

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::errors::FleetError;

/// A file on disk addressed by path
#[derive(Debug, Clone)]
pub struct File {
    path: PathBuf,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    /// Read and deserialize the file's JSON content
    pub async fn read_json<T: DeserializeOwned>(&self) -> Result<T, FleetError> {
        let contents = fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Serialize `value` as pretty JSON and replace the file atomically.
    pub async fn write_json<T: Serialize>(&self, value: &T) -> Result<(), FleetError> {
        let contents = serde_json::to_vec_pretty(value)?;
        self.write_atomic(&contents).await
    }

    /// Restrict the file to owner read/write (0o600). No-op off Unix.
    pub async fn set_permissions_600(&self) -> Result<(), FleetError> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&self.path).await?.permissions();
            perms.set_mode(0o600);
            fs::set_permissions(&self.path, perms).await?;
        }
        Ok(())
    }

    async fn write_atomic(&self, contents: &[u8]) -> Result<(), FleetError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let temp_path = self.path.with_extension("tmp");

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}
