use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::CacheError;

/// A cached copy of the form state and when it was captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft<T> {
    pub updated_at: DateTime<Utc>,
    pub state: T,
}

/// Local fallback copy of the last-known form state, kept in a single JSON file.
#[derive(Debug, Clone)]
pub struct DraftCache {
    path: PathBuf,
}

impl DraftCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the draft via a temp file and rename so a crash never leaves a
    /// half-written cache behind.
    pub async fn store<T: Serialize>(&self, state: &T) -> Result<(), CacheError> {
        let draft = Draft {
            updated_at: Utc::now(),
            state,
        };
        let bytes = serde_json::to_vec(&draft)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Returns the cached draft, or `None` if nothing has been cached.
    pub async fn load<T: DeserializeOwned>(&self) -> Result<Option<Draft<T>>, CacheError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
