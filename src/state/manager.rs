//! State manager implementation
//!
//! Provides file-based state persistence with atomic writes. The file holds
//! the blob exactly as emitted (raw or compressed), so it can be handed back
//! to the next run unchanged.

use super::codec;
use super::types::SyncState;
use crate::error::{Error, Result};
use crate::types::JsonValue;
use std::path::{Path, PathBuf};

/// State manager for persisting and loading state
#[derive(Debug, Clone)]
pub struct StateManager {
    /// Path to the state file
    path: PathBuf,
}

impl StateManager {
    /// Create a new state manager with the given path
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Load the raw blob; `None` when the file does not exist or is empty
    pub async fn load(&self) -> Result<Option<JsonValue>> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(None);
        }

        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::State {
                message: format!("Failed to read state file: {e}"),
            })?;

        if contents.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| Error::State {
                message: format!("Failed to parse state file: {e}"),
            })
    }

    /// Load and decode the state
    pub async fn load_state(&self) -> Result<SyncState> {
        codec::decode(self.load().await?)
    }

    /// Save a blob to the state file
    pub async fn save(&self, blob: &JsonValue) -> Result<()> {
        let contents = serde_json::to_string_pretty(blob).map_err(|e| Error::State {
            message: format!("Failed to serialize state: {e}"),
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents)
            .await
            .map_err(|e| Error::State {
                message: format!("Failed to write state file: {e}"),
            })?;

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::State {
                message: format!("Failed to rename state file: {e}"),
            })?;

        Ok(())
    }

    /// Encode and save a state
    pub async fn save_state(&self, state: &SyncState, compressed: bool) -> Result<()> {
        self.save(&codec::encode(state, compressed)?).await
    }

    /// Get the state file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}
