//! Local file backend for state storage
//!
//! Stores state as pretty-printed JSON (default: filess.state.json). Writes
//! go to a sibling temporary file that is then renamed over the state file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::backend::{BackendError, BackendResult, StateBackend};
use crate::state::StateFile;

pub struct LocalBackend {
    state_path: PathBuf,
}

impl LocalBackend {
    /// Default state file name
    pub const DEFAULT_STATE_FILE: &'static str = "filess.state.json";

    /// Create a new LocalBackend using filess.state.json in the current directory
    pub fn new() -> Self {
        Self::with_path(PathBuf::from(Self::DEFAULT_STATE_FILE))
    }

    pub fn with_path(state_path: impl Into<PathBuf>) -> Self {
        Self {
            state_path: state_path.into(),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateBackend for LocalBackend {
    async fn read_state(&self) -> BackendResult<Option<StateFile>> {
        let content = match tokio::fs::read_to_string(&self.state_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BackendError::Io(format!("Failed to read state file: {}", e)));
            }
        };

        let state: StateFile = serde_json::from_str(&content).map_err(|e| {
            BackendError::InvalidState(format!("Failed to parse state file: {}", e))
        })?;

        if state.version > StateFile::CURRENT_VERSION {
            return Err(BackendError::UnsupportedVersion {
                found: state.version,
                supported: StateFile::CURRENT_VERSION,
            });
        }

        Ok(Some(state))
    }

    async fn write_state(&self, state: &StateFile) -> BackendResult<()> {
        let content = serde_json::to_string_pretty(state).map_err(|e| {
            BackendError::Serialization(format!("Failed to serialize state: {}", e))
        })?;

        let tmp_path = self.state_path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to write state file: {}", e)))?;
        tokio::fs::rename(&tmp_path, &self.state_path)
            .await
            .map_err(|e| BackendError::Io(format!("Failed to replace state file: {}", e)))?;

        Ok(())
    }
}
