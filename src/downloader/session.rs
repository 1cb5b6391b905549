// Session store - the only durable state

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::errors::EngineError;
use super::format_selector::QualityProfile;
use super::models::{FormatDescriptor, Job, Metadata};

/// Everything restored at startup. Overwritten wholesale on every save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionState {
    pub last_url: String,
    pub output_folder: Option<PathBuf>,
    pub quality: Option<QualityProfile>,
    pub last_formats: Vec<FormatDescriptor>,
    pub last_metadata: Metadata,
    pub queue: Vec<Job>,
    pub cursor: usize,
}

/// JSON session file at a fixed path
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the session. A missing or unreadable file yields defaults.
    pub fn load(&self) -> SessionState {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(target: "session", path = %self.path.display(), "no session file");
                return SessionState::default();
            }
            Err(e) => {
                warn!(target: "session", path = %self.path.display(), error = %e, "could not read session");
                return SessionState::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(state) => {
                info!(target: "session", path = %self.path.display(), "session restored");
                state
            }
            Err(e) => {
                warn!(target: "session", path = %self.path.display(), error = %e, "session file is corrupt, starting fresh");
                SessionState::default()
            }
        }
    }

    /// Replace the session file atomically: write a sibling temp file, then
    /// rename it over the old one.
    pub fn save(&self, state: &SessionState) -> Result<(), EngineError> {
        let persist_err = |e: &dyn std::fmt::Display| {
            EngineError::PersistenceFailed(format!("{}: {}", self.path.display(), e))
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| persist_err(&e))?;

        let json = serde_json::to_vec_pretty(state).map_err(|e| persist_err(&e))?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| persist_err(&e))?;
        tmp.write_all(&json).map_err(|e| persist_err(&e))?;
        tmp.flush().map_err(|e| persist_err(&e))?;
        tmp.persist(&self.path).map_err(|e| persist_err(&e.error))?;

        debug!(target: "session", path = %self.path.display(), jobs = state.queue.len(), "session saved");
        Ok(())
    }
}
