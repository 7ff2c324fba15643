//! Client-side persistent state: preferences, RPC override, last healthy
//! endpoint and generation history, kept in one JSON file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};

use crate::domain::{AppError, EndpointCache};

/// Number of history entries kept on disk
pub const HISTORY_LIMIT: usize = 10;

/// Default store location relative to the working directory
pub const DEFAULT_STORE_PATH: &str = ".pennypics.json";

/// One completed generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub request_id: String,
    pub prompt: String,
    pub style: String,
    pub width: u32,
    pub height: u32,
    /// Payment signature, absent when payment was skipped
    #[serde(default)]
    pub signature: Option<String>,
    /// Files the images were written to
    #[serde(default)]
    pub files: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientState {
    #[serde(default)]
    pub dark_mode: bool,
    #[serde(default)]
    pub rpc_url_override: Option<String>,
    #[serde(default)]
    pub last_good_rpc_url: Option<String>,
    /// Newest first
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

/// JSON-file backed store, loaded once and written through on every change
pub struct ClientStore {
    path: PathBuf,
    state: RwLock<ClientState>,
}

impl ClientStore {
    /// Load the store at `path`. A missing file yields defaults; an unreadable
    /// or corrupt one yields defaults and a warning.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<ClientState>(&raw) {
                Ok(state) => state,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Client store is corrupt, using defaults");
                    ClientState::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No client store yet");
                ClientState::default()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Client store unreadable, using defaults");
                ClientState::default()
            }
        };

        Self {
            path,
            state: RwLock::new(state),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> ClientState {
        self.state
            .read()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn dark_mode(&self) -> bool {
        self.snapshot().dark_mode
    }

    pub fn set_dark_mode(&self, enabled: bool) -> Result<(), AppError> {
        self.update(|state| state.dark_mode = enabled)
    }

    pub fn rpc_url_override(&self) -> Option<String> {
        self.snapshot().rpc_url_override
    }

    /// Set or clear the custom RPC URL. Any change forgets the cached
    /// endpoint so the next selection starts from the new preference.
    pub fn set_rpc_url_override(&self, url: Option<String>) -> Result<(), AppError> {
        self.update(|state| {
            if state.rpc_url_override != url {
                state.last_good_rpc_url = None;
            }
            state.rpc_url_override = url;
        })
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.snapshot().history
    }

    /// Prepend an entry, dropping the oldest beyond [`HISTORY_LIMIT`]
    pub fn push_history(&self, entry: HistoryEntry) -> Result<(), AppError> {
        self.update(|state| {
            state.history.insert(0, entry);
            state.history.truncate(HISTORY_LIMIT);
        })
    }

    fn update(&self, change: impl FnOnce(&mut ClientState)) -> Result<(), AppError> {
        let snapshot = {
            let mut guard = self
                .state
                .write()
                .map_err(|_| AppError::Internal("Client store lock poisoned".to_string()))?;
            change(&mut guard);
            guard.clone()
        };
        self.save(&snapshot)
    }

    fn save(&self, state: &ClientState) -> Result<(), AppError> {
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| AppError::Serialization(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::Internal(format!("Failed to create store dir: {}", e)))?;
        }
        std::fs::write(&self.path, json)
            .map_err(|e| AppError::Internal(format!("Failed to write client store: {}", e)))
    }
}

impl EndpointCache for ClientStore {
    fn load(&self) -> Option<String> {
        self.snapshot().last_good_rpc_url
    }

    fn store(&self, url: &str) {
        if let Err(e) = self.update(|state| state.last_good_rpc_url = Some(url.to_string())) {
            warn!(error = %e, "Failed to remember RPC endpoint");
        }
    }
}
