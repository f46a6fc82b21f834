//! Logged-in surveyor session.
//!
//! [`SessionContext`] is passed explicitly to the components that need
//! credentials. It can persist itself to the `session.token_file` named in
//! the configuration so `survey login` survives between invocations.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::SessionConfig;
use crate::models::SurveyorId;
use crate::traits::SessionStore;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredSession {
    token: Option<String>,
    surveyor_id: Option<SurveyorId>,
    surveyor_name: Option<String>,
}

pub struct SessionContext {
    state: RwLock<StoredSession>,
    token_file: Option<PathBuf>,
}

impl SessionContext {
    pub fn new(token: Option<String>, surveyor_id: Option<SurveyorId>) -> Self {
        Self {
            state: RwLock::new(StoredSession {
                token,
                surveyor_id,
                surveyor_name: None,
            }),
            token_file: None,
        }
    }

    /// Builds the session from config, letting a saved token file override
    /// the static values.
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        let mut stored = StoredSession {
            token: config.token.clone(),
            surveyor_id: config.surveyor_id,
            surveyor_name: None,
        };

        if let Some(path) = &config.token_file {
            if path.exists() {
                let saved = read_session_file(path)?;
                if saved.token.is_some() {
                    stored.token = saved.token;
                }
                if saved.surveyor_id.is_some() {
                    stored.surveyor_id = saved.surveyor_id;
                }
                stored.surveyor_name = saved.surveyor_name;
            }
        }

        Ok(Self {
            state: RwLock::new(stored),
            token_file: config.token_file.clone(),
        })
    }

    pub fn surveyor_id(&self) -> Option<SurveyorId> {
        self.read().surveyor_id
    }

    pub fn surveyor_name(&self) -> Option<String> {
        self.read().surveyor_name.clone()
    }

    /// Stores fresh credentials and writes them to the token file, if any.
    pub fn log_in(
        &self,
        token: String,
        surveyor_id: SurveyorId,
        surveyor_name: Option<String>,
    ) -> Result<()> {
        {
            let mut state = self.write();
            state.token = Some(token);
            state.surveyor_id = Some(surveyor_id);
            state.surveyor_name = surveyor_name;
        }
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.token_file else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let json = serde_json::to_string_pretty(&*self.read())?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write session file: {}", path.display()))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StoredSession> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StoredSession> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStore for SessionContext {
    fn token(&self) -> Option<String> {
        self.read().token.clone()
    }

    fn on_unauthorized(&self) {
        self.write().token = None;
        if let Err(e) = self.persist() {
            tracing::warn!(error = %e, "failed to clear saved session");
        }
        tracing::warn!("session token rejected by server; log in again");
    }
}

fn read_session_file(path: &Path) -> Result<StoredSession> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read session file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse session file: {}", path.display()))
}
