use std::collections::HashMap;
use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::config::{BackendSettings, DaemonConfig};
use crate::elective::{ElectiveCatalog, ElectiveSelection};
use crate::remote::{HttpBackend, OfflineBackend, SystemOfRecord};
use crate::store::{PendingToggle, SubmissionStore};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// One student's open elective screen: the working selection (drafts
/// included) and the catalog it is validated against.
#[derive(Debug, Clone)]
pub struct ElectiveSession {
    pub selection: ElectiveSelection,
    pub catalog: ElectiveCatalog,
}

pub struct AppState {
    pub config: DaemonConfig,
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub store: SubmissionStore,
    /// Two-phase toggles waiting for `submissions.toggleSettle`, by ticket.
    pub pending: HashMap<String, PendingToggle>,
    pub electives: HashMap<String, ElectiveSession>,
    pub backend_settings: BackendSettings,
    pub backend: Box<dyn SystemOfRecord>,
}

impl AppState {
    pub fn new(config: DaemonConfig) -> anyhow::Result<Self> {
        let backend_settings = config.backend.clone();
        let backend = build_backend(&backend_settings)?;
        Ok(Self {
            config,
            workspace: None,
            db: None,
            store: SubmissionStore::new(),
            pending: HashMap::new(),
            electives: HashMap::new(),
            backend_settings,
            backend,
        })
    }

    pub fn set_backend(&mut self, settings: BackendSettings) -> anyhow::Result<()> {
        self.backend = build_backend(&settings)?;
        self.backend_settings = settings;
        Ok(())
    }
}

pub fn build_backend(settings: &BackendSettings) -> anyhow::Result<Box<dyn SystemOfRecord>> {
    match settings.base_url.as_deref() {
        Some(url) => Ok(Box::new(HttpBackend::new(
            url,
            settings.timeout_ms,
            settings.token.clone(),
        )?)),
        None => Ok(Box::new(OfflineBackend)),
    }
}
