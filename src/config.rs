use crate::remote::DEFAULT_TIMEOUT_MS;
use serde::{Deserialize, Serialize};

pub const LOG_ENV: &str = "TERMWORKD_LOG";
pub const BACKEND_URL_ENV: &str = "TERMWORKD_BACKEND_URL";
pub const BACKEND_TIMEOUT_ENV: &str = "TERMWORKD_BACKEND_TIMEOUT_MS";

/// Where the system of record lives. Persisted per workspace under
/// `backend.baseUrl` / `backend.timeoutMs`; the token stays in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendSettings {
    pub base_url: Option<String>,
    pub timeout_ms: u64,
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            token: None,
        }
    }
}

impl BackendSettings {
    pub fn is_offline(&self) -> bool {
        self.base_url.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub log_filter: String,
    pub backend: BackendSettings,
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |k: &str| {
            lookup(k)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let timeout_ms = non_empty(BACKEND_TIMEOUT_ENV)
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        Self {
            log_filter: non_empty(LOG_ENV).unwrap_or_else(|| "info".to_string()),
            backend: BackendSettings {
                base_url: non_empty(BACKEND_URL_ENV),
                timeout_ms,
                token: None,
            },
        }
    }
}
