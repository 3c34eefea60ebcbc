use crate::config::BackendSettings;
use crate::db;
use crate::ipc::error::{db_err, err, ok};
use crate::ipc::helpers::{db_conn, HandlerResult};
use crate::ipc::types::{AppState, Request};
use crate::store::SubmissionStore;
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

const BACKEND_KEY: &str = "backend";

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "backend": state.backend.name(),
            "baseUrl": state.backend_settings.base_url,
            "offline": state.backend_settings.is_offline(),
            "inFlight": state.store.total_in_flight(),
            "pendingTickets": state.pending.len(),
        }),
    )
}

/// Saved settings win over the environment; the in-memory token is kept.
fn saved_backend_settings(
    conn: &rusqlite::Connection,
    current: &BackendSettings,
) -> anyhow::Result<Option<BackendSettings>> {
    let Some(saved) = db::settings_get_json(conn, BACKEND_KEY)? else {
        return Ok(None);
    };
    let mut settings: BackendSettings = serde_json::from_value(saved)?;
    settings.token = current.token.clone();
    Ok(Some(settings))
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    let conn = match db::open_db(&path) {
        Ok(c) => c,
        Err(e) => return db_err(&req.id, "db_open_failed", e),
    };
    let (records, unreadable) = match db::load_confirmed_submissions(&conn) {
        Ok(v) => v,
        Err(e) => return db_err(&req.id, "db_query_failed", e),
    };
    if unreadable > 0 {
        warn!(unreadable, "ignored unreadable submission rows");
    }

    // A broken saved value must not keep the workspace closed. Without saved
    // settings the startup environment applies again.
    let settings = match saved_backend_settings(&conn, &state.backend_settings) {
        Ok(Some(settings)) => Some(settings),
        Ok(None) => Some(BackendSettings {
            token: state.backend_settings.token.clone(),
            ..state.config.backend.clone()
        }),
        Err(e) => {
            warn!(error = %e, "could not read saved backend settings");
            None
        }
    };
    if let Some(settings) = settings.filter(|s| *s != state.backend_settings) {
        if let Err(e) = state.set_backend(settings) {
            warn!(error = %e, "backend settings unusable, keeping current backend");
        }
    }

    state.store = SubmissionStore::from_confirmed(records);
    state.pending.clear();
    state.electives.clear();
    state.workspace = Some(path.clone());
    state.db = Some(conn);
    info!(workspace = %path.display(), records = state.store.len(), "workspace opened");

    ok(
        &req.id,
        json!({
            "workspacePath": path.to_string_lossy(),
            "records": state.store.len(),
            "backend": state.backend.name(),
        }),
    )
}

fn parse_backend_settings(req: &Request, current: &BackendSettings) -> HandlerResult<BackendSettings> {
    let base_url = match req.params.get("baseUrl") {
        None => current.base_url.clone(),
        Some(v) if v.is_null() => None,
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(err(&req.id, "bad_params", "baseUrl must be a string or null", None));
            };
            let t = s.trim();
            if t.is_empty() {
                None
            } else if t.starts_with("http://") || t.starts_with("https://") {
                Some(t.trim_end_matches('/').to_string())
            } else {
                return Err(err(
                    &req.id,
                    "bad_params",
                    "baseUrl must start with http:// or https://",
                    None,
                ));
            }
        }
    };
    let timeout_ms = match req.params.get("timeoutMs") {
        None => current.timeout_ms,
        Some(v) if v.is_null() => current.timeout_ms,
        Some(v) => match v.as_u64() {
            Some(n) if n > 0 => n,
            _ => {
                return Err(err(
                    &req.id,
                    "bad_params",
                    "timeoutMs must be a positive integer",
                    None,
                ))
            }
        },
    };
    let token = match req.params.get("token") {
        None => current.token.clone(),
        Some(v) if v.is_null() => None,
        Some(v) => match v.as_str() {
            Some(s) => Some(s.to_string()),
            None => return Err(err(&req.id, "bad_params", "token must be a string", None)),
        },
    };
    Ok(BackendSettings {
        base_url,
        timeout_ms,
        token,
    })
}

fn handle_backend_configure(state: &mut AppState, req: &Request) -> serde_json::Value {
    let settings = match parse_backend_settings(req, &state.backend_settings) {
        Ok(s) => s,
        Err(e) => return e,
    };

    let mut persisted = false;
    if let Ok(conn) = db_conn(state, req) {
        let value = match serde_json::to_value(&settings) {
            Ok(v) => v,
            Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
        };
        if let Err(e) = db::settings_set_json(conn, BACKEND_KEY, &value) {
            return db_err(&req.id, "db_update_failed", e);
        }
        persisted = true;
    }

    if let Err(e) = state.set_backend(settings) {
        return err(&req.id, "backend_unavailable", format!("{e:#}"), None);
    }
    info!(
        backend = state.backend.name(),
        base_url = ?state.backend_settings.base_url,
        "backend configured"
    );
    ok(
        &req.id,
        json!({
            "backend": state.backend.name(),
            "baseUrl": state.backend_settings.base_url,
            "timeoutMs": state.backend_settings.timeout_ms,
            "persisted": persisted,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "backend.configure" => Some(handle_backend_configure(state, req)),
        _ => None,
    }
}
