//! The system of record seam: where confirmed submission and elective state
//! lives. `HttpBackend` talks to the college backend; `OfflineBackend` makes
//! the local workspace authoritative.

use crate::elective::ElectiveCatalog;
use crate::error::RemoteError;
use crate::model::{ElectiveCategory, Status, SubmissionRecord, SubmissionType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionQuery {
    pub student_id: Option<String>,
    pub subject_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToggleWrite {
    pub student_id: String,
    pub subject_id: String,
    pub submission_type: SubmissionType,
    pub status: Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElectiveWrite {
    pub student_id: String,
    pub category: ElectiveCategory,
    pub subject_id: String,
    pub faculty_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RemotePick {
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub faculty_id: Option<String>,
}

/// `GET /electives/{student_id}`: current picks plus the offered catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RemoteElectives {
    #[serde(default)]
    pub picks: BTreeMap<ElectiveCategory, RemotePick>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub catalog: Option<ElectiveCatalog>,
}

/// Reads return `None` when the local workspace is the source of truth.
pub trait SystemOfRecord {
    fn name(&self) -> &'static str;

    fn fetch_submissions(
        &self,
        query: &SubmissionQuery,
    ) -> Result<Option<Vec<SubmissionRecord>>, RemoteError>;

    fn confirm_toggle(&self, write: &ToggleWrite) -> Result<(), RemoteError>;

    fn fetch_electives(&self, student_id: &str) -> Result<Option<RemoteElectives>, RemoteError>;

    fn confirm_elective(&self, write: &ElectiveWrite) -> Result<(), RemoteError>;

    fn confirm_lock(&self, student_id: &str) -> Result<(), RemoteError>;
}

/// Accepts every write; nothing to fetch.
#[derive(Debug, Default)]
pub struct OfflineBackend;

impl SystemOfRecord for OfflineBackend {
    fn name(&self) -> &'static str {
        "offline"
    }

    fn fetch_submissions(
        &self,
        _query: &SubmissionQuery,
    ) -> Result<Option<Vec<SubmissionRecord>>, RemoteError> {
        Ok(None)
    }

    fn confirm_toggle(&self, _write: &ToggleWrite) -> Result<(), RemoteError> {
        Ok(())
    }

    fn fetch_electives(&self, _student_id: &str) -> Result<Option<RemoteElectives>, RemoteError> {
        Ok(None)
    }

    fn confirm_elective(&self, _write: &ElectiveWrite) -> Result<(), RemoteError> {
        Ok(())
    }

    fn confirm_lock(&self, _student_id: &str) -> Result<(), RemoteError> {
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Ack {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireRecord {
    student_id: String,
    subject_id: String,
    submission_type: String,
    status: String,
}

/// Interpret a `{success, error?}` write response.
pub fn read_ack(status: u16, body: &str) -> Result<(), RemoteError> {
    let parsed: Result<Ack, _> = serde_json::from_str(body);
    match parsed {
        Ok(Ack { success: true, .. }) if (200..300).contains(&status) => Ok(()),
        Ok(Ack { error, .. }) => Err(RemoteError::Rejected(
            error.unwrap_or_else(|| format!("HTTP {}", status)),
        )),
        Err(_) if !(200..300).contains(&status) => {
            Err(RemoteError::Transport(format!("HTTP {}: {}", status, body.trim())))
        }
        Err(e) => Err(RemoteError::Decode(e.to_string())),
    }
}

/// Decode `GET /submissions`. Accepts a bare array or `{records: [...]}`.
pub fn read_submissions(body: &str) -> Result<Vec<SubmissionRecord>, RemoteError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| RemoteError::Decode(e.to_string()))?;
    let items = match value {
        serde_json::Value::Array(a) => a,
        serde_json::Value::Object(mut o) => match o.remove("records") {
            Some(serde_json::Value::Array(a)) => a,
            _ => return Err(RemoteError::Decode("expected records array".into())),
        },
        _ => return Err(RemoteError::Decode("expected records array".into())),
    };

    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let w: WireRecord =
            serde_json::from_value(item).map_err(|e| RemoteError::Decode(e.to_string()))?;
        let submission_type = SubmissionType::parse(&w.submission_type).ok_or_else(|| {
            RemoteError::Decode(format!("unknown submission_type {}", w.submission_type))
        })?;
        let status = Status::parse(&w.status)
            .ok_or_else(|| RemoteError::Decode(format!("unknown status {}", w.status)))?;
        out.push(SubmissionRecord {
            student_id: w.student_id,
            subject_id: w.subject_id,
            submission_type,
            status,
        });
    }
    Ok(out)
}

pub struct HttpBackend {
    client: reqwest::blocking::Client,
    base_url: reqwest::Url,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout_ms: u64, token: Option<String>) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()?;
        let base_url = reqwest::Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("backend URL cannot take a path: {}", base_url);
        }
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Base URL plus one percent-encoded path segment per entry.
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Transport(format!("bad backend URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authed(&self, rb: reqwest::blocking::RequestBuilder) -> reqwest::blocking::RequestBuilder {
        match &self.token {
            Some(t) => rb.bearer_auth(t),
            None => rb,
        }
    }

    fn send(
        &self,
        rb: reqwest::blocking::RequestBuilder,
    ) -> Result<(u16, String), RemoteError> {
        let resp = self
            .authed(rb)
            .send()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok((status, body))
    }

    fn post<T: Serialize>(&self, segments: &[&str], body: &T) -> Result<(), RemoteError> {
        let url = self.endpoint(segments)?;
        info!(url = %url, "posting to system of record");
        let (status, text) = self.send(self.client.post(url).json(body))?;
        read_ack(status, &text)
    }

    fn get(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<String, RemoteError> {
        let url = self.endpoint(segments)?;
        debug!(url = %url, ?query, "fetching from system of record");
        let mut rb = self.client.get(url);
        if !query.is_empty() {
            rb = rb.query(query);
        }
        let (status, text) = self.send(rb)?;
        if !(200..300).contains(&status) {
            return Err(RemoteError::Transport(format!(
                "HTTP {}: {}",
                status,
                text.trim()
            )));
        }
        Ok(text)
    }
}

impl SystemOfRecord for HttpBackend {
    fn name(&self) -> &'static str {
        "http"
    }

    fn fetch_submissions(
        &self,
        query: &SubmissionQuery,
    ) -> Result<Option<Vec<SubmissionRecord>>, RemoteError> {
        let mut params = Vec::new();
        if let Some(s) = &query.student_id {
            params.push(("student_id", s.as_str()));
        }
        if let Some(s) = &query.subject_id {
            params.push(("subject_id", s.as_str()));
        }
        let body = self.get(&["submissions"], &params)?;
        let records = read_submissions(&body)?;
        info!(count = records.len(), "pulled submission records");
        Ok(Some(records))
    }

    fn confirm_toggle(&self, write: &ToggleWrite) -> Result<(), RemoteError> {
        self.post(&["submissions", "toggle"], write)
    }

    fn fetch_electives(&self, student_id: &str) -> Result<Option<RemoteElectives>, RemoteError> {
        let body = self.get(&["electives", student_id], &[])?;
        let parsed: RemoteElectives =
            serde_json::from_str(&body).map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(Some(parsed))
    }

    fn confirm_elective(&self, write: &ElectiveWrite) -> Result<(), RemoteError> {
        self.post(&["electives", "select"], write)
    }

    fn confirm_lock(&self, student_id: &str) -> Result<(), RemoteError> {
        self.post(
            &["electives", "lock"],
            &serde_json::json!({ "student_id": student_id }),
        )
    }
}
