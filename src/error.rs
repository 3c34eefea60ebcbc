use crate::model::{ElectiveCategory, Role, SubjectType, SubmissionType};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// One precise reason a transition was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldIssue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ElectiveCategory>,
    pub field: String,
    pub reason: String,
}

impl FieldIssue {
    pub fn new(
        category: Option<ElectiveCategory>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            category,
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("backend rejected the write: {0}")]
    Rejected(String),
    #[error("backend unreachable: {0}")]
    Transport(String),
    #[error("unreadable backend response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {}", summarize(.issues))]
    Validation { issues: Vec<FieldIssue> },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("{submission_type} does not apply to a {} subject (defaulter={defaulter})", .subject_type.as_str())]
    NotApplicable {
        submission_type: SubmissionType,
        subject_type: SubjectType,
        defaulter: bool,
    },

    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },

    #[error("role {} may not {action}", .role.as_str())]
    Forbidden { role: Role, action: &'static str },

    #[error(transparent)]
    Backend(RemoteError),
}

pub type CoreResult<T> = Result<T, CoreError>;

fn summarize(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(|i| match i.category {
            Some(c) => format!("{} {}: {}", c, i.field, i.reason),
            None => format!("{}: {}", i.field, i.reason),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

impl CoreError {
    pub fn invalid(
        category: Option<ElectiveCategory>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        CoreError::Validation {
            issues: vec![FieldIssue::new(category, field, reason)],
        }
    }

    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            what,
            id: id.into(),
        }
    }

    /// An explicit refusal from the backend is a conflict; anything else is an outage.
    pub fn from_remote(e: RemoteError) -> Self {
        match e {
            RemoteError::Rejected(message) => CoreError::Conflict { message },
            other => CoreError::Backend(other),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation { .. } => "validation_failed",
            CoreError::Conflict { .. } => "conflict",
            CoreError::NotApplicable { .. } => "not_applicable",
            CoreError::NotFound { .. } => "not_found",
            CoreError::Forbidden { .. } => "forbidden",
            CoreError::Backend(_) => "backend_unavailable",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            CoreError::Validation { issues } => Some(json!({ "issues": issues })),
            CoreError::NotApplicable {
                submission_type,
                subject_type,
                defaulter,
            } => Some(json!({
                "submissionType": submission_type,
                "subjectType": subject_type,
                "defaulter": defaulter,
            })),
            CoreError::NotFound { what, id } => Some(json!({ "kind": what, "id": id })),
            CoreError::Forbidden { role, action } => {
                Some(json!({ "role": role.as_str(), "action": action }))
            }
            CoreError::Conflict { .. } | CoreError::Backend(_) => None,
        }
    }
}
