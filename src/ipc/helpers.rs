use crate::aggregate::{aggregate, Aggregate};
use crate::db;
use crate::filter::{parse_view_filter, ViewFilter};
use crate::ipc::error::{core_err, db_err, err};
use crate::ipc::types::{AppState, Request};
use crate::model::{ElectiveCategory, Role, SubmissionKey, SubmissionType};
use crate::roster::Roster;
use crate::store::SubmissionStore;
use rusqlite::Connection;
use tracing::warn;

pub type HandlerResult<T> = Result<T, serde_json::Value>;

pub fn required_str(req: &Request, key: &str) -> HandlerResult<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Absent, null and blank all read as `None`.
pub fn optional_str(req: &Request, key: &str) -> HandlerResult<Option<String>> {
    match req.params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => match v.as_str() {
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => Ok(Some(s.trim().to_string())),
            None => Err(err(
                &req.id,
                "bad_params",
                format!("{} must be a string", key),
                None,
            )),
        },
    }
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> HandlerResult<&'a Connection> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn optional_role(req: &Request) -> HandlerResult<Option<Role>> {
    match optional_str(req, "role")? {
        None => Ok(None),
        Some(raw) => Role::parse(&raw).map(Some).ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("unknown role: {}", raw),
                None,
            )
        }),
    }
}

pub fn required_category(req: &Request) -> HandlerResult<ElectiveCategory> {
    let raw = required_str(req, "category")?;
    ElectiveCategory::parse(&raw).ok_or_else(|| {
        err(
            &req.id,
            "bad_params",
            format!("category must be MDM, OE or PE (got {})", raw),
            None,
        )
    })
}

pub fn submission_key(req: &Request) -> HandlerResult<SubmissionKey> {
    let student_id = required_str(req, "studentId")?;
    let subject_id = required_str(req, "subjectId")?;
    let raw = required_str(req, "submissionType")?;
    let Some(submission_type) = SubmissionType::parse(&raw) else {
        return Err(err(
            &req.id,
            "bad_params",
            format!("unknown submissionType: {}", raw),
            None,
        ));
    };
    Ok(SubmissionKey::new(student_id, subject_id, submission_type))
}

pub fn view_filter(req: &Request) -> HandlerResult<ViewFilter> {
    parse_view_filter(req.params.get("filters")).map_err(|e| core_err(&req.id, &e))
}

pub fn load_roster(conn: &Connection, req: &Request) -> HandlerResult<Roster> {
    db::load_roster(conn).map_err(|e| db_err(&req.id, "db_query_failed", e))
}

/// Aggregate the current optimistic view of `store` over `roster`. Records of
/// students scoped out of `roster` are left out before aggregation.
pub fn aggregate_view(roster: &Roster, store: &SubmissionStore) -> Aggregate {
    let records = store.records().filter(|r| roster.in_scope(&r.student_id));
    let agg = aggregate(roster, records);
    if agg.skipped_records > 0 {
        warn!(skipped = agg.skipped_records, "aggregation skipped unusable records");
    }
    agg
}

/// Restrict the roster to one class, or to the classes of one year
/// (optionally within a department). Returns the class id when scoped to one.
pub fn scope_roster(req: &Request, roster: &mut Roster) -> HandlerResult<Option<String>> {
    if let Some(class_id) = optional_str(req, "classId")? {
        if roster.class(&class_id).is_none() {
            return Err(err(
                &req.id,
                "not_found",
                format!("class not found: {}", class_id),
                None,
            ));
        }
        roster.retain_students(|s| s.class_id == class_id);
        return Ok(Some(class_id));
    }
    let year = match req.params.get("year") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => Some(v.as_i64().ok_or_else(|| {
            err(&req.id, "bad_params", "year must be an integer", None)
        })?),
    };
    let department_id = optional_str(req, "departmentId")?;
    match (year, department_id) {
        (Some(y), dept) => {
            let ids = roster.class_ids_for_year(y, dept.as_deref());
            roster.retain_students(|s| ids.contains(&s.class_id));
        }
        (None, Some(dept)) => {
            let ids: std::collections::HashSet<String> = roster
                .classes
                .iter()
                .filter(|c| c.department_id.as_deref() == Some(dept.as_str()))
                .map(|c| c.id.clone())
                .collect();
            roster.retain_students(|s| ids.contains(&s.class_id));
        }
        (None, None) => {}
    }
    Ok(None)
}
