use crate::db;
use crate::error::{CoreError, RemoteError};
use crate::ipc::error::{core_err, db_err, err, ok};
use crate::ipc::helpers::{
    aggregate_view, db_conn, load_roster, optional_role, optional_str, required_str,
    submission_key,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{Status, SubmissionKey, SubmissionRecord, SubmissionType};
use crate::remote::SubmissionQuery;
use crate::store::{SettleOutcome, SubmissionStore};
use crate::toggle::{write_for, ToggleController};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

fn parse_record(v: &serde_json::Value) -> Option<SubmissionRecord> {
    let text = |k: &str| {
        v.get(k)
            .and_then(|x| x.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    };
    Some(SubmissionRecord {
        student_id: text("studentId")?,
        subject_id: text("subjectId")?,
        submission_type: SubmissionType::parse(&text("submissionType")?)?,
        status: Status::parse(&text("status")?)?,
    })
}

fn persist_confirmed(state: &AppState, key: &SubmissionKey, out: &SettleOutcome) {
    if !out.newly_confirmed {
        return;
    }
    let Some(conn) = state.db.as_ref() else {
        return;
    };
    let record = SubmissionRecord {
        student_id: key.student_id.clone(),
        subject_id: key.subject_id.clone(),
        submission_type: key.submission_type,
        status: out.confirmed,
    };
    if let Err(e) = db::upsert_submission(conn, &record) {
        warn!(key = %key, error = %e, "confirmed value not persisted");
    }
}

fn outcome_json(out: &SettleOutcome) -> serde_json::Value {
    json!({
        "status": out.status,
        "confirmed": out.confirmed,
        "superseded": out.superseded,
    })
}

/// A refused toggle answers with the error plus the value after rollback.
fn refused(
    req: &Request,
    e: &CoreError,
    store: &SubmissionStore,
    key: &SubmissionKey,
) -> serde_json::Value {
    let mut details = e.details().unwrap_or_else(|| json!({}));
    details["status"] = json!(store.status(key));
    details["confirmed"] = json!(store.confirmed_status(key));
    details["rolledBack"] = json!(matches!(e, CoreError::Conflict { .. } | CoreError::Backend(_)));
    err(&req.id, e.code(), e.to_string(), Some(details))
}

fn handle_submissions_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(raw) = req.params.get("records").and_then(|v| v.as_array()) else {
        return err(&req.id, "bad_params", "missing records", None);
    };
    let mut records = Vec::with_capacity(raw.len());
    let mut skipped = 0_usize;
    for v in raw {
        match parse_record(v) {
            Some(r) => records.push(r),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(skipped, "submission import skipped malformed records");
    }

    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    if let Err(e) = db::upsert_submissions(conn, &records) {
        return db_err(&req.id, "db_insert_failed", e);
    }
    let imported = records.len();
    for r in records {
        state.store.load_confirmed(r);
    }
    info!(imported, "submission records imported");
    ok(&req.id, json!({ "imported": imported, "skipped": skipped }))
}

fn handle_submissions_sync(state: &mut AppState, req: &Request) -> serde_json::Value {
    let query = SubmissionQuery {
        student_id: match optional_str(req, "studentId") {
            Ok(v) => v,
            Err(e) => return e,
        },
        subject_id: match optional_str(req, "subjectId") {
            Ok(v) => v,
            Err(e) => return e,
        },
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let fetched = match state.backend.fetch_submissions(&query) {
        Ok(v) => v,
        Err(e) => return core_err(&req.id, &CoreError::Backend(e)),
    };
    let Some(records) = fetched else {
        return ok(
            &req.id,
            json!({ "source": "workspace", "records": state.store.len() }),
        );
    };
    if let Err(e) = db::upsert_submissions(conn, &records) {
        return db_err(&req.id, "db_insert_failed", e);
    }
    let count = records.len();
    for r in records {
        state.store.load_confirmed(r);
    }
    info!(count, backend = state.backend.name(), "submissions synced");
    ok(
        &req.id,
        json!({ "source": state.backend.name(), "records": count }),
    )
}

fn handle_submissions_for_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let mut roster = match load_roster(conn, req) {
        Ok(r) => r,
        Err(e) => return e,
    };
    roster.retain_students(|s| s.id == student_id);
    let agg = aggregate_view(&roster, &state.store);
    match agg.student(&student_id) {
        Some(summary) => ok(&req.id, json!({ "student": summary })),
        None => core_err(&req.id, &CoreError::not_found("student", student_id)),
    }
}

fn handle_submissions_toggle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let key = match submission_key(req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    let role = match optional_role(req) {
        Ok(r) => r,
        Err(e) => return e,
    };
    let roster = match db_conn(state, req).and_then(|conn| load_roster(conn, req)) {
        Ok(r) => r,
        Err(e) => return e,
    };

    let outcome = ToggleController::new(&mut state.store).toggle(
        &roster,
        key.clone(),
        role,
        &*state.backend,
    );
    match outcome {
        Ok(out) => {
            persist_confirmed(state, &key, &out);
            ok(&req.id, outcome_json(&out))
        }
        Err(e) => refused(req, &e, &state.store, &key),
    }
}

fn handle_toggle_begin(state: &mut AppState, req: &Request) -> serde_json::Value {
    let key = match submission_key(req) {
        Ok(k) => k,
        Err(e) => return e,
    };
    let role = match optional_role(req) {
        Ok(r) => r,
        Err(e) => return e,
    };
    let roster = match db_conn(state, req).and_then(|conn| load_roster(conn, req)) {
        Ok(r) => r,
        Err(e) => return e,
    };

    let pending = match ToggleController::new(&mut state.store).begin(&roster, key, role) {
        Ok(p) => p,
        Err(e) => return core_err(&req.id, &e),
    };
    let ticket = Uuid::new_v4().to_string();
    let result = json!({
        "ticket": ticket,
        "previous": pending.previous,
        "status": pending.next,
        "write": write_for(&pending),
    });
    state.pending.insert(ticket, pending);
    ok(&req.id, result)
}

fn handle_toggle_settle(state: &mut AppState, req: &Request) -> serde_json::Value {
    let ticket = match required_str(req, "ticket") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(success) = req.params.get("success").and_then(|v| v.as_bool()) else {
        return err(&req.id, "bad_params", "missing success", None);
    };
    let Some(pending) = state.pending.remove(&ticket) else {
        return core_err(&req.id, &CoreError::not_found("ticket", ticket));
    };

    let answer = if success {
        Ok(())
    } else {
        let message = req
            .params
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("rejected by system of record");
        Err(RemoteError::Rejected(message.to_string()))
    };
    let mut ctl = ToggleController::new(&mut state.store);
    match ctl.settle(&pending, answer) {
        Ok(out) => {
            persist_confirmed(state, &pending.key, &out);
            ok(&req.id, outcome_json(&out))
        }
        Err(e) => refused(req, &e, &state.store, &pending.key),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "submissions.import" => Some(handle_submissions_import(state, req)),
        "submissions.sync" => Some(handle_submissions_sync(state, req)),
        "submissions.forStudent" => Some(handle_submissions_for_student(state, req)),
        "submissions.toggle" => Some(handle_submissions_toggle(state, req)),
        "submissions.toggleBegin" => Some(handle_toggle_begin(state, req)),
        "submissions.toggleSettle" => Some(handle_toggle_settle(state, req)),
        _ => None,
    }
}
