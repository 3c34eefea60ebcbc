use crate::db;
use crate::elective::{
    check_role, ElectiveCatalog, ElectiveController, ElectivePick, ElectiveSelection,
};
use crate::error::CoreError;
use crate::ipc::error::{core_err, db_err, err, ok};
use crate::ipc::helpers::{
    db_conn, load_roster, optional_role, required_category, required_str, HandlerResult,
};
use crate::ipc::types::{AppState, ElectiveSession, Request};
use serde_json::json;
use tracing::{info, warn};

/// Load a student's selection and catalog, preferring the system of record
/// and falling back to the workspace when it has nothing to say.
fn load_session(
    state: &AppState,
    req: &Request,
    student_id: &str,
) -> HandlerResult<ElectiveSession> {
    let conn = db_conn(state, req)?;
    let roster = load_roster(conn, req)?;
    let Some(student) = roster.student(student_id) else {
        return Err(core_err(&req.id, &CoreError::not_found("student", student_id)));
    };
    let local_catalog = ElectiveCatalog::from_subjects(&roster.subjects, &student.class_id);

    let remote = state
        .backend
        .fetch_electives(student_id)
        .map_err(|e| core_err(&req.id, &CoreError::Backend(e)))?;
    match remote {
        Some(r) => {
            let mut selection = ElectiveSelection::new(student_id);
            selection.locked = r.locked;
            for (category, pick) in r.picks {
                selection.picks.insert(
                    category,
                    ElectivePick {
                        subject_id: pick.subject_id,
                        faculty_id: pick.faculty_id,
                    },
                );
            }
            if let Err(e) = db::save_elective_selection(conn, &selection) {
                warn!(student_id, error = %e, "remote elective state not cached");
            }
            Ok(ElectiveSession {
                selection,
                catalog: r.catalog.unwrap_or(local_catalog),
            })
        }
        None => {
            let selection = db::load_elective_selection(conn, student_id)
                .map_err(|e| db_err(&req.id, "db_query_failed", e))?;
            Ok(ElectiveSession {
                selection,
                catalog: local_catalog,
            })
        }
    }
}

pub fn session_json(session: &ElectiveSession) -> serde_json::Value {
    json!({
        "selection": session.selection,
        "state": session.selection.state(&session.catalog),
        "offered": session.catalog.offered(),
        "catalog": session.catalog,
        "missingForLock": session.selection.missing_for_lock(&session.catalog),
    })
}

pub fn open_session(
    state: &mut AppState,
    req: &Request,
    student_id: &str,
) -> HandlerResult<serde_json::Value> {
    let session = load_session(state, req, student_id)?;
    let body = session_json(&session);
    state.electives.insert(student_id.to_string(), session);
    Ok(body)
}

fn ensure_session(state: &mut AppState, req: &Request, student_id: &str) -> HandlerResult<()> {
    if !state.electives.contains_key(student_id) {
        let session = load_session(state, req, student_id)?;
        state.electives.insert(student_id.to_string(), session);
    }
    Ok(())
}

fn persist(state: &AppState, student_id: &str) {
    let (Some(conn), Some(session)) = (state.db.as_ref(), state.electives.get(student_id)) else {
        return;
    };
    if let Err(e) = db::save_elective_selection(conn, &session.selection) {
        warn!(student_id, error = %e, "confirmed elective state not persisted");
    }
}

fn handle_electives_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match open_session(state, req, &student_id) {
        Ok(body) => ok(&req.id, body),
        Err(e) => e,
    }
}

#[derive(Clone, Copy)]
enum Transition {
    Subject,
    Faculty,
    Lock,
}

fn handle_transition(state: &mut AppState, req: &Request, t: Transition) -> serde_json::Value {
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match optional_role(req) {
        Ok(role) => {
            if let Err(e) = check_role(role) {
                return core_err(&req.id, &e);
            }
        }
        Err(e) => return e,
    }
    if let Err(e) = ensure_session(state, req, &student_id) {
        return e;
    }

    let remote = &*state.backend;
    let Some(session) = state.electives.get_mut(&student_id) else {
        return core_err(&req.id, &CoreError::not_found("elective session", student_id));
    };
    let ctl = ElectiveController::new(remote);
    let result = match t {
        Transition::Subject => {
            let category = match required_category(req) {
                Ok(c) => c,
                Err(e) => return e,
            };
            let subject_id = match required_str(req, "subjectId") {
                Ok(v) => v,
                Err(e) => return e,
            };
            ctl.select_subject(&mut session.selection, &session.catalog, category, &subject_id)
        }
        Transition::Faculty => {
            let category = match required_category(req) {
                Ok(c) => c,
                Err(e) => return e,
            };
            let faculty_id = match required_str(req, "facultyId") {
                Ok(v) => v,
                Err(e) => return e,
            };
            ctl.select_faculty(&mut session.selection, &session.catalog, category, &faculty_id)
        }
        Transition::Lock => ctl.lock(&mut session.selection, &session.catalog),
    };
    let body = session_json(session);

    match result {
        Ok(()) => {
            if !matches!(t, Transition::Subject) {
                persist(state, &student_id);
                info!(student_id = %student_id, "elective state saved");
            }
            ok(&req.id, body)
        }
        Err(e) => {
            let mut details = e.details().unwrap_or_else(|| json!({}));
            details["electives"] = body;
            err(&req.id, e.code(), e.to_string(), Some(details))
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "electives.open" => Some(handle_electives_open(state, req)),
        "electives.selectSubject" => Some(handle_transition(state, req, Transition::Subject)),
        "electives.selectFaculty" => Some(handle_transition(state, req, Transition::Faculty)),
        "electives.lock" => Some(handle_transition(state, req, Transition::Lock)),
        _ => None,
    }
}
