use crate::db;
use crate::filter::filter;
use crate::ipc::error::{db_err, err, ok};
use crate::ipc::helpers::{aggregate_view, db_conn, load_roster, optional_str, view_filter};
use crate::ipc::types::{AppState, Request};
use crate::roster::RosterImport;
use serde_json::json;
use std::collections::HashSet;
use tracing::info;

/// Reference problems the database would not catch on its own.
fn check_import(data: &RosterImport) -> Vec<String> {
    let mut problems = Vec::new();
    let mut seen = HashSet::new();
    for s in &data.students {
        if !seen.insert(s.id.as_str()) {
            problems.push(format!("duplicate student id {}", s.id));
        }
        if s.id.trim().is_empty() || s.name.trim().is_empty() {
            problems.push(format!("student {:?} needs an id and a name", s.id));
        }
    }
    for s in &data.subjects {
        if s.id.trim().is_empty() || s.class_id.trim().is_empty() {
            problems.push(format!("subject {:?} needs an id and a classId", s.id));
        }
    }
    problems
}

fn handle_roster_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let data: RosterImport = match serde_json::from_value(req.params.clone()) {
        Ok(d) => d,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    if data.is_empty() {
        return err(&req.id, "bad_params", "nothing to import", None);
    }
    let problems = check_import(&data);
    if !problems.is_empty() {
        return err(
            &req.id,
            "bad_params",
            "roster has invalid entries",
            Some(json!({ "problems": problems })),
        );
    }

    match db::import_roster(conn, &data) {
        Ok(counts) => {
            info!(
                students = counts.students,
                subjects = counts.subjects,
                classes = counts.classes,
                "roster imported"
            );
            // Open elective sessions hold catalogs built from the old subjects.
            state.electives.clear();
            ok(&req.id, json!({ "imported": counts }))
        }
        Err(e) => db_err(&req.id, "db_insert_failed", e),
    }
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let class_id = match optional_str(req, "classId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let f = match view_filter(req) {
        Ok(f) => f,
        Err(e) => return e,
    };
    let mut roster = match load_roster(conn, req) {
        Ok(r) => r,
        Err(e) => return e,
    };
    if let Some(cid) = class_id.as_deref() {
        roster.retain_students(|s| s.class_id == cid);
    }

    let agg = aggregate_view(&roster, &state.store);
    let rows: Vec<serde_json::Value> = filter(&agg.students, &f)
        .into_iter()
        .filter_map(|summary| {
            let st = roster.student(&summary.student_id)?;
            Some(json!({
                "id": st.id,
                "classId": st.class_id,
                "batchId": st.batch_id,
                "rollNo": st.roll_no,
                "hallTicket": st.hall_ticket,
                "name": st.name,
                "email": st.email,
                "mobile": st.mobile,
                "defaulter": st.defaulter,
                "submissionPercentage": summary.submission_percentage,
                "categories": summary.categories,
            }))
        })
        .collect();

    ok(
        &req.id,
        json!({
            "students": rows,
            "total": agg.students.len(),
            "filters": f,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "roster.import" => Some(handle_roster_import(state, req)),
        "students.list" => Some(handle_students_list(state, req)),
        _ => None,
    }
}
