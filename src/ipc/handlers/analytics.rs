use crate::aggregate::{
    class_statistics, dashboard_statistics, department_statistics, subject_statistics,
    year_statistics,
};
use crate::filter::filter;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    aggregate_view, db_conn, load_roster, optional_str, scope_roster, view_filter,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

/// Statistics over a scope (class, year, department or everything) plus the
/// filtered student rows; statistics always cover the whole scope.
fn handle_analytics_dashboard(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
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
    if let Err(e) = scope_roster(req, &mut roster) {
        return e;
    }

    let agg = aggregate_view(&roster, &state.store);
    let stats = dashboard_statistics(&agg.students);
    let students = filter(&agg.students, &f);
    ok(
        &req.id,
        json!({
            "statistics": stats,
            "students": students,
            "filters": f,
            "skippedRecords": agg.skipped_records,
        }),
    )
}

fn handle_analytics_subjects(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let faculty_id = match optional_str(req, "facultyId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let mut roster = match load_roster(conn, req) {
        Ok(r) => r,
        Err(e) => return e,
    };
    let class_id = match scope_roster(req, &mut roster) {
        Ok(c) => c,
        Err(e) => return e,
    };
    if let Some(class_id) = class_id {
        roster.subjects.retain(|s| s.class_id == class_id);
    }

    let agg = aggregate_view(&roster, &state.store);
    let subjects = subject_statistics(&roster, &agg, faculty_id.as_deref());
    ok(&req.id, json!({ "subjects": subjects }))
}

fn handle_analytics_years(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let department_id = match optional_str(req, "departmentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let roster = match load_roster(conn, req) {
        Ok(r) => r,
        Err(e) => return e,
    };
    let agg = aggregate_view(&roster, &state.store);
    ok(
        &req.id,
        json!({
            "years": year_statistics(&roster, &agg, department_id.as_deref()),
        }),
    )
}

fn handle_analytics_departments(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let roster = match load_roster(conn, req) {
        Ok(r) => r,
        Err(e) => return e,
    };
    let agg = aggregate_view(&roster, &state.store);
    ok(
        &req.id,
        json!({
            "departments": department_statistics(&roster, &agg),
            "classes": class_statistics(&roster, &agg),
            "overall": dashboard_statistics(&agg.students),
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.dashboard" => Some(handle_analytics_dashboard(state, req)),
        "analytics.subjects" => Some(handle_analytics_subjects(state, req)),
        "analytics.years" => Some(handle_analytics_years(state, req)),
        "analytics.departments" => Some(handle_analytics_departments(state, req)),
        _ => None,
    }
}
