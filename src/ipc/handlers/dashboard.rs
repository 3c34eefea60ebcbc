use crate::aggregate::{
    dashboard_statistics, department_statistics, subject_statistics, year_statistics,
    StudentSummary,
};
use crate::error::CoreError;
use crate::filter::filter;
use crate::ipc::error::{core_err, err, ok};
use crate::ipc::handlers::electives::open_session;
use crate::ipc::helpers::{
    aggregate_view, db_conn, load_roster, required_str, view_filter, HandlerResult,
};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;
use serde_json::json;
use std::collections::HashSet;

fn class_teacher_view(state: &AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let class_id = required_str(req, "classId")?;
    let f = view_filter(req)?;
    let mut roster = load_roster(db_conn(state, req)?, req)?;
    let Some(class) = roster.class(&class_id).cloned() else {
        return Err(core_err(&req.id, &CoreError::not_found("class", class_id)));
    };
    roster.retain_students(|s| s.class_id == class_id);
    roster.subjects.retain(|s| s.class_id == class_id);

    let agg = aggregate_view(&roster, &state.store);
    Ok(json!({
        "class": class,
        "batches": roster.batches.iter().filter(|b| b.class_id == class_id).collect::<Vec<_>>(),
        "subjects": roster.subjects,
        "statistics": dashboard_statistics(&agg.students),
        "students": filter(&agg.students, &f),
        "filters": f,
    }))
}

fn faculty_view(state: &AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let faculty_id = required_str(req, "facultyId")?;
    let f = view_filter(req)?;
    let roster = load_roster(db_conn(state, req)?, req)?;
    let agg = aggregate_view(&roster, &state.store);

    let taught: HashSet<&str> = roster
        .subjects
        .iter()
        .filter(|s| s.offers_faculty(&faculty_id))
        .map(|s| s.id.as_str())
        .collect();
    let students: Vec<&StudentSummary> = agg
        .students
        .iter()
        .filter(|s| s.subjects.iter().any(|p| taught.contains(p.subject_id.as_str())))
        .collect();
    let visible: Vec<&StudentSummary> = students
        .iter()
        .copied()
        .filter(|s| f.matches(s))
        .collect();

    Ok(json!({
        "subjects": subject_statistics(&roster, &agg, Some(&faculty_id)),
        "statistics": dashboard_statistics(students.iter().copied()),
        "students": visible,
        "filters": f,
    }))
}

fn hod_view(state: &AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let department_id = required_str(req, "departmentId")?;
    let roster = load_roster(db_conn(state, req)?, req)?;
    let Some(department) = roster.departments.iter().find(|d| d.id == department_id).cloned()
    else {
        return Err(core_err(
            &req.id,
            &CoreError::not_found("department", department_id),
        ));
    };
    let agg = aggregate_view(&roster, &state.store);
    let class_ids: HashSet<&str> = roster
        .classes
        .iter()
        .filter(|c| c.department_id.as_deref() == Some(department_id.as_str()))
        .map(|c| c.id.as_str())
        .collect();
    let members = agg
        .students
        .iter()
        .filter(|s| class_ids.contains(s.class_id.as_str()));

    Ok(json!({
        "department": department,
        "years": year_statistics(&roster, &agg, Some(&department_id)),
        "statistics": dashboard_statistics(members),
    }))
}

fn director_view(state: &AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let roster = load_roster(db_conn(state, req)?, req)?;
    let agg = aggregate_view(&roster, &state.store);
    Ok(json!({
        "departments": department_statistics(&roster, &agg),
        "years": year_statistics(&roster, &agg, None),
        "statistics": dashboard_statistics(&agg.students),
    }))
}

fn student_view(state: &mut AppState, req: &Request) -> HandlerResult<serde_json::Value> {
    let student_id = required_str(req, "studentId")?;
    let mut roster = load_roster(db_conn(state, req)?, req)?;
    roster.retain_students(|s| s.id == student_id);
    let agg = aggregate_view(&roster, &state.store);
    let Some(summary) = agg.student(&student_id) else {
        return Err(core_err(&req.id, &CoreError::not_found("student", student_id)));
    };
    let summary = json!(summary);
    let electives = open_session(state, req, &student_id)?;
    Ok(json!({
        "student": summary,
        "electives": electives,
    }))
}

fn handle_dashboard_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let raw = match required_str(req, "role") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(role) = Role::parse(&raw) else {
        return err(&req.id, "bad_params", format!("unknown role: {}", raw), None);
    };

    let view = match role {
        Role::ClassTeacher => class_teacher_view(state, req),
        Role::Faculty => faculty_view(state, req),
        Role::Hod => hod_view(state, req),
        Role::Director => director_view(state, req),
        Role::Student => student_view(state, req),
    };
    match view {
        Ok(mut body) => {
            body["role"] = json!(role);
            body["canToggle"] = json!(role.may_mark_submissions());
            body["canEditElectives"] = json!(role.may_edit_electives());
            ok(&req.id, body)
        }
        Err(e) => e,
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "dashboard.open" => Some(handle_dashboard_open(state, req)),
        _ => None,
    }
}
