mod test_support;

use serde_json::json;
use test_support::{error_code, request, request_ok, seeded_workspace, spawn_sidecar};

fn status_of(detail: &serde_json::Value, subject_id: &str, submission_type: &str) -> String {
    detail["student"]["subjects"]
        .as_array()
        .expect("subjects")
        .iter()
        .find(|s| s["subjectId"] == subject_id)
        .and_then(|s| {
            s["submissions"]
                .as_array()
                .expect("submissions")
                .iter()
                .find(|t| t["submissionType"] == submission_type)
        })
        .and_then(|t| t["status"].as_str())
        .expect("status present")
        .to_string()
}

#[test]
fn offline_toggle_confirms_and_survives_reopen() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let workspace = seeded_workspace(&mut stdin, &mut reader, "termworkd-toggle-offline");

    let out = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "submissions.toggle",
        json!({ "studentId": "s1", "subjectId": "dsa", "submissionType": "CIE", "role": "faculty" }),
    );
    assert_eq!(out["status"], "completed");
    assert_eq!(out["confirmed"], "completed");
    drop(stdin);
    let _ = child.wait();

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let opened = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    assert_eq!(opened["records"], 1);
    let detail = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "submissions.forStudent",
        json!({ "studentId": "s1" }),
    );
    assert_eq!(status_of(&detail, "dsa", "cie"), "completed");
    assert_eq!(status_of(&detail, "dsa", "ta"), "pending");
    // theory CIE+TA plus practical TA
    assert_eq!(detail["student"]["applicableCount"], 3);
    assert_eq!(detail["student"]["submissionPercentage"], 33);
    drop(stdin);
    let _ = child.wait();
}

#[test]
fn inapplicable_and_forbidden_toggles_change_nothing() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = seeded_workspace(&mut stdin, &mut reader, "termworkd-toggle-refused");

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "submissions.toggle",
        json!({ "studentId": "s2", "subjectId": "dsa-lab", "submissionType": "cie" }),
    );
    assert_eq!(error_code(&resp), "not_applicable");
    assert_eq!(resp["error"]["details"]["subjectType"], "practical");

    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "submissions.toggle",
        json!({ "studentId": "s1", "subjectId": "dsa", "submissionType": "defaulter_work" }),
    );
    assert_eq!(error_code(&resp), "not_applicable");

    let resp = request(
        &mut stdin,
        &mut reader,
        "3",
        "submissions.toggle",
        json!({ "studentId": "s1", "subjectId": "dsa", "submissionType": "ta", "role": "hod" }),
    );
    assert_eq!(error_code(&resp), "forbidden");

    let resp = request(
        &mut stdin,
        &mut reader,
        "4",
        "submissions.toggle",
        json!({ "studentId": "ghost", "subjectId": "dsa", "submissionType": "ta" }),
    );
    assert_eq!(error_code(&resp), "not_found");

    let detail = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "submissions.forStudent",
        json!({ "studentId": "s1" }),
    );
    assert_eq!(detail["student"]["completedCount"], 0);

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn two_phase_rejection_rolls_back_to_pending() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = seeded_workspace(&mut stdin, &mut reader, "termworkd-toggle-two-phase");

    let begun = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "submissions.toggleBegin",
        json!({ "studentId": "s1", "subjectId": "dsa", "submissionType": "TA" }),
    );
    assert_eq!(begun["previous"], "pending");
    assert_eq!(begun["status"], "completed");
    assert_eq!(begun["write"]["submission_type"], "ta");
    let ticket = begun["ticket"].as_str().expect("ticket").to_string();

    // Readers see the optimistic value while the write is outstanding.
    let detail = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "submissions.forStudent",
        json!({ "studentId": "s1" }),
    );
    assert_eq!(status_of(&detail, "dsa", "ta"), "completed");

    let settled = request(
        &mut stdin,
        &mut reader,
        "3",
        "submissions.toggleSettle",
        json!({ "ticket": ticket, "success": false, "error": "network down" }),
    );
    assert_eq!(error_code(&settled), "conflict");
    assert_eq!(settled["error"]["details"]["status"], "pending");
    assert_eq!(settled["error"]["details"]["rolledBack"], true);

    let detail = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "submissions.forStudent",
        json!({ "studentId": "s1" }),
    );
    assert_eq!(status_of(&detail, "dsa", "ta"), "pending");

    // The ticket is spent.
    let again = request(
        &mut stdin,
        &mut reader,
        "5",
        "submissions.toggleSettle",
        json!({ "ticket": ticket, "success": true }),
    );
    assert_eq!(error_code(&again), "not_found");

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn interleaved_tickets_settle_in_reverse_order() {
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = seeded_workspace(&mut stdin, &mut reader, "termworkd-toggle-interleaved");
    let key = json!({ "studentId": "s2", "subjectId": "dsa", "submissionType": "defaulter_work" });

    let first = request_ok(&mut stdin, &mut reader, "1", "submissions.toggleBegin", key.clone());
    let second = request_ok(&mut stdin, &mut reader, "2", "submissions.toggleBegin", key.clone());
    assert_eq!(first["status"], "completed");
    assert_eq!(second["status"], "pending");

    let out = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "submissions.toggleSettle",
        json!({ "ticket": second["ticket"], "success": true }),
    );
    assert_eq!(out["confirmed"], "pending");
    let out = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "submissions.toggleSettle",
        json!({ "ticket": first["ticket"], "success": true }),
    );
    // The older confirmation must not overwrite the newer one.
    assert_eq!(out["status"], "pending");
    assert_eq!(out["confirmed"], "pending");

    let health = request_ok(&mut stdin, &mut reader, "5", "health", json!({}));
    assert_eq!(health["inFlight"], 0);
    assert_eq!(health["pendingTickets"], 0);

    drop(stdin);
    let _ = child.wait();
}
