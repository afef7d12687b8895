mod common;

use axum::http::StatusCode;
use common::{
    admin_payload, generate_unique_email, setup_test_app, student_payload, teacher_payload,
};
use serde_json::{Value, json};

/// Register a pending student and return (profile id, identity id).
async fn pending_student(app: &common::TestApp) -> (String, String) {
    let email = generate_unique_email();
    let token = app.register_and_login(student_payload(&email)).await;
    let profile = app.own_profile(&token).await;
    assert_eq!(profile["status"], "pending");
    (
        profile["id"].as_str().unwrap().to_string(),
        profile["identity_id"].as_str().unwrap().to_string(),
    )
}

async fn admin_session(app: &common::TestApp) -> (String, Value) {
    let email = generate_unique_email();
    let token = app.register_and_login(admin_payload(&email)).await;
    let profile = app.own_profile(&token).await;
    (token, profile)
}

/// An approved teacher: registered pending, then approved by a fresh admin.
async fn approved_teacher(app: &common::TestApp) -> String {
    let email = generate_unique_email();
    let token = app.register_and_login(teacher_payload(&email)).await;
    let profile = app.own_profile(&token).await;

    let (admin_token, _) = admin_session(app).await;
    let (status, _) = app
        .request(
            "POST",
            &format!("/api/approvals/{}/approve", profile["id"].as_str().unwrap()),
            Some(&admin_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    token
}

#[tokio::test]
async fn test_admin_approves_pending_student() {
    let app = setup_test_app();
    let (profile_id, _) = pending_student(&app).await;
    let (admin_token, admin_profile) = admin_session(&app).await;

    let (status, body) = app
        .request(
            "POST",
            &format!("/api/approvals/{profile_id}/approve"),
            Some(&admin_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");
    assert_eq!(body["approved_by"], admin_profile["identity_id"]);
    assert!(!body["approved_at"].is_null());
    assert!(body["rejected_by"].is_null());

    // Exactly one audit row, action=approve.
    let (status, actions) = app
        .request(
            "GET",
            &format!("/api/approvals/{profile_id}/actions"),
            Some(&admin_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let actions = actions.as_array().unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0]["action"], "approve");
    assert_eq!(actions[0]["approver_role"], "admin");
}

#[tokio::test]
async fn test_teacher_may_approve_student() {
    let app = setup_test_app();
    let teacher_token = approved_teacher(&app).await;
    let (profile_id, _) = pending_student(&app).await;

    let (status, body) = app
        .request(
            "POST",
            &format!("/api/approvals/{profile_id}/approve"),
            Some(&teacher_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "approved");
}

#[tokio::test]
async fn test_teacher_cannot_approve_teacher() {
    let app = setup_test_app();
    let approver_token = approved_teacher(&app).await;

    // A second teacher, still pending.
    let email = generate_unique_email();
    let target_token = app.register_and_login(teacher_payload(&email)).await;
    let target = app.own_profile(&target_token).await;
    let target_id = target["id"].as_str().unwrap();

    let (status, body) = app
        .request(
            "POST",
            &format!("/api/approvals/{target_id}/approve"),
            Some(&approver_token),
            None,
        )
        .await;
    // Role mismatch is a policy denial, not a not-found.
    assert_eq!(status, StatusCode::FORBIDDEN, "unexpected: {body}");

    // Nothing changed and no audit row was appended.
    let unchanged = app.own_profile(&target_token).await;
    assert_eq!(unchanged["status"], "pending");
    assert!(unchanged["approved_by"].is_null());

    let (admin_token, _) = admin_session(&app).await;
    let (_, actions) = app
        .request(
            "GET",
            &format!("/api/approvals/{target_id}/actions"),
            Some(&admin_token),
            None,
        )
        .await;
    assert_eq!(actions.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_reject_sets_reason_and_audit() {
    let app = setup_test_app();
    let (profile_id, _) = pending_student(&app).await;
    let (admin_token, admin_profile) = admin_session(&app).await;

    let (status, body) = app
        .request(
            "POST",
            &format!("/api/approvals/{profile_id}/reject"),
            Some(&admin_token),
            Some(json!({ "reason": "incomplete guardian info" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["rejected_by"], admin_profile["identity_id"]);
    assert_eq!(body["rejection_reason"], "incomplete guardian info");
    assert!(!body["rejected_at"].is_null());
    assert!(body["approved_by"].is_null());

    let (_, actions) = app
        .request(
            "GET",
            &format!("/api/approvals/{profile_id}/actions"),
            Some(&admin_token),
            None,
        )
        .await;
    let actions = actions.as_array().unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0]["action"], "reject");
    assert_eq!(actions[0]["reason"], "incomplete guardian info");
}

#[tokio::test]
async fn test_reject_requires_reason() {
    let app = setup_test_app();
    let (profile_id, _) = pending_student(&app).await;
    let (admin_token, _) = admin_session(&app).await;

    let (status, _) = app
        .request(
            "POST",
            &format!("/api/approvals/{profile_id}/reject"),
            Some(&admin_token),
            Some(json!({ "reason": "" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = app
        .request(
            "POST",
            &format!("/api/approvals/{profile_id}/reject"),
            Some(&admin_token),
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_decided_profile_rejects_further_transitions() {
    let app = setup_test_app();
    let (profile_id, _) = pending_student(&app).await;
    let (admin_token, _) = admin_session(&app).await;

    let (status, _) = app
        .request(
            "POST",
            &format!("/api/approvals/{profile_id}/approve"),
            Some(&admin_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    // Approve again: rejected as a no-op, not silently ignored.
    let (status, _) = app
        .request(
            "POST",
            &format!("/api/approvals/{profile_id}/approve"),
            Some(&admin_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Reject after approve: same.
    let (status, _) = app
        .request(
            "POST",
            &format!("/api/approvals/{profile_id}/reject"),
            Some(&admin_token),
            Some(json!({ "reason": "too late" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // Still exactly one audit row.
    let (_, actions) = app
        .request(
            "GET",
            &format!("/api/approvals/{profile_id}/actions"),
            Some(&admin_token),
            None,
        )
        .await;
    assert_eq!(actions.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_students_cannot_reach_approvals() {
    let app = setup_test_app();
    let email = generate_unique_email();
    let student_token = app.register_and_login(student_payload(&email)).await;
    let (profile_id, _) = pending_student(&app).await;

    let (status, _) = app
        .request(
            "POST",
            &format!("/api/approvals/{profile_id}/approve"),
            Some(&student_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .request("GET", "/api/profiles/pending", Some(&student_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_pending_listing_is_scoped_by_role() {
    let app = setup_test_app();
    pending_student(&app).await;
    pending_student(&app).await;

    // One pending teacher.
    let email = generate_unique_email();
    app.register_and_login(teacher_payload(&email)).await;

    let (admin_token, _) = admin_session(&app).await;
    let (_, body) = app
        .request("GET", "/api/profiles/pending", Some(&admin_token), None)
        .await;
    assert_eq!(body["meta"]["total"], 3);

    let teacher_token = approved_teacher(&app).await;
    let (_, body) = app
        .request("GET", "/api/profiles/pending", Some(&teacher_token), None)
        .await;
    // Teachers see pending students only.
    assert_eq!(body["meta"]["total"], 2);
    assert!(
        body["data"]
            .as_array()
            .unwrap()
            .iter()
            .all(|p| p["role"] == "student")
    );
}

#[tokio::test]
async fn test_bulk_approval_is_best_effort() {
    let app = setup_test_app();
    for _ in 0..3 {
        pending_student(&app).await;
    }
    let email = generate_unique_email();
    app.register_and_login(teacher_payload(&email)).await;

    let (admin_token, _) = admin_session(&app).await;
    let (status, body) = app
        .request(
            "POST",
            "/api/approvals/approve-all",
            Some(&admin_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["approved"], 4);
    assert_eq!(body["failures"].as_array().unwrap().len(), 0);

    // Nothing pending remains; a second sweep approves zero.
    let (_, body) = app
        .request(
            "POST",
            "/api/approvals/approve-all",
            Some(&admin_token),
            None,
        )
        .await;
    assert_eq!(body["approved"], 0);
}

#[tokio::test]
async fn test_concurrent_bulk_approvals_decide_each_row_once() {
    let app = std::sync::Arc::new(setup_test_app());
    for _ in 0..5 {
        pending_student(&app).await;
    }
    let (admin_token, _) = admin_session(&app).await;

    let a = {
        let app = app.clone();
        let token = admin_token.clone();
        tokio::spawn(async move {
            app.request("POST", "/api/approvals/approve-all", Some(&token), None)
                .await
        })
    };
    let b = {
        let app = app.clone();
        let token = admin_token.clone();
        tokio::spawn(async move {
            app.request("POST", "/api/approvals/approve-all", Some(&token), None)
                .await
        })
    };

    let (_, body_a) = a.await.unwrap();
    let (_, body_b) = b.await.unwrap();
    let approved = body_a["approved"].as_u64().unwrap() + body_b["approved"].as_u64().unwrap();
    // Each row is approved exactly once; the losing sweep sees either an
    // empty snapshot or per-row conflicts, never a double transition.
    assert_eq!(approved, 5);

    let (_, body) = app
        .request("GET", "/api/profiles/pending", Some(&admin_token), None)
        .await;
    assert_eq!(body["meta"]["total"], 0);
}

#[tokio::test]
async fn test_concurrent_approve_and_reject_single_winner() {
    let app = std::sync::Arc::new(setup_test_app());
    let (profile_id, _) = pending_student(&app).await;
    let (admin_token, _) = admin_session(&app).await;

    let approve = {
        let app = app.clone();
        let token = admin_token.clone();
        let id = profile_id.clone();
        tokio::spawn(async move {
            app.request("POST", &format!("/api/approvals/{id}/approve"), Some(&token), None)
                .await
        })
    };
    let reject = {
        let app = app.clone();
        let token = admin_token.clone();
        let id = profile_id.clone();
        tokio::spawn(async move {
            app.request(
                "POST",
                &format!("/api/approvals/{id}/reject"),
                Some(&token),
                Some(json!({ "reason": "concurrent sweep" })),
            )
            .await
        })
    };

    let (status_a, _) = approve.await.unwrap();
    let (status_r, _) = reject.await.unwrap();

    // Exactly one of the two writers wins the conditional update.
    let winners = [status_a, status_r]
        .iter()
        .filter(|s| **s == StatusCode::OK)
        .count();
    assert_eq!(winners, 1);

    // The profile landed in exactly one terminal state with a consistent
    // field combination and a single audit row.
    let (_, profile) = app
        .request(
            "GET",
            &format!("/api/profiles/{profile_id}"),
            Some(&admin_token),
            None,
        )
        .await;
    match profile["status"].as_str().unwrap() {
        "approved" => {
            assert!(!profile["approved_by"].is_null());
            assert!(profile["rejected_by"].is_null());
            assert!(profile["rejection_reason"].is_null());
        }
        "rejected" => {
            assert!(!profile["rejected_by"].is_null());
            assert!(profile["approved_by"].is_null());
        }
        other => panic!("unexpected terminal status {other}"),
    }

    let (_, actions) = app
        .request(
            "GET",
            &format!("/api/approvals/{profile_id}/actions"),
            Some(&admin_token),
            None,
        )
        .await;
    assert_eq!(actions.as_array().unwrap().len(), 1);
}
