// src/team_members_tests.rs

#[cfg(test)]
mod tests {
    use crate::error::AppError;
    use crate::models::{MemberStatus, Role, TeamMember};
    use crate::team_members::{save_member, team_stats};
    use crate::test_support::TestApp;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    fn new_member() -> serde_json::Value {
        json!({
            "name": "Carol Jones",
            "email": "Carol@Example.com",
            "department": "Sales",
            "position": "Account Executive",
            "skills": [" negotiation ", "", "crm"]
        })
    }

    #[tokio::test]
    async fn admin_creates_member_with_normalized_fields() {
        let app = TestApp::new();
        let (_, admin) = app.seed_member("Root", "root@example.com", Role::Admin).await;

        let (status, body) = app
            .send(Method::POST, "/api/team-members", Some(&admin), Some(new_member()))
            .await;

        assert_eq!(status, StatusCode::CREATED, "{}", body);
        assert_eq!(body["message"], "Team member created successfully");
        assert_eq!(body["data"]["email"], "carol@example.com");
        assert_eq!(body["data"]["role"], "employee");
        assert_eq!(body["data"]["status"], "active");
        assert_eq!(body["data"]["skills"], json!(["negotiation", "crm"]));
        assert!(body["data"].get("passwordHash").is_none());
    }

    #[tokio::test]
    async fn create_rejects_missing_fields_and_duplicates() {
        let app = TestApp::new();
        let (_, admin) = app.seed_member("Root", "root@example.com", Role::Admin).await;

        let (status, body) = app
            .send(
                Method::POST,
                "/api/team-members",
                Some(&admin),
                Some(json!({ "name": "No Email" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "Missing required fields: name, email, department, position"
        );

        app.send(Method::POST, "/api/team-members", Some(&admin), Some(new_member()))
            .await;
        let (status, body) = app
            .send(Method::POST, "/api/team-members", Some(&admin), Some(new_member()))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Email already exists");
    }

    #[tokio::test]
    async fn invalid_email_is_a_validation_error() {
        let app = TestApp::new();
        let (_, admin) = app.seed_member("Root", "root@example.com", Role::Admin).await;
        let mut body = new_member();
        body["email"] = json!("not-an-email");

        let (status, body) = app
            .send(Method::POST, "/api/team-members", Some(&admin), Some(body))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"], json!(["Please enter a valid email"]));
    }

    #[tokio::test]
    async fn managers_view_but_cannot_create() {
        let app = TestApp::new();
        let (_, manager) = app.seed_member("Mo", "mo@example.com", Role::Manager).await;
        let (_, employee) = app.seed_member("Em", "em@example.com", Role::Employee).await;

        let (status, body) = app
            .send(Method::GET, "/api/team-members", Some(&manager), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);

        let (status, _) = app
            .send(Method::POST, "/api/team-members", Some(&manager), Some(new_member()))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .send(Method::GET, "/api/team-members", Some(&employee), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn list_filters_by_search_and_role() {
        let app = TestApp::new();
        let (_, admin) = app.seed_member("Root", "root@example.com", Role::Admin).await;
        app.seed_member("Dana Smith", "dana@example.com", Role::Manager).await;
        app.seed_member("Eli Stone", "eli@example.com", Role::Employee).await;

        let (_, body) = app
            .send(Method::GET, "/api/team-members?search=SMITH", Some(&admin), None)
            .await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["email"], "dana@example.com");

        let (_, body) = app
            .send(Method::GET, "/api/team-members?role=employee", Some(&admin), None)
            .await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["name"], "Eli Stone");
    }

    #[tokio::test]
    async fn members_edit_own_profile_only() {
        let app = TestApp::new();
        let (me, token) = app.seed_member("Em", "em@example.com", Role::Employee).await;
        let (other, _) = app.seed_member("Ot", "ot@example.com", Role::Employee).await;

        let (status, body) = app
            .send(
                Method::PUT,
                &format!("/api/team-members/{}", me.id),
                Some(&token),
                Some(json!({ "bio": "Hello", "location": "Oslo" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["bio"], "Hello");

        let (status, _) = app
            .send(
                Method::PUT,
                &format!("/api/team-members/{}", me.id),
                Some(&token),
                Some(json!({ "role": "admin" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .send(
                Method::PUT,
                &format!("/api/team-members/{}", other.id),
                Some(&token),
                Some(json!({ "bio": "Hijacked" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn admin_deletes_others_but_not_self() {
        let app = TestApp::new();
        let (root, admin) = app.seed_member("Root", "root@example.com", Role::Admin).await;
        let (other, _) = app.seed_member("Ot", "ot@example.com", Role::Employee).await;

        let (status, _) = app
            .send(
                Method::DELETE,
                &format!("/api/team-members/{}", root.id),
                Some(&admin),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app
            .send(
                Method::DELETE,
                &format!("/api/team-members/{}", other.id),
                Some(&admin),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Team member deleted successfully");

        let (status, body) = app
            .send(
                Method::GET,
                &format!("/api/team-members/{}", other.id),
                Some(&admin),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Team member not found");
    }

    #[tokio::test]
    async fn deleted_member_takes_their_timesheets_along() {
        let app = TestApp::new();
        let (_, admin) = app.seed_member("Root", "root@example.com", Role::Admin).await;
        let (ann, ann_token) = app.seed_member("Ann", "ann@example.com", Role::Employee).await;

        let (status, _) = app
            .send(
                Method::POST,
                "/api/time-entries",
                Some(&ann_token),
                Some(json!({ "weekStart": "2024-03-04", "hours": [8, 8, 8, 8, 8, 0, 0] })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = app
            .send(
                Method::DELETE,
                &format!("/api/team-members/{}", ann.id),
                Some(&admin),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = app
            .send(Method::GET, "/api/time-entries", Some(&admin), None)
            .await;
        assert_eq!(body["count"], 0);

        let (_, body) = app
            .send(Method::GET, "/api/reports/summary", Some(&admin), None)
            .await;
        assert_eq!(body["data"]["team"], json!([]));
        assert_eq!(body["data"]["totalHours"].as_f64(), Some(0.0));
    }

    #[tokio::test]
    async fn saving_a_vanished_member_is_not_found() {
        let app = TestApp::new();
        let (member, _) = app.seed_member("Ann", "ann@example.com", Role::Employee).await;
        let repo = app.state.repo.as_ref();

        assert!(save_member(repo, &member).await.is_ok());

        repo.delete_member(member.id).await.unwrap();
        match save_member(repo, &member).await {
            Err(AppError::NotFound(what)) => assert_eq!(what, "Team member"),
            other => panic!("expected not found, got {:?}", other),
        }
    }

    #[test]
    fn stats_count_roles_statuses_and_departments() {
        let member = |role: Role, status: MemberStatus, department: &str| {
            let mut m = TeamMember::new(
                "M".into(),
                format!("{}@example.com", uuid::Uuid::new_v4()),
                department.into(),
                "Dev".into(),
            );
            m.role = role;
            m.status = status;
            m
        };
        let stats = team_stats(&[
            member(Role::Admin, MemberStatus::Active, "Ops"),
            member(Role::Employee, MemberStatus::Pending, "Sales"),
            member(Role::Employee, MemberStatus::Active, "Sales"),
        ]);

        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_role.employee, 2);
        assert_eq!(stats.by_role.manager, 0);
        assert_eq!(stats.by_status.pending, 1);
        assert_eq!(stats.by_department["Sales"], 2);
        assert_eq!(stats.by_department["Ops"], 1);
    }

    #[tokio::test]
    async fn stats_endpoint_needs_team_view() {
        let app = TestApp::new();
        let (_, manager) = app.seed_member("Mo", "mo@example.com", Role::Manager).await;
        let (_, employee) = app.seed_member("Em", "em@example.com", Role::Employee).await;

        let (status, body) = app
            .send(Method::GET, "/api/team-members/stats", Some(&manager), None)
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["data"]["total"], 2);
        assert_eq!(body["data"]["byRole"], json!({ "admin": 0, "manager": 1, "employee": 1 }));
        assert_eq!(body["data"]["byStatus"]["active"], 2);
        assert_eq!(body["data"]["byDepartment"], json!({ "Engineering": 2 }));

        let (status, _) = app
            .send(Method::GET, "/api/team-members/stats", Some(&employee), None)
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
