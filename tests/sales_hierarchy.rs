mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};

use common::{SalesOrg, TestApp};

/// BM manages two BDMs, each with four BDEs holding ten leads apiece.
#[tokio::test]
async fn team_scope_counts_follow_the_reporting_tree() -> Result<()> {
    let app = TestApp::new().await?;
    let org = SalesOrg::build(&app).await?;

    for bde in org.all_bdes() {
        app.leads(bde, 10).await?;
    }
    app.leads(org.outsider, 5).await?;

    assert_eq!(app.count("/leads", org.bm1).await?, 80);
    assert_eq!(app.count("/leads", org.bdm1).await?, 40);
    assert_eq!(app.count("/leads", org.bdm2).await?, 40);
    for bde in org.all_bdes() {
        assert_eq!(app.count("/leads", bde).await?, 10, "bde {bde}");
    }

    // bm2's team is itself plus the outsider.
    assert_eq!(app.count("/leads", org.bm2).await?, 5);

    // Department scope: every lead owned by a SALES employee.
    assert_eq!(app.count("/leads", org.head).await?, 85);

    // ADMIN sees company-wide, including leads outside bm1's subtree.
    assert_eq!(app.count("/leads", org.admin).await?, 85);

    Ok(())
}

#[tokio::test]
async fn manager_with_no_reports_sees_only_self() -> Result<()> {
    let app = TestApp::new().await?;
    let org = SalesOrg::build(&app).await?;
    let lonely = app.employee("lonely-bm", "SALES", Some("SALES_BM"), Some(org.head)).await?;

    app.leads(lonely, 3).await?;
    app.leads(org.bdes_of_bdm1[0], 2).await?;

    assert_eq!(app.count("/leads", lonely).await?, 3);
    Ok(())
}

#[tokio::test]
async fn new_reports_deep_in_the_tree_widen_team_visibility() -> Result<()> {
    let app = TestApp::new().await?;
    let org = SalesOrg::build(&app).await?;

    let before = app.count("/employees", org.bm1).await?;
    // bm1, 2 BDMs, 8 BDEs
    assert_eq!(before, 11);

    let intern = app
        .employee("intern", "SALES", Some("SALES_BDE"), Some(org.bdes_of_bdm2[3]))
        .await?;
    app.leads(intern, 1).await?;

    assert_eq!(app.count("/employees", org.bm1).await?, before + 1);
    assert_eq!(app.count("/leads", org.bm1).await?, 1);
    assert_eq!(app.count("/leads", org.bdm2).await?, 1);
    assert_eq!(app.count("/leads", org.bdm1).await?, 0);
    Ok(())
}

#[tokio::test]
async fn team_larger_than_the_bind_limit_is_still_listed() -> Result<()> {
    let app = TestApp::new().await?;
    let org = SalesOrg::build(&app).await?;
    let bde = org.bdes_of_bdm1[0];

    // 33,000 reports under one BDE pushes bm1's team past SQLite's host parameter cap.
    sqlx::query(
        r#"
        WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < 33000)
        INSERT INTO employees (name, email, department_id, manager_id, role_id)
        SELECT 'bulk-' || n, 'bulk-' || n || '@salesdesk.test', e.department_id, e.id, e.role_id
        FROM seq, employees e
        WHERE e.id = ?
        "#,
    )
    .bind(bde)
    .execute(&app.pool)
    .await?;

    let deepest: i64 = sqlx::query_scalar("SELECT id FROM employees WHERE email = 'bulk-33000@salesdesk.test'")
        .fetch_one(&app.pool)
        .await?;
    app.leads(deepest, 2).await?;
    app.leads(org.bdes_of_bdm2[0], 3).await?;
    app.leads(org.outsider, 4).await?;

    assert_eq!(app.count("/leads", org.bm1).await?, 5);
    assert_eq!(app.count("/leads", bde).await?, 2);
    assert_eq!(app.count("/leads", org.bdm2).await?, 3);
    Ok(())
}

#[tokio::test]
async fn get_lead_outside_scope_is_not_found() -> Result<()> {
    let app = TestApp::new().await?;
    let org = SalesOrg::build(&app).await?;
    let lead = app.leads(org.outsider, 1).await?[0];

    let (status, _) = app.get(&format!("/leads/{lead}"), org.bm1).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.get(&format!("/leads/{lead}"), org.bm2).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["owner_id"], org.outsider);
    Ok(())
}

#[tokio::test]
async fn unassigned_and_roleless_employees_are_denied() -> Result<()> {
    let app = TestApp::new().await?;
    let org = SalesOrg::build(&app).await?;
    app.leads(org.bdes_of_bdm1[0], 2).await?;

    let unassigned = app.employee("new-hire", "SALES", Some("UNASSIGNED"), Some(org.bm1)).await?;
    let roleless = app.employee("no-role", "SALES", None, None).await?;

    for employee in [unassigned, roleless] {
        for uri in ["/leads", "/tasks", "/employees", "/attendance", "/eod", "/projects"] {
            let (status, body) = app.get(uri, employee).await?;
            assert_eq!(status, StatusCode::FORBIDDEN, "{uri} as {employee}");
            // Denials never say why.
            assert_eq!(body["message"], "forbidden");
        }
    }
    Ok(())
}

#[tokio::test]
async fn missing_capability_is_forbidden() -> Result<()> {
    let app = TestApp::new().await?;
    let org = SalesOrg::build(&app).await?;

    // HR_MANAGER holds nothing on leads.
    let (status, _) = app.get("/leads", org.hr).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // BDE cannot read roles.
    let (status, _) = app.get("/rbac/roles", org.bdes_of_bdm1[0]).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn requests_without_token_are_unauthenticated() -> Result<()> {
    let app = TestApp::new().await?;

    let (status, body) = app.request(Method::GET, "/leads", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthenticated");

    // Token for an employee that does not exist.
    let (status, _) = app.get("/leads", 9_999).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn admin_is_allowed_everything_even_with_empty_catalog() -> Result<()> {
    let app = TestApp::new().await?;
    let org = SalesOrg::build(&app).await?;
    sqlx::query("DELETE FROM role_permissions").execute(&app.pool).await?;

    for module in ["leads", "tasks", "employees", "attendance", "eod", "projects", "departments", "roles"] {
        for action in ["view", "create", "edit", "delete", "assign"] {
            let uri = format!("/rbac/access?module={module}&action={action}&owner_id={}", org.outsider);
            let (status, body) = app.get(&uri, org.admin).await?;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["allowed"], true, "{module}:{action}");
        }
    }
    Ok(())
}

#[tokio::test]
async fn department_scope_includes_inactive_employees() -> Result<()> {
    let app = TestApp::new().await?;
    let org = SalesOrg::build(&app).await?;
    let leaver = app.employee("leaver", "SALES", Some("SALES_BDE"), None).await?;
    sqlx::query("UPDATE employees SET is_active = 0 WHERE id = ?")
        .bind(leaver)
        .execute(&app.pool)
        .await?;
    app.leads(leaver, 2).await?;

    assert_eq!(app.count("/leads", org.head).await?, 2);
    // HR_MANAGER holds employees:view at `all`.
    let ids = app.list_ids("/employees", org.hr).await?;
    assert!(ids.contains(&leaver));
    Ok(())
}

#[tokio::test]
async fn lead_creation_respects_create_scope() -> Result<()> {
    let app = TestApp::new().await?;
    let org = SalesOrg::build(&app).await?;
    let bde = org.bdes_of_bdm1[0];

    let (status, body) = app
        .request(Method::POST, "/leads", Some(bde), Some(serde_json::json!({ "company": "Acme" })))
        .await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["owner_id"], bde);
    assert_eq!(body["status"], "new");

    // leads:create is own-scoped, so creating for someone else is refused.
    let (status, _) = app
        .request(
            Method::POST,
            "/leads",
            Some(bde),
            Some(serde_json::json!({ "company": "Other", "owner_id": org.bdes_of_bdm1[1] })),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}
