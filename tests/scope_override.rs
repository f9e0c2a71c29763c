mod common;

use anyhow::Result;
use axum::http::StatusCode;

use common::{SalesOrg, TestApp};

#[tokio::test]
async fn own_scope_ignores_filters_for_other_employees() -> Result<()> {
    let app = TestApp::new().await?;
    let org = SalesOrg::build(&app).await?;
    let (me, peer) = (org.bdes_of_bdm1[0], org.bdes_of_bdm1[1]);
    let mine = app.leads(me, 3).await?;
    app.leads(peer, 5).await?;

    let unfiltered = app.list_ids("/leads", me).await?;
    let filtered = app.list_ids(&format!("/leads?employee_id={peer}"), me).await?;
    assert_eq!(unfiltered, mine);
    assert_eq!(filtered, unfiltered);

    let own = app.list_ids(&format!("/leads?employee_id={me}"), me).await?;
    assert_eq!(own, mine);
    Ok(())
}

#[tokio::test]
async fn team_scope_narrows_inside_the_team_only() -> Result<()> {
    let app = TestApp::new().await?;
    let org = SalesOrg::build(&app).await?;
    for bde in org.all_bdes() {
        app.leads(bde, 10).await?;
    }
    let outsider_leads = app.leads(org.outsider, 5).await?;

    let one = app.list_ids(&format!("/leads?employee_id={}", org.bdes_of_bdm2[1]), org.bm1).await?;
    assert_eq!(one.len(), 10);

    // Outside the team: ignored, never widened to the outsider's leads.
    let ignored = app.list_ids(&format!("/leads?employee_id={}", org.outsider), org.bm1).await?;
    assert_eq!(ignored.len(), 80);
    assert!(ignored.iter().all(|id| !outsider_leads.contains(id)));
    Ok(())
}

#[tokio::test]
async fn unrestricted_scope_narrows_to_anyone() -> Result<()> {
    let app = TestApp::new().await?;
    let org = SalesOrg::build(&app).await?;
    app.leads(org.bdes_of_bdm1[0], 4).await?;
    let outsider_leads = app.leads(org.outsider, 2).await?;

    let narrowed = app.list_ids(&format!("/leads?employee_id={}", org.outsider), org.admin).await?;
    assert_eq!(narrowed, outsider_leads);
    assert_eq!(app.count("/leads", org.admin).await?, 6);
    Ok(())
}

#[tokio::test]
async fn department_scope_narrows_within_department() -> Result<()> {
    let app = TestApp::new().await?;
    let org = SalesOrg::build(&app).await?;
    let outsider_leads = app.leads(org.outsider, 2).await?;
    app.leads(org.bdm1, 3).await?;

    let narrowed = app.list_ids(&format!("/leads?employee_id={}", org.outsider), org.head).await?;
    assert_eq!(narrowed, outsider_leads);

    // HR is another department; the filter is dropped.
    let ignored = app.list_ids(&format!("/leads?employee_id={}", org.hr), org.head).await?;
    assert_eq!(ignored.len(), 5);
    Ok(())
}

async fn insert_task(app: &TestApp, assignee: i64, title: &str) -> Result<i64> {
    Ok(sqlx::query("INSERT INTO tasks (assignee_id, title) VALUES (?, ?)")
        .bind(assignee)
        .bind(title)
        .execute(&app.pool)
        .await?
        .last_insert_rowid())
}

#[tokio::test]
async fn tasks_are_scoped_by_assignee() -> Result<()> {
    let app = TestApp::new().await?;
    let org = SalesOrg::build(&app).await?;
    let mine = insert_task(&app, org.bdes_of_bdm1[0], "call back").await?;
    let peer = insert_task(&app, org.bdes_of_bdm1[1], "send quote").await?;
    let other_team = insert_task(&app, org.bdes_of_bdm2[0], "demo").await?;

    assert_eq!(app.list_ids("/tasks", org.bdes_of_bdm1[0]).await?, vec![mine]);
    assert_eq!(app.list_ids("/tasks", org.bdm1).await?, vec![mine, peer]);
    assert_eq!(app.list_ids("/tasks", org.bm1).await?, vec![mine, peer, other_team]);

    let filtered = app
        .list_ids(&format!("/tasks?employee_id={}", org.bdes_of_bdm2[0]), org.bdm1)
        .await?;
    assert_eq!(filtered, vec![mine, peer]);
    Ok(())
}

#[tokio::test]
async fn attendance_and_eod_follow_the_same_rules() -> Result<()> {
    let app = TestApp::new().await?;
    let org = SalesOrg::build(&app).await?;
    let bde = org.bdes_of_bdm1[0];

    for (employee, day) in [(bde, "2026-10-01"), (bde, "2026-10-02"), (org.outsider, "2026-10-01")] {
        sqlx::query("INSERT INTO attendance (employee_id, work_date) VALUES (?, ?)")
            .bind(employee)
            .bind(day)
            .execute(&app.pool)
            .await?;
        sqlx::query("INSERT INTO eod_reports (employee_id, report_date, summary) VALUES (?, ?, 'done')")
            .bind(employee)
            .bind(day)
            .execute(&app.pool)
            .await?;
    }

    assert_eq!(app.count("/attendance", bde).await?, 2);
    assert_eq!(app.count("/attendance", org.bm1).await?, 2);
    assert_eq!(app.count("/attendance", org.hr).await?, 3);
    assert_eq!(app.count("/eod", org.bdm1).await?, 2);
    assert_eq!(app.count("/eod", org.head).await?, 3);

    // HR holds nothing on eod.
    let (status, _) = app.get("/eod", org.hr).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}
