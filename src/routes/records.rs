//! Read-only scoped lists. Each one applies the requester's `view` scope for the
//! record's module and the optional `employee_id` narrowing filter.

use axum::extract::{Query, State};
use axum::Json;

use super::ScopeFilter;
use crate::app::AppState;
use crate::errors::AppResult;
use crate::jwt::AuthUser;
use crate::models::records::{AttendanceEntry, EodReport, Project, Task};

#[utoipa::path(
    get,
    path = "/tasks",
    tag = "Records",
    params(ScopeFilter),
    responses((status = 200, description = "Visible tasks", body = Vec<Task>)),
    security(("bearerAuth" = []))
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(filter): Query<ScopeFilter>,
) -> AppResult<Json<Vec<Task>>> {
    Ok(Json(state.access.list_visible(auth.employee_id, filter.employee_id).await?))
}

#[utoipa::path(
    get,
    path = "/attendance",
    tag = "Records",
    params(ScopeFilter),
    responses((status = 200, description = "Visible attendance entries", body = Vec<AttendanceEntry>)),
    security(("bearerAuth" = []))
)]
pub async fn list_attendance(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(filter): Query<ScopeFilter>,
) -> AppResult<Json<Vec<AttendanceEntry>>> {
    Ok(Json(state.access.list_visible(auth.employee_id, filter.employee_id).await?))
}

#[utoipa::path(
    get,
    path = "/eod",
    tag = "Records",
    params(ScopeFilter),
    responses((status = 200, description = "Visible end-of-day reports", body = Vec<EodReport>)),
    security(("bearerAuth" = []))
)]
pub async fn list_eod_reports(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(filter): Query<ScopeFilter>,
) -> AppResult<Json<Vec<EodReport>>> {
    Ok(Json(state.access.list_visible(auth.employee_id, filter.employee_id).await?))
}

#[utoipa::path(
    get,
    path = "/projects",
    tag = "Records",
    params(ScopeFilter),
    responses((status = 200, description = "Visible projects", body = Vec<Project>)),
    security(("bearerAuth" = []))
)]
pub async fn list_projects(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(filter): Query<ScopeFilter>,
) -> AppResult<Json<Vec<Project>>> {
    Ok(Json(state.access.list_visible(auth.employee_id, filter.employee_id).await?))
}
