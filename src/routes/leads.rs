use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use super::ScopeFilter;
use crate::app::AppState;
use crate::employees::get_employee;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::hierarchy::OrgChart;
use crate::jwt::AuthUser;
use crate::models::rbac::{Action, Module};
use crate::models::records::{Lead, LeadAssignRequest, LeadCreateRequest};

const LEAD_COLUMNS: &str = "id, owner_id, department_id, company, contact_name, status, created_at, updated_at";

async fn fetch_lead(state: &AppState, id: i64) -> AppResult<Lead> {
    sqlx::query_as::<_, Lead>(&format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?"))
        .bind(id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("lead {id} not found")))
}

#[utoipa::path(
    get,
    path = "/leads",
    tag = "Leads",
    params(ScopeFilter),
    responses(
        (status = 200, description = "Leads visible to the requester", body = Vec<Lead>),
        (status = 403, description = "No leads:view capability")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_leads(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(filter): Query<ScopeFilter>,
) -> AppResult<Json<Vec<Lead>>> {
    let leads = state.access.list_visible::<Lead>(auth.employee_id, filter.employee_id).await?;
    Ok(Json(leads))
}

#[utoipa::path(
    get,
    path = "/leads/{id}",
    tag = "Leads",
    params(("id" = i64, Path, description = "Lead ID")),
    responses(
        (status = 200, description = "Lead", body = Lead),
        (status = 404, description = "Lead not found or not visible")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_lead(State(state): State<AppState>, auth: AuthUser, Path(id): Path<i64>) -> AppResult<Json<Lead>> {
    let lead = state.access.get_visible::<Lead>(auth.employee_id, id).await?;
    Ok(Json(lead))
}

#[utoipa::path(
    post,
    path = "/leads",
    tag = "Leads",
    request_body = LeadCreateRequest,
    responses(
        (status = 201, description = "Lead created", body = Lead),
        (status = 403, description = "Owner outside the requester's leads:create scope")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_lead(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(req): Json<LeadCreateRequest>,
) -> AppResult<(StatusCode, Json<Lead>)> {
    if req.company.trim().is_empty() {
        return Err(AppError::bad_request("company must not be empty"));
    }

    let owner_id = req.owner_id.unwrap_or(auth.employee_id);
    state
        .access
        .authorize(auth.employee_id, Module::Leads, Action::Create, Some(owner_id))
        .await?;
    let owner = get_employee(&state.pool, owner_id).await?;

    let id = sqlx::query("INSERT INTO leads (owner_id, department_id, company, contact_name, status) VALUES (?, ?, ?, ?, ?)")
        .bind(owner.id)
        .bind(owner.department_id)
        .bind(req.company.trim())
        .bind(&req.contact_name)
        .bind(req.status.as_deref().unwrap_or("new"))
        .execute(&state.pool)
        .await?
        .last_insert_rowid();

    let lead = fetch_lead(&state, id).await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.employee_id),
        &lead,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(lead)))
}

/// Reassign a lead. The requester needs `leads:assign` over the current owner,
/// and the new owner must be inside the same scope.
#[utoipa::path(
    put,
    path = "/leads/{id}/assign",
    tag = "Leads",
    params(("id" = i64, Path, description = "Lead ID")),
    request_body = LeadAssignRequest,
    responses(
        (status = 200, description = "Lead reassigned", body = Lead),
        (status = 403, description = "Current or new owner outside the requester's scope"),
        (status = 404, description = "Lead not found"),
        (status = 409, description = "Lead changed owner while the request was in flight")
    ),
    security(("bearerAuth" = []))
)]
pub async fn assign_lead(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<LeadAssignRequest>,
) -> AppResult<Json<Lead>> {
    let before = fetch_lead(&state, id).await?;

    let access = state
        .access
        .authorize(auth.employee_id, Module::Leads, Action::Assign, Some(before.owner_id))
        .await?;

    let chart = OrgChart::load(&state.pool).await?;
    let new_owner = chart
        .get(req.owner_id)
        .ok_or_else(|| AppError::not_found(format!("employee {} not found", req.owner_id)))?;
    if !access.visibility.admits(new_owner.id, &chart) {
        return Err(AppError::forbidden(format!(
            "employee {} cannot assign lead {id} to {} outside scope",
            auth.employee_id, new_owner.id
        )));
    }

    crate::leads::reassign(&state.pool, id, before.owner_id, new_owner).await?;

    let lead = fetch_lead(&state, id).await?;

    log_activity_with_context(
        &state.event_bus,
        "assigned",
        Some(auth.employee_id),
        &lead,
        Some(&before),
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(lead))
}
