use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::ScopeFilter;
use crate::app::AppState;
use crate::authz::Visibility;
use crate::employees;
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::hierarchy::{HierarchyTree, OrgChart};
use crate::integrity::report_faults;
use crate::jwt::AuthUser;
use crate::models::employee::{ChangeManagerRequest, Employee, ManagerChange};
use crate::models::rbac::{Action, Module};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HierarchyQuery {
    /// Root employee; defaults to the requester for team and own scopes.
    pub root: Option<i64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ReportsQuery {
    #[serde(default)]
    pub transitive: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReportsResponse {
    pub employee_id: i64,
    pub transitive: bool,
    pub report_ids: Vec<i64>,
}

#[utoipa::path(
    get,
    path = "/employees",
    tag = "Employees",
    params(ScopeFilter),
    responses((status = 200, description = "Employees visible to the requester", body = Vec<Employee>)),
    security(("bearerAuth" = []))
)]
pub async fn list_employees(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(filter): Query<ScopeFilter>,
) -> AppResult<Json<Vec<Employee>>> {
    Ok(Json(state.access.list_visible(auth.employee_id, filter.employee_id).await?))
}

/// Reporting tree, pruned to the employees the requester can view.
#[utoipa::path(
    get,
    path = "/employees/hierarchy",
    tag = "Employees",
    params(HierarchyQuery),
    responses(
        (status = 200, description = "Reporting tree", body = HierarchyTree),
        (status = 404, description = "Root employee not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn hierarchy(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<HierarchyQuery>,
) -> AppResult<Json<HierarchyTree>> {
    let access = state
        .access
        .authorize(auth.employee_id, Module::Employees, Action::View, query.root)
        .await?;

    // Department members need not report up to the requester, so that scope
    // starts from the whole forest.
    let root = match (&access.visibility, query.root) {
        (_, Some(root)) => Some(root),
        (Visibility::Unrestricted | Visibility::Department(_), None) => None,
        (Visibility::Employees(_), None) => Some(auth.employee_id),
    };

    let mut tree = state.access.hierarchy_tree(auth.employee_id, root).await?;
    if access.visibility != Visibility::Unrestricted {
        let chart = OrgChart::load(&state.pool).await?;
        tree.restrict(|id| access.visibility.admits(id, &chart));
    }

    Ok(Json(tree))
}

#[utoipa::path(
    get,
    path = "/employees/{id}/reports",
    tag = "Employees",
    params(("id" = i64, Path, description = "Manager employee ID"), ReportsQuery),
    responses(
        (status = 200, description = "Direct or transitive report ids", body = ReportsResponse),
        (status = 403, description = "Employee outside the requester's scope")
    ),
    security(("bearerAuth" = []))
)]
pub async fn reports(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Query(query): Query<ReportsQuery>,
) -> AppResult<Json<ReportsResponse>> {
    let access = state
        .access
        .authorize(auth.employee_id, Module::Employees, Action::View, Some(id))
        .await?;

    let chart = OrgChart::load(&state.pool).await?;
    if !chart.contains(id) {
        return Err(AppError::not_found(format!("employee {id} not found")));
    }

    let members = if query.transitive {
        let subtree = chart.transitive_reports(id);
        if !subtree.faults.is_empty() {
            report_faults(&state.event_bus, Some(auth.employee_id), &subtree.faults);
        }
        subtree.members
    } else {
        chart.direct_reports(id)
    };

    let report_ids = members
        .into_iter()
        .filter(|r| access.visibility.admits(*r, &chart))
        .collect();

    Ok(Json(ReportsResponse { employee_id: id, transitive: query.transitive, report_ids }))
}

#[utoipa::path(
    put,
    path = "/employees/{id}/manager",
    tag = "Employees",
    params(("id" = i64, Path, description = "Employee ID")),
    request_body = ChangeManagerRequest,
    responses(
        (status = 200, description = "Manager changed", body = ManagerChange),
        (status = 403, description = "Employee or new manager outside scope"),
        (status = 422, description = "Change would create a reporting cycle")
    ),
    security(("bearerAuth" = []))
)]
pub async fn change_manager(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(req): Json<ChangeManagerRequest>,
) -> AppResult<Json<ManagerChange>> {
    let access = state
        .access
        .authorize(auth.employee_id, Module::Employees, Action::Edit, Some(id))
        .await?;

    if let Some(manager_id) = req.manager_id {
        let chart = OrgChart::load(&state.pool).await?;
        if chart.contains(manager_id) && !access.visibility.admits(manager_id, &chart) {
            return Err(AppError::forbidden(format!(
                "employee {} cannot place {id} under {manager_id} outside scope",
                auth.employee_id
            )));
        }
    }

    let change = employees::change_manager(&state.pool, id, req.manager_id).await?;
    state.access.invalidate().await;

    log_activity_with_context(
        &state.event_bus,
        "manager_changed",
        Some(auth.employee_id),
        &change,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(change))
}
