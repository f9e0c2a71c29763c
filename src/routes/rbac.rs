//! RBAC administration and introspection.
//!
//! Reads require `roles:view`, writes `roles:edit`. Every write clears the
//! principal cache and is published on the audit channel with Critical severity.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::app::AppState;
use crate::authz::{Decision, DenyReason, VisibilityView};
use crate::catalog::{self, store, DriftReport, InvalidGrant, MatrixDefinition, ScopeConflict};
use crate::errors::{AppError, AppResult};
use crate::events::{log_activity_with_context, RequestContext};
use crate::hierarchy::OrgChart;
use crate::jwt::AuthUser;
use crate::models::rbac::*;

async fn require(state: &AppState, auth: AuthUser, action: Action) -> AppResult<()> {
    state
        .access
        .authorize(auth.employee_id, Module::Roles, action, None)
        .await
        .map(|_| ())
}

// =============================================================================
// ROLE ENDPOINTS
// =============================================================================

#[utoipa::path(
    get,
    path = "/rbac/roles",
    tag = "RBAC",
    responses((status = 200, description = "List of roles", body = Vec<Role>)),
    security(("bearerAuth" = []))
)]
pub async fn list_roles(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Role>>> {
    require(&state, auth, Action::View).await?;
    Ok(Json(store::list_roles(&state.pool).await?))
}

#[utoipa::path(
    post,
    path = "/rbac/roles",
    tag = "RBAC",
    request_body = RoleCreateRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 409, description = "Role code already exists")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(req): Json<RoleCreateRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    require(&state, auth, Action::Edit).await?;
    let role = store::create_role(&state.pool, &req).await?;

    log_activity_with_context(
        &state.event_bus,
        "created",
        Some(auth.employee_id),
        &role,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok((StatusCode::CREATED, Json(role)))
}

// =============================================================================
// ROLE PERMISSION ENDPOINTS
// =============================================================================

#[utoipa::path(
    get,
    path = "/rbac/roles/{role_id}/permissions",
    tag = "RBAC",
    params(("role_id" = i64, Path, description = "Role ID")),
    responses(
        (status = 200, description = "Permissions held by the role", body = Vec<Permission>),
        (status = 404, description = "Role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_role_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(role_id): Path<i64>,
) -> AppResult<Json<Vec<Permission>>> {
    require(&state, auth, Action::View).await?;
    Ok(Json(store::permissions_for_role(&state.pool, role_id).await?))
}

/// Replace the role's permission set. Sending the same payload again is a no-op.
#[utoipa::path(
    put,
    path = "/rbac/roles/{role_id}/permissions",
    tag = "RBAC",
    params(("role_id" = i64, Path, description = "Role ID")),
    request_body = SyncRolePermissionsRequest,
    responses(
        (status = 200, description = "Permissions replaced", body = Vec<Permission>),
        (status = 404, description = "Role or permission not found"),
        (status = 409, description = "Payload holds two scopes for one module/action")
    ),
    security(("bearerAuth" = []))
)]
pub async fn sync_role_permissions(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(role_id): Path<i64>,
    Json(req): Json<SyncRolePermissionsRequest>,
) -> AppResult<Json<Vec<Permission>>> {
    require(&state, auth, Action::Edit).await?;

    let permissions = store::sync_role_permissions(&state.pool, role_id, &req.permission_ids).await?;
    state.access.invalidate().await;

    let sync = RolePermissionSync {
        role_id,
        permission_ids: permissions.iter().map(|p| p.id).collect(),
    };
    log_activity_with_context(
        &state.event_bus,
        "synced",
        Some(auth.employee_id),
        &sync,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(permissions))
}

#[utoipa::path(
    put,
    path = "/rbac/roles/{role_id}/scopes",
    tag = "RBAC",
    params(("role_id" = i64, Path, description = "Role ID")),
    request_body = AssignScopeRequest,
    responses(
        (status = 200, description = "Scope assigned, replacing any previous one", body = Permission),
        (status = 404, description = "Role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn assign_scope(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path(role_id): Path<i64>,
    Json(req): Json<AssignScopeRequest>,
) -> AppResult<Json<Permission>> {
    require(&state, auth, Action::Edit).await?;

    let permission = store::assign_scope(&state.pool, role_id, req.module, req.action, req.scope).await?;
    state.access.invalidate().await;

    let assignment = ScopeAssignment {
        role_id,
        module: req.module,
        action: req.action,
        scope: Some(req.scope),
    };
    log_activity_with_context(
        &state.event_bus,
        "assigned",
        Some(auth.employee_id),
        &assignment,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(Json(permission))
}

#[utoipa::path(
    delete,
    path = "/rbac/roles/{role_id}/scopes/{module}/{action}",
    tag = "RBAC",
    params(
        ("role_id" = i64, Path, description = "Role ID"),
        ("module" = String, Path, description = "Module"),
        ("action" = String, Path, description = "Action")
    ),
    responses(
        (status = 204, description = "Capability revoked"),
        (status = 400, description = "Unknown module or action"),
        (status = 404, description = "Role not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn revoke_scope(
    State(state): State<AppState>,
    auth: AuthUser,
    headers: HeaderMap,
    Path((role_id, module, action)): Path<(i64, String, String)>,
) -> AppResult<StatusCode> {
    require(&state, auth, Action::Edit).await?;

    let module: Module = module.parse().map_err(|_| AppError::bad_request(format!("unknown module '{module}'")))?;
    let action: Action = action.parse().map_err(|_| AppError::bad_request(format!("unknown action '{action}'")))?;

    store::revoke_capability(&state.pool, role_id, module, action).await?;
    state.access.invalidate().await;

    let assignment = ScopeAssignment { role_id, module, action, scope: None };
    log_activity_with_context(
        &state.event_bus,
        "revoked",
        Some(auth.employee_id),
        &assignment,
        None,
        Some(RequestContext::from_headers(&headers)),
    );

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/rbac/permissions",
    tag = "RBAC",
    responses((status = 200, description = "Permission catalog", body = Vec<Permission>)),
    security(("bearerAuth" = []))
)]
pub async fn list_permissions(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Permission>>> {
    require(&state, auth, Action::View).await?;
    Ok(Json(store::list_permissions(&state.pool).await?))
}

// =============================================================================
// INTROSPECTION
// =============================================================================

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AccessQuery {
    pub module: Module,
    pub action: Action,
    pub owner_id: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AccessCheckResponse {
    pub allowed: bool,
    pub scope: Option<ScopeType>,
    pub reason: Option<DenyReason>,
}

/// Decision for the requester. Denials are returned, not raised.
#[utoipa::path(
    get,
    path = "/rbac/access",
    tag = "RBAC",
    params(AccessQuery),
    responses((status = 200, description = "Access decision", body = AccessCheckResponse)),
    security(("bearerAuth" = []))
)]
pub async fn check_access(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<AccessQuery>,
) -> AppResult<Json<AccessCheckResponse>> {
    let decision = state
        .access
        .decide(auth.employee_id, query.module, query.action, query.owner_id)
        .await?;

    let response = match decision {
        Decision::Allow(access) => AccessCheckResponse { allowed: true, scope: Some(access.scope), reason: None },
        Decision::Deny(reason) => AccessCheckResponse { allowed: false, scope: None, reason: Some(reason) },
    };
    Ok(Json(response))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct VisibilityQuery {
    pub module: Module,
    #[serde(default = "default_action")]
    pub action: Action,
}

fn default_action() -> Action {
    Action::View
}

#[utoipa::path(
    get,
    path = "/rbac/visibility",
    tag = "RBAC",
    params(VisibilityQuery),
    responses(
        (status = 200, description = "Owners the requester may see", body = VisibilityView),
        (status = 403, description = "No such capability")
    ),
    security(("bearerAuth" = []))
)]
pub async fn visibility(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<VisibilityQuery>,
) -> AppResult<Json<VisibilityView>> {
    let access = state
        .access
        .resolve_visibility(auth.employee_id, query.module, query.action)
        .await?;
    Ok(Json(access.visibility.describe(Some(access.scope))))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuditReport {
    pub scope_conflicts: Vec<ScopeConflict>,
    pub invalid_grants: Vec<InvalidGrant>,
    pub drift: DriftReport,
    pub hierarchy_cycles: Vec<Vec<i64>>,
}

#[utoipa::path(
    get,
    path = "/rbac/audit",
    tag = "RBAC",
    responses((status = 200, description = "Catalog and hierarchy integrity report", body = AuditReport)),
    security(("bearerAuth" = []))
)]
pub async fn audit(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<AuditReport>> {
    require(&state, auth, Action::View).await?;

    let matrix = MatrixDefinition::builtin()?;
    let report = AuditReport {
        scope_conflicts: store::audit_scope_conflicts(&state.pool).await?,
        invalid_grants: store::audit_invalid_grants(&state.pool).await?,
        drift: catalog::drift_report(&state.pool, &matrix).await?,
        hierarchy_cycles: OrgChart::load(&state.pool).await?.detect_cycles(),
    };
    Ok(Json(report))
}
