use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::errors::{AppError, AppResult};
use crate::{authz, catalog, hierarchy, integrity, models, routes};

#[derive(OpenApi)]
#[openapi(
	paths(
		routes::health::health,
		routes::leads::list_leads,
		routes::leads::get_lead,
		routes::leads::create_lead,
		routes::leads::assign_lead,
		routes::records::list_tasks,
		routes::records::list_attendance,
		routes::records::list_eod_reports,
		routes::records::list_projects,
		routes::employees::list_employees,
		routes::employees::hierarchy,
		routes::employees::reports,
		routes::employees::change_manager,
		routes::rbac::list_roles,
		routes::rbac::create_role,
		routes::rbac::get_role_permissions,
		routes::rbac::sync_role_permissions,
		routes::rbac::assign_scope,
		routes::rbac::revoke_scope,
		routes::rbac::list_permissions,
		routes::rbac::check_access,
		routes::rbac::visibility,
		routes::rbac::audit
	),
	components(
		schemas(
			routes::health::HealthResponse,
			models::records::Lead,
			models::records::LeadCreateRequest,
			models::records::LeadAssignRequest,
			models::records::Task,
			models::records::AttendanceEntry,
			models::records::EodReport,
			models::records::Project,
			models::employee::Employee,
			models::employee::ChangeManagerRequest,
			models::employee::ManagerChange,
			models::rbac::ScopeType,
			models::rbac::Module,
			models::rbac::Action,
			models::rbac::Role,
			models::rbac::RoleCreateRequest,
			models::rbac::Permission,
			models::rbac::SyncRolePermissionsRequest,
			models::rbac::AssignScopeRequest,
			hierarchy::HierarchyTree,
			hierarchy::HierarchyNode,
			integrity::IntegrityFault,
			integrity::FaultKind,
			authz::DenyReason,
			authz::VisibilityView,
			catalog::ScopeConflict,
			catalog::InvalidGrant,
			catalog::DriftReport,
			catalog::matrix::DriftEntry,
			catalog::matrix::DriftKind,
			routes::employees::ReportsResponse,
			routes::rbac::AccessCheckResponse,
			routes::rbac::AuditReport
		)
	),
	tags(
		(name = "Health", description = "Liveness"),
		(name = "Leads", description = "Scoped lead records"),
		(name = "Records", description = "Scoped tasks, attendance, EOD reports and projects"),
		(name = "Employees", description = "Reporting hierarchy"),
		(name = "RBAC", description = "Roles, permissions and access decisions")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;

	ensure_security_components(&mut doc);
	ensure_servers(&mut doc, port);

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> AppResult<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.persist_authorization(true);

	let doc_json = serde_json::to_value(&doc).map_err(|e| AppError::internal(e.to_string()))?;
	let doc_json = Arc::new(doc_json);

	let json_route = get(move || {
		let doc_json = Arc::clone(&doc_json);
		async move { Json((*doc_json).clone()) }
	});

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn ensure_security_components(doc: &mut Value) {
	let Some(root) = doc.as_object_mut() else {
		return;
	};
	let components = root.entry("components").or_insert_with(|| json!({}));
	let Some(components) = components.as_object_mut() else {
		return;
	};
	let schemes = components.entry("securitySchemes").or_insert_with(|| json!({}));
	if let Some(schemes) = schemes.as_object_mut() {
		schemes.entry("bearerAuth").or_insert_with(|| {
			json!({
				"type": "http",
				"scheme": "bearer",
				"bearerFormat": "JWT"
			})
		});
	}
}

fn ensure_servers(doc: &mut Value, port: u16) {
	let server_url = format!("http://localhost:{}", port);

	match doc.get_mut("servers") {
		Some(Value::Array(arr)) => {
			let has = arr.iter().any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				arr.push(json!({ "url": server_url }));
			}
		}
		_ => {
			doc["servers"] = json!([{ "url": server_url }]);
		}
	}
}
