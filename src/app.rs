use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::AccessService;
use crate::config;
use crate::docs;
use crate::errors::AppError;
use crate::events::{self, EventBus};
use crate::jwt::JwtConfig;
use crate::routes::{employees, health, leads, rbac, records};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub access: AccessService,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig, access: AccessService) -> Self {
        let event_bus = access.event_bus().clone();
        Self {
            pool,
            jwt: Arc::new(jwt),
            access,
            event_bus,
        }
    }
}

/// Build the router from environment configuration and start the audit listener.
pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let cache_ttl = config::cache_ttl_from_env()?;

    let (event_bus, rx) = events::init_event_bus();
    tokio::spawn(events::start_activity_listener(rx, pool.clone()));

    let access = AccessService::new(pool.clone(), event_bus, cache_ttl);
    let state = AppState::new(pool, jwt_config, access);

    let port = config::port_from_env()?;
    let openapi = docs::build_openapi(port).map_err(|e| AppError::internal(e.to_string()))?;

    Ok(router(state).merge(docs::swagger_routes(openapi)?))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let lead_routes = Router::new()
        .route("/", get(leads::list_leads).post(leads::create_lead))
        .route("/:id", get(leads::get_lead))
        .route("/:id/assign", put(leads::assign_lead));

    let employee_routes = Router::new()
        .route("/", get(employees::list_employees))
        .route("/hierarchy", get(employees::hierarchy))
        .route("/:id/reports", get(employees::reports))
        .route("/:id/manager", put(employees::change_manager));

    let rbac_routes = Router::new()
        .route("/roles", get(rbac::list_roles).post(rbac::create_role))
        .route(
            "/roles/:role_id/permissions",
            get(rbac::get_role_permissions).put(rbac::sync_role_permissions),
        )
        .route("/roles/:role_id/scopes", put(rbac::assign_scope))
        .route("/roles/:role_id/scopes/:module/:action", delete(rbac::revoke_scope))
        .route("/permissions", get(rbac::list_permissions))
        .route("/access", get(rbac::check_access))
        .route("/visibility", get(rbac::visibility))
        .route("/audit", get(rbac::audit));

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/leads", lead_routes)
        .route("/tasks", get(records::list_tasks))
        .route("/attendance", get(records::list_attendance))
        .route("/eod", get(records::list_eod_reports))
        .route("/projects", get(records::list_projects))
        .nest("/employees", employee_routes)
        .nest("/rbac", rbac_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
