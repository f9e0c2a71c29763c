use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use super::cache::PrincipalCache;
use super::evaluator::{Access, AccessPolicy, Decision, DefaultAccessPolicy};
use super::principal::Principal;
use super::scoping::{ScopedQuery, ScopedRecord};
use crate::errors::{AppError, AppResult};
use crate::events::EventBus;
use crate::hierarchy::{HierarchyTree, OrgChart};
use crate::integrity::{report_faults, IntegrityFault};
use crate::models::rbac::{Action, Module};

/// Entry point for every access question the HTTP layer asks.
#[derive(Clone)]
pub struct AccessService {
    pool: SqlitePool,
    cache: Arc<PrincipalCache>,
    policy: Arc<dyn AccessPolicy>,
    event_bus: EventBus,
}

impl AccessService {
    pub fn new(pool: SqlitePool, event_bus: EventBus, cache_ttl: Duration) -> Self {
        Self::with_policy(pool, event_bus, cache_ttl, Arc::new(DefaultAccessPolicy::new()))
    }

    pub fn with_policy(
        pool: SqlitePool,
        event_bus: EventBus,
        cache_ttl: Duration,
        policy: Arc<dyn AccessPolicy>,
    ) -> Self {
        Self {
            pool,
            cache: Arc::new(PrincipalCache::new(cache_ttl)),
            policy,
            event_bus,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub async fn principal(&self, employee_id: i64) -> AppResult<Arc<Principal>> {
        if let Some(principal) = self.cache.get(employee_id).await {
            return Ok(principal);
        }

        let generation = self.cache.generation();
        let (principal, faults) = Principal::load(&self.pool, employee_id).await?;
        self.report(employee_id, &faults);

        let principal = Arc::new(principal);
        self.cache.insert(Arc::clone(&principal), generation).await;
        Ok(principal)
    }

    /// Full decision, denials included. Used where the caller wants to inspect
    /// the outcome rather than fail on it.
    pub async fn decide(
        &self,
        requester: i64,
        module: Module,
        action: Action,
        owner_id: Option<i64>,
    ) -> AppResult<Decision> {
        let principal = self.principal(requester).await?;
        let chart = OrgChart::load(&self.pool).await?;
        let evaluation = self.policy.decide(&principal, &chart, module, action, owner_id).await;
        self.report(requester, &evaluation.faults);
        Ok(evaluation.decision)
    }

    /// Allow or `Forbidden`. With `owner_id` the target record's owner must be visible.
    pub async fn authorize(
        &self,
        requester: i64,
        module: Module,
        action: Action,
        owner_id: Option<i64>,
    ) -> AppResult<Access> {
        self.decide(requester, module, action, owner_id)
            .await?
            .into_result()
            .map_err(|err| match err {
                AppError::Forbidden(reason) => AppError::forbidden(format!(
                    "employee {requester} {module}:{action} owner {owner_id:?}: {reason}"
                )),
                other => other,
            })
    }

    pub async fn resolve_visibility(&self, requester: i64, module: Module, action: Action) -> AppResult<Access> {
        self.authorize(requester, module, action, None).await
    }

    /// Records of `T` the requester may view, optionally narrowed to one employee.
    pub async fn list_visible<T: ScopedRecord>(&self, requester: i64, narrow_to: Option<i64>) -> AppResult<Vec<T>> {
        let access = self.resolve_visibility(requester, T::MODULE, Action::View).await?;
        let visibility = match narrow_to {
            Some(_) => access.visibility.narrow(narrow_to, &OrgChart::load(&self.pool).await?),
            None => access.visibility,
        };
        ScopedQuery::new::<T>().apply(&visibility).fetch_all(&self.pool).await
    }

    /// One record of `T` if it exists and is visible; anything else is `NotFound`
    /// so hidden records are indistinguishable from missing ones.
    pub async fn get_visible<T: ScopedRecord>(&self, requester: i64, id: i64) -> AppResult<T> {
        let access = self.resolve_visibility(requester, T::MODULE, Action::View).await?;
        ScopedQuery::new::<T>()
            .apply(&access.visibility)
            .with_id(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::not_found(format!("{} {id} not found", T::TABLE)))
    }

    pub async fn hierarchy_tree(&self, requester: i64, root: Option<i64>) -> AppResult<HierarchyTree> {
        let chart = OrgChart::load(&self.pool).await?;
        let tree = chart.build_tree(root)?;
        self.report(requester, &tree.faults);
        Ok(tree)
    }

    /// Drop every cached principal. Called after catalog writes and manager changes.
    pub async fn invalidate(&self) {
        self.cache.clear().await;
    }

    fn report(&self, actor_id: i64, faults: &[IntegrityFault]) {
        if !faults.is_empty() {
            report_faults(&self.event_bus, Some(actor_id), faults);
        }
    }
}
