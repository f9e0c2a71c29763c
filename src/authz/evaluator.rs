use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use utoipa::ToSchema;

use super::principal::Principal;
use super::scope::{self, Visibility};
use crate::errors::{AppError, AppResult};
use crate::hierarchy::OrgChart;
use crate::integrity::IntegrityFault;
use crate::models::rbac::{Action, Module, ScopeType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// No role, an inactive role, or UNASSIGNED.
    NoRole,
    MissingCapability,
    /// Capability held but the target owner is not visible.
    OutsideScope,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DenyReason::NoRole => "no role",
            DenyReason::MissingCapability => "missing capability",
            DenyReason::OutsideScope => "target outside scope",
        })
    }
}

/// What an allowed request may touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Access {
    pub scope: ScopeType,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow(Access),
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }

    pub fn into_result(self) -> AppResult<Access> {
        match self {
            Decision::Allow(access) => Ok(access),
            Decision::Deny(reason) => Err(AppError::forbidden(reason.to_string())),
        }
    }
}

/// A decision plus whatever data faults were met while reaching it.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub decision: Decision,
    pub faults: Vec<IntegrityFault>,
}

/// Access Decision Point.
#[async_trait]
pub trait AccessPolicy: Send + Sync {
    /// Decide whether `principal` may perform `action` on `module`, optionally
    /// against a record owned by `owner_id`.
    async fn decide(
        &self,
        principal: &Principal,
        chart: &OrgChart,
        module: Module,
        action: Action,
        owner_id: Option<i64>,
    ) -> Evaluation;
}

/// Standard evaluation order:
/// 1. super-admin -> allow everything
/// 2. no assigned role -> deny
/// 3. no scope for (module, action) -> deny
/// 4. target owner outside the resolved scope -> deny
/// 5. allow
#[derive(Debug, Clone, Default)]
pub struct DefaultAccessPolicy;

impl DefaultAccessPolicy {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AccessPolicy for DefaultAccessPolicy {
    async fn decide(
        &self,
        principal: &Principal,
        chart: &OrgChart,
        module: Module,
        action: Action,
        owner_id: Option<i64>,
    ) -> Evaluation {
        let deny = |reason: DenyReason| {
            tracing::debug!(
                employee_id = principal.employee_id,
                role = ?principal.role_code(),
                %module,
                %action,
                ?owner_id,
                %reason,
                "access denied"
            );
            Evaluation { decision: Decision::Deny(reason), faults: Vec::new() }
        };

        if principal.is_super_admin() {
            tracing::debug!(employee_id = principal.employee_id, %module, %action, "super-admin bypass");
            return Evaluation {
                decision: Decision::Allow(Access { scope: ScopeType::All, visibility: Visibility::Unrestricted }),
                faults: Vec::new(),
            };
        }

        if !principal.has_assigned_role() {
            return deny(DenyReason::NoRole);
        }

        let Some(scope) = principal.scope_for(module, action) else {
            return deny(DenyReason::MissingCapability);
        };

        let (visibility, faults) = scope::resolve(scope, principal, chart);

        if let Some(owner) = owner_id {
            if !visibility.admits(owner, chart) {
                let mut evaluation = deny(DenyReason::OutsideScope);
                evaluation.faults = faults;
                return evaluation;
            }
        }

        tracing::debug!(employee_id = principal.employee_id, %module, %action, %scope, "access allowed");
        Evaluation { decision: Decision::Allow(Access { scope, visibility }), faults }
    }
}
