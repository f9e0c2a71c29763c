//! Permission Catalog: which `(module, action, scope)` triples each role holds.
//!
//! A role holds at most one scope per `(module, action)`. Writes go through
//! [`store::assign_scope`] / [`store::sync_role_permissions`], which replace
//! atomically and refuse payloads that would leave two scopes in place.

pub mod matrix;
pub mod store;

use std::collections::BTreeMap;

use serde::Serialize;
use utoipa::ToSchema;

use crate::integrity::IntegrityFault;
use crate::models::rbac::{Action, Capability, Grant, Module, ScopeType};

pub use matrix::{drift_report, seed, DriftReport, MatrixDefinition, MatrixRole, SeedSummary};

pub const ADMIN_ROLE: &str = "ADMIN";
pub const UNASSIGNED_ROLE: &str = "UNASSIGNED";

/// Resolved `(module, action) -> scope` map for one role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleGrants {
    scopes: BTreeMap<Capability, ScopeType>,
}

impl RoleGrants {
    /// Build from stored grants. When rows conflict the narrowest scope wins and
    /// the conflict is returned for reporting.
    pub fn from_grants(role_id: i64, grants: impl IntoIterator<Item = Grant>) -> (Self, Vec<IntegrityFault>) {
        let mut held: BTreeMap<Capability, Vec<ScopeType>> = BTreeMap::new();
        for grant in grants {
            let scopes = held.entry(grant.capability()).or_default();
            if !scopes.contains(&grant.scope) {
                scopes.push(grant.scope);
            }
        }

        let mut faults = Vec::new();
        let mut scopes = BTreeMap::new();
        for (capability, mut held_scopes) in held {
            held_scopes.sort_by_key(ScopeType::rank);
            if held_scopes.len() > 1 {
                faults.push(IntegrityFault::scope_conflict(role_id, capability, &held_scopes));
            }
            scopes.insert(capability, held_scopes[0]);
        }

        (Self { scopes }, faults)
    }

    pub fn scope_for(&self, module: Module, action: Action) -> Option<ScopeType> {
        self.scopes.get(&Capability::new(module, action)).copied()
    }

    pub fn has_capability(&self, module: Module, action: Action) -> bool {
        self.scope_for(module, action).is_some()
    }

    pub fn grants(&self) -> Vec<Grant> {
        self.scopes
            .iter()
            .map(|(cap, scope)| Grant { module: cap.module, action: cap.action, scope: *scope })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

/// A role holding more than one scope for the same capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ScopeConflict {
    pub role_id: i64,
    pub role_code: String,
    pub module: Module,
    pub action: Action,
    pub scopes: Vec<ScopeType>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScopeRepair {
    pub conflict: ScopeConflict,
    pub kept: ScopeType,
}

/// A granted permission row whose module, action or scope this build cannot read.
/// Kept as raw text so it can be reported and removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct InvalidGrant {
    pub role_id: i64,
    pub role_code: String,
    pub permission_id: i64,
    pub module: String,
    pub action: String,
    pub scope_type: String,
    pub reason: String,
}

/// Outcome of a repair run.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct CatalogRepair {
    pub removed_grants: Vec<InvalidGrant>,
    pub scope_repairs: Vec<ScopeRepair>,
}
