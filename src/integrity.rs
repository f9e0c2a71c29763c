use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::events::{EventBus, Loggable, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// A manager edge that closes a loop in the reporting graph.
    HierarchyCycle,
    /// `manager_id` points at an employee that does not exist.
    DanglingManager,
    /// A role holds more than one scope for one `(module, action)`.
    ScopeConflict,
    /// A stored grant names a module, action or scope this build does not know.
    InvalidGrant,
}

impl FaultKind {
    pub fn event_action(&self) -> &'static str {
        match self {
            FaultKind::HierarchyCycle => "hierarchy_cycle",
            FaultKind::DanglingManager => "dangling_manager",
            FaultKind::ScopeConflict => "scope_conflict",
            FaultKind::InvalidGrant => "invalid_grant",
        }
    }
}

/// Corrupted data found while serving a request. Never fatal for the request;
/// the offending edge or row is ignored and the fault is reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct IntegrityFault {
    pub kind: FaultKind,
    /// Employee id for hierarchy faults, role id for scope conflicts.
    pub subject_id: i64,
    pub detail: String,
}

impl IntegrityFault {
    pub fn cycle(manager_id: i64, report_id: i64) -> Self {
        Self {
            kind: FaultKind::HierarchyCycle,
            subject_id: report_id,
            detail: format!("manager edge {manager_id} -> {report_id} closes a cycle"),
        }
    }

    pub fn dangling_manager(employee_id: i64, manager_id: i64) -> Self {
        Self {
            kind: FaultKind::DanglingManager,
            subject_id: employee_id,
            detail: format!("employee {employee_id} references missing manager {manager_id}"),
        }
    }

    pub fn scope_conflict(role_id: i64, capability: impl std::fmt::Display, scopes: &[impl std::fmt::Display]) -> Self {
        let held = scopes.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(", ");
        Self {
            kind: FaultKind::ScopeConflict,
            subject_id: role_id,
            detail: format!("role {role_id} holds [{held}] for {capability}"),
        }
    }

    pub fn invalid_grant(role_id: i64, permission_id: i64, reason: impl std::fmt::Display) -> Self {
        Self {
            kind: FaultKind::InvalidGrant,
            subject_id: role_id,
            detail: format!("role {role_id} holds unusable permission {permission_id}: {reason}"),
        }
    }
}

impl Loggable for IntegrityFault {
    fn entity_type() -> &'static str { "integrity" }
    fn subject_id(&self) -> i64 { self.subject_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

/// Log each fault and publish it on the audit channel.
pub fn report_faults(event_bus: &EventBus, actor_id: Option<i64>, faults: &[IntegrityFault]) {
    for fault in faults {
        tracing::warn!(kind = ?fault.kind, subject_id = fault.subject_id, "{}", fault.detail);
        crate::events::log_activity(event_bus, fault.kind.event_action(), actor_id, fault);
    }
}
