//! Scope Resolver: turns a granted [`ScopeType`] into the set of record owners
//! the requester may see.

use std::collections::BTreeSet;

use serde::Serialize;
use utoipa::ToSchema;

use super::Principal;
use crate::hierarchy::OrgChart;
use crate::integrity::IntegrityFault;
use crate::models::rbac::ScopeType;

/// Which record owners are visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    Unrestricted,
    /// Owners whose `department_id` equals this one.
    Department(i64),
    Employees(BTreeSet<i64>),
}

impl Visibility {
    pub fn only(employee_id: i64) -> Self {
        Visibility::Employees(BTreeSet::from([employee_id]))
    }

    /// Whether a record owned by `owner_id` is visible. Owners unknown to the
    /// chart have no department and only pass an explicit employee set.
    pub fn admits(&self, owner_id: i64, chart: &OrgChart) -> bool {
        match self {
            Visibility::Unrestricted => true,
            Visibility::Department(dept) => chart.department_of(owner_id) == Some(*dept),
            Visibility::Employees(ids) => ids.contains(&owner_id),
        }
    }

    /// Apply an optional `employee_id` filter. A filter inside the visible set
    /// narrows to that employee; one outside it is ignored so it can never widen.
    pub fn narrow(&self, requested: Option<i64>, chart: &OrgChart) -> Visibility {
        match requested {
            Some(id) if self.admits(id, chart) => Visibility::only(id),
            Some(id) => {
                tracing::debug!(employee_id = id, "narrowing filter outside visibility ignored");
                self.clone()
            }
            None => self.clone(),
        }
    }

    pub fn describe(&self, scope: Option<ScopeType>) -> VisibilityView {
        let mut view = VisibilityView {
            scope,
            unrestricted: false,
            department_id: None,
            employee_ids: None,
        };
        match self {
            Visibility::Unrestricted => view.unrestricted = true,
            Visibility::Department(dept) => view.department_id = Some(*dept),
            Visibility::Employees(ids) => view.employee_ids = Some(ids.iter().copied().collect()),
        }
        view
    }
}

/// Serializable form of a [`Visibility`].
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VisibilityView {
    pub scope: Option<ScopeType>,
    pub unrestricted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_ids: Option<Vec<i64>>,
}

/// Visible owners for `principal` holding `scope`.
pub fn resolve(scope: ScopeType, principal: &Principal, chart: &OrgChart) -> (Visibility, Vec<IntegrityFault>) {
    match scope {
        ScopeType::Own => (Visibility::only(principal.employee_id), Vec::new()),
        ScopeType::Team => {
            let team = chart.team(principal.employee_id);
            (Visibility::Employees(team.members), team.faults)
        }
        ScopeType::Department => (Visibility::Department(principal.department_id), Vec::new()),
        ScopeType::All => (Visibility::Unrestricted, Vec::new()),
    }
}

/// Resolve a scope name as stored. Anything unrecognised resolves to nothing.
pub fn resolve_named(scope: &str, principal: &Principal, chart: &OrgChart) -> (Visibility, Vec<IntegrityFault>) {
    match scope.parse::<ScopeType>() {
        Ok(scope) => resolve(scope, principal, chart),
        Err(_) => {
            tracing::warn!(scope, employee_id = principal.employee_id, "unknown scope resolved to nothing");
            (Visibility::Employees(BTreeSet::new()), Vec::new())
        }
    }
}
