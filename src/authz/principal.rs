use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::catalog::{RoleGrants, ADMIN_ROLE, UNASSIGNED_ROLE};
use crate::errors::{AppError, AppResult};
use crate::integrity::IntegrityFault;
use crate::models::rbac::{Action, DbPermission, DbRole, Grant, Module, Permission, ScopeType};

/// The role an employee acts under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RoleRef {
    pub id: i64,
    pub code: String,
    pub is_super_admin: bool,
}

/// Principal represents the requesting employee with their resolved grants.
#[derive(Debug, Clone)]
pub struct Principal {
    pub employee_id: i64,
    pub department_id: i64,
    pub role: Option<RoleRef>,
    pub grants: RoleGrants,
}

impl Principal {
    pub fn new(employee_id: i64, department_id: i64) -> Self {
        Self {
            employee_id,
            department_id,
            role: None,
            grants: RoleGrants::default(),
        }
    }

    pub fn with_role(mut self, id: i64, code: impl Into<String>, is_super_admin: bool) -> Self {
        self.role = Some(RoleRef { id, code: code.into(), is_super_admin });
        self
    }

    pub fn with_grants(mut self, grants: RoleGrants) -> Self {
        self.grants = grants;
        self
    }

    pub fn role_code(&self) -> Option<&str> {
        self.role.as_ref().map(|r| r.code.as_str())
    }

    pub fn is_super_admin(&self) -> bool {
        self.role
            .as_ref()
            .is_some_and(|r| r.is_super_admin || r.code == ADMIN_ROLE)
    }

    /// False for employees without a role and for the UNASSIGNED placeholder.
    pub fn has_assigned_role(&self) -> bool {
        self.role.as_ref().is_some_and(|r| r.code != UNASSIGNED_ROLE)
    }

    pub fn scope_for(&self, module: Module, action: Action) -> Option<ScopeType> {
        self.grants.scope_for(module, action)
    }

    /// Resolve the principal for `employee_id` from storage.
    ///
    /// Inactive roles are treated as no role. Grant rows that cannot be parsed or
    /// that conflict are left out of the narrowest-wins map and returned as faults.
    pub async fn load(pool: &SqlitePool, employee_id: i64) -> AppResult<(Self, Vec<IntegrityFault>)> {
        let row: Option<(i64, Option<i64>, bool)> =
            sqlx::query_as("SELECT department_id, role_id, is_active FROM employees WHERE id = ?")
                .bind(employee_id)
                .fetch_optional(pool)
                .await?;

        let (department_id, role_id, is_active) =
            row.ok_or_else(|| AppError::unauthenticated(format!("unknown employee {employee_id}")))?;
        if !is_active {
            return Err(AppError::unauthenticated(format!("employee {employee_id} is inactive")));
        }

        let mut principal = Principal::new(employee_id, department_id);
        let Some(role_id) = role_id else {
            return Ok((principal, Vec::new()));
        };

        let role = sqlx::query_as::<_, DbRole>(
            "SELECT id, code, name, department_id, is_super_admin, is_active FROM roles WHERE id = ?",
        )
        .bind(role_id)
        .fetch_optional(pool)
        .await?;

        let Some(role) = role.filter(|r| r.is_active) else {
            tracing::debug!(employee_id, role_id, "role missing or inactive");
            return Ok((principal, Vec::new()));
        };

        let rows = sqlx::query_as::<_, DbPermission>(
            r#"
            SELECT p.id, p.module, p.action, p.scope_type, p.description
            FROM permissions p
            INNER JOIN role_permissions rp ON p.id = rp.permission_id
            WHERE rp.role_id = ?
            "#,
        )
        .bind(role.id)
        .fetch_all(pool)
        .await?;

        let mut faults = Vec::new();
        let mut grants = Vec::with_capacity(rows.len());
        for row in rows {
            let permission_id = row.id;
            match Permission::try_from(row) {
                Ok(p) => grants.push(Grant { module: p.module, action: p.action, scope: p.scope_type }),
                Err(e) => faults.push(IntegrityFault::invalid_grant(role.id, permission_id, e)),
            }
        }

        let (grants, conflicts) = RoleGrants::from_grants(role.id, grants);
        faults.extend(conflicts);

        principal = principal
            .with_role(role.id, role.code, role.is_super_admin)
            .with_grants(grants);
        Ok((principal, faults))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_code_is_super_admin_without_flag() {
        let principal = Principal::new(1, 10).with_role(1, "ADMIN", false);
        assert!(principal.is_super_admin());
        assert!(principal.has_assigned_role());
    }

    #[test]
    fn flagged_role_is_super_admin() {
        let principal = Principal::new(1, 10).with_role(9, "PLATFORM_OWNER", true);
        assert!(principal.is_super_admin());
    }

    #[test]
    fn unassigned_and_missing_roles_are_not_assigned() {
        assert!(!Principal::new(1, 10).has_assigned_role());
        assert!(!Principal::new(1, 10).with_role(7, "UNASSIGNED", false).has_assigned_role());
        assert!(!Principal::new(1, 10).with_role(7, "UNASSIGNED", false).is_super_admin());
    }
}
