use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use utoipa::ToSchema;

use super::store;
use crate::errors::{AppError, AppResult};
use crate::models::rbac::{Action, Capability, Grant, Module, ScopeType};

const BUILTIN_MATRIX: &str = include_str!("../../config/permission_matrix.json");

/// Declarative role/permission matrix shipped with the crate.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatrixDefinition {
    /// Actions that exist for each module. Every one of them is offered at every scope.
    pub universe: BTreeMap<Module, Vec<Action>>,
    #[serde(default)]
    pub departments: Vec<MatrixDepartment>,
    pub roles: Vec<MatrixRole>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatrixDepartment {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatrixRole {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub super_admin: bool,
    /// Department code.
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub grants: Vec<Grant>,
}

impl MatrixRole {
    pub fn scope_for(&self, module: Module, action: Action) -> Option<ScopeType> {
        self.grants
            .iter()
            .find(|g| g.module == module && g.action == action)
            .map(|g| g.scope)
    }

    pub fn expected(&self) -> BTreeMap<Capability, ScopeType> {
        self.grants.iter().map(|g| (g.capability(), g.scope)).collect()
    }
}

impl MatrixDefinition {
    pub fn builtin() -> AppResult<Self> {
        Self::from_json(BUILTIN_MATRIX)
    }

    pub fn from_json(raw: &str) -> AppResult<Self> {
        let matrix: MatrixDefinition = serde_json::from_str(raw)
            .map_err(|e| AppError::configuration(format!("invalid permission matrix: {e}")))?;
        matrix.validate()?;
        Ok(matrix)
    }

    pub fn validate(&self) -> AppResult<()> {
        let mut codes = BTreeSet::new();
        for role in &self.roles {
            if !codes.insert(role.code.as_str()) {
                return Err(AppError::data_integrity(format!("role {} defined twice in matrix", role.code)));
            }

            let mut seen = BTreeSet::new();
            for grant in &role.grants {
                if !seen.insert(grant.capability()) {
                    return Err(AppError::data_integrity(format!(
                        "role {} grants {} more than once",
                        role.code,
                        grant.capability()
                    )));
                }
                let offered = self
                    .universe
                    .get(&grant.module)
                    .is_some_and(|actions| actions.contains(&grant.action));
                if !offered {
                    return Err(AppError::data_integrity(format!(
                        "role {} grants {} which is not in the permission universe",
                        role.code,
                        grant.capability()
                    )));
                }
            }

            if let Some(dept) = &role.department {
                if !self.departments.iter().any(|d| &d.code == dept) {
                    return Err(AppError::data_integrity(format!(
                        "role {} references unknown department {dept}",
                        role.code
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn role(&self, code: &str) -> Option<&MatrixRole> {
        self.roles.iter().find(|r| r.code == code)
    }

    /// Every `(module, action, scope)` triple the catalog offers.
    pub fn permission_universe(&self) -> Vec<Grant> {
        self.universe
            .iter()
            .flat_map(|(module, actions)| {
                actions.iter().flat_map(move |action| {
                    ScopeType::all().into_iter().map(move |scope| Grant {
                        module: *module,
                        action: *action,
                        scope,
                    })
                })
            })
            .collect()
    }
}

// =============================================================================
// SEEDING
// =============================================================================

#[derive(Debug, Default, Clone, Serialize)]
pub struct SeedSummary {
    pub departments: usize,
    pub permissions: usize,
    pub roles: usize,
    pub grants: usize,
}

/// Upsert departments, the permission universe and every matrix role, then
/// replace each matrix role's grants. Runs as one transaction; re-running is a no-op.
pub async fn seed(pool: &SqlitePool, matrix: &MatrixDefinition) -> AppResult<SeedSummary> {
    let mut tx = pool.begin().await?;
    let mut summary = SeedSummary::default();

    for dept in &matrix.departments {
        sqlx::query("INSERT INTO departments (code, name) VALUES (?, ?) ON CONFLICT(code) DO UPDATE SET name = excluded.name")
            .bind(&dept.code)
            .bind(&dept.name)
            .execute(&mut *tx)
            .await?;
        summary.departments += 1;
    }

    for grant in matrix.permission_universe() {
        sqlx::query("INSERT OR IGNORE INTO permissions (module, action, scope_type, description) VALUES (?, ?, ?, ?)")
            .bind(grant.module.as_str())
            .bind(grant.action.as_str())
            .bind(grant.scope.as_str())
            .bind(store::describe_permission(grant.module, grant.action, grant.scope))
            .execute(&mut *tx)
            .await?;
        summary.permissions += 1;
    }

    for role in &matrix.roles {
        let department_id = match &role.department {
            Some(code) => Some(department_id(&mut tx, code).await?),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO roles (code, name, department_id, is_super_admin)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(code) DO UPDATE SET
                name = excluded.name,
                department_id = excluded.department_id,
                is_super_admin = excluded.is_super_admin
            "#,
        )
        .bind(&role.code)
        .bind(&role.name)
        .bind(department_id)
        .bind(role.super_admin)
        .execute(&mut *tx)
        .await?;

        let (role_id,): (i64,) = sqlx::query_as("SELECT id FROM roles WHERE code = ?")
            .bind(&role.code)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
            .bind(role_id)
            .execute(&mut *tx)
            .await?;

        for grant in &role.grants {
            sqlx::query(
                r#"
                INSERT INTO role_permissions (role_id, permission_id)
                SELECT ?, id FROM permissions WHERE module = ? AND action = ? AND scope_type = ?
                "#,
            )
            .bind(role_id)
            .bind(grant.module.as_str())
            .bind(grant.action.as_str())
            .bind(grant.scope.as_str())
            .execute(&mut *tx)
            .await?;
            summary.grants += 1;
        }
        summary.roles += 1;
    }

    tx.commit().await?;
    tracing::info!(
        roles = summary.roles,
        grants = summary.grants,
        permissions = summary.permissions,
        "permission matrix seeded"
    );
    Ok(summary)
}

async fn department_id(conn: &mut SqliteConnection, code: &str) -> AppResult<i64> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT id FROM departments WHERE code = ?")
        .bind(code)
        .fetch_optional(&mut *conn)
        .await?;
    row.map(|(id,)| id)
        .ok_or_else(|| AppError::not_found(format!("department {code} not found")))
}

// =============================================================================
// DRIFT
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    /// The matrix grants it but the stored role does not.
    Missing,
    /// Stored but absent from the matrix.
    Unexpected,
    WrongScope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DriftEntry {
    pub role_code: String,
    pub kind: DriftKind,
    pub module: Module,
    pub action: Action,
    pub expected: Option<ScopeType>,
    pub actual: Option<ScopeType>,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct DriftReport {
    /// Matrix roles with no stored row.
    pub missing_roles: Vec<String>,
    pub entries: Vec<DriftEntry>,
}

impl DriftReport {
    pub fn is_clean(&self) -> bool {
        self.missing_roles.is_empty() && self.entries.is_empty()
    }
}

/// Compare stored grants for every matrix role against the matrix.
pub async fn drift_report(pool: &SqlitePool, matrix: &MatrixDefinition) -> AppResult<DriftReport> {
    let mut report = DriftReport::default();

    for role in &matrix.roles {
        let Some(stored) = store::find_role_by_code(pool, &role.code).await? else {
            report.missing_roles.push(role.code.clone());
            continue;
        };
        let (grants, _) = store::role_grants(pool, stored.id).await?;
        let actual: BTreeMap<Capability, ScopeType> =
            grants.grants().iter().map(|g| (g.capability(), g.scope)).collect();
        report.entries.extend(compare(&role.code, &role.expected(), &actual));
    }

    Ok(report)
}

fn compare(
    role_code: &str,
    expected: &BTreeMap<Capability, ScopeType>,
    actual: &BTreeMap<Capability, ScopeType>,
) -> Vec<DriftEntry> {
    let capabilities: BTreeSet<&Capability> = expected.keys().chain(actual.keys()).collect();

    capabilities
        .into_iter()
        .filter_map(|cap| {
            let want = expected.get(cap).copied();
            let have = actual.get(cap).copied();
            let kind = match (want, have) {
                (Some(_), None) => DriftKind::Missing,
                (None, Some(_)) => DriftKind::Unexpected,
                (Some(w), Some(h)) if w != h => DriftKind::WrongScope,
                _ => return None,
            };
            Some(DriftEntry {
                role_code: role_code.to_string(),
                kind,
                module: cap.module,
                action: cap.action,
                expected: want,
                actual: have,
            })
        })
        .collect()
}
