use std::collections::{BTreeMap, BTreeSet};

use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};

use super::{matrix::MatrixDefinition, CatalogRepair, InvalidGrant, RoleGrants, ScopeConflict, ScopeRepair};
use crate::errors::{AppError, AppResult};
use crate::integrity::IntegrityFault;
use crate::models::rbac::{
    Action, DbPermission, DbRole, Grant, Module, Permission, Role, RoleCreateRequest, ScopeType,
};

const ROLE_COLUMNS: &str = "id, code, name, department_id, is_super_admin, is_active";
const PERMISSION_COLUMNS: &str = "id, module, action, scope_type, description";

// =============================================================================
// ROLES
// =============================================================================

pub async fn list_roles(pool: &SqlitePool) -> AppResult<Vec<Role>> {
    let rows = sqlx::query_as::<_, DbRole>(&format!("SELECT {ROLE_COLUMNS} FROM roles ORDER BY code"))
        .fetch_all(pool)
        .await?;
    Ok(rows.into_iter().map(Role::from).collect())
}

pub async fn get_role(pool: &SqlitePool, role_id: i64) -> AppResult<Role> {
    let mut conn = pool.acquire().await?;
    role_in(&mut conn, role_id).await
}

pub async fn find_role_by_code(pool: &SqlitePool, code: &str) -> AppResult<Option<Role>> {
    let row = sqlx::query_as::<_, DbRole>(&format!("SELECT {ROLE_COLUMNS} FROM roles WHERE code = ?"))
        .bind(code)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Role::from))
}

pub async fn create_role(pool: &SqlitePool, req: &RoleCreateRequest) -> AppResult<Role> {
    let code = req.code.trim().to_uppercase();
    if code.is_empty() {
        return Err(AppError::bad_request("role code must not be empty"));
    }
    if find_role_by_code(pool, &code).await?.is_some() {
        return Err(AppError::conflict(format!("role {code} already exists")));
    }

    let id = sqlx::query("INSERT INTO roles (code, name, department_id) VALUES (?, ?, ?)")
        .bind(&code)
        .bind(&req.name)
        .bind(req.department_id)
        .execute(pool)
        .await?
        .last_insert_rowid();

    get_role(pool, id).await
}

async fn role_in(conn: &mut SqliteConnection, role_id: i64) -> AppResult<Role> {
    sqlx::query_as::<_, DbRole>(&format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = ?"))
        .bind(role_id)
        .fetch_optional(&mut *conn)
        .await?
        .map(Role::from)
        .ok_or_else(|| AppError::not_found(format!("role {role_id} not found")))
}

// =============================================================================
// PERMISSIONS
// =============================================================================

pub async fn list_permissions(pool: &SqlitePool) -> AppResult<Vec<Permission>> {
    let rows = sqlx::query_as::<_, DbPermission>(&format!(
        "SELECT {PERMISSION_COLUMNS} FROM permissions ORDER BY module, action, scope_type"
    ))
    .fetch_all(pool)
    .await?;

    let (permissions, unreadable) = split_readable(rows);
    for (permission_id, error) in &unreadable {
        tracing::warn!(permission_id, %error, "permission row skipped");
    }
    Ok(permissions)
}

/// Rows this build can read, plus `(permission_id, error)` for the rest.
fn split_readable(rows: Vec<DbPermission>) -> (Vec<Permission>, Vec<(i64, AppError)>) {
    let mut readable = Vec::with_capacity(rows.len());
    let mut unreadable = Vec::new();
    for row in rows {
        let permission_id = row.id;
        match Permission::try_from(row) {
            Ok(p) => readable.push(p),
            Err(e) => unreadable.push((permission_id, e)),
        }
    }
    (readable, unreadable)
}

/// Permission row for the triple, created on first use.
async fn ensure_permission(
    conn: &mut SqliteConnection,
    module: Module,
    action: Action,
    scope: ScopeType,
) -> AppResult<Permission> {
    sqlx::query("INSERT OR IGNORE INTO permissions (module, action, scope_type, description) VALUES (?, ?, ?, ?)")
        .bind(module.as_str())
        .bind(action.as_str())
        .bind(scope.as_str())
        .bind(describe_permission(module, action, scope))
        .execute(&mut *conn)
        .await?;

    let row = sqlx::query_as::<_, DbPermission>(&format!(
        "SELECT {PERMISSION_COLUMNS} FROM permissions WHERE module = ? AND action = ? AND scope_type = ?"
    ))
    .bind(module.as_str())
    .bind(action.as_str())
    .bind(scope.as_str())
    .fetch_one(&mut *conn)
    .await?;

    Permission::try_from(row)
}

pub(crate) fn describe_permission(module: Module, action: Action, scope: ScopeType) -> String {
    let breadth = match scope {
        ScopeType::Own => "own records",
        ScopeType::Team => "own and team records",
        ScopeType::Department => "department records",
        ScopeType::All => "all records",
    };
    format!("{} {} ({})", action, module, breadth)
}

// =============================================================================
// ROLE GRANTS
// =============================================================================

pub async fn permissions_for_role(pool: &SqlitePool, role_id: i64) -> AppResult<Vec<Permission>> {
    let (permissions, faults) = role_permissions(pool, role_id).await?;
    for fault in &faults {
        tracing::warn!(role_id, "{}", fault.detail);
    }
    Ok(permissions)
}

async fn role_permissions(pool: &SqlitePool, role_id: i64) -> AppResult<(Vec<Permission>, Vec<IntegrityFault>)> {
    let mut conn = pool.acquire().await?;
    role_in(&mut conn, role_id).await?;
    permissions_in(&mut conn, role_id).await
}

async fn permissions_in(conn: &mut SqliteConnection, role_id: i64) -> AppResult<(Vec<Permission>, Vec<IntegrityFault>)> {
    let rows = sqlx::query_as::<_, DbPermission>(
        r#"
        SELECT p.id, p.module, p.action, p.scope_type, p.description
        FROM permissions p
        INNER JOIN role_permissions rp ON p.id = rp.permission_id
        WHERE rp.role_id = ?
        ORDER BY p.module, p.action, p.scope_type
        "#,
    )
    .bind(role_id)
    .fetch_all(&mut *conn)
    .await?;

    let (permissions, unreadable) = split_readable(rows);
    let faults = unreadable
        .into_iter()
        .map(|(permission_id, error)| IntegrityFault::invalid_grant(role_id, permission_id, error))
        .collect();
    Ok((permissions, faults))
}

/// Resolved grants plus any stored conflicts (narrowest scope kept) and
/// unreadable grant rows.
pub async fn role_grants(pool: &SqlitePool, role_id: i64) -> AppResult<(RoleGrants, Vec<IntegrityFault>)> {
    let (permissions, mut faults) = role_permissions(pool, role_id).await?;
    let grants = permissions.iter().map(|p| Grant {
        module: p.module,
        action: p.action,
        scope: p.scope_type,
    });
    let (grants, conflicts) = RoleGrants::from_grants(role_id, grants);
    faults.extend(conflicts);
    Ok((grants, faults))
}

/// Give `role_id` exactly `scope` for `(module, action)`, replacing whatever
/// scope it held, in one transaction.
pub async fn assign_scope(
    pool: &SqlitePool,
    role_id: i64,
    module: Module,
    action: Action,
    scope: ScopeType,
) -> AppResult<Permission> {
    let mut tx = pool.begin().await?;
    role_in(&mut tx, role_id).await?;

    let permission = ensure_permission(&mut tx, module, action, scope).await?;
    delete_capability(&mut tx, role_id, module, action).await?;

    sqlx::query("INSERT INTO role_permissions (role_id, permission_id) VALUES (?, ?)")
        .bind(role_id)
        .bind(permission.id)
        .execute(&mut *tx)
        .await?;

    verify_single_scope(&mut tx, role_id).await?;
    tx.commit().await?;

    tracing::info!(role_id, permission = %permission.key(), "scope assigned");
    Ok(permission)
}

pub async fn revoke_capability(pool: &SqlitePool, role_id: i64, module: Module, action: Action) -> AppResult<u64> {
    let mut tx = pool.begin().await?;
    role_in(&mut tx, role_id).await?;
    let removed = delete_capability(&mut tx, role_id, module, action).await?;
    tx.commit().await?;
    Ok(removed)
}

async fn delete_capability(conn: &mut SqliteConnection, role_id: i64, module: Module, action: Action) -> AppResult<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM role_permissions
        WHERE role_id = ?
          AND permission_id IN (SELECT id FROM permissions WHERE module = ? AND action = ?)
        "#,
    )
    .bind(role_id)
    .bind(module.as_str())
    .bind(action.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Replace the role's permission set with `permission_ids`. Applying the same
/// payload twice leaves the same set.
pub async fn sync_role_permissions(pool: &SqlitePool, role_id: i64, permission_ids: &[i64]) -> AppResult<Vec<Permission>> {
    let ids: BTreeSet<i64> = permission_ids.iter().copied().collect();

    let mut tx = pool.begin().await?;
    role_in(&mut tx, role_id).await?;

    let permissions = permissions_by_id(&mut tx, &ids).await?;
    if permissions.len() != ids.len() {
        let found: BTreeSet<i64> = permissions.iter().map(|p| p.id).collect();
        let missing: Vec<String> = ids.difference(&found).map(|id| id.to_string()).collect();
        return Err(AppError::not_found(format!("permissions not found: {}", missing.join(", "))));
    }

    let mut by_capability: BTreeMap<(Module, Action), Vec<ScopeType>> = BTreeMap::new();
    for p in &permissions {
        by_capability.entry((p.module, p.action)).or_default().push(p.scope_type);
    }
    if let Some(((module, action), scopes)) = by_capability.iter().find(|(_, s)| s.len() > 1) {
        let held: Vec<&str> = scopes.iter().map(ScopeType::as_str).collect();
        return Err(AppError::conflict(format!(
            "payload grants {} scopes for {}:{}: {}",
            scopes.len(),
            module,
            action,
            held.join(", ")
        )));
    }

    sqlx::query("DELETE FROM role_permissions WHERE role_id = ?")
        .bind(role_id)
        .execute(&mut *tx)
        .await?;

    for p in &permissions {
        sqlx::query("INSERT INTO role_permissions (role_id, permission_id) VALUES (?, ?)")
            .bind(role_id)
            .bind(p.id)
            .execute(&mut *tx)
            .await?;
    }

    verify_single_scope(&mut tx, role_id).await?;
    tx.commit().await?;

    tracing::info!(role_id, permissions = permissions.len(), "role permissions synced");
    Ok(permissions)
}

async fn permissions_by_id(conn: &mut SqliteConnection, ids: &BTreeSet<i64>) -> AppResult<Vec<Permission>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut builder: QueryBuilder<Sqlite> =
        QueryBuilder::new(format!("SELECT {PERMISSION_COLUMNS} FROM permissions WHERE id IN ("));
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY id");

    let rows = builder
        .build_query_as::<DbPermission>()
        .fetch_all(&mut *conn)
        .await?;

    let (permissions, unreadable) = split_readable(rows);
    if let Some((permission_id, error)) = unreadable.first() {
        return Err(AppError::bad_request(format!("permission {permission_id} cannot be granted: {error}")));
    }
    Ok(permissions)
}

/// Post-write invariant check; an error here aborts the surrounding transaction.
async fn verify_single_scope(conn: &mut SqliteConnection, role_id: i64) -> AppResult<()> {
    let conflicts = conflicts_in(conn, Some(role_id)).await?;
    if let Some(conflict) = conflicts.first() {
        return Err(AppError::data_integrity(format!(
            "role {} would hold {} scopes for {}:{}",
            conflict.role_code,
            conflict.scopes.len(),
            conflict.module,
            conflict.action
        )));
    }
    Ok(())
}

// =============================================================================
// AUDIT / REPAIR
// =============================================================================

pub async fn audit_scope_conflicts(pool: &SqlitePool) -> AppResult<Vec<ScopeConflict>> {
    let mut conn = pool.acquire().await?;
    conflicts_in(&mut conn, None).await
}

async fn conflicts_in(conn: &mut SqliteConnection, role_id: Option<i64>) -> AppResult<Vec<ScopeConflict>> {
    let rows: Vec<(i64, String, String, String, String)> = sqlx::query_as(
        r#"
        SELECT r.id, r.code, p.module, p.action, group_concat(p.scope_type, ',')
        FROM role_permissions rp
        INNER JOIN roles r ON r.id = rp.role_id
        INNER JOIN permissions p ON p.id = rp.permission_id
        WHERE (?1 IS NULL OR r.id = ?1)
        GROUP BY r.id, p.module, p.action
        HAVING COUNT(*) > 1
        ORDER BY r.code, p.module, p.action
        "#,
    )
    .bind(role_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(role_id, role_code, module, action, scopes)| {
            parse_conflict(role_id, role_code, &module, &action, &scopes)
        })
        .collect())
}

/// `None` when fewer than two readable scopes remain; unreadable rows are
/// reported through [`audit_invalid_grants`] instead.
fn parse_conflict(role_id: i64, role_code: String, module: &str, action: &str, scopes: &str) -> Option<ScopeConflict> {
    let module = module.parse::<Module>().ok()?;
    let action = action.parse::<Action>().ok()?;
    let mut scopes: Vec<ScopeType> = scopes.split(',').filter_map(|s| s.parse().ok()).collect();
    scopes.sort_by_key(ScopeType::rank);
    scopes.dedup();
    if scopes.len() < 2 {
        return None;
    }
    Some(ScopeConflict { role_id, role_code, module, action, scopes })
}

/// Grant rows naming a module, action or scope this build does not know.
pub async fn audit_invalid_grants(pool: &SqlitePool) -> AppResult<Vec<InvalidGrant>> {
    let mut conn = pool.acquire().await?;
    invalid_grants_in(&mut conn).await
}

async fn invalid_grants_in(conn: &mut SqliteConnection) -> AppResult<Vec<InvalidGrant>> {
    let rows: Vec<(i64, String, i64, String, String, String)> = sqlx::query_as(
        r#"
        SELECT r.id, r.code, p.id, p.module, p.action, p.scope_type
        FROM role_permissions rp
        INNER JOIN roles r ON r.id = rp.role_id
        INNER JOIN permissions p ON p.id = rp.permission_id
        ORDER BY r.code, p.id
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(role_id, role_code, permission_id, module, action, scope_type)| {
            let reason = readable_triple(&module, &action, &scope_type).err()?;
            Some(InvalidGrant {
                role_id,
                role_code,
                permission_id,
                module,
                action,
                scope_type,
                reason: reason.to_string(),
            })
        })
        .collect())
}

fn readable_triple(module: &str, action: &str, scope: &str) -> AppResult<()> {
    module.parse::<Module>()?;
    action.parse::<Action>()?;
    scope.parse::<ScopeType>()?;
    Ok(())
}

/// Drop unreadable grant rows, then collapse every conflict to one scope: the
/// matrix scope for matrix roles, otherwise the narrowest scope held.
pub async fn repair_catalog(pool: &SqlitePool, matrix: &MatrixDefinition) -> AppResult<CatalogRepair> {
    let removed_grants = remove_invalid_grants(pool).await?;

    let conflicts = audit_scope_conflicts(pool).await?;
    let mut scope_repairs = Vec::with_capacity(conflicts.len());

    for conflict in conflicts {
        let kept = matrix
            .role(&conflict.role_code)
            .and_then(|role| role.scope_for(conflict.module, conflict.action))
            .or_else(|| conflict.scopes.iter().min_by_key(|s| s.rank()).copied())
            .ok_or_else(|| AppError::internal("conflict without scopes"))?;

        assign_scope(pool, conflict.role_id, conflict.module, conflict.action, kept).await?;
        tracing::warn!(
            role = %conflict.role_code,
            module = %conflict.module,
            action = %conflict.action,
            kept = %kept,
            "scope conflict repaired"
        );
        scope_repairs.push(ScopeRepair { conflict, kept });
    }

    Ok(CatalogRepair { removed_grants, scope_repairs })
}

async fn remove_invalid_grants(pool: &SqlitePool) -> AppResult<Vec<InvalidGrant>> {
    let mut tx = pool.begin().await?;
    let invalid = invalid_grants_in(&mut tx).await?;

    for grant in &invalid {
        sqlx::query("DELETE FROM role_permissions WHERE role_id = ? AND permission_id = ?")
            .bind(grant.role_id)
            .bind(grant.permission_id)
            .execute(&mut *tx)
            .await?;
        tracing::warn!(
            role = %grant.role_code,
            permission_id = grant.permission_id,
            reason = %grant.reason,
            "unreadable grant removed"
        );
    }

    tx.commit().await?;
    Ok(invalid)
}
