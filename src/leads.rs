//! Lead ownership writes.

use sqlx::SqlitePool;

use crate::errors::{AppError, AppResult};
use crate::models::employee::Employee;

/// Move `lead_id` to `new_owner`, provided it still belongs to `expected_owner`.
///
/// The caller authorized against `expected_owner`. If another write moved the
/// lead in between, nothing is changed and `Conflict` is returned.
pub async fn reassign(pool: &SqlitePool, lead_id: i64, expected_owner: i64, new_owner: &Employee) -> AppResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE leads
        SET owner_id = ?, department_id = ?, updated_at = CURRENT_TIMESTAMP
        WHERE id = ? AND owner_id = ?
        "#,
    )
    .bind(new_owner.id)
    .bind(new_owner.department_id)
    .bind(lead_id)
    .bind(expected_owner)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::conflict(format!(
            "lead {lead_id} no longer belongs to employee {expected_owner}"
        )));
    }

    tracing::info!(lead_id, from = expected_owner, to = new_owner.id, "lead reassigned");
    Ok(())
}
