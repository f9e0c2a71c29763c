//! Reporting-line writes.

use sqlx::SqlitePool;

use crate::errors::{AppError, AppResult};
use crate::hierarchy::OrgChart;
use crate::models::employee::{Employee, ManagerChange};

pub async fn get_employee(pool: &SqlitePool, employee_id: i64) -> AppResult<Employee> {
    sqlx::query_as::<_, Employee>(
        "SELECT id, name, email, department_id, manager_id, role_id, is_active FROM employees WHERE id = ?",
    )
    .bind(employee_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| AppError::not_found(format!("employee {employee_id} not found")))
}

/// Point `employee_id` at `manager_id` (or detach it).
///
/// The chart is read and the row written inside one transaction. A manager that
/// is the employee, or sits anywhere below it, is rejected with `DataIntegrity`.
pub async fn change_manager(
    pool: &SqlitePool,
    employee_id: i64,
    manager_id: Option<i64>,
) -> AppResult<ManagerChange> {
    let mut tx = pool.begin().await?;
    let chart = OrgChart::load(&mut *tx).await?;

    let employee = chart
        .get(employee_id)
        .ok_or_else(|| AppError::not_found(format!("employee {employee_id} not found")))?;
    let previous_manager_id = employee.manager_id;

    if let Some(manager_id) = manager_id {
        if !chart.contains(manager_id) {
            return Err(AppError::not_found(format!("manager {manager_id} not found")));
        }
        if chart.would_create_cycle(employee_id, manager_id) {
            return Err(AppError::data_integrity(format!(
                "employee {manager_id} cannot manage {employee_id}: reporting cycle"
            )));
        }
    }

    sqlx::query("UPDATE employees SET manager_id = ? WHERE id = ?")
        .bind(manager_id)
        .bind(employee_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(employee_id, ?previous_manager_id, ?manager_id, "manager changed");
    Ok(ManagerChange {
        employee_id,
        previous_manager_id,
        manager_id,
    })
}
