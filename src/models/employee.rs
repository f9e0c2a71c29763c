use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::events::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Employee {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub department_id: i64,
    pub manager_id: Option<i64>,
    pub role_id: Option<i64>,
    pub is_active: bool,
}

impl Loggable for Employee {
    fn entity_type() -> &'static str { "employee" }
    fn subject_id(&self) -> i64 { self.id }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangeManagerRequest {
    /// `null` detaches the employee from any manager.
    pub manager_id: Option<i64>,
}

/// Reporting-line change as published on the audit channel.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ManagerChange {
    pub employee_id: i64,
    pub previous_manager_id: Option<i64>,
    pub manager_id: Option<i64>,
}

impl Loggable for ManagerChange {
    fn entity_type() -> &'static str { "employee" }
    fn subject_id(&self) -> i64 { self.employee_id }
    fn severity(&self) -> Severity { Severity::Critical }
}
