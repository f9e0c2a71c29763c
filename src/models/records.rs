use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::events::Loggable;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Lead {
    pub id: i64,
    pub owner_id: i64,
    pub department_id: i64,
    #[schema(example = "Acme Industries")]
    pub company: String,
    pub contact_name: Option<String>,
    #[schema(example = "new")]
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loggable for Lead {
    fn entity_type() -> &'static str { "lead" }
    fn subject_id(&self) -> i64 { self.id }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LeadCreateRequest {
    #[schema(example = "Acme Industries")]
    pub company: String,
    pub contact_name: Option<String>,
    pub status: Option<String>,
    /// Defaults to the requester.
    pub owner_id: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LeadAssignRequest {
    pub owner_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Task {
    pub id: i64,
    pub assignee_id: i64,
    pub lead_id: Option<i64>,
    pub title: String,
    pub status: String,
    pub due_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AttendanceEntry {
    pub id: i64,
    pub employee_id: i64,
    pub work_date: NaiveDate,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct EodReport {
    pub id: i64,
    pub employee_id: i64,
    pub report_date: NaiveDate,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Project {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}
