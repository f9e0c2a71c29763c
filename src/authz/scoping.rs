//! Query Scoping Adapter.
//!
//! Turns a [`Visibility`] into a SQL predicate on the record's owner column, or
//! applies the same rule to records already in memory. Every extra filter is
//! ANDed onto the visibility predicate, so nothing appended here can widen it.

use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

use super::scope::Visibility;
use crate::errors::AppResult;
use crate::hierarchy::OrgChart;
use crate::models::employee::Employee;
use crate::models::rbac::Module;
use crate::models::records::{AttendanceEntry, EodReport, Lead, Project, Task};

/// A table whose rows belong to one employee.
pub trait ScopedRecord: for<'r> FromRow<'r, SqliteRow> + Send + Unpin {
    const MODULE: Module;
    const TABLE: &'static str;
    const OWNER_COLUMN: &'static str;
    const COLUMNS: &'static [&'static str];
    const ORDER_BY: &'static str = "id";

    fn owner_id(&self) -> i64;
}

impl ScopedRecord for Lead {
    const MODULE: Module = Module::Leads;
    const TABLE: &'static str = "leads";
    const OWNER_COLUMN: &'static str = "owner_id";
    const COLUMNS: &'static [&'static str] = &[
        "id",
        "owner_id",
        "department_id",
        "company",
        "contact_name",
        "status",
        "created_at",
        "updated_at",
    ];

    fn owner_id(&self) -> i64 {
        self.owner_id
    }
}

impl ScopedRecord for Task {
    const MODULE: Module = Module::Tasks;
    const TABLE: &'static str = "tasks";
    const OWNER_COLUMN: &'static str = "assignee_id";
    const COLUMNS: &'static [&'static str] =
        &["id", "assignee_id", "lead_id", "title", "status", "due_date", "created_at"];

    fn owner_id(&self) -> i64 {
        self.assignee_id
    }
}

impl ScopedRecord for AttendanceEntry {
    const MODULE: Module = Module::Attendance;
    const TABLE: &'static str = "attendance";
    const OWNER_COLUMN: &'static str = "employee_id";
    const COLUMNS: &'static [&'static str] = &["id", "employee_id", "work_date", "status"];
    const ORDER_BY: &'static str = "work_date DESC, id";

    fn owner_id(&self) -> i64 {
        self.employee_id
    }
}

impl ScopedRecord for EodReport {
    const MODULE: Module = Module::Eod;
    const TABLE: &'static str = "eod_reports";
    const OWNER_COLUMN: &'static str = "employee_id";
    const COLUMNS: &'static [&'static str] = &["id", "employee_id", "report_date", "summary", "created_at"];
    const ORDER_BY: &'static str = "report_date DESC, id";

    fn owner_id(&self) -> i64 {
        self.employee_id
    }
}

impl ScopedRecord for Project {
    const MODULE: Module = Module::Projects;
    const TABLE: &'static str = "projects";
    const OWNER_COLUMN: &'static str = "owner_id";
    const COLUMNS: &'static [&'static str] = &["id", "owner_id", "name", "description", "created_at"];

    fn owner_id(&self) -> i64 {
        self.owner_id
    }
}

/// Employees own themselves.
impl ScopedRecord for Employee {
    const MODULE: Module = Module::Employees;
    const TABLE: &'static str = "employees";
    const OWNER_COLUMN: &'static str = "id";
    const COLUMNS: &'static [&'static str] =
        &["id", "name", "email", "department_id", "manager_id", "role_id", "is_active"];

    fn owner_id(&self) -> i64 {
        self.id
    }
}

/// `SELECT` over one [`ScopedRecord`] table with a visibility predicate.
pub struct ScopedQuery<'a> {
    builder: QueryBuilder<'a, Sqlite>,
    owner_column: &'static str,
    order_by: &'static str,
}

impl<'a> ScopedQuery<'a> {
    pub fn new<T: ScopedRecord>() -> Self {
        let columns = T::COLUMNS
            .iter()
            .map(|c| format!("t.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let builder = QueryBuilder::new(format!("SELECT {columns} FROM {} t WHERE 1 = 1", T::TABLE));
        Self {
            builder,
            owner_column: T::OWNER_COLUMN,
            order_by: T::ORDER_BY,
        }
    }

    /// Restrict to rows whose owner is visible.
    pub fn apply(mut self, visibility: &Visibility) -> Self {
        match visibility {
            Visibility::Unrestricted => {}
            Visibility::Department(dept) => {
                self.builder
                    .push(format!(" AND t.{} IN (SELECT id FROM employees WHERE department_id = ", self.owner_column))
                    .push_bind(*dept)
                    .push(")");
            }
            Visibility::Employees(ids) if ids.is_empty() => {
                self.builder.push(" AND 1 = 0");
            }
            // One bind for the whole set; SQLite caps host parameters per statement.
            Visibility::Employees(ids) => {
                let members = serde_json::Value::from(ids.iter().copied().collect::<Vec<i64>>());
                self.builder
                    .push(format!(" AND t.{} IN (SELECT value FROM json_each(", self.owner_column))
                    .push_bind(members.to_string())
                    .push("))");
            }
        }
        self
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.builder.push(" AND t.id = ").push_bind(id);
        self
    }

    pub fn sql(&self) -> &str {
        self.builder.sql()
    }

    pub async fn fetch_all<T: ScopedRecord>(mut self, pool: &SqlitePool) -> AppResult<Vec<T>> {
        self.builder.push(format!(" ORDER BY t.{}", self.order_by.replace(", ", ", t.")));
        let rows = self.builder.build_query_as::<T>().fetch_all(pool).await?;
        Ok(rows)
    }

    pub async fn fetch_optional<T: ScopedRecord>(mut self, pool: &SqlitePool) -> AppResult<Option<T>> {
        let row = self.builder.build_query_as::<T>().fetch_optional(pool).await?;
        Ok(row)
    }
}

/// In-memory counterpart of [`ScopedQuery::apply`].
pub fn filter_records<T: ScopedRecord>(records: Vec<T>, visibility: &Visibility, chart: &OrgChart) -> Vec<T> {
    records
        .into_iter()
        .filter(|r| visibility.admits(r.owner_id(), chart))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::hierarchy::tests::{emp, sample_chart};

    #[test]
    fn unrestricted_adds_no_predicate() {
        let q = ScopedQuery::new::<Lead>().apply(&Visibility::Unrestricted);
        assert!(q.sql().starts_with("SELECT t.id, t.owner_id"));
        assert!(q.sql().ends_with("FROM leads t WHERE 1 = 1"));
    }

    #[test]
    fn employee_set_binds_once() {
        let q = ScopedQuery::new::<Task>().apply(&Visibility::Employees(BTreeSet::from([2, 4, 5])));
        assert!(q.sql().ends_with("AND t.assignee_id IN (SELECT value FROM json_each(?))"));
        assert_eq!(q.sql().matches('?').count(), 1);
    }

    #[test]
    fn empty_set_matches_nothing() {
        let q = ScopedQuery::new::<Project>().apply(&Visibility::Employees(BTreeSet::new()));
        assert!(q.sql().ends_with("AND 1 = 0"));
    }

    #[test]
    fn department_joins_through_employees() {
        let q = ScopedQuery::new::<EodReport>().apply(&Visibility::Department(10));
        assert!(q
            .sql()
            .ends_with("AND t.employee_id IN (SELECT id FROM employees WHERE department_id = ?)"));
    }

    #[test]
    fn filter_records_matches_visibility() {
        let chart = sample_chart();
        let employees = vec![emp(1, None, 10), emp(7, Some(5), 20), emp(8, None, 20)];

        let visible = filter_records(employees.clone(), &Visibility::Department(20), &chart);
        assert_eq!(visible.iter().map(|e| e.id).collect::<Vec<_>>(), vec![7, 8]);

        let visible = filter_records(employees, &Visibility::only(1), &chart);
        assert_eq!(visible.len(), 1);
    }
}
