use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::errors::AppError;
use crate::events::{Loggable, Severity};

// =============================================================================
// SCOPE / MODULE / ACTION
// =============================================================================

/// Breadth of records a permission applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScopeType {
    Own,
    Team,
    Department,
    All,
}

impl ScopeType {
    pub fn all() -> [ScopeType; 4] {
        [ScopeType::Own, ScopeType::Team, ScopeType::Department, ScopeType::All]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeType::Own => "own",
            ScopeType::Team => "team",
            ScopeType::Department => "department",
            ScopeType::All => "all",
        }
    }

    /// Breadth ordering: own < team < department < all.
    pub fn rank(&self) -> u8 {
        match self {
            ScopeType::Own => 0,
            ScopeType::Team => 1,
            ScopeType::Department => 2,
            ScopeType::All => 3,
        }
    }
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "own" => Ok(ScopeType::Own),
            "team" => Ok(ScopeType::Team),
            "department" => Ok(ScopeType::Department),
            "all" => Ok(ScopeType::All),
            other => Err(AppError::data_integrity(format!("unknown scope type '{other}'"))),
        }
    }
}

/// Functional area that permissions are partitioned by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    Leads,
    Tasks,
    Employees,
    Attendance,
    Eod,
    Projects,
    Departments,
    Roles,
}

impl Module {
    pub fn all() -> Vec<Module> {
        vec![
            Module::Leads,
            Module::Tasks,
            Module::Employees,
            Module::Attendance,
            Module::Eod,
            Module::Projects,
            Module::Departments,
            Module::Roles,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Module::Leads => "leads",
            Module::Tasks => "tasks",
            Module::Employees => "employees",
            Module::Attendance => "attendance",
            Module::Eod => "eod",
            Module::Projects => "projects",
            Module::Departments => "departments",
            Module::Roles => "roles",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Module {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Module::all()
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| AppError::data_integrity(format!("unknown module '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    View,
    Create,
    Edit,
    Delete,
    Assign,
}

impl Action {
    pub fn all() -> Vec<Action> {
        vec![Action::View, Action::Create, Action::Edit, Action::Delete, Action::Assign]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Delete => "delete",
            Action::Assign => "assign",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::all()
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| AppError::data_integrity(format!("unknown action '{s}'")))
    }
}

/// A `(module, action)` pair; a role holds at most one scope per capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub struct Capability {
    pub module: Module,
    pub action: Action,
}

impl Capability {
    pub fn new(module: Module, action: Action) -> Self {
        Self { module, action }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.action)
    }
}

// =============================================================================
// ROLE
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub id: i64,
    #[schema(example = "SALES_BM")]
    pub code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department_id: Option<i64>,
    pub is_super_admin: bool,
    pub is_active: bool,
}

impl Loggable for Role {
    fn entity_type() -> &'static str { "role" }
    fn subject_id(&self) -> i64 { self.id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbRole {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub department_id: Option<i64>,
    pub is_super_admin: bool,
    pub is_active: bool,
}

impl From<DbRole> for Role {
    fn from(db: DbRole) -> Self {
        Role {
            id: db.id,
            code: db.code,
            name: db.name,
            department_id: db.department_id,
            is_super_admin: db.is_super_admin,
            is_active: db.is_active,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleCreateRequest {
    #[schema(example = "SALES_TL")]
    pub code: String,
    #[schema(example = "Sales Team Lead")]
    pub name: String,
    pub department_id: Option<i64>,
}

// =============================================================================
// PERMISSION
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Permission {
    pub id: i64,
    pub module: Module,
    pub action: Action,
    pub scope_type: ScopeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Permission {
    pub fn capability(&self) -> Capability {
        Capability::new(self.module, self.action)
    }

    /// `module:action:scope`, the form used in logs and the permission matrix.
    pub fn key(&self) -> String {
        format!("{}:{}:{}", self.module, self.action, self.scope_type)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbPermission {
    pub id: i64,
    pub module: String,
    pub action: String,
    pub scope_type: String,
    pub description: Option<String>,
}

impl TryFrom<DbPermission> for Permission {
    type Error = AppError;

    fn try_from(db: DbPermission) -> Result<Self, Self::Error> {
        Ok(Permission {
            id: db.id,
            module: db.module.parse()?,
            action: db.action.parse()?,
            scope_type: db.scope_type.parse()?,
            description: db.description,
        })
    }
}

// =============================================================================
// ROLE-PERMISSION ASSIGNMENT
// =============================================================================

/// Full replacement of a role's permission set.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RolePermissionSync {
    pub role_id: i64,
    pub permission_ids: Vec<i64>,
}

impl Loggable for RolePermissionSync {
    fn entity_type() -> &'static str { "role_permission" }
    fn subject_id(&self) -> i64 { self.role_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SyncRolePermissionsRequest {
    pub permission_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AssignScopeRequest {
    pub module: Module,
    pub action: Action,
    pub scope: ScopeType,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScopeAssignment {
    pub role_id: i64,
    pub module: Module,
    pub action: Action,
    pub scope: Option<ScopeType>,
}

impl Loggable for ScopeAssignment {
    fn entity_type() -> &'static str { "role_scope" }
    fn subject_id(&self) -> i64 { self.role_id }
    fn severity(&self) -> Severity { Severity::Critical }
}

/// One granted `(module, action, scope)` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub struct Grant {
    pub module: Module,
    pub action: Action,
    pub scope: ScopeType,
}

impl Grant {
    pub fn capability(&self) -> Capability {
        Capability::new(self.module, self.action)
    }
}
