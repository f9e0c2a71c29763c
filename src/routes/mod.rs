pub mod employees;
pub mod health;
pub mod leads;
pub mod rbac;
pub mod records;

use serde::Deserialize;
use utoipa::IntoParams;

/// Optional narrowing filter shared by the scoped list endpoints.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ScopeFilter {
    /// Only records owned by this employee. Ignored when outside the requester's scope.
    pub employee_id: Option<i64>,
}
