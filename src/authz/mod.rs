//! Authorization: principals, scope resolution, the access decision point and
//! the query scoping adapter.
//!
//! Evaluation fails closed. No role, an UNASSIGNED role, a missing capability,
//! an unknown scope or a target owner outside the resolved scope all deny.

mod cache;
mod evaluator;
mod principal;
pub mod scope;
pub mod scoping;
mod service;

pub use cache::PrincipalCache;
pub use evaluator::{Access, AccessPolicy, Decision, DefaultAccessPolicy, DenyReason, Evaluation};
pub use principal::{Principal, RoleRef};
pub use scope::{Visibility, VisibilityView};
pub use scoping::{filter_records, ScopedQuery, ScopedRecord};
pub use service::AccessService;
