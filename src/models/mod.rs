pub mod employee;
pub mod rbac;
pub mod records;
