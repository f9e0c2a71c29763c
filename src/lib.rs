pub mod app;
pub mod authz;
pub mod catalog;
pub mod config;
pub mod db;
pub mod docs;
pub mod employees;
pub mod errors;
pub mod events;
pub mod hierarchy;
pub mod integrity;
pub mod jwt;
pub mod leads;
pub mod models;
pub mod routes;

// Re-export commonly used items for tests
pub use app::create_app;
