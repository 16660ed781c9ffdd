//! Monitoring and control over HTTP

pub mod dashboard;

pub use dashboard::{create_router, start_server, AppState, ErrorBody};
