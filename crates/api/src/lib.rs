//! HTTP API layer for kyc-vault.
//!
//! - **Endpoints**: document intake and status for users, review routes for admins
//! - **Extractors**: authenticated user and reviewer
//! - **Middleware**: bearer token authentication
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;

pub use endpoints::{router, upload_body_limit};
pub use middleware::{AppState, auth_middleware};
