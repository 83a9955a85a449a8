//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: infrastructure wiring (event store/bus, projections, dispatcher)
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent `{"errors": [...]}` responses

use std::io;
use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use videostore_infra::config::AppConfig;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(config: &AppConfig) -> io::Result<Router> {
    let services = Arc::new(services::build_services(config)?);
    Ok(router_with(services))
}

/// Router over already-built services (tests keep a handle on them).
pub fn router_with(services: Arc<services::AppServices>) -> Router {
    routes::all().layer(ServiceBuilder::new().layer(Extension(services)))
}
