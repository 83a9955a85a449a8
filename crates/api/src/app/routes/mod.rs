use axum::{Router, routing::get};

pub mod customers;
pub mod movies;
pub mod rentals;
pub mod system;

/// Router for every endpoint except `/health`.
pub fn router() -> Router {
    Router::new()
        .nest("/movies", movies::router())
        .nest("/customers", customers::router())
        .nest("/rentals", rentals::router())
}

/// Full route tree.
pub fn all() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .merge(router())
}
