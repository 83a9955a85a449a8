use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use videostore_rentals::{CustomerId, MovieId, RentalId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_rentals).post(create_rental))
        .route("/overdue", get(list_overdue))
        .route("/check-out", post(check_out))
        .route("/check-in", post(check_in))
        .route("/:id", get(get_rental))
}

#[derive(Debug, Deserialize)]
pub struct OverdueQuery {
    /// Defaults to today (UTC).
    pub today: Option<NaiveDate>,
}

pub async fn list_rentals(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let rentals: Vec<_> = services
        .read_models()
        .rentals
        .list()
        .iter()
        .map(dto::rental_summary_to_json)
        .collect();
    (StatusCode::OK, Json(rentals)).into_response()
}

pub async fn list_overdue(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<OverdueQuery>,
) -> axum::response::Response {
    let today = query.today.unwrap_or_else(|| Utc::now().date_naive());
    let rentals: Vec<_> = services
        .read_models()
        .rentals
        .overdue(today)
        .iter()
        .map(dto::rental_to_json)
        .collect();
    (StatusCode::OK, Json(rentals)).into_response()
}

pub async fn get_rental(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Some(agg) = dto::parse_id(&id) else {
        return errors::not_found();
    };

    match services.read_models().rentals.get(&RentalId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::rental_to_json(&rm))).into_response(),
        None => errors::not_found(),
    }
}

/// Create a rental record. Goes through the checkout path, so inventory and
/// the customer's count move with it.
pub async fn create_rental(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::RentalRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let Some((movie_id, customer_id)) = parse_pair(&body) else {
        return errors::not_found();
    };

    match services.rentals().checkout(movie_id, customer_id) {
        Ok(receipt) => (
            StatusCode::CREATED,
            Json(dto::created_rental_to_json(&receipt)),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn check_out(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::RentalRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let Some((movie_id, customer_id)) = parse_pair(&body) else {
        return errors::not_found();
    };

    match services.rentals().checkout(movie_id, customer_id) {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn check_in(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::RentalRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let Some((movie_id, customer_id)) = parse_pair(&body) else {
        return errors::not_found();
    };

    match services.rentals().checkin(movie_id, customer_id) {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

fn parse_pair(body: &dto::RentalRequest) -> Option<(MovieId, CustomerId)> {
    let movie = dto::body_id(body.movie_id.as_ref())?;
    let customer = dto::body_id(body.customer_id.as_ref())?;
    Some((MovieId::new(movie), CustomerId::new(customer)))
}
