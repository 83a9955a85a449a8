use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;

use videostore_core::AggregateId;
use videostore_rentals::customer::{self, Customer};
use videostore_rentals::{CustomerCommand, CustomerId, RegisterCustomer};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_customers).post(register_customer))
        .route("/:id", get(get_customer))
        .route("/:id/rentals", get(list_open_rentals))
}

pub async fn list_customers(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    let customers: Vec<_> = services
        .read_models()
        .customers
        .list()
        .into_iter()
        .map(dto::customer_to_json)
        .collect();
    (StatusCode::OK, Json(customers)).into_response()
}

pub async fn register_customer(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::RegisterCustomerRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let agg = AggregateId::new();
    let customer_id = CustomerId::new(agg);

    let cmd = CustomerCommand::RegisterCustomer(RegisterCustomer {
        customer_id,
        name: body.name,
        phone: body.phone,
        postal_code: body.postal_code,
        occurred_at: Utc::now(),
    });

    if let Err(e) = services.dispatch::<Customer>(agg, customer::AGGREGATE_TYPE, cmd, |id| {
        Customer::empty(CustomerId::new(id))
    }) {
        return errors::dispatch_error_to_response(e);
    }

    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": agg.to_string() })),
    )
        .into_response()
}

pub async fn get_customer(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Some(agg) = dto::parse_id(&id) else {
        return errors::not_found();
    };

    match services.read_models().customers.get(&CustomerId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::customer_to_json(rm))).into_response(),
        None => errors::not_found(),
    }
}

/// Rentals the customer has not returned yet.
pub async fn list_open_rentals(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Some(agg) = dto::parse_id(&id) else {
        return errors::not_found();
    };
    let customer_id = CustomerId::new(agg);

    let read_models = services.read_models();
    if read_models.customers.get(&customer_id).is_none() {
        return errors::not_found();
    }

    let rentals: Vec<_> = read_models
        .rentals
        .open_for_customer(customer_id)
        .iter()
        .map(dto::rental_to_json)
        .collect();
    (StatusCode::OK, Json(rentals)).into_response()
}
