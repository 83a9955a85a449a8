use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;

use videostore_core::AggregateId;
use videostore_infra::projections::{
    customers::CustomerReadModel, movies::MovieReadModel, rentals::RentalReadModel,
};
use videostore_infra::rental_service::CheckoutReceipt;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct AddMovieRequest {
    pub title: String,
    pub overview: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub inventory: u32,
}

#[derive(Debug, Deserialize)]
pub struct ChangeInventoryRequest {
    pub inventory: u32,
}

#[derive(Debug, Deserialize)]
pub struct RegisterCustomerRequest {
    pub name: String,
    pub phone: Option<String>,
    pub postal_code: Option<String>,
}

/// Body of create-rental, check-out and check-in.
///
/// Ids are taken as raw JSON: a missing, null or non-string id names no
/// record, which is reported as not found rather than as a bad body.
#[derive(Debug, Deserialize)]
pub struct RentalRequest {
    #[serde(default)]
    pub movie_id: Option<serde_json::Value>,
    #[serde(default)]
    pub customer_id: Option<serde_json::Value>,
}

// -------------------------
// Response mapping
// -------------------------

pub fn movie_to_json(rm: MovieReadModel) -> serde_json::Value {
    json!({
        "id": rm.id.to_string(),
        "title": rm.title,
        "overview": rm.overview,
        "release_date": rm.release_date,
        "inventory": rm.total_inventory,
        "available_inventory": rm.available_inventory,
    })
}

pub fn customer_to_json(rm: CustomerReadModel) -> serde_json::Value {
    json!({
        "id": rm.id.to_string(),
        "name": rm.name,
        "phone": rm.phone,
        "postal_code": rm.postal_code,
        "registered_at": rm.registered_at,
        "movies_checked_out_count": rm.movies_checked_out_count,
    })
}

/// Rental row for listings.
pub fn rental_summary_to_json(rm: &RentalReadModel) -> serde_json::Value {
    json!({
        "id": rm.id.to_string(),
        "customer_id": rm.customer_id.to_string(),
        "movie_id": rm.movie_id.to_string(),
        "checkout_date": rm.checkout_date,
        "due_date": rm.due_date,
    })
}

pub fn rental_to_json(rm: &RentalReadModel) -> serde_json::Value {
    let mut body = rental_summary_to_json(rm);
    body["returned_date"] = json!(rm.returned_date);
    body
}

/// Rental record as created by a checkout (the projection may lag behind).
pub fn created_rental_to_json(receipt: &CheckoutReceipt) -> serde_json::Value {
    json!({
        "id": receipt.rental_id.to_string(),
        "customer_id": receipt.customer_id.to_string(),
        "movie_id": receipt.movie_id.to_string(),
        "checkout_date": receipt.checkout_date,
        "due_date": receipt.due_date,
        "returned_date": null,
    })
}

/// Parse a path or body id. Unparseable ids name nothing, so callers treat
/// `None` as not found.
pub fn parse_id(raw: &str) -> Option<AggregateId> {
    raw.trim().parse().ok()
}

/// Id carried in a JSON body; only strings can hold one.
pub fn body_id(raw: Option<&serde_json::Value>) -> Option<AggregateId> {
    raw.and_then(serde_json::Value::as_str).and_then(parse_id)
}
