use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;

use videostore_core::AggregateId;
use videostore_rentals::movie::{self, Movie};
use videostore_rentals::{AddMovie, ChangeInventory, MovieCommand, MovieId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_movies).post(add_movie))
        .route("/:id", get(get_movie))
        .route("/:id/inventory", post(change_inventory))
}

pub async fn list_movies(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let movies: Vec<_> = services
        .read_models()
        .movies
        .list()
        .into_iter()
        .map(dto::movie_to_json)
        .collect();
    (StatusCode::OK, Json(movies)).into_response()
}

pub async fn add_movie(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::AddMovieRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let agg = AggregateId::new();
    let movie_id = MovieId::new(agg);

    let cmd = MovieCommand::AddMovie(AddMovie {
        movie_id,
        title: body.title,
        overview: body.overview,
        release_date: body.release_date,
        total_inventory: body.inventory,
        occurred_at: Utc::now(),
    });

    if let Err(e) = services.dispatch::<Movie>(agg, movie::AGGREGATE_TYPE, cmd, |id| {
        Movie::empty(MovieId::new(id))
    }) {
        return errors::dispatch_error_to_response(e);
    }

    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "id": agg.to_string() })),
    )
        .into_response()
}

pub async fn get_movie(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Some(agg) = dto::parse_id(&id) else {
        return errors::not_found();
    };

    match services.read_models().movies.get(&MovieId::new(agg)) {
        Some(rm) => (StatusCode::OK, Json(dto::movie_to_json(rm))).into_response(),
        None => errors::not_found(),
    }
}

pub async fn change_inventory(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::ChangeInventoryRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection(rejection),
    };
    let Some(agg) = dto::parse_id(&id) else {
        return errors::not_found();
    };
    let movie_id = MovieId::new(agg);

    let cmd = MovieCommand::ChangeInventory(ChangeInventory {
        movie_id,
        total_inventory: body.inventory,
        occurred_at: Utc::now(),
    });

    let committed = match services.dispatch::<Movie>(agg, movie::AGGREGATE_TYPE, cmd, |id| {
        Movie::empty(MovieId::new(id))
    }) {
        Ok(c) => c,
        Err(e) => return errors::dispatch_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "id": agg.to_string(),
            "inventory": body.inventory,
            "events_committed": committed.len(),
        })),
    )
        .into_response()
}
