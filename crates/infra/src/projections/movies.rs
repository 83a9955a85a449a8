use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value as JsonValue;

use videostore_events::EventEnvelope;
use videostore_rentals::movie::AGGREGATE_TYPE;
use videostore_rentals::{MovieEvent, MovieId};

use super::ProjectionError;
use super::cursor::StreamCursors;
use crate::read_model::ReadStore;

/// Queryable catalog entry: one movie and its shelf counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MovieReadModel {
    pub id: MovieId,
    pub title: String,
    pub overview: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub total_inventory: u32,
    pub available_inventory: u32,
    pub copies_on_loan: u32,
}

impl MovieReadModel {
    fn recount(&mut self) {
        self.available_inventory = self.total_inventory.saturating_sub(self.copies_on_loan);
    }
}

/// Movie catalog projection.
///
/// Consumes published envelopes (JSON payloads) of `rentals.movie` streams.
/// Read models are disposable and rebuildable from the event stream.
#[derive(Debug)]
pub struct MovieCatalogProjection<S>
where
    S: ReadStore<MovieId, MovieReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> MovieCatalogProjection<S>
where
    S: ReadStore<MovieId, MovieReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, movie_id: &MovieId) -> Option<MovieReadModel> {
        self.store.get(movie_id)
    }

    /// All movies, ordered by title.
    pub fn list(&self) -> Vec<MovieReadModel> {
        let mut movies = self.store.list();
        movies.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.0.cmp(&b.id.0)));
        movies
    }

    pub(crate) fn cursors(&self) -> &StreamCursors {
        &self.cursors
    }

    /// Apply a published envelope; envelopes of other aggregate types are ignored.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }

        self.cursors.apply_next(envelope, || {
            let event: MovieEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

            let movie_id = event.movie_id();
            if movie_id.0 != envelope.aggregate_id() {
                return Err(ProjectionError::StreamMismatch(format!(
                    "movie {movie_id} delivered on stream {}",
                    envelope.aggregate_id()
                )));
            }

            let current = self.store.get(&movie_id);
            let next = match (event, current) {
                (MovieEvent::MovieAdded(e), _) => MovieReadModel {
                    id: e.movie_id,
                    title: e.title,
                    overview: e.overview,
                    release_date: e.release_date,
                    total_inventory: e.total_inventory,
                    available_inventory: e.total_inventory,
                    copies_on_loan: 0,
                },
                (MovieEvent::CopyCheckedOut(_), Some(mut rm)) => {
                    rm.copies_on_loan += 1;
                    rm.recount();
                    rm
                }
                (MovieEvent::CopyReturned(_), Some(mut rm)) => {
                    rm.copies_on_loan = rm.copies_on_loan.saturating_sub(1);
                    rm.recount();
                    rm
                }
                (MovieEvent::InventoryChanged(e), Some(mut rm)) => {
                    rm.total_inventory = e.total_inventory;
                    rm.recount();
                    rm
                }
                (_, None) => {
                    return Err(ProjectionError::StreamMismatch(format!(
                        "movie {movie_id} changed before it was added"
                    )));
                }
            };

            self.store.upsert(movie_id, next);
            Ok(())
        })
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.cursors.reset();
        self.store.clear();

        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (e.aggregate_id(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
