//! Read-model projections fed by the event bus.
//!
//! Projections are eventually consistent with the command path. Each one
//! keeps a per-stream cursor, so redelivered envelopes are no-ops. When an
//! envelope arrives ahead of its predecessor (concurrent commits publish in
//! any order), [`ReadModels`] catches the stream up from the event store.

pub mod cursor;
pub mod customers;
pub mod movies;
pub mod rentals;

use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

use videostore_core::AggregateId;
use videostore_events::EventEnvelope;
use videostore_rentals::{CustomerId, MovieId, RentalId};

use crate::event_store::{EventStore, EventStoreError};
use crate::read_model::InMemoryReadStore;

use self::cursor::StreamCursors;
use self::customers::{CustomerDirectoryProjection, CustomerReadModel};
use self::movies::{MovieCatalogProjection, MovieReadModel};
use self::rentals::{RentalLedgerProjection, RentalReadModel};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event: {0}")]
    Deserialize(String),

    #[error("event does not match its stream: {0}")]
    StreamMismatch(String),

    #[error("sequence gap on stream {aggregate_id} (last={last}, found={found})")]
    Gap {
        aggregate_id: AggregateId,
        last: u64,
        found: u64,
    },

    #[error(transparent)]
    Store(#[from] EventStoreError),
}

pub type MovieCatalog = MovieCatalogProjection<Arc<InMemoryReadStore<MovieId, MovieReadModel>>>;
pub type CustomerDirectory =
    CustomerDirectoryProjection<Arc<InMemoryReadStore<CustomerId, CustomerReadModel>>>;
pub type RentalLedger = RentalLedgerProjection<Arc<InMemoryReadStore<RentalId, RentalReadModel>>>;

/// The application's read side: every projection, plus the store used to
/// catch a stream up after a gap.
#[derive(Debug)]
pub struct ReadModels<S> {
    store: S,
    pub movies: MovieCatalog,
    pub customers: CustomerDirectory,
    pub rentals: RentalLedger,
}

impl<S> ReadModels<S>
where
    S: EventStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            movies: MovieCatalogProjection::new(Arc::new(InMemoryReadStore::new())),
            customers: CustomerDirectoryProjection::new(Arc::new(InMemoryReadStore::new())),
            rentals: RentalLedgerProjection::new(Arc::new(InMemoryReadStore::new())),
        }
    }

    /// Route one published envelope to the projection that owns its type.
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        match self.apply_routed(envelope) {
            Err(ProjectionError::Gap { aggregate_id, .. }) => {
                self.catch_up(envelope.aggregate_type(), aggregate_id)
            }
            other => other,
        }
    }

    /// Clear every read model and replay the whole event log.
    pub fn rebuild_from_store(&self) -> Result<(), ProjectionError> {
        let envelopes: Vec<_> = self
            .store
            .load_all()?
            .iter()
            .map(|e| e.to_envelope())
            .collect();

        self.movies.rebuild_from_scratch(envelopes.iter().cloned())?;
        self.customers.rebuild_from_scratch(envelopes.iter().cloned())?;
        self.rentals.rebuild_from_scratch(envelopes)?;
        Ok(())
    }

    fn apply_routed(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        match envelope.aggregate_type() {
            videostore_rentals::movie::AGGREGATE_TYPE => self.movies.apply_envelope(envelope),
            videostore_rentals::customer::AGGREGATE_TYPE => self.customers.apply_envelope(envelope),
            videostore_rentals::rental::AGGREGATE_TYPE => self.rentals.apply_envelope(envelope),
            _ => Ok(()),
        }
    }

    fn cursors_for(&self, aggregate_type: &str) -> Option<&StreamCursors> {
        match aggregate_type {
            videostore_rentals::movie::AGGREGATE_TYPE => Some(self.movies.cursors()),
            videostore_rentals::customer::AGGREGATE_TYPE => Some(self.customers.cursors()),
            videostore_rentals::rental::AGGREGATE_TYPE => Some(self.rentals.cursors()),
            _ => None,
        }
    }

    fn catch_up(&self, aggregate_type: &str, aggregate_id: AggregateId) -> Result<(), ProjectionError> {
        let Some(cursors) = self.cursors_for(aggregate_type) else {
            return Ok(());
        };
        let position = cursors.position(aggregate_id);

        for stored in self.store.load_stream(aggregate_id)? {
            if stored.sequence_number > position {
                self.apply_routed(&stored.to_envelope())?;
            }
        }
        Ok(())
    }
}
