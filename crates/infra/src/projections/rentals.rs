use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value as JsonValue;

use videostore_events::EventEnvelope;
use videostore_rentals::rental::AGGREGATE_TYPE;
use videostore_rentals::{CustomerId, MovieId, RentalEvent, RentalId};

use super::ProjectionError;
use super::cursor::StreamCursors;
use crate::read_model::ReadStore;

/// Queryable rental record. Closed rentals stay, with `returned_date` set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RentalReadModel {
    pub id: RentalId,
    pub customer_id: CustomerId,
    pub movie_id: MovieId,
    pub checkout_date: NaiveDate,
    pub due_date: NaiveDate,
    pub returned_date: Option<NaiveDate>,
}

impl RentalReadModel {
    pub fn is_open(&self) -> bool {
        self.returned_date.is_none()
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.is_open() && self.due_date < today
    }
}

/// Rental ledger projection (`rentals.rental` streams).
#[derive(Debug)]
pub struct RentalLedgerProjection<S>
where
    S: ReadStore<RentalId, RentalReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> RentalLedgerProjection<S>
where
    S: ReadStore<RentalId, RentalReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, rental_id: &RentalId) -> Option<RentalReadModel> {
        self.store.get(rental_id)
    }

    /// Every rental, oldest checkout first.
    pub fn list(&self) -> Vec<RentalReadModel> {
        let mut rentals = self.store.list();
        rentals.sort_by(|a, b| {
            a.checkout_date
                .cmp(&b.checkout_date)
                .then(a.id.0.cmp(&b.id.0))
        });
        rentals
    }

    pub fn open_for_customer(&self, customer_id: CustomerId) -> Vec<RentalReadModel> {
        self.list()
            .into_iter()
            .filter(|r| r.customer_id == customer_id && r.is_open())
            .collect()
    }

    /// Open rentals whose due date is before `today`.
    pub fn overdue(&self, today: NaiveDate) -> Vec<RentalReadModel> {
        self.list()
            .into_iter()
            .filter(|r| r.is_overdue(today))
            .collect()
    }

    pub(crate) fn cursors(&self) -> &StreamCursors {
        &self.cursors
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }

        self.cursors.apply_next(envelope, || {
            let event: RentalEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

            let rental_id = event.rental_id();
            if rental_id.0 != envelope.aggregate_id() {
                return Err(ProjectionError::StreamMismatch(format!(
                    "rental {rental_id} delivered on stream {}",
                    envelope.aggregate_id()
                )));
            }

            let next = match (event, self.store.get(&rental_id)) {
                (RentalEvent::RentalOpened(e), _) => RentalReadModel {
                    id: e.rental_id,
                    customer_id: e.customer_id,
                    movie_id: e.movie_id,
                    checkout_date: e.checkout_date,
                    due_date: e.due_date,
                    returned_date: None,
                },
                (RentalEvent::RentalClosed(e), Some(mut rm)) => {
                    rm.returned_date = Some(e.returned_date);
                    rm
                }
                (RentalEvent::RentalClosed(_), None) => {
                    return Err(ProjectionError::StreamMismatch(format!(
                        "rental {rental_id} closed before it was opened"
                    )));
                }
            };

            self.store.upsert(rental_id, next);
            Ok(())
        })
    }

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
