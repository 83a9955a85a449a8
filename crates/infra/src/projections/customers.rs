use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;

use videostore_events::EventEnvelope;
use videostore_rentals::customer::AGGREGATE_TYPE;
use videostore_rentals::{CustomerEvent, CustomerId};

use super::ProjectionError;
use super::cursor::StreamCursors;
use crate::read_model::ReadStore;

/// Queryable customer directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerReadModel {
    pub id: CustomerId,
    pub name: String,
    pub phone: Option<String>,
    pub postal_code: Option<String>,
    pub registered_at: DateTime<Utc>,
    pub movies_checked_out_count: u32,
}

/// Customer directory projection (`rentals.customer` streams).
#[derive(Debug)]
pub struct CustomerDirectoryProjection<S>
where
    S: ReadStore<CustomerId, CustomerReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> CustomerDirectoryProjection<S>
where
    S: ReadStore<CustomerId, CustomerReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, customer_id: &CustomerId) -> Option<CustomerReadModel> {
        self.store.get(customer_id)
    }

    /// All customers, ordered by name.
    pub fn list(&self) -> Vec<CustomerReadModel> {
        let mut customers = self.store.list();
        customers.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.0.cmp(&b.id.0)));
        customers
    }

    pub(crate) fn cursors(&self) -> &StreamCursors {
        &self.cursors
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != AGGREGATE_TYPE {
            return Ok(());
        }

        self.cursors.apply_next(envelope, || {
            let event: CustomerEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

            let customer_id = event.customer_id();
            if customer_id.0 != envelope.aggregate_id() {
                return Err(ProjectionError::StreamMismatch(format!(
                    "customer {customer_id} delivered on stream {}",
                    envelope.aggregate_id()
                )));
            }

            let next = match (event, self.store.get(&customer_id)) {
                (CustomerEvent::CustomerRegistered(e), _) => CustomerReadModel {
                    id: e.customer_id,
                    name: e.name,
                    phone: e.phone,
                    postal_code: e.postal_code,
                    registered_at: e.occurred_at,
                    movies_checked_out_count: 0,
                },
                (CustomerEvent::MovieCheckedOut(_), Some(mut rm)) => {
                    rm.movies_checked_out_count += 1;
                    rm
                }
                (CustomerEvent::MovieReturned(_), Some(mut rm)) => {
                    rm.movies_checked_out_count = rm.movies_checked_out_count.saturating_sub(1);
                    rm
                }
                (_, None) => {
                    return Err(ProjectionError::StreamMismatch(format!(
                        "customer {customer_id} changed before registering"
                    )));
                }
            };

            self.store.upsert(customer_id, next);
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

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use uuid::Uuid;
    use videostore_core::AggregateId;
    use videostore_rentals::{
        CustomerRegistered, MovieCheckedOut, MovieId, MovieReturned, RentalId,
    };

    use super::*;
    use crate::read_model::InMemoryReadStore;

    fn envelope(seq: u64, event: CustomerEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            event.customer_id().0,
            AGGREGATE_TYPE,
            seq,
            serde_json::to_value(&event).unwrap(),
        )
    }

    #[test]
    fn counts_open_loans() {
        let projection = CustomerDirectoryProjection::new(Arc::new(InMemoryReadStore::new()));
        let customer_id = CustomerId::new(AggregateId::new());
        let movie_id = MovieId::new(AggregateId::new());
        let rental_id = RentalId::new(AggregateId::new());

        let events = vec![
            CustomerEvent::CustomerRegistered(CustomerRegistered {
                customer_id,
                name: "Shelley Rocha".to_string(),
                phone: Some("(322) 510-8695".to_string()),
                postal_code: Some("24309".to_string()),
                occurred_at: Utc::now(),
            }),
            CustomerEvent::MovieCheckedOut(MovieCheckedOut {
                customer_id,
                rental_id,
                movie_id,
                occurred_at: Utc::now(),
            }),
            CustomerEvent::MovieCheckedOut(MovieCheckedOut {
                customer_id,
                rental_id: RentalId::new(AggregateId::new()),
                movie_id,
                occurred_at: Utc::now(),
            }),
            CustomerEvent::MovieReturned(MovieReturned {
                customer_id,
                rental_id,
                movie_id,
                occurred_at: Utc::now(),
            }),
        ];
        for (i, e) in events.into_iter().enumerate() {
            projection.apply_envelope(&envelope(i as u64 + 1, e)).unwrap();
        }

        let rm = projection.get(&customer_id).unwrap();
        assert_eq!(rm.name, "Shelley Rocha");
        assert_eq!(rm.movies_checked_out_count, 1);
    }

    #[test]
    fn other_aggregate_types_are_ignored() {
        let projection = CustomerDirectoryProjection::new(Arc::new(InMemoryReadStore::new()));
        let env = EventEnvelope::new(
            Uuid::now_v7(),
            AggregateId::new(),
            "rentals.movie",
            1,
            serde_json::json!({"not": "a customer event"}),
        );

        projection.apply_envelope(&env).unwrap();
        assert!(projection.list().is_empty());
    }
}
