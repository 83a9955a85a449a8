//! Command execution pipeline (application-level orchestration).
//!
//! Implements the command dispatch pattern for event-sourced aggregates:
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store
//!   ↓
//! 2. Rehydrate aggregate (apply historical events to rebuild state)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events to store (append-only, optimistic concurrency check)
//!   ↓
//! 5. Publish events to bus (projections)
//! ```
//!
//! The dispatcher covers single-aggregate commands. Cross-aggregate work
//! (checkout/checkin) reuses the same load/convert/publish helpers from
//! [`crate::rental_service`] and commits through one atomic batch.
//!
//! This module contains no IO itself; it composes infrastructure traits.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use videostore_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use videostore_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Optimistic concurrency failure (e.g. stale aggregate version).
    #[error("concurrency conflict: {0}")]
    Concurrency(String),
    /// The request conflicts with current state (no copies left, nothing to return).
    #[error("{0}")]
    Conflict(String),
    /// Domain validation failure (deterministic).
    #[error("{0}")]
    Validation(String),
    /// Domain invariant failure (deterministic).
    #[error("{0}")]
    InvariantViolation(String),
    /// Referenced movie, customer or rental does not exist.
    #[error("not found")]
    NotFound,
    /// Failed to deserialize historical event payloads into the aggregate event type.
    #[error("failed to read event history: {0}")]
    Deserialize(String),
    /// Persisting to the event store failed.
    #[error("event store failure: {0}")]
    Store(EventStoreError),
    /// Publication failed after a successful append (at-least-once; retry may duplicate).
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            _ => DispatchError::Store(value),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Conflict(msg),
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// ## Execution Guarantees
///
/// - Events are persisted before publication (if append fails, nothing is published)
/// - Optimistic concurrency: the append expects the version the aggregate was rehydrated at
/// - Each command operates on a single aggregate instance
///
/// ## Error Semantics
///
/// - Domain errors map onto `Validation` / `InvariantViolation` / `Conflict` / `NotFound`
/// - Version mismatch → `Concurrency`
/// - Bus errors → `Publish` (events are persisted, publication failed)
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command through the full event-sourcing pipeline.
    ///
    /// `make_aggregate` builds the empty instance that history is replayed
    /// into (e.g. `Movie::empty(id)`), which keeps the dispatcher generic.
    ///
    /// Returns the committed events with their sequence numbers. A command
    /// that decides no events commits nothing and returns an empty vec.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: videostore_events::Event + Serialize + DeserializeOwned,
    {
        // 1-2) Load history and rehydrate
        let (aggregate, version) =
            load_aggregate(&self.store, aggregate_id, aggregate_type, make_aggregate)?;

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist (append-only, optimistic)
        let uncommitted = to_uncommitted(aggregate_id, aggregate_type, &decided)?;
        let committed = self
            .store
            .append(uncommitted, ExpectedVersion::Exact(version))?;

        // 5) Publish committed events (after append)
        publish(&self.bus, &committed)?;

        Ok(committed)
    }

    /// Rehydrate an aggregate from its stream (consistent read).
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        load_aggregate(&self.store, aggregate_id, aggregate_type, make_aggregate).map(|(a, _)| a)
    }
}

/// Load, validate and replay one stream.
///
/// A stream that belongs to another aggregate type is reported as
/// `NotFound`: a customer id is not a movie. Returns the aggregate and the
/// stream version to expect on the next append.
pub(crate) fn load_aggregate<A, S>(
    store: &S,
    aggregate_id: AggregateId,
    aggregate_type: &str,
    make_aggregate: impl FnOnce(AggregateId) -> A,
) -> Result<(A, u64), DispatchError>
where
    S: EventStore + ?Sized,
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    let history = store.load_stream(aggregate_id)?;
    if history.first().is_some_and(|e| e.aggregate_type != aggregate_type) {
        return Err(DispatchError::NotFound);
    }
    validate_loaded_stream(aggregate_id, &history)?;

    let mut aggregate = make_aggregate(aggregate_id);
    apply_history(&mut aggregate, &history)?;

    Ok((aggregate, stream_version(&history)))
}

pub(crate) fn to_uncommitted<E>(
    aggregate_id: AggregateId,
    aggregate_type: &str,
    events: &[E],
) -> Result<Vec<UncommittedEvent>, DispatchError>
where
    E: videostore_events::Event + Serialize,
{
    events
        .iter()
        .map(|ev| UncommittedEvent::from_typed(aggregate_id, aggregate_type, Uuid::now_v7(), ev))
        .collect::<Result<Vec<_>, _>>()
        .map_err(DispatchError::from)
}

pub(crate) fn publish<B>(bus: &B, committed: &[StoredEvent]) -> Result<(), DispatchError>
where
    B: EventBus<EventEnvelope<JsonValue>> + ?Sized,
{
    for stored in committed {
        bus.publish(stored.to_envelope())
            .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
    }
    Ok(())
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // A stream must be one aggregate's events with strictly increasing sequence numbers.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::CorruptStream(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::CorruptStream(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}
