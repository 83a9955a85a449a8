use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde_json::Value as JsonValue;

use videostore_core::AggregateId;
use videostore_events::EventEnvelope;

use super::ProjectionError;

/// Per-stream position of the last applied event.
///
/// Delivery is at-least-once, so envelopes at or below the cursor are
/// skipped. Anything beyond `cursor + 1` is a gap and is rejected; the
/// caller catches up from the event store.
#[derive(Debug, Default)]
pub struct StreamCursors {
    positions: Mutex<HashMap<AggregateId, u64>>,
}

impl StreamCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self, aggregate_id: AggregateId) -> u64 {
        let positions = self.positions.lock().unwrap_or_else(PoisonError::into_inner);
        positions.get(&aggregate_id).copied().unwrap_or(0)
    }

    /// Run `apply` if `envelope` is the next event of its stream, then advance.
    ///
    /// The cursor lock is held across `apply`, so two workers never apply the
    /// same stream position twice.
    pub fn apply_next<F>(&self, envelope: &EventEnvelope<JsonValue>, apply: F) -> Result<(), ProjectionError>
    where
        F: FnOnce() -> Result<(), ProjectionError>,
    {
        let mut positions = self.positions.lock().unwrap_or_else(PoisonError::into_inner);
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();
        let last = positions.get(&aggregate_id).copied().unwrap_or(0);

        if seq != 0 && seq <= last {
            // Duplicate or replay.
            return Ok(());
        }
        if seq != last + 1 {
            return Err(ProjectionError::Gap {
                aggregate_id,
                last,
                found: seq,
            });
        }

        apply()?;
        positions.insert(aggregate_id, seq);
        Ok(())
    }

    pub fn reset(&self) {
        self.positions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;

    fn envelope(aggregate_id: AggregateId, seq: u64) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(Uuid::now_v7(), aggregate_id, "test.stream", seq, json!({}))
    }

    #[test]
    fn duplicates_are_skipped_and_gaps_rejected() {
        let cursors = StreamCursors::new();
        let id = AggregateId::new();
        let mut applied = 0;

        cursors.apply_next(&envelope(id, 1), || { applied += 1; Ok(()) }).unwrap();
        cursors.apply_next(&envelope(id, 1), || { applied += 1; Ok(()) }).unwrap();
        assert_eq!(applied, 1);
        assert_eq!(cursors.position(id), 1);

        let err = cursors.apply_next(&envelope(id, 3), || Ok(())).unwrap_err();
        assert!(matches!(err, ProjectionError::Gap { last: 1, found: 3, .. }));
        assert_eq!(cursors.position(id), 1);
    }

    #[test]
    fn failed_apply_does_not_advance() {
        let cursors = StreamCursors::new();
        let id = AggregateId::new();

        let err = cursors
            .apply_next(&envelope(id, 1), || {
                Err(ProjectionError::Deserialize("bad payload".to_string()))
            })
            .unwrap_err();

        assert!(matches!(err, ProjectionError::Deserialize(_)));
        assert_eq!(cursors.position(id), 0);
    }
}
