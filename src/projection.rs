//! Projection driver: folds the global operation log into read-model data
//! from a saved cursor.
//!
//! A projection is eventually consistent: [`advance`](Projection::advance)
//! reads every operation-log entry past the cursor, dispatches each to the
//! handlers registered for the entry's tag, and moves the cursor entry by
//! entry. Delivery order equals global `op_nr` order regardless of
//! aggregate boundaries.

use std::sync::Arc;

use crate::codec::EventCodec;
use crate::error::{EventDecodingFailure, ProjectionError};
use crate::store::EventStore;
use crate::tag::{AggregateId, Tag};

/// A decoded event together with its address in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct EventData<E> {
    /// Tag of the aggregate that produced the event.
    pub tag: Tag,
    /// Instance the event belongs to.
    pub id: AggregateId,
    /// The event's version within its stream.
    pub version: u64,
    /// The decoded event.
    pub payload: E,
}

/// Type-erased per-tag handler: decodes the raw payload and folds it into
/// the data. Erasure is what lets one projection subscribe to aggregates
/// with different event types.
type TagHandler<D> =
    Arc<dyn Fn(&mut D, &Tag, &AggregateId, u64, &str) -> Result<(), EventDecodingFailure> + Send + Sync>;

/// A read model built by folding the global event log.
///
/// Holds the data, the cursor (highest `op_nr` already folded), and the
/// registered per-tag handlers. Handlers must be deterministic: given the
/// same log, they must produce the same data.
pub struct Projection<D> {
    cursor: u64,
    data: D,
    initial: D,
    handlers: Vec<(Tag, TagHandler<D>)>,
}

impl<D: Clone> Projection<D> {
    /// Create a projection starting from `data` with the cursor at 0.
    pub fn new(data: D) -> Self {
        Self {
            cursor: 0,
            initial: data.clone(),
            data,
            handlers: Vec::new(),
        }
    }

    /// Register a handler for one aggregate tag.
    ///
    /// Every entry for `tag` is decoded with `codec` and folded through
    /// `apply`. A projection may register handlers for several tags, and
    /// several handlers for the same tag -- all of them run, in
    /// registration order.
    pub fn on<E, X, F>(mut self, tag: Tag, codec: X, apply: F) -> Self
    where
        X: EventCodec<E> + 'static,
        F: Fn(&mut D, EventData<E>) + Send + Sync + 'static,
        E: 'static,
    {
        let handler: TagHandler<D> = Arc::new(move |data, tag, id, version, raw| {
            let payload = codec.decode(raw)?;
            apply(
                data,
                EventData {
                    tag: tag.clone(),
                    id: id.clone(),
                    version,
                    payload,
                },
            );
            Ok(())
        });
        self.handlers.push((tag, handler));
        self
    }

    /// The highest `op_nr` already folded into the data.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// The projection's current data.
    pub fn data(&self) -> &D {
        &self.data
    }

    /// Fold all operation-log entries past the cursor.
    ///
    /// The cursor moves after each fully-folded entry, so a later call
    /// resumes exactly where this one stopped. Re-running with no new
    /// operations is a no-op.
    ///
    /// # Errors
    ///
    /// A payload that fails to decode halts the projection: the error is
    /// returned and the cursor stays on the last fully-folded entry.
    /// Other projections are unaffected.
    pub fn advance<S: EventStore>(&mut self, store: &S) -> Result<(), ProjectionError> {
        let entries = store.read_log(self.cursor)?;
        let folded = entries.len();

        let Self {
            cursor,
            data,
            handlers,
            ..
        } = self;

        for entry in entries {
            for (tag, handler) in handlers.iter() {
                if *tag != entry.tag {
                    continue;
                }
                let raw = store.payload_at(&entry.tag, &entry.id, entry.version)?;
                if let Err(failure) = handler(data, &entry.tag, &entry.id, entry.version, &raw) {
                    tracing::warn!(
                        tag = %entry.tag,
                        id = %entry.id,
                        version = entry.version,
                        op_nr = entry.op_nr,
                        "projection halted, cannot decode event payload"
                    );
                    return Err(failure.into());
                }
            }
            *cursor = entry.op_nr;
        }

        if folded > 0 {
            tracing::debug!(entries = folded, cursor = *cursor, "projection advanced");
        }
        Ok(())
    }

    /// Reset the data and cursor, then refold the whole log from scratch.
    pub fn rebuild<S: EventStore>(&mut self, store: &S) -> Result<(), ProjectionError> {
        self.data = self.initial.clone();
        self.cursor = 0;
        self.advance(store)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::*;
    use crate::codec::JsonCodec;
    use crate::runtime::AggregateRuntime;
    use crate::runtime::test_fixtures::{Counter, CounterCommand, CounterEvent};
    use crate::store::MemoryEventStore;

    /// Per-counter current values, keyed by aggregate id.
    fn counter_values() -> Projection<HashMap<String, i64>> {
        Projection::new(HashMap::new()).on(
            Tag::new("counter"),
            JsonCodec::<CounterEvent>::default(),
            |data, event: EventData<CounterEvent>| {
                let key = event.id.as_str().to_owned();
                match event.payload {
                    CounterEvent::Created { start, .. } => {
                        data.insert(key, start);
                    }
                    CounterEvent::Incremented => {
                        if let Some(value) = data.get_mut(&key) {
                            *value += 1;
                        }
                    }
                    CounterEvent::Decremented => {
                        if let Some(value) = data.get_mut(&key) {
                            *value -= 1;
                        }
                    }
                }
            },
        )
    }

    fn seeded_store() -> Arc<MemoryEventStore> {
        let store = Arc::new(MemoryEventStore::new());
        let runtime = AggregateRuntime::<Counter, MemoryEventStore>::new(Arc::clone(&store));
        let id = AggregateId::new("a");
        runtime
            .execute(
                &id,
                &CounterCommand::Create {
                    id: "a".to_string(),
                    start: 5,
                },
            )
            .expect("create should succeed");
        runtime
            .execute(&id, &CounterCommand::Increment)
            .expect("increment should succeed");
        runtime
            .execute(&id, &CounterCommand::Increment)
            .expect("increment should succeed");
        runtime
            .execute(&id, &CounterCommand::Decrement)
            .expect("decrement should succeed");
        store
    }

    #[test]
    fn advance_folds_the_whole_log() {
        let store = seeded_store();
        let mut projection = counter_values();

        projection.advance(&*store).expect("advance should succeed");

        assert_eq!(projection.cursor(), 4);
        assert_eq!(projection.data().get("a"), Some(&6));
    }

    #[test]
    fn advance_with_no_new_operations_is_a_noop() {
        let store = seeded_store();
        let mut projection = counter_values();

        projection.advance(&*store).expect("first advance");
        let cursor = projection.cursor();
        let data = projection.data().clone();

        projection.advance(&*store).expect("second advance");
        assert_eq!(projection.cursor(), cursor);
        assert_eq!(projection.data(), &data);
    }

    #[test]
    fn advance_resumes_from_the_cursor() {
        let store = seeded_store();
        let mut projection = counter_values();
        projection.advance(&*store).expect("first advance");

        // New operations arrive after the first fold.
        let runtime = AggregateRuntime::<Counter, MemoryEventStore>::new(Arc::clone(&store));
        runtime
            .execute(&AggregateId::new("a"), &CounterCommand::Increment)
            .expect("increment should succeed");

        projection.advance(&*store).expect("second advance");
        assert_eq!(projection.cursor(), 5);
        assert_eq!(projection.data().get("a"), Some(&7));
    }

    #[test]
    fn handlers_observe_op_nr_order_across_aggregates() {
        let store = Arc::new(MemoryEventStore::new());
        let runtime = AggregateRuntime::<Counter, MemoryEventStore>::new(Arc::clone(&store));

        // Interleave two instances.
        for (id, cmd) in [
            ("a", CounterCommand::Create { id: "a".into(), start: 0 }),
            ("b", CounterCommand::Create { id: "b".into(), start: 0 }),
            ("a", CounterCommand::Increment),
            ("b", CounterCommand::Increment),
            ("a", CounterCommand::Increment),
        ] {
            runtime
                .execute(&AggregateId::new(id), &cmd)
                .expect("command should succeed");
        }

        let mut projection = Projection::new(Vec::<(String, u64)>::new()).on(
            Tag::new("counter"),
            JsonCodec::<CounterEvent>::default(),
            |data, event: EventData<CounterEvent>| {
                data.push((event.id.as_str().to_owned(), event.version));
            },
        );
        projection.advance(&*store).expect("advance should succeed");

        assert_eq!(
            projection.data(),
            &vec![
                ("a".to_string(), 1),
                ("b".to_string(), 1),
                ("a".to_string(), 2),
                ("b".to_string(), 2),
                ("a".to_string(), 3),
            ]
        );
    }

    #[test]
    fn entries_for_other_tags_move_the_cursor_without_handlers() {
        let store = seeded_store();
        store
            .append_events(
                &Tag::new("order"),
                &AggregateId::new("o-1"),
                0,
                vec!["anything".to_string()],
            )
            .expect("append should succeed");

        let mut projection = counter_values();
        projection.advance(&*store).expect("advance should succeed");

        // The order entry has no handler but still advances the cursor.
        assert_eq!(projection.cursor(), 5);
        assert_eq!(projection.data().get("a"), Some(&6));
    }

    #[test]
    fn decode_failure_halts_without_advancing_the_cursor() {
        let store = seeded_store();
        store
            .append_events(
                &Tag::new("counter"),
                &AggregateId::new("broken"),
                0,
                vec!["{ not json".to_string()],
            )
            .expect("append should succeed");

        let mut projection = counter_values();
        let err = projection
            .advance(&*store)
            .expect_err("corrupt payload must halt the projection");
        assert!(matches!(err, ProjectionError::Decoding(_)));

        // Entries before the corrupt one were folded; the cursor stops
        // just short of it.
        assert_eq!(projection.cursor(), 4);
        assert_eq!(projection.data().get("a"), Some(&6));

        // Retrying halts at the same place.
        let err = projection
            .advance(&*store)
            .expect_err("retry still halts on the corrupt payload");
        assert!(matches!(err, ProjectionError::Decoding(_)));
        assert_eq!(projection.cursor(), 4);
    }

    #[test]
    fn rebuild_refolds_from_scratch() {
        let store = seeded_store();
        let mut projection = counter_values();

        projection.advance(&*store).expect("advance should succeed");
        assert_eq!(projection.data().get("a"), Some(&6));

        projection.rebuild(&*store).expect("rebuild should succeed");
        assert_eq!(projection.cursor(), 4);
        assert_eq!(projection.data().get("a"), Some(&6));
    }
}
