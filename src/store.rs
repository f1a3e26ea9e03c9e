//! Event store contract: versioned append-only per-aggregate streams with
//! optimistic concurrency, plus the global operation log that projections
//! fold.
//!
//! The store is payload-erased: it persists the text form produced by an
//! [`EventCodec`](crate::codec::EventCodec) and never interprets it. Typed
//! events cross the boundary in the aggregate runtime and the projection
//! driver.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::tag::{AggregateId, Tag};

/// A batch of events appended together.
///
/// `version` is the version assigned to the *first* event of the batch;
/// subsequent events occupy consecutive versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedEvents<E> {
    /// Version of the first event in the batch. Always >= 1.
    pub version: u64,
    /// The events, in append order.
    pub events: Vec<E>,
}

/// One raw event as persisted in a stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Version of this event within its stream. Dense from 1.
    pub version: u64,
    /// The encoded payload.
    pub payload: String,
}

/// Result of reading a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadResponse {
    /// The stream's current last version; 0 when the stream is empty or
    /// was never created.
    pub last_version: u64,
    /// Events with versions greater than the requested `from_version`.
    pub events: Vec<RecordedEvent>,
    /// Whether the read reached the end of the stream. Backends that page
    /// may return `false`; the in-memory store always reads to the end.
    pub end_of_stream: bool,
}

/// One entry of the global operation log.
///
/// `op_nr` is store-wide and strictly increasing; it defines the single
/// global order projections observe across aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Store-wide, strictly increasing operation number.
    pub op_nr: u64,
    /// Tag of the aggregate that produced the event.
    pub tag: Tag,
    /// Instance the event belongs to.
    pub id: AggregateId,
    /// The event's version within its stream.
    pub version: u64,
}

/// Append-only log of per-aggregate event streams with optimistic
/// concurrency.
///
/// # Contract
///
/// - Per-aggregate versions are dense from 1.
/// - `append_events` with a stale `expected_version` fails with
///   [`StoreError::UnexpectedVersion`] and changes nothing.
/// - Every appended event receives a fresh, strictly increasing global
///   `op_nr`; the operation log is append-only.
/// - Reading a never-created stream yields `last_version = 0` with no
///   events; it is not an error.
pub trait EventStore: Send + Sync {
    /// Read events for `(tag, id)` with versions greater than
    /// `from_version`. Pass 0 to read the whole stream.
    fn read_events(
        &self,
        tag: &Tag,
        id: &AggregateId,
        from_version: u64,
    ) -> Result<ReadResponse, StoreError>;

    /// Append encoded events at the end of the stream.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnexpectedVersion`] when the stream's current
    /// last version differs from `expected_version`.
    fn append_events(
        &self,
        tag: &Tag,
        id: &AggregateId,
        expected_version: u64,
        payloads: Vec<String>,
    ) -> Result<(), StoreError>;

    /// Read operation-log entries with `op_nr` greater than `after_op_nr`,
    /// in `op_nr` order.
    fn read_log(&self, after_op_nr: u64) -> Result<Vec<LogEntry>, StoreError>;

    /// Fetch the raw payload stored at `(tag, id, version)`.
    fn payload_at(
        &self,
        tag: &Tag,
        id: &AggregateId,
        version: u64,
    ) -> Result<String, StoreError>;
}

/// In-memory reference backend.
///
/// Streams and the operation log live behind one `std::sync::RwLock`,
/// held only for the duration of a single operation. Writers are thereby
/// serialized per `append_events` call, which is what gives two racers on
/// the same stream their winner-and-conflict outcome.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<(Tag, AggregateId), Vec<String>>,
    log: Vec<LogEntry>,
}

impl MemoryEventStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventStore for MemoryEventStore {
    fn read_events(
        &self,
        tag: &Tag,
        id: &AggregateId,
        from_version: u64,
    ) -> Result<ReadResponse, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        let Some(stream) = inner.streams.get(&(tag.clone(), id.clone())) else {
            return Ok(ReadResponse {
                last_version: 0,
                events: Vec::new(),
                end_of_stream: true,
            });
        };

        let last_version = stream.len() as u64;
        let start = (from_version as usize).min(stream.len());
        let events = stream[start..]
            .iter()
            .enumerate()
            .map(|(offset, payload)| RecordedEvent {
                version: start as u64 + offset as u64 + 1,
                payload: payload.clone(),
            })
            .collect();

        Ok(ReadResponse {
            last_version,
            events,
            end_of_stream: true,
        })
    }

    fn append_events(
        &self,
        tag: &Tag,
        id: &AggregateId,
        expected_version: u64,
        payloads: Vec<String>,
    ) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let Inner { streams, log } = &mut *inner;

        let stream = streams.entry((tag.clone(), id.clone())).or_default();
        let actual = stream.len() as u64;
        if actual != expected_version {
            tracing::debug!(
                tag = %tag,
                id = %id,
                expected = expected_version,
                actual,
                "append rejected, version conflict"
            );
            return Err(StoreError::UnexpectedVersion {
                id: id.clone(),
                expected: expected_version,
                actual,
            });
        }

        let count = payloads.len();
        for payload in payloads {
            stream.push(payload);
            log.push(LogEntry {
                op_nr: log.len() as u64 + 1,
                tag: tag.clone(),
                id: id.clone(),
                version: stream.len() as u64,
            });
        }

        tracing::debug!(
            tag = %tag,
            id = %id,
            count,
            first_version = expected_version + 1,
            "appended events"
        );
        Ok(())
    }

    fn read_log(&self, after_op_nr: u64) -> Result<Vec<LogEntry>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        // op_nr is dense from 1 in this backend, so the cursor is an index.
        let start = (after_op_nr as usize).min(inner.log.len());
        Ok(inner.log[start..].to_vec())
    }

    fn payload_at(
        &self,
        tag: &Tag,
        id: &AggregateId,
        version: u64,
    ) -> Result<String, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let index = version.checked_sub(1);
        inner
            .streams
            .get(&(tag.clone(), id.clone()))
            .zip(index)
            .and_then(|(stream, index)| stream.get(index as usize))
            .cloned()
            .ok_or_else(|| {
                StoreError::Backend(format!("no event at {tag}/{id} version {version}"))
            })
    }
}
