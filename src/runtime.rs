//! Aggregate runtime: loads a stream, folds it through the compiled flow,
//! matches the command against the handler in force, and appends the
//! accepted events.
//!
//! The runtime owns no state between calls. Every command handling is a
//! load-fold-append round trip, which is what makes optimistic concurrency
//! work: two racers load the same version, the first append wins, and the
//! second sees [`StoreError::UnexpectedVersion`] and retries from a fresh
//! load.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::codec::EventCodec;
use crate::error::{AggregateError, StoreError};
use crate::flow::{Flow, StreamConsumer, compile, empty_handler};
use crate::store::{EventStore, VersionedEvents};
use crate::tag::{AggregateId, Tag};

/// Maximum number of optimistic concurrency retries in
/// [`AggregateRuntime::execute`] before the conflict is surfaced.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// A domain aggregate whose behaviour is described by a flow.
///
/// The flow is a state machine: its states are the command handlers
/// currently in force, its transitions the events that were emitted and
/// accepted. The runtime compiles [`flow`](Aggregate::flow) once per call
/// and replays the persisted stream through it to find the aggregate's
/// current position.
///
/// # Contract
///
/// - `flow()` must be deterministic: the same construction every call.
/// - Clause guards and emit closures must be pure; they run on every
///   replayed command handling.
pub trait Aggregate: Send + Sync + 'static {
    /// Identifies this aggregate type (e.g. "counter"). Unique per type.
    const TAG: &'static str;

    /// The set of commands this aggregate can handle.
    type Command: Send + Sync + 'static;

    /// The set of events this aggregate can produce and consume.
    type Event: Send + Sync + 'static;

    /// Codec that carries `Event` across the payload-erased store
    /// boundary.
    type Codec: EventCodec<Self::Event> + Default;

    /// The flow describing this aggregate's behaviour from its blank
    /// state.
    fn flow() -> Flow<Self::Command, Self::Event>;
}

/// Replay position of an aggregate.
#[derive(Clone)]
pub struct AggregateState<C, E> {
    /// The last appended version; 0 for a fresh aggregate.
    pub version: u64,
    /// The consumer at this position. `None` means the flow has
    /// terminated and the aggregate accepts nothing further.
    pub consumer: Option<StreamConsumer<C, E>>,
}

/// Executes commands for one aggregate type against an event store.
pub struct AggregateRuntime<A: Aggregate, S: EventStore> {
    store: Arc<S>,
    codec: A::Codec,
    _aggregate: PhantomData<fn() -> A>,
}

impl<A: Aggregate, S: EventStore> AggregateRuntime<A, S> {
    /// Create a runtime over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            codec: A::Codec::default(),
            _aggregate: PhantomData,
        }
    }

    /// The tag this runtime reads and writes under.
    pub fn tag() -> Tag {
        Tag::new(A::TAG)
    }

    /// The state of an aggregate with no history: version 0 and the flow
    /// compiled to its first wait point under the empty handler.
    pub fn initial_state(&self) -> AggregateState<A::Command, A::Event> {
        AggregateState {
            version: 0,
            consumer: compile(empty_handler(), A::flow()),
        }
    }

    /// Load and replay the persisted stream for `id`.
    ///
    /// Events the then-current matcher does not recognize leave the
    /// consumer unchanged.
    ///
    /// # Errors
    ///
    /// A payload that fails to decode is fatal: the loaded stream is
    /// incoherent and the call returns [`AggregateError::Decoding`].
    pub fn load(
        &self,
        id: &AggregateId,
    ) -> Result<AggregateState<A::Command, A::Event>, AggregateError> {
        let response = self.store.read_events(&Self::tag(), id, 0)?;

        let mut consumer = compile(empty_handler(), A::flow());
        for recorded in &response.events {
            let event = self.codec.decode(&recorded.payload)?;
            consumer = match consumer {
                Some(current) => current.step_on_event(&event),
                None => None,
            };
        }

        Ok(AggregateState {
            version: response.last_version,
            consumer,
        })
    }

    /// Handle a single command: load, match, append.
    ///
    /// On success returns the appended batch with the version assigned to
    /// its first event. A concurrent writer between load and append
    /// surfaces as [`StoreError::UnexpectedVersion`]; use
    /// [`execute`](AggregateRuntime::execute) to retry automatically.
    ///
    /// # Errors
    ///
    /// - [`AggregateError::HandlerNotFound`] when no clause matches (or
    ///   the flow has terminated).
    /// - [`AggregateError::CommandRejected`] with every failing guard's
    ///   message when guards reject the command.
    /// - [`AggregateError::Store`] / [`AggregateError::Decoding`] for
    ///   store and replay failures.
    pub fn handle_command(
        &self,
        id: &AggregateId,
        command: &A::Command,
    ) -> Result<VersionedEvents<A::Event>, AggregateError> {
        let _span =
            tracing::debug_span!("handle_command", aggregate_type = A::TAG, instance_id = %id)
                .entered();

        let state = self.load(id)?;
        let consumer = state.consumer.as_ref().ok_or_else(|| {
            tracing::debug!("flow already terminated, command has no handler");
            AggregateError::HandlerNotFound
        })?;

        match consumer.handle_command(command) {
            None => Err(AggregateError::HandlerNotFound),
            Some(Err(failures)) => {
                tracing::debug!(failures = failures.len(), "command rejected by guards");
                Err(AggregateError::CommandRejected(failures))
            }
            Some(Ok(events)) => {
                let payloads = events.iter().map(|e| self.codec.encode(e)).collect();
                self.store
                    .append_events(&Self::tag(), id, state.version, payloads)?;
                tracing::debug!(count = events.len(), "command accepted");
                Ok(VersionedEvents {
                    version: state.version + 1,
                    events,
                })
            }
        }
    }

    /// Handle a command, retrying on optimistic concurrency conflicts.
    ///
    /// Retries [`handle_command`](AggregateRuntime::handle_command) from a
    /// fresh load up to a small fixed number of times when the append hits
    /// a version conflict. All other errors are returned as-is; when the
    /// retries are exhausted, the last conflict is returned.
    pub fn execute(
        &self,
        id: &AggregateId,
        command: &A::Command,
    ) -> Result<VersionedEvents<A::Event>, AggregateError> {
        let mut attempt = 0;
        loop {
            match self.handle_command(id, command) {
                Err(AggregateError::Store(StoreError::UnexpectedVersion { .. }))
                    if attempt + 1 < DEFAULT_MAX_RETRIES =>
                {
                    attempt += 1;
                    tracing::debug!(
                        aggregate_type = A::TAG,
                        instance_id = %id,
                        attempt,
                        "version conflict, retrying from a fresh load"
                    );
                }
                outcome => return outcome,
            }
        }
    }
}
