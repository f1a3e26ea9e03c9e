//! Flow-based event sourcing core.
//!
//! `eventflow` lets a domain author express an aggregate's behaviour as a
//! *flow*: a state machine whose states are the command handlers currently
//! in force and whose transitions are the events that were emitted and
//! accepted. A flow compiles into a [`StreamConsumer`] -- a pair of
//! reducer functions an event store can drive: one matches commands, the
//! other advances on each persisted event.
//!
//! # Key Types
//!
//! | Type | Role |
//! |------|------|
//! | [`Flow`] | Program describing an aggregate: install handler, wait for event |
//! | [`StreamConsumer`] | Compiled flow state during event replay |
//! | [`Aggregate`] | Domain model: a tag, command/event types, and a flow |
//! | [`AggregateRuntime`] | Loads, replays, matches commands, appends events |
//! | [`EventStore`] | Versioned append-only streams with optimistic concurrency |
//! | [`MemoryEventStore`] | In-memory reference backend |
//! | [`Projection`] | Read model folded from the global operation log |
//! | [`EventCodec`] / [`JsonCodec`] | Text encoding of event types across the store boundary |
//!
//! Flows are written with the clause DSL: [`handler`] gathers
//! [`when`]-clauses with guards and emit actions, and each clause's
//! `switch` names the flow that takes over once its event is accepted.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use eventflow::{
//!     Aggregate, AggregateId, AggregateRuntime, Flow, JsonCodec, MemoryEventStore, handler, when,
//! };
//! use serde::{Deserialize, Serialize};
//!
//! // 1. Define commands and events.
//! #[derive(Debug, Clone)]
//! enum LightCommand {
//!     TurnOn,
//!     TurnOff,
//! }
//!
//! #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
//! #[serde(tag = "type", content = "data")]
//! enum LightEvent {
//!     TurnedOn,
//!     TurnedOff,
//! }
//!
//! // 2. Describe the behaviour as a flow: two states, each accepting
//! //    exactly the command that leaves it.
//! fn off() -> Flow<LightCommand, LightEvent> {
//!     handler(vec![
//!         when(|cmd: &LightCommand| matches!(cmd, LightCommand::TurnOn).then_some(()))
//!             .emit(vec![LightEvent::TurnedOn])
//!             .switch(|event| matches!(event, LightEvent::TurnedOn).then(on)),
//!     ])
//! }
//!
//! fn on() -> Flow<LightCommand, LightEvent> {
//!     handler(vec![
//!         when(|cmd: &LightCommand| matches!(cmd, LightCommand::TurnOff).then_some(()))
//!             .emit(vec![LightEvent::TurnedOff])
//!             .switch(|event| matches!(event, LightEvent::TurnedOff).then(off)),
//!     ])
//! }
//!
//! struct Light;
//!
//! impl Aggregate for Light {
//!     const TAG: &'static str = "light";
//!     type Command = LightCommand;
//!     type Event = LightEvent;
//!     type Codec = JsonCodec<LightEvent>;
//!
//!     fn flow() -> Flow<LightCommand, LightEvent> {
//!         off()
//!     }
//! }
//!
//! // 3. Run commands against a store.
//! let store = Arc::new(MemoryEventStore::new());
//! let runtime = AggregateRuntime::<Light, _>::new(Arc::clone(&store));
//! let id = AggregateId::new("kitchen");
//!
//! let appended = runtime.execute(&id, &LightCommand::TurnOn)?;
//! assert_eq!(appended.version, 1);
//! assert_eq!(appended.events, vec![LightEvent::TurnedOn]);
//!
//! // A light that is already on has no handler for `TurnOn`.
//! assert!(runtime.execute(&id, &LightCommand::TurnOn).is_err());
//! # Ok::<(), eventflow::AggregateError>(())
//! ```

mod codec;
pub use codec::{EventCodec, JsonCodec};
mod dsl;
pub use dsl::{AnyOther, Clause, Emit, When, any_other, handler, when};
mod error;
pub use error::{AggregateError, EventDecodingFailure, ProjectionError, StoreError};
mod flow;
pub use flow::{
    CommandHandler, EventMatcher, Flow, HandlerResult, StreamConsumer, compile, empty_handler,
};
mod projection;
pub use projection::{EventData, Projection};
mod runtime;
pub use runtime::{Aggregate, AggregateRuntime, AggregateState};
mod store;
pub use store::{
    EventStore, LogEntry, MemoryEventStore, ReadResponse, RecordedEvent, VersionedEvents,
};
mod tag;
pub use tag::{AggregateId, Tag};
