//! Event codec contract and the default JSON codec.

use std::marker::PhantomData;

use serde::{Serialize, de::DeserializeOwned};

use crate::error::EventDecodingFailure;

/// Bidirectional text encoding of a user event type.
///
/// # Contract
///
/// `decode(encode(e))` must equal `Ok(e)` for every valid event. A store
/// registers one codec per aggregate's event type; the global log holds
/// only erased payloads, and the codec is how typed events cross that
/// boundary in both directions.
pub trait EventCodec<E>: Send + Sync {
    /// Encode an event into its persisted text form.
    fn encode(&self, event: &E) -> String;

    /// Decode a persisted payload back into the event type.
    ///
    /// # Errors
    ///
    /// Returns [`EventDecodingFailure`] carrying the raw payload when the
    /// payload is corrupt or does not match the event schema.
    fn decode(&self, raw: &str) -> Result<E, EventDecodingFailure>;
}

/// JSON codec for any serde-capable event type.
///
/// Works with any `Serialize + DeserializeOwned` event. Domain event enums
/// conventionally use adjacently tagged serialization
/// (`#[serde(tag = "type", content = "data")]`) so the payload carries the
/// variant name explicitly.
pub struct JsonCodec<E> {
    _marker: PhantomData<fn() -> E>,
}

impl<E> Default for JsonCodec<E> {
    fn default() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<E> Clone for JsonCodec<E> {
    fn clone(&self) -> Self {
        Self::default()
    }
}

impl<E> std::fmt::Debug for JsonCodec<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<E> EventCodec<E> for JsonCodec<E>
where
    E: Serialize + DeserializeOwned + Send + Sync,
{
    fn encode(&self, event: &E) -> String {
        // Serialization of a plain-data event enum cannot fail.
        serde_json::to_string(event).expect("domain event must serialize to JSON")
    }

    fn decode(&self, raw: &str) -> Result<E, EventDecodingFailure> {
        serde_json::from_str(raw).map_err(|_| EventDecodingFailure {
            raw: raw.to_owned(),
        })
    }
}
