//! # Wire Envelope
//!
//! An envelope is an ordered tuple; position is the schema:
//!
//! ```text
//! [channel, payload]                            fire-and-forget
//! [channel, payload, id]                        async request (or its response)
//! [channel, payload, id, true]                  blocking request
//! [channel, payload, id, true, function]        blocking request by function name
//! ```
//!
//! Trailing absent fields are left off. A gap before a present field is written
//! as `null`, and `null` always reads back as absent.

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use serde::de;
use serde::de::IgnoredAny;
use serde::de::SeqAccess;
use serde::ser::SerializeSeq;
use serde_json::Value;

use crate::Error;
use crate::Result;
use crate::channels;
use crate::id::CorrelationId;

#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub channel: String,
    /// Positional arguments for calls, the bare return value for responses.
    pub payload: Value,
    pub correlation_id: Option<CorrelationId>,
    pub synchronous: bool,
    pub target_function: Option<String>,
}

/// What the sender of an envelope expects in return.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Kind {
    /// No id: nothing comes back.
    Event,
    /// Id without the sync flag: an envelope carrying the same id comes back.
    Request(CorrelationId),
    /// Id with the sync flag: the answer goes through the shared slot.
    SyncRequest(CorrelationId),
    /// Like `SyncRequest`, dispatched by function name instead of channel.
    ContextRequest { id: CorrelationId, function: String },
}

impl Envelope {
    fn new(channel: impl Into<String>, payload: Value) -> Self {
        Self {
            channel: channel.into(),
            payload,
            correlation_id: None,
            synchronous: false,
            target_function: None,
        }
    }

    pub fn event(channel: impl Into<String>, args: Vec<Value>) -> Self {
        Self::new(channel, Value::Array(args))
    }

    pub fn request(channel: impl Into<String>, args: Vec<Value>, id: CorrelationId) -> Self {
        Self { correlation_id: Some(id), ..Self::event(channel, args) }
    }

    pub fn sync_request(channel: impl Into<String>, args: Vec<Value>, id: CorrelationId) -> Self {
        Self { synchronous: true, ..Self::request(channel, args, id) }
    }

    pub fn context_request(function: impl Into<String>, args: Vec<Value>, id: CorrelationId) -> Self {
        Self {
            target_function: Some(function.into()),
            ..Self::sync_request(channels::CONTEXT, args, id)
        }
    }

    pub fn response(channel: impl Into<String>, value: Value, id: CorrelationId) -> Self {
        Self { correlation_id: Some(id), ..Self::new(channel, value) }
    }

    /// The one-time handshake that accompanies the shared slot handle.
    pub fn setup() -> Self {
        Self::event(channels::SETUP, Vec::new())
    }

    pub fn kind(&self) -> Kind {
        match (self.correlation_id, self.synchronous, &self.target_function) {
            (None, _, _) => Kind::Event,
            (Some(id), false, _) => Kind::Request(id),
            (Some(id), true, None) => Kind::SyncRequest(id),
            (Some(id), true, Some(function)) => Kind::ContextRequest { id, function: function.clone() },
        }
    }

    /// Consumes the envelope, returning its payload as positional arguments.
    pub fn into_args(self) -> Vec<Value> {
        positional(self.payload)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(Error::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(Error::Decode)
    }

    /// Number of tuple positions this envelope occupies on the wire.
    fn wire_len(&self) -> usize {
        if self.target_function.is_some() {
            5
        } else if self.synchronous {
            4
        } else if self.correlation_id.is_some() {
            3
        } else {
            2
        }
    }
}

/// Serializes call arguments into positional form.
///
/// Tuples and sequences spread into one argument per element, `()` is no
/// arguments, and any other value is a single argument. The count follows the
/// runtime value: `None`, `Value::Null` and `()` all become no arguments, and a
/// `Vec` spreads. Wrap a lone argument as `(x,)` to always send exactly one.
pub fn to_args<A: Serialize + ?Sized>(args: &A) -> Result<Vec<Value>> {
    serde_json::to_value(args).map(positional).map_err(Error::Encode)
}

fn positional(value: Value) -> Vec<Value> {
    match value {
        Value::Array(args) => args,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = self.wire_len();
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.channel)?;
        seq.serialize_element(&self.payload)?;
        if len > 2 {
            seq.serialize_element(&self.correlation_id)?;
        }
        if len > 3 {
            seq.serialize_element(&self.synchronous)?;
        }
        if len > 4 {
            seq.serialize_element(&self.target_function)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Envelope {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct EnvelopeVisitor;

        impl<'de> de::Visitor<'de> for EnvelopeVisitor {
            type Value = Envelope;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("an envelope tuple of 2 to 5 elements")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Envelope, A::Error> {
                let channel: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let payload: Value = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let correlation_id = seq.next_element::<Option<CorrelationId>>()?.flatten();
                let synchronous = seq.next_element::<Option<bool>>()?.flatten().unwrap_or(false);
                let target_function = seq.next_element::<Option<String>>()?.flatten();

                if seq.next_element::<IgnoredAny>()?.is_some() {
                    return Err(de::Error::invalid_length(6, &self));
                }

                Ok(Envelope { channel, payload, correlation_id, synchronous, target_function })
            }
        }

        deserializer.deserialize_seq(EnvelopeVisitor)
    }
}
