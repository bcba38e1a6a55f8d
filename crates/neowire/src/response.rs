//! # Response Payload
//!
//! The bytes a host writes into the shared slot to answer a blocking call:
//! UTF-8 JSON of the listener's result. JSON has no "no value", so a missing
//! result is written as `null`, and an empty slot reads back as `null` too.

use serde_json::Value;

use crate::Error;
use crate::Result;

pub fn encode_response(value: Option<&Value>) -> Result<Vec<u8>> {
    match value {
        Some(value) => serde_json::to_vec(value).map_err(Error::Encode),
        None => Ok(b"null".to_vec()),
    }
}

pub fn decode_response(bytes: &[u8]) -> Result<Value> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes).map_err(Error::Decode)
}
