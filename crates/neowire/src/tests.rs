use std::collections::HashMap;

use serde_json::Value;
use serde_json::json;

use crate::*;
use crate::channels;
use crate::response::decode_response;
use crate::response::encode_response;

fn wire(env: &Envelope) -> Value {
    serde_json::from_slice(&env.encode().unwrap()).unwrap()
}

// ============================================================================
//  ENVELOPE SHAPES
// ============================================================================

#[test]
fn test_event_is_two_tuple() {
    let env = Envelope::event("log", vec![json!("hello"), json!(1)]);
    assert_eq!(wire(&env), json!(["log", ["hello", 1]]));
    assert_eq!(env.kind(), Kind::Event);
}

#[test]
fn test_request_carries_string_id() {
    let env = Envelope::request("add", vec![json!(2), json!(3)], CorrelationId(5));
    assert_eq!(wire(&env), json!(["add", [2, 3], "5"]));
    assert_eq!(env.kind(), Kind::Request(CorrelationId(5)));
}

#[test]
fn test_sync_request_sets_flag() {
    let env = Envelope::sync_request("ping", vec![], CorrelationId(7));
    assert_eq!(wire(&env), json!(["ping", [], "7", true]));
    assert_eq!(env.kind(), Kind::SyncRequest(CorrelationId(7)));
}

#[test]
fn test_context_request_uses_reserved_channel() {
    let env = Envelope::context_request("getConfig", vec![json!("theme")], CorrelationId(9));
    assert_eq!(wire(&env), json!(["@@request-sync-context", ["theme"], "9", true, "getConfig"]));
    assert_eq!(
        env.kind(),
        Kind::ContextRequest { id: CorrelationId(9), function: "getConfig".into() }
    );
}

#[test]
fn test_response_payload_is_bare_value() {
    let env = Envelope::response("add", json!(5), CorrelationId(1));
    assert_eq!(wire(&env), json!(["add", 5, "1"]));
}

#[test]
fn test_setup_envelope() {
    let env = Envelope::setup();
    assert_eq!(wire(&env), json!(["@@sab", []]));
}

// ============================================================================
//  DECODING
// ============================================================================

#[test]
fn test_decode_round_trips_every_kind() {
    let envelopes = [
        Envelope::event("a", vec![json!(null)]),
        Envelope::request("b", vec![json!({"k": [1, 2]})], CorrelationId(2)),
        Envelope::sync_request("c", vec![], CorrelationId(3)),
        Envelope::context_request("d", vec![json!([])], CorrelationId(5)),
    ];
    for env in envelopes {
        assert_eq!(Envelope::decode(&env.encode().unwrap()).unwrap(), env);
    }
}

#[test]
fn test_decode_treats_null_as_absent() {
    let env = Envelope::decode(br#"["x", [1], null, null, null]"#).unwrap();
    assert_eq!(env.kind(), Kind::Event);
    assert_eq!(env.into_args(), vec![json!(1)]);
}

#[test]
fn test_decode_accepts_numeric_id() {
    let env = Envelope::decode(br#"["x", [], 12]"#).unwrap();
    assert_eq!(env.correlation_id, Some(CorrelationId(12)));
}

#[test]
fn test_decode_explicit_false_is_async() {
    let env = Envelope::decode(br#"["x", [], "4", false]"#).unwrap();
    assert_eq!(env.kind(), Kind::Request(CorrelationId(4)));
}

#[test]
fn test_decode_rejects_malformed() {
    let bad: [&[u8]; 6] = [
        b"[]",
        br#"["only-channel"]"#,
        br#"{"channel": "x"}"#,
        br#"["x", [], "not-a-number"]"#,
        br#"["x", [], "1", true, "f", "extra"]"#,
        b"not json",
    ];
    for bytes in bad {
        assert!(matches!(Envelope::decode(bytes), Err(Error::Decode(_))), "{:?}", String::from_utf8_lossy(bytes));
    }
}

// ============================================================================
//  ARGUMENTS
// ============================================================================

#[test]
fn test_to_args_spreads_tuples() {
    assert_eq!(to_args(&(2, "three")).unwrap(), vec![json!(2), json!("three")]);
    assert_eq!(to_args(&()).unwrap(), Vec::<Value>::new());
    assert_eq!(to_args(&"solo").unwrap(), vec![json!("solo")]);
    assert_eq!(to_args(&vec![1, 2, 3]).unwrap().len(), 3);
}

#[test]
fn test_to_args_count_follows_runtime_value() {
    assert_eq!(to_args(&None::<u8>).unwrap(), Vec::<Value>::new());
    assert_eq!(to_args(&json!(null)).unwrap(), Vec::<Value>::new());
    assert_eq!(to_args(&Some(vec![1, 2])).unwrap().len(), 2);

    // wrapped, each of these is exactly one argument
    assert_eq!(to_args(&(None::<u8>,)).unwrap(), vec![Value::Null]);
    assert_eq!(to_args(&(json!(null),)).unwrap(), vec![Value::Null]);
    assert_eq!(to_args(&(vec![1, 2],)).unwrap(), vec![json!([1, 2])]);
}

#[test]
fn test_to_args_reports_unserializable() {
    let mut map = HashMap::new();
    map.insert((1, 2), "tuple keys are not json");
    assert!(matches!(to_args(&(map,)), Err(Error::Encode(_))));
}

#[test]
fn test_into_args_wraps_scalar_payload() {
    let env = Envelope::response("r", json!("v"), CorrelationId(1));
    assert_eq!(env.into_args(), vec![json!("v")]);
}

// ============================================================================
//  IDS & CHANNELS
// ============================================================================

#[test]
fn test_id_spaces_are_disjoint() {
    let host = IdAllocator::new(Side::Host);
    let worker = IdAllocator::new(Side::Worker);

    let host_ids: Vec<_> = (0..4).map(|_| host.next()).collect();
    let worker_ids: Vec<_> = (0..4).map(|_| worker.next()).collect();

    assert_eq!(host_ids, [2, 4, 6, 8].map(CorrelationId));
    assert_eq!(worker_ids, [1, 3, 5, 7].map(CorrelationId));
    assert!(host_ids.iter().all(|id| host.owns(*id) && !worker.owns(*id)));
    assert!(worker_ids.iter().all(|id| worker.owns(*id) && !host.owns(*id)));
}

#[test]
fn test_worker_ids_skip_zero_on_wrap() {
    let worker = IdAllocator::new(Side::Worker);
    worker.next.store(u32::MAX, std::sync::atomic::Ordering::Relaxed);

    assert_eq!(worker.next(), CorrelationId(u32::MAX));
    assert_eq!(worker.next(), CorrelationId(1));
}

#[test]
fn test_reserved_channels_are_rejected() {
    assert!(channels::check_application("ping").is_ok());
    assert!(matches!(channels::check_application(channels::SETUP), Err(Error::ReservedChannel(_))));
    assert!(matches!(channels::check_application(channels::CONTEXT), Err(Error::ReservedChannel(_))));
}

// ============================================================================
//  RESPONSE PAYLOAD
// ============================================================================

#[test]
fn test_response_preserves_values() {
    let values = [
        json!(null),
        json!("pong"),
        json!(5),
        json!(-1.5),
        json!([]),
        json!({}),
        json!({"nested": {"list": [1, [2, [3]]], "flag": true}}),
        json!("unicode ✓ ünïcödé"),
    ];
    for v in values {
        assert_eq!(decode_response(&encode_response(Some(&v)).unwrap()).unwrap(), v);
    }
}

#[test]
fn test_missing_value_decodes_as_null() {
    assert_eq!(encode_response(None).unwrap(), b"null");
    assert_eq!(decode_response(&encode_response(None).unwrap()).unwrap(), Value::Null);
}

#[test]
fn test_empty_slot_decodes_as_null() {
    assert_eq!(decode_response(&[]).unwrap(), Value::Null);
}

#[test]
fn test_truncated_payload_is_decode_error() {
    assert!(matches!(decode_response(b"{\"a\":"), Err(Error::Decode(_))));
}
