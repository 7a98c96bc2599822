// tests/property/message_test.rs

//! Properties of the line codec: what it accepts, what it rejects, and that
//! the payload is always the untouched input.

use hookline::core::errors::MalformedMessage;
use hookline::core::protocol::message::parse;
use proptest::prelude::*;
use serde_json::{Map, Value, json};

fn extra_fields() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("[a-z_]{1,12}", ".{0,40}"), 0..6)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_valid_object_yields_cmd_and_raw_payload(
        cmd in ".{0,64}",
        extras in extra_fields(),
    ) {
        let mut object = Map::new();
        for (key, value) in extras {
            if key != "cmd" {
                object.insert(key, Value::String(value));
            }
        }
        object.insert("cmd".to_string(), Value::String(cmd.clone()));
        let raw = Value::Object(object).to_string();

        let msg = parse(&raw).unwrap();
        prop_assert_eq!(msg.command, cmd);
        prop_assert_eq!(msg.payload, raw);
    }

    #[test]
    fn test_object_without_cmd_is_rejected(extras in extra_fields()) {
        let mut object = Map::new();
        for (key, value) in extras {
            if key != "cmd" {
                object.insert(key, Value::String(value));
            }
        }
        let raw = Value::Object(object).to_string();
        prop_assert_eq!(parse(&raw).unwrap_err(), MalformedMessage::MissingCommand);
    }

    #[test]
    fn test_non_string_cmd_is_rejected(n in any::<i64>(), flag in any::<bool>()) {
        for value in [json!(n), json!(flag), json!([n]), json!({ "n": n }), Value::Null] {
            let raw = json!({ "cmd": value }).to_string();
            prop_assert_eq!(parse(&raw).unwrap_err(), MalformedMessage::CommandNotString);
        }
    }

    #[test]
    fn test_non_json_is_rejected(word in "[a-zA-Z][a-zA-Z0-9 ]{0,30}") {
        // Bare words other than JSON literals are never valid.
        prop_assume!(!["true", "false", "null"].contains(&word.trim()));
        prop_assert!(matches!(parse(&word), Err(MalformedMessage::InvalidSyntax(_))));
    }

    #[test]
    fn test_parse_never_panics(raw in ".{0,200}") {
        let _ = parse(&raw);
    }
}
