//! Property-based tests for record decoding
//!
//! Decoding must not depend on where the transport happens to cut the body.

use super::decoder::decode_chunks;
use super::ProtocolEvent;
use proptest::prelude::*;

/// Delta text including multi-byte characters and JSON escapes
fn arb_fragment() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 .,!?\u{e9}\u{4e2d}\u{1f600}\"\\\\]{1,20}"
}

fn arb_event() -> impl Strategy<Value = ProtocolEvent> {
    prop_oneof![
        (1i64..10_000).prop_map(|conversation_id| ProtocolEvent::Conversation { conversation_id }),
        arb_fragment().prop_map(|content| ProtocolEvent::Delta { content }),
        (proptest::option::of(arb_fragment()), proptest::option::of(1i64..10_000)).prop_map(
            |(content, conversation_id)| ProtocolEvent::Done {
                content,
                conversation_id,
            }
        ),
        arb_fragment().prop_map(|error| ProtocolEvent::Error { error }),
    ]
}

fn encode(event: &ProtocolEvent) -> String {
    let value = match event {
        ProtocolEvent::Conversation { conversation_id } => {
            serde_json::json!({ "type": "conversation", "conversation_id": conversation_id })
        }
        ProtocolEvent::Delta { content } => {
            serde_json::json!({ "type": "delta", "content": content })
        }
        ProtocolEvent::Done {
            content,
            conversation_id,
        } => serde_json::json!({ "type": "done", "content": content, "conversation_id": conversation_id }),
        ProtocolEvent::Error { error } => serde_json::json!({ "type": "error", "error": error }),
    };
    // Backend separates records with a blank line
    format!("data: {value}\n\n")
}

/// Body made of records interleaved with noise lines
fn arb_body() -> impl Strategy<Value = (Vec<u8>, Vec<ProtocolEvent>)> {
    proptest::collection::vec(
        (
            arb_event(),
            prop_oneof![
                Just(String::new()),
                Just(": ping\n".to_string()),
                Just("data: {broken\n".to_string()),
            ],
        ),
        0..8,
    )
    .prop_map(|items| {
        let mut body = String::new();
        let mut events = Vec::new();
        for (event, noise) in items {
            body.push_str(&noise);
            body.push_str(&encode(&event));
            events.push(event);
        }
        (body.into_bytes(), events)
    })
}

fn split_at_points(body: &[u8], mut points: Vec<usize>) -> Vec<&[u8]> {
    points.iter_mut().for_each(|p| *p %= body.len() + 1);
    points.sort_unstable();
    points.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for point in points {
        chunks.push(&body[start..point]);
        start = point;
    }
    chunks.push(&body[start..]);
    chunks
}

proptest! {
    #[test]
    fn chunking_does_not_change_events(
        (body, expected) in arb_body(),
        points in proptest::collection::vec(any::<usize>(), 0..12),
    ) {
        let chunks = split_at_points(&body, points);
        prop_assert_eq!(decode_chunks(&chunks), expected);
    }

    #[test]
    fn byte_at_a_time_matches_whole((body, expected) in arb_body()) {
        let chunks: Vec<&[u8]> = body.chunks(1).collect();
        prop_assert_eq!(decode_chunks(&chunks), expected);
    }
}
