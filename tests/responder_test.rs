//! Tests for responder routing against a hand-driven transport.

mod common;

use std::sync::Arc;

use common::RecordingDirect;
use qp::{Codec, JsonCodec, RequestId, Responder, Transaction};
use serde_json::json;

fn encode(tx: &Transaction) -> Vec<u8> {
    JsonCodec.marshal_transaction(tx).unwrap()
}

fn decode(bytes: &[u8]) -> Transaction {
    JsonCodec.unmarshal_transaction(bytes).unwrap()
}

#[tokio::test]
async fn test_three_hop_forwarding() {
    let transport = Arc::new(RecordingDirect::new());
    let codec: Arc<dyn Codec> = Arc::new(JsonCodec);

    let r1 = Responder::new("function-one", "instance", codec.clone(), transport.clone());
    let r2 = Responder::new("function-two", "instance", codec.clone(), transport.clone());
    let r3 = Responder::new("function-three", "instance", codec.clone(), transport.clone());

    r1.handle_fn("one", |tx| {
        tx.data["one"] = json!(true);
    })
    .unwrap();
    r2.handle_fn("two", |tx| {
        tx.data["two"] = json!(true);
    })
    .unwrap();
    r3.handle_fn("three", |tx| {
        tx.data["three"] = json!(true);
    })
    .unwrap();

    let request = Transaction {
        to: vec!["two".to_string(), "three".to_string()],
        from: vec!["r.0".to_string()],
        id: RequestId { raw: 1 },
        data: json!({}),
    };

    transport.inject("one", encode(&request)).await;
    let hop = transport.last_sent("two").expect("nothing forwarded to two");
    transport.inject("two", hop).await;
    let hop = transport.last_sent("three").expect("nothing forwarded to three");
    transport.inject("three", hop).await;

    let reply = decode(&transport.last_sent("r.0").expect("no reply to originator"));
    assert_eq!(reply.id, RequestId { raw: 1 });
    assert!(reply.to.is_empty());
    assert_eq!(
        reply.from,
        vec![
            "r.0",
            "function-one.instance",
            "function-two.instance",
            "function-three.instance"
        ]
    );
    assert_eq!(reply.data, json!({"one": true, "two": true, "three": true}));
}

#[tokio::test]
async fn test_abort_routes_back_to_the_originator() {
    let transport = Arc::new(RecordingDirect::new());
    let responder = Responder::new("svc", "0", Arc::new(JsonCodec), transport.clone());
    responder
        .handle_fn("svc", |tx| {
            tx.abort();
            tx.data = json!("aborted");
        })
        .unwrap();

    let request = Transaction {
        to: vec!["two".to_string(), "three".to_string()],
        from: vec!["r.0".to_string()],
        id: RequestId { raw: 2 },
        data: json!(null),
    };
    transport.inject("svc", encode(&request)).await;

    assert!(transport.last_sent("two").is_none());
    let reply = decode(&transport.last_sent("r.0").expect("no reply to originator"));
    assert!(reply.to.is_empty());
    assert_eq!(reply.from, vec!["r.0", "svc.0"]);
    assert_eq!(reply.data, json!("aborted"));
}

#[tokio::test]
async fn test_unroutable_transaction_is_dropped() {
    let transport = Arc::new(RecordingDirect::new());
    let responder = Responder::new("svc", "0", Arc::new(JsonCodec), transport.clone());
    responder.handle_fn("svc", |_| {}).unwrap();

    let malformed = Transaction {
        to: Vec::new(),
        from: Vec::new(),
        id: RequestId { raw: 3 },
        data: json!(null),
    };
    transport.inject("svc", encode(&malformed)).await;
    assert_eq!(transport.send_count(), 0);
}

#[tokio::test]
async fn test_undecodable_transaction_is_dropped() {
    let transport = Arc::new(RecordingDirect::new());
    let responder = Responder::new("svc", "0", Arc::new(JsonCodec), transport.clone());
    responder.handle_fn("svc", |_| {}).unwrap();

    transport.inject("svc", b"not a transaction".to_vec()).await;
    assert_eq!(transport.send_count(), 0);
}

#[tokio::test]
async fn test_handlers_on_one_channel_run_in_registration_order() {
    let transport = Arc::new(RecordingDirect::new());
    let responder = Responder::new("svc", "0", Arc::new(JsonCodec), transport.clone());
    responder
        .handle_fn("svc", |tx| {
            tx.data.as_array_mut().unwrap().push(json!("first"));
        })
        .unwrap();
    responder
        .handle_fn("svc", |tx| {
            tx.data.as_array_mut().unwrap().push(json!("second"));
        })
        .unwrap();

    let request = Transaction {
        to: Vec::new(),
        from: vec!["r.0".to_string()],
        id: RequestId { raw: 4 },
        data: json!([]),
    };
    transport.inject("svc", encode(&request)).await;

    let reply = decode(&transport.last_sent("r.0").unwrap());
    assert_eq!(reply.data, json!(["first", "second"]));
}
