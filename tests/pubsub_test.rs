//! Pub/sub façade tests over the in-process transport.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use qp::{
    event_handler, Codec, InProcPubSub, JsonCodec, PubSubHub, PubSubTransport, Publisher,
    Subscriber,
};
use serde_json::json;

fn codec() -> Arc<dyn Codec> {
    Arc::new(JsonCodec)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(200)).await;
}

/// An exact subscriber sees only its channel; a children subscriber sees
/// the channel and all its descendants, but not lookalike siblings.
#[tokio::test]
async fn test_exact_and_wildcard_subscriptions() {
    let hub = Arc::new(PubSubHub::new());

    let exact_hits = Arc::new(AtomicUsize::new(0));
    let family_hits = Arc::new(AtomicUsize::new(0));

    let sub_transport_a = Arc::new(InProcPubSub::with_hub(hub.clone()));
    let subscriber_a = Subscriber::new(codec(), sub_transport_a.clone());
    {
        let hits = exact_hits.clone();
        subscriber_a
            .subscribe(
                "test.event",
                event_handler(move |_, _| {
                    hits.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
    }

    let sub_transport_b = Arc::new(InProcPubSub::with_hub(hub.clone()));
    let subscriber_b = Subscriber::new(codec(), sub_transport_b.clone());
    {
        let hits = family_hits.clone();
        subscriber_b
            .listen_for_children(
                "test.event",
                event_handler(move |_, _| {
                    hits.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
    }

    let pub_transport = Arc::new(InProcPubSub::with_hub(hub));
    let publisher = Publisher::new("pub", "0", codec(), pub_transport.clone());

    sub_transport_a.start().unwrap();
    sub_transport_b.start().unwrap();
    pub_transport.start().unwrap();

    publisher.publish("test.event", json!(1)).await.unwrap();
    settle().await;
    assert_eq!(exact_hits.load(Ordering::SeqCst), 1);
    assert_eq!(family_hits.load(Ordering::SeqCst), 1);

    publisher.publish("test.event.one", json!(2)).await.unwrap();
    settle().await;
    assert_eq!(exact_hits.load(Ordering::SeqCst), 1);
    assert_eq!(family_hits.load(Ordering::SeqCst), 2);

    publisher.publish("test.event.one.two", json!(3)).await.unwrap();
    settle().await;
    assert_eq!(family_hits.load(Ordering::SeqCst), 3);

    // a lookalike sibling is not a descendant
    publisher.publish("test.events", json!(4)).await.unwrap();
    settle().await;
    assert_eq!(exact_hits.load(Ordering::SeqCst), 1);
    assert_eq!(family_hits.load(Ordering::SeqCst), 3);
}

/// Every subscriber on the same channel receives every publish.
#[tokio::test]
async fn test_multi_subscriber_fan_out() {
    let hub = Arc::new(PubSubHub::new());
    let hits: Vec<Arc<AtomicUsize>> = (0..3).map(|_| Arc::new(AtomicUsize::new(0))).collect();

    let mut transports = Vec::new();
    for hit in &hits {
        let transport = Arc::new(InProcPubSub::with_hub(hub.clone()));
        let subscriber = Subscriber::new(codec(), transport.clone());
        let hit = hit.clone();
        subscriber
            .subscribe(
                "fanout.check",
                event_handler(move |_, _| {
                    hit.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        transport.start().unwrap();
        transports.push((transport, subscriber));
    }

    let pub_transport = Arc::new(InProcPubSub::with_hub(hub));
    let publisher = Publisher::new("pub", "0", codec(), pub_transport.clone());
    pub_transport.start().unwrap();

    publisher.publish("fanout.check", json!("hello")).await.unwrap();
    settle().await;

    for hit in &hits {
        assert_eq!(hit.load(Ordering::SeqCst), 1);
    }
}

/// Events carry the publisher's endpoint and the source channel.
#[tokio::test]
async fn test_event_carries_publisher_and_channel() {
    let hub = Arc::new(PubSubHub::new());

    let seen: Arc<std::sync::Mutex<Vec<(String, String, serde_json::Value)>>> =
        Arc::new(std::sync::Mutex::new(Vec::new()));

    let sub_transport = Arc::new(InProcPubSub::with_hub(hub.clone()));
    let subscriber = Subscriber::new(codec(), sub_transport.clone());
    {
        let seen = seen.clone();
        subscriber
            .subscribe(
                "router.request.size",
                event_handler(move |channel, event| {
                    seen.lock()
                        .unwrap()
                        .push((channel.to_string(), event.from.clone(), event.data.clone()));
                }),
            )
            .unwrap();
    }

    let pub_transport = Arc::new(InProcPubSub::with_hub(hub));
    let publisher = Publisher::new("router", "7", codec(), pub_transport.clone());
    sub_transport.start().unwrap();
    pub_transport.start().unwrap();

    publisher
        .publish("router.request.size", json!(2048))
        .await
        .unwrap();
    settle().await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "router.request.size");
    assert_eq!(seen[0].1, "router.7");
    assert_eq!(seen[0].2, json!(2048));
}

/// Handlers registered under the same subscription key all fire.
#[tokio::test]
async fn test_multiple_handlers_per_subscription_key() {
    let hub = Arc::new(PubSubHub::new());
    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let transport = Arc::new(InProcPubSub::with_hub(hub.clone()));
    let subscriber = Subscriber::new(codec(), transport.clone());
    {
        let first = first.clone();
        subscriber
            .subscribe(
                "shared.key",
                event_handler(move |_, _| {
                    first.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
    }
    {
        let second = second.clone();
        subscriber
            .subscribe(
                "shared.key",
                event_handler(move |_, _| {
                    second.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
    }

    let pub_transport = Arc::new(InProcPubSub::with_hub(hub));
    let publisher = Publisher::new("pub", "0", codec(), pub_transport.clone());
    transport.start().unwrap();
    pub_transport.start().unwrap();

    publisher.publish("shared.key", json!(null)).await.unwrap();
    settle().await;

    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}
