//! Tests for the channel-to-handler maps and wildcard matching.

use qp::dispatch::{channel_matches, DirectDispatcher, PubSubDispatcher};

#[test]
fn test_exact_key_matches_only_itself() {
    assert!(channel_matches("a.b", "a.b"));
    assert!(!channel_matches("a.b", "a.b.c"));
    assert!(!channel_matches("a.b", "a"));
    assert!(!channel_matches("a.b", "a.bx"));
}

#[test]
fn test_wildcard_key_matches_prefix_and_descendants() {
    assert!(channel_matches("a.b*", "a.b"));
    assert!(channel_matches("a.b*", "a.b.c"));
    assert!(channel_matches("a.b*", "a.b.c.d"));
    assert!(!channel_matches("a.b*", "a.bx"));
    assert!(!channel_matches("a.b*", "a"));
}

#[test]
fn test_direct_dispatcher_appends_in_order() {
    let dispatcher: DirectDispatcher<&str> = DirectDispatcher::new();
    assert!(dispatcher.track("one", "first"));
    assert!(!dispatcher.track("one", "second"));
    assert!(dispatcher.track("two", "other"));

    assert_eq!(dispatcher.find("one"), vec!["first", "second"]);
    assert_eq!(dispatcher.find("two"), vec!["other"]);
    assert!(dispatcher.find("missing").is_empty());
}

#[test]
fn test_direct_dispatcher_is_exact_only() {
    let dispatcher: DirectDispatcher<&str> = DirectDispatcher::new();
    dispatcher.track("a.b", "handler");
    assert!(dispatcher.find("a.b.c").is_empty());
}

#[test]
fn test_pubsub_dispatcher_concatenates_matches_in_insertion_order() {
    let dispatcher: PubSubDispatcher<&str> = PubSubDispatcher::new();
    dispatcher.track("test.event", "exact");
    dispatcher.track("test.event*", "family");
    dispatcher.track("test.event*", "family-too");
    dispatcher.track("other", "unrelated");

    assert_eq!(
        dispatcher.find("test.event"),
        vec!["exact", "family", "family-too"]
    );
    assert_eq!(dispatcher.find("test.event.one"), vec!["family", "family-too"]);
    assert!(dispatcher.find("test.events").is_empty());
}

#[test]
fn test_pubsub_dispatcher_set_replaces() {
    let dispatcher: PubSubDispatcher<&str> = PubSubDispatcher::new();
    dispatcher.track("chan", "old");
    dispatcher.track("chan", "older");
    dispatcher.set("chan", "new");
    assert_eq!(dispatcher.find("chan"), vec!["new"]);
}

#[test]
fn test_pubsub_dispatcher_find_key_ignores_wildcards() {
    let dispatcher: PubSubDispatcher<&str> = PubSubDispatcher::new();
    dispatcher.track("a.b", "exact");
    dispatcher.track("a.b*", "family");
    assert_eq!(dispatcher.find_key("a.b"), vec!["exact"]);
    assert_eq!(dispatcher.find_key("a.b*"), vec!["family"]);
    assert!(dispatcher.find_key("a.b.c").is_empty());
}
