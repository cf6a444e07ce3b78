// Connection to session correlation tests

use loqa_transcribe::{CorrelationMap, TranscribeError};

#[test]
fn test_resolve_unbound_connection_fails() {
    let map = CorrelationMap::new();
    assert_eq!(
        map.resolve("conn-1"),
        Err(TranscribeError::NotBound("conn-1".to_string()))
    );
}

#[test]
fn test_bind_then_resolve() {
    let map = CorrelationMap::new();
    map.bind("conn-1", "session-a").unwrap();

    assert_eq!(map.resolve("conn-1").unwrap(), "session-a");
    assert_eq!(map.len(), 1);
}

#[test]
fn test_double_bind_is_rejected() {
    let map = CorrelationMap::new();
    map.bind("conn-1", "session-a").unwrap();

    assert_eq!(
        map.bind("conn-1", "session-b"),
        Err(TranscribeError::AlreadyBound {
            connection_id: "conn-1".to_string(),
            session_id: "session-a".to_string(),
        })
    );

    // The first binding is untouched
    assert_eq!(map.resolve("conn-1").unwrap(), "session-a");
}

#[test]
fn test_unbind_is_idempotent() {
    let map = CorrelationMap::new();
    map.bind("conn-1", "session-a").unwrap();

    assert_eq!(map.unbind("conn-1"), Some("session-a".to_string()));
    assert_eq!(map.unbind("conn-1"), None);
    assert!(map.is_empty());

    // A connection may bind again once unbound
    map.bind("conn-1", "session-b").unwrap();
    assert_eq!(map.resolve("conn-1").unwrap(), "session-b");
}

#[test]
fn test_connections_bind_independently() {
    let map = CorrelationMap::new();
    for i in 0..50 {
        map.bind(&format!("conn-{}", i), &format!("session-{}", i))
            .unwrap();
    }

    assert_eq!(map.len(), 50);
    assert_eq!(map.resolve("conn-17").unwrap(), "session-17");
}
