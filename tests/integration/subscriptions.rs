use crate::*;

use murmur_core::value::Coordinate;

/// Offline publish runs local offline callbacks before returning and sends
/// nothing to the peer.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_offline_publish_stays_local() {
    let (a, b) = connected_pair(|_| {}).await.unwrap();

    let remote = Recorder::new();
    a.subscribe(Scope::All, "T", remote.callback());
    let local = Recorder::new();
    b.subscribe(Scope::Offline, "T", local.callback());

    b.publish(Scope::Offline, "T", b"x").unwrap();
    assert_eq!(local.payloads(), vec![b"x".to_vec()]);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(remote.len(), 0);
}

/// After unsubscribing, publications no longer reach the callback, and a
/// second unsubscribe is a no-op.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unsubscribe_stops_delivery() {
    let (a, b) = connected_pair(|_| {}).await.unwrap();
    let seen = Recorder::new();
    let sub = a.subscribe(Scope::Online, "T", seen.callback());

    b.publish(Scope::Online, "T", b"1").unwrap();
    assert!(wait_until(CONVERGE, || seen.len() == 1).await);

    assert!(a.unsubscribe(Scope::Online, "T", &sub));
    assert!(!a.unsubscribe(Scope::Online, "T", &sub));

    b.publish(Scope::Online, "T", b"2").unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(seen.payloads(), vec![b"1".to_vec()]);
}

/// Subscription changes made after the handshake reach the peer's view.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_subscription_changes_propagate() {
    let (a, b) = connected_pair(|_| {}).await.unwrap();
    let topics_seen_by_b = || {
        b.verified_peers()
            .first()
            .map(|p| p.topics.iter().cloned().collect::<Vec<_>>())
            .unwrap_or_default()
    };

    let temp = a.subscribe(Scope::Online, "temp", |_| {});
    let _pose = a.subscribe(Scope::All, "pose", |_| {});
    let _log = a.subscribe(Scope::Offline, "log", |_| {});

    assert!(
        wait_until(CONVERGE, || topics_seen_by_b() == vec!["pose".to_string(), "temp".to_string()])
            .await
    );

    a.unsubscribe(Scope::Online, "temp", &temp);
    assert!(wait_until(CONVERGE, || topics_seen_by_b() == vec!["pose".to_string()]).await);
}

/// Subscriptions that exist before the peers meet are carried by the
/// handshake itself.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_handshake_carries_existing_subscriptions() {
    let (a, b) = start_pair(|_| {}).unwrap();
    a.subscribe(Scope::Online, "early", |_| {});

    assert!(
        wait_until(CONVERGE, || {
            verified_each_other(&a, &b) && b.verified_peers()[0].topics.contains("early")
        })
        .await
    );
}

/// Typed helpers encode on one node and decode on the other.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_typed_values_cross_the_network() {
    let (a, b) = connected_pair(|_| {}).await.unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    a.subscribe_value(Scope::Online, "gps", move |c: Coordinate| s.lock().unwrap().push(c));

    b.publish_value(Scope::Online, "gps", &Coordinate::new(59.33, 18.06)).unwrap();
    assert!(wait_until(CONVERGE, || seen.lock().unwrap().len() == 1).await);
    assert_eq!(seen.lock().unwrap()[0], Coordinate::new(59.33, 18.06));
}
