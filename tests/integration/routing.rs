use crate::*;

/// An online publish reaches the remote online subscriber exactly once and
/// no local subscriber.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_online_publish_reaches_peer_once() {
    let (a, b) = connected_pair(|_| {}).await.unwrap();

    let remote = Recorder::new();
    a.subscribe(Scope::Online, "T", remote.callback());
    let local_offline = Recorder::new();
    b.subscribe(Scope::Offline, "T", local_offline.callback());
    let local_online = Recorder::new();
    b.subscribe(Scope::Online, "T", local_online.callback());

    b.publish(Scope::Online, "T", &[0x10, 0x20]).unwrap();

    assert!(wait_until(CONVERGE, || remote.len() == 1).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(remote.payloads(), vec![vec![0x10, 0x20]]);
    assert_eq!(local_offline.len(), 0);
    assert_eq!(local_online.len(), 0);
}

/// `All` delivers to local offline subscribers and to the peer.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_publish_all_goes_both_ways() {
    let (a, b) = connected_pair(|_| {}).await.unwrap();

    let remote_online = Recorder::new();
    a.subscribe(Scope::Online, "T", remote_online.callback());
    let remote_offline = Recorder::new();
    a.subscribe(Scope::Offline, "T", remote_offline.callback());
    let local = Recorder::new();
    b.subscribe(Scope::Offline, "T", local.callback());

    b.publish(Scope::All, "T", b"both").unwrap();
    assert_eq!(local.payloads(), vec![b"both".to_vec()]);

    assert!(wait_until(CONVERGE, || remote_online.len() == 1).await);
    assert_eq!(remote_offline.len(), 0);
}

/// Publications on one connection arrive in the order they were sent.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_publications_keep_order() {
    let (a, b) = connected_pair(|_| {}).await.unwrap();
    let seen = Recorder::new();
    a.subscribe(Scope::Online, "seq", seen.callback());

    for i in 0u32..200 {
        b.publish(Scope::Online, "seq", &i.to_le_bytes()).unwrap();
    }

    assert!(wait_until(CONVERGE, || seen.len() == 200).await);
    let expected: Vec<Vec<u8>> = (0u32..200).map(|i| i.to_le_bytes().to_vec()).collect();
    assert_eq!(seen.payloads(), expected);
}

/// Payloads much larger than a socket buffer arrive intact.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_large_payload_is_delivered_intact() {
    let (a, b) = connected_pair(|_| {}).await.unwrap();
    let seen = Recorder::new();
    a.subscribe(Scope::Online, "blob", seen.callback());

    let payload: Vec<u8> = (0..2 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
    b.publish(Scope::Online, "blob", &payload).unwrap();

    assert!(wait_until(Duration::from_secs(10), || seen.len() == 1).await);
    assert_eq!(seen.payloads()[0], payload);
}

/// A payload over the frame limit is refused locally and never sent.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_oversized_publish_is_refused() {
    let (a, b) = connected_pair(|c| c.max_frame_bytes = 1024).await.unwrap();
    let seen = Recorder::new();
    a.subscribe(Scope::Online, "T", seen.callback());

    let err = b.publish(Scope::Online, "T", &[0u8; 4096]).unwrap_err();
    assert!(matches!(err, NodeError::FrameTooLarge { .. }));

    // The connection survives and still carries normal traffic.
    b.publish(Scope::Online, "T", b"small").unwrap();
    assert!(wait_until(CONVERGE, || seen.len() == 1).await);
    assert!(verified_each_other(&a, &b));
}

/// With interest filtering, the topic set reaches the publisher before the
/// subscriber's first publication is routed.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_interest_filtered_routing() {
    let (a, b) = connected_pair(|c| c.filter_by_interest = true).await.unwrap();

    let seen = Recorder::new();
    a.subscribe(Scope::Online, "temp", seen.callback());
    assert!(
        wait_until(CONVERGE, || {
            b.verified_peers()
                .first()
                .map_or(false, |p| p.topics.contains("temp"))
        })
        .await
    );

    b.publish(Scope::Online, "pose", b"ignored").unwrap();
    b.publish(Scope::Online, "temp", b"21.5").unwrap();
    assert!(wait_until(CONVERGE, || seen.len() == 1).await);
    assert_eq!(seen.payloads(), vec![b"21.5".to_vec()]);
}
