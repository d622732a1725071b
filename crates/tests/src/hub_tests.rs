use std::sync::Arc;

use livepoll_config::HubSettings;
use livepoll_services::realtime::{FanOut, Hub, UserType};

fn hub_with_capacity(capacity: usize) -> Hub {
    Hub::new(HubSettings {
        client_queue_capacity: capacity,
        ..HubSettings::default()
    })
}

fn payload(text: &str) -> Arc<str> {
    Arc::from(text)
}

#[tokio::test]
async fn stats_count_connections_by_role() {
    let hub = hub_with_capacity(8);
    let (organizer, _o_rx) = hub.new_client("s1", UserType::Organizer, "org");
    let (p1, _p1_rx) = hub.new_client("s1", UserType::Participant, "p1");
    let (p2, _p2_rx) = hub.new_client("s1", UserType::Participant, "p2");

    assert_eq!(hub.register(organizer).await, 1);
    assert_eq!(hub.register(p1).await, 2);
    assert_eq!(hub.register(p2).await, 3);

    let stats = hub.session_stats("s1").await;
    assert!(stats.exists);
    assert_eq!(stats.active_connections, 3);
    assert_eq!(stats.organizer_count, 1);
    assert_eq!(stats.participant_count, 2);

    let json = serde_json::to_value(&stats).unwrap();
    assert_eq!(json["sessionId"], "s1");
    assert_eq!(json["activeConnections"], 3);
}

#[tokio::test]
async fn unknown_session_reports_missing() {
    let hub = hub_with_capacity(8);
    let stats = hub.session_stats("nope").await;
    assert!(!stats.exists);
    assert_eq!(stats.active_connections, 0);

    assert_eq!(hub.broadcast_to_session("nope", payload("{}")).await, FanOut::default());
    assert!(!hub.unregister("nope", uuid::Uuid::new_v4()).await);
}

#[tokio::test]
async fn last_unregister_tears_the_session_down() {
    let hub = hub_with_capacity(8);
    let (a, _a_rx) = hub.new_client("s1", UserType::Participant, "a");
    let (b, _b_rx) = hub.new_client("s1", UserType::Participant, "b");
    let (a_id, b_id) = (a.id, b.id);
    hub.register(a).await;
    hub.register(b).await;
    assert_eq!(hub.session_count().await, 1);

    assert!(hub.unregister("s1", a_id).await);
    assert_eq!(hub.session_count().await, 1);
    assert_eq!(hub.session_stats("s1").await.active_connections, 1);

    assert!(hub.unregister("s1", b_id).await);
    assert_eq!(hub.session_count().await, 0);
    assert!(!hub.session_stats("s1").await.exists);
}

#[tokio::test]
async fn broadcast_reaches_every_client_of_the_session_only() {
    let hub = hub_with_capacity(8);
    let (a, mut a_rx) = hub.new_client("s1", UserType::Participant, "a");
    let (b, mut b_rx) = hub.new_client("s1", UserType::Organizer, "b");
    let (other, mut other_rx) = hub.new_client("s2", UserType::Participant, "c");
    hub.register(a).await;
    hub.register(b).await;
    hub.register(other).await;

    let report = hub.broadcast_to_session("s1", payload("hello")).await;
    assert_eq!(report.delivered, 2);
    assert_eq!(report.remaining, 2);

    assert_eq!(&*a_rx.recv().await.unwrap(), "hello");
    assert_eq!(&*b_rx.recv().await.unwrap(), "hello");
    assert!(other_rx.try_recv().is_err());
}

#[tokio::test]
async fn slow_consumer_is_evicted_without_blocking_others() {
    let hub = hub_with_capacity(2);
    let (slow, mut slow_rx) = hub.new_client("s1", UserType::Participant, "slow");
    let (fast, mut fast_rx) = hub.new_client("s1", UserType::Participant, "fast");
    hub.register(slow).await;
    hub.register(fast).await;

    for i in 0..2 {
        let report = hub.broadcast_to_session("s1", payload(&format!("m{i}"))).await;
        assert_eq!(report.delivered, 2);
        fast_rx.recv().await.unwrap();
    }

    // The slow queue is full now.
    let report = hub.broadcast_to_session("s1", payload("m2")).await;
    assert_eq!(report.delivered, 1);
    assert_eq!(report.evicted, 1);
    assert_eq!(report.remaining, 1);
    assert_eq!(&*fast_rx.recv().await.unwrap(), "m2");

    // The evicted client drains what was queued, then sees its queue close.
    assert_eq!(&*slow_rx.recv().await.unwrap(), "m0");
    assert_eq!(&*slow_rx.recv().await.unwrap(), "m1");
    assert!(slow_rx.recv().await.is_none());

    let stats = hub.session_stats("s1").await;
    assert_eq!(stats.active_connections, 1);
}

#[tokio::test]
async fn session_is_reaped_when_its_only_client_is_evicted() {
    let hub = hub_with_capacity(1);
    let (client, _rx) = hub.new_client("s1", UserType::Participant, "only");
    hub.register(client).await;

    hub.broadcast_to_session("s1", payload("first")).await;
    let report = hub.broadcast_to_session("s1", payload("second")).await;
    assert_eq!(report.evicted, 1);
    assert_eq!(report.remaining, 0);
    assert_eq!(hub.session_count().await, 0);
}

#[tokio::test]
async fn dropped_receiver_counts_as_disconnected() {
    let hub = hub_with_capacity(4);
    let (gone, gone_rx) = hub.new_client("s1", UserType::Participant, "gone");
    let (alive, mut alive_rx) = hub.new_client("s1", UserType::Participant, "alive");
    hub.register(gone).await;
    hub.register(alive).await;
    drop(gone_rx);

    let report = hub.broadcast_to_session("s1", payload("ping")).await;
    assert_eq!(report.delivered, 1);
    assert_eq!(report.disconnected, 1);
    assert_eq!(report.evicted, 0);
    assert_eq!(report.remaining, 1);
    assert_eq!(&*alive_rx.recv().await.unwrap(), "ping");
}

#[tokio::test]
async fn reply_sender_does_not_keep_the_queue_open() {
    let hub = hub_with_capacity(4);
    let (client, mut rx) = hub.new_client("s1", UserType::Participant, "p");
    let (id, replies) = (client.id, client.reply_sender());
    hub.register(client).await;

    replies.upgrade().unwrap().try_send(payload("pong")).unwrap();
    assert_eq!(&*rx.recv().await.unwrap(), "pong");

    hub.unregister("s1", id).await;
    assert!(replies.upgrade().is_none());
    assert!(rx.recv().await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn register_racing_teardown_keeps_the_new_client() {
    let hub = Arc::new(hub_with_capacity(8));

    for round in 0..50 {
        let session = format!("race-{round}");
        let (first, _first_rx) = hub.new_client(&session, UserType::Participant, "a");
        let first_id = first.id;
        assert_eq!(hub.register(first).await, 1);
        let (second, _second_rx) = hub.new_client(&session, UserType::Participant, "b");

        let leaving = {
            let hub = hub.clone();
            let session = session.clone();
            tokio::spawn(async move { hub.unregister(&session, first_id).await })
        };
        let joining = {
            let hub = hub.clone();
            tokio::spawn(async move { hub.register(second).await })
        };
        assert!(leaving.await.unwrap());
        assert!(joining.await.unwrap() >= 1);

        let stats = hub.session_stats(&session).await;
        assert!(stats.exists, "round {round}");
        assert_eq!(stats.active_connections, 1, "round {round}");
    }
}
