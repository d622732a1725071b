use std::time::Duration;

use bson::oid::ObjectId;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::fixtures::seed::COLORS;
use crate::fixtures::test_app::TestApp;
use crate::fixtures::wait_for;
use crate::fixtures::ws_client::{self, WsStream};

const LIMIT: Duration = Duration::from_secs(2);

async fn send_json(ws: &mut WsStream, value: Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

async fn stats(app: &TestApp, session_id: &str) -> Value {
    app.client
        .get(app.url(&format!("/api/v1/ws/stats?sessionId={session_id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn expect_rejected(url: &str) {
    match connect_async(url).await {
        Err(WsError::Http(resp)) => assert_eq!(resp.status().as_u16(), 400),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("upgrade should have been refused for {url}"),
    }
}

#[tokio::test]
async fn upgrade_requires_valid_parameters() {
    let app = TestApp::spawn().await;
    let base = format!("ws://{}/ws", app.addr);

    expect_rejected(&base).await;
    expect_rejected(&format!("{base}?sessionId=s1&userType=participant")).await;
    expect_rejected(&format!("{base}?sessionId=s1&userId=u1")).await;
    expect_rejected(&format!("{base}?userType=participant&userId=u1")).await;
    expect_rejected(&app.ws_url("s1", "admin", "u1")).await;

    assert_eq!(app.services.hub.session_count().await, 0);
}

#[tokio::test]
async fn client_messages_get_typed_replies() {
    let app = TestApp::spawn().await;
    let mut ws = ws_client::connect(&app.ws_url("s1", "participant", "u1")).await;

    send_json(&mut ws, json!({ "type": "ping" })).await;
    let pong = ws_client::next_json(&mut ws, LIMIT).await.unwrap();
    assert_eq!(pong["type"], "pong");

    send_json(&mut ws, json!({ "type": "subscribe" })).await;
    let subscribed = ws_client::next_json(&mut ws, LIMIT).await.unwrap();
    assert_eq!(subscribed["type"], "subscribed");
    assert_eq!(subscribed["sessionId"], "s1");
    assert!(subscribed["timestamp"].is_string());

    send_json(&mut ws, json!({ "type": "dance" })).await;
    let error = ws_client::next_json(&mut ws, LIMIT).await.unwrap();
    assert_eq!(error["type"], "error");
    assert_eq!(error["message"], "Unknown message type");

    // Unparsable frames are ignored and the connection stays usable.
    ws.send(Message::text("not json")).await.unwrap();
    send_json(&mut ws, json!({ "type": "ping" })).await;
    let pong = ws_client::next_json(&mut ws, LIMIT).await.unwrap();
    assert_eq!(pong["type"], "pong");
}

#[tokio::test]
async fn get_results_returns_a_snapshot() {
    let app = TestApp::spawn().await;
    let session = app.seed_active_session("Snapshot", &COLORS).await;
    let session_id = session["id"].as_str().unwrap();
    let mut ws = ws_client::connect(&app.ws_url(session_id, "organizer", "org")).await;

    send_json(&mut ws, json!({ "type": "get_results" })).await;
    let snapshot = ws_client::next_of_type(&mut ws, "results", LIMIT).await.unwrap();
    assert_eq!(snapshot["sessionId"], session_id);
    let results = snapshot["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["totalVotes"], 0);
    assert_eq!(results[0]["options"].as_array().unwrap().len(), 3);

    let unknown = ObjectId::new().to_hex();
    let mut ws = ws_client::connect(&app.ws_url(&unknown, "participant", "p")).await;
    send_json(&mut ws, json!({ "type": "get_results" })).await;
    let error = ws_client::next_json(&mut ws, LIMIT).await.unwrap();
    assert_eq!(error["type"], "error");
}

#[tokio::test]
async fn stats_track_connections_and_teardown() {
    let app = TestApp::spawn().await;

    let resp = app.client.get(app.url("/api/v1/ws/stats")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let mut organizer = ws_client::connect(&app.ws_url("room", "organizer", "org")).await;
    let mut participant = ws_client::connect(&app.ws_url("room", "participant", "p1")).await;

    let hub = app.services.hub.clone();
    assert!(
        wait_for(LIMIT, || {
            let hub = hub.clone();
            async move { hub.session_stats("room").await.active_connections == 2 }
        })
        .await
    );
    let body = stats(&app, "room").await;
    assert_eq!(body["exists"], true);
    assert_eq!(body["activeConnections"], 2);
    assert_eq!(body["organizerCount"], 1);
    assert_eq!(body["participantCount"], 1);

    participant.close(None).await.unwrap();
    assert!(
        wait_for(LIMIT, || {
            let hub = hub.clone();
            async move { hub.session_stats("room").await.active_connections == 1 }
        })
        .await
    );

    organizer.close(None).await.unwrap();
    assert!(
        wait_for(LIMIT, || {
            let hub = hub.clone();
            async move { !hub.session_stats("room").await.exists }
        })
        .await
    );
    let body = stats(&app, "room").await;
    assert_eq!(body["exists"], false);
    assert_eq!(body["activeConnections"], 0);
}

#[tokio::test]
async fn oversized_frames_close_the_connection() {
    let app = TestApp::spawn().await;
    let mut ws = ws_client::connect(&app.ws_url("big", "participant", "p")).await;

    let hub = app.services.hub.clone();
    assert!(
        wait_for(LIMIT, || {
            let hub = hub.clone();
            async move { hub.session_stats("big").await.exists }
        })
        .await
    );

    let padding = "x".repeat(app.settings.hub.max_frame_bytes * 2);
    let _ = ws
        .send(Message::text(json!({ "type": "ping", "pad": padding }).to_string()))
        .await;

    assert!(
        wait_for(LIMIT, || {
            let hub = hub.clone();
            async move { !hub.session_stats("big").await.exists }
        })
        .await
    );
}

#[tokio::test]
async fn server_pings_on_the_configured_interval() {
    let app = TestApp::spawn_with_settings(|s| {
        s.hub.ping_interval_secs = 1;
        s.hub.read_deadline_secs = 5;
    })
    .await;
    let mut ws = ws_client::connect(&app.ws_url("s-ping", "participant", "u1")).await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    let mut pinged = false;
    while let Ok(Some(frame)) = tokio::time::timeout_at(deadline, ws.next()).await {
        if matches!(frame, Ok(Message::Ping(_))) {
            pinged = true;
            break;
        }
    }
    assert!(pinged, "expected a ping within the interval");
}

#[tokio::test]
async fn silent_peer_is_dropped_after_the_read_deadline() {
    let app = TestApp::spawn_with_settings(|s| {
        s.hub.ping_interval_secs = 1;
        s.hub.read_deadline_secs = 2;
    })
    .await;
    // Never polled, so pings go unanswered.
    let _ws = ws_client::connect(&app.ws_url("s-silent", "participant", "u1")).await;

    let hub = app.services.hub.clone();
    let registered = wait_for(LIMIT, || {
        let hub = hub.clone();
        async move { hub.session_stats("s-silent").await.active_connections == 1 }
    })
    .await;
    assert!(registered);

    let reaped = wait_for(Duration::from_secs(6), || {
        let hub = hub.clone();
        async move { !hub.session_stats("s-silent").await.exists }
    })
    .await;
    assert!(reaped, "silent connection should be closed by the read deadline");
}
