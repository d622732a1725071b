use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::{IntoResponse, Response},
};
use bson::oid::ObjectId;
use chrono::Utc;
use futures::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use livepoll_config::HubSettings;
use livepoll_services::realtime::UserType;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsParams {
    pub session_id: Option<String>,
    pub user_type: Option<String>,
    pub user_id: Option<String>,
}

impl WsParams {
    fn validate(self) -> Result<(String, UserType, String), String> {
        let session_id = required(self.session_id, "sessionId")?;
        let user_type = required(self.user_type, "userType")?;
        let user_id = required(self.user_id, "userId")?;
        let user_type = user_type
            .parse::<UserType>()
            .map_err(|_| "userType must be 'organizer' or 'participant'".to_string())?;
        Ok((session_id, user_type, user_id))
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| format!("{name} is required"))
}

#[derive(Debug, Deserialize)]
struct ClientFrame {
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Validates the query before upgrading; bad parameters never get a socket.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let (session_id, user_type, user_id) = match params.validate() {
        Ok(v) => v,
        Err(msg) => return ApiError::BadRequest(msg).into_response(),
    };

    let max_frame = state.services.hub.settings().max_frame_bytes;
    ws.max_message_size(max_frame)
        .max_frame_size(max_frame)
        .on_upgrade(move |socket| handle_socket(socket, state, session_id, user_type, user_id))
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    session_id: String,
    user_type: UserType,
    user_id: String,
) {
    let hub = state.services.hub.clone();
    let settings = hub.settings().clone();

    let (client, outbound) = hub.new_client(&session_id, user_type, &user_id);
    let client_id = client.id;
    let replies = client.reply_sender();
    let connections = hub.register(client).await;
    info!(
        %session_id,
        %user_type,
        %user_id,
        %client_id,
        connections,
        "WebSocket connected"
    );

    let (sink, stream) = socket.split();
    let mut write_task = tokio::spawn(write_loop(sink, outbound, settings.clone()));
    let mut read_task = tokio::spawn(read_loop(
        stream,
        state,
        session_id.clone(),
        replies,
        settings,
    ));

    tokio::select! {
        _ = &mut write_task => read_task.abort(),
        _ = &mut read_task => write_task.abort(),
    }

    hub.unregister(&session_id, client_id).await;
    info!(%session_id, %client_id, "WebSocket disconnected");
}

/// Drains the outbound queue and pings on an interval. A closed queue means
/// the hub dropped this client.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Arc<str>>,
    settings: HubSettings,
) {
    let write_timeout = Duration::from_secs(settings.write_timeout_secs);
    let period = Duration::from_secs(settings.ping_interval_secs);
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);

    loop {
        let message = tokio::select! {
            next = outbound.recv() => match next {
                Some(payload) => Message::text(&*payload),
                None => {
                    let _ = tokio::time::timeout(write_timeout, sink.send(Message::Close(None))).await;
                    debug!("Outbound queue closed");
                    return;
                }
            },
            _ = ticker.tick() => Message::Ping(Default::default()),
        };

        match tokio::time::timeout(write_timeout, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(%e, "WebSocket write failed");
                return;
            }
            Err(_) => {
                warn!("WebSocket write timed out");
                return;
            }
        }
    }
}

/// Reads control frames until the peer goes away or stays silent past the
/// read deadline. Only pongs extend the deadline.
async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    state: AppState,
    session_id: String,
    replies: mpsc::WeakSender<Arc<str>>,
    settings: HubSettings,
) {
    let window = Duration::from_secs(settings.read_deadline_secs);
    let mut deadline = Instant::now() + window;

    loop {
        let frame = match tokio::time::timeout_at(deadline, stream.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(e))) => {
                debug!(%session_id, %e, "WebSocket read error");
                return;
            }
            Ok(None) => return,
            Err(_) => {
                info!(%session_id, "Read deadline passed, closing connection");
                return;
            }
        };

        match frame {
            Message::Text(text) => {
                if let Some(reply) = handle_client_message(&state, &session_id, text.as_str()).await {
                    send_reply(&replies, reply);
                }
            }
            Message::Pong(_) => deadline = Instant::now() + window,
            Message::Close(_) => return,
            _ => {}
        }
    }
}

async fn handle_client_message(
    state: &AppState,
    session_id: &str,
    text: &str,
) -> Option<serde_json::Value> {
    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(%session_id, %e, "Ignoring unparsable frame");
            return None;
        }
    };
    let Some(kind) = frame.kind else {
        debug!(%session_id, "Ignoring frame without type");
        return None;
    };

    debug!(%session_id, kind = %kind, "WS message received");
    let reply = match kind.as_str() {
        "ping" => serde_json::json!({ "type": "pong" }),
        "subscribe" => serde_json::json!({
            "type": "subscribed",
            "sessionId": session_id,
            "timestamp": Utc::now(),
        }),
        "get_results" => results_snapshot(state, session_id).await,
        _ => serde_json::json!({
            "type": "error",
            "message": "Unknown message type",
        }),
    };
    Some(reply)
}

async fn results_snapshot(state: &AppState, session_id: &str) -> serde_json::Value {
    let results = match ObjectId::parse_str(session_id) {
        Ok(sid) => state.services.aggregator.session_results(&sid).await,
        Err(_) => {
            return serde_json::json!({
                "type": "error",
                "message": "Results unavailable for this session",
            });
        }
    };

    match results {
        Ok(results) => serde_json::json!({
            "type": "results",
            "sessionId": session_id,
            "results": results,
            "timestamp": Utc::now(),
        }),
        Err(e) => {
            warn!(%session_id, %e, "Results snapshot failed");
            serde_json::json!({
                "type": "error",
                "message": "Results unavailable for this session",
            })
        }
    }
}

fn send_reply(replies: &mpsc::WeakSender<Arc<str>>, reply: serde_json::Value) {
    let Some(tx) = replies.upgrade() else {
        return;
    };
    if tx.try_send(reply.to_string().into()).is_err() {
        debug!("Dropping reply for a full or closed queue");
    }
}
