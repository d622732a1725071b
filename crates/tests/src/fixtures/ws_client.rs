use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub async fn connect(url: &str) -> WsStream {
    let (ws, _) = connect_async(url).await.expect("WebSocket connect failed");
    ws
}

/// Next JSON text frame, skipping control frames. `None` on timeout or
/// close.
pub async fn next_json(ws: &mut WsStream, limit: Duration) -> Option<Value> {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let frame = tokio::time::timeout_at(deadline, ws.next()).await.ok()??;
        match frame.ok()? {
            Message::Text(text) => return serde_json::from_str(text.as_str()).ok(),
            Message::Close(_) => return None,
            _ => continue,
        }
    }
}

/// Skips frames until one with the given `type` arrives.
pub async fn next_of_type(ws: &mut WsStream, kind: &str, limit: Duration) -> Option<Value> {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let value = next_json(ws, remaining).await?;
        if value["type"] == kind {
            return Some(value);
        }
    }
}
