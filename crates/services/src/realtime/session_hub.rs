use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::client::{ClientHandle, UserType};

/// Result of one broadcast call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOut {
    pub delivered: usize,
    /// Slow consumers whose queue was full.
    pub evicted: usize,
    /// Clients whose connection had already gone away.
    pub disconnected: usize,
    pub remaining: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub session_id: String,
    pub active_connections: usize,
    pub organizer_count: usize,
    pub participant_count: usize,
    pub exists: bool,
}

impl SessionStats {
    pub fn missing(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            active_connections: 0,
            organizer_count: 0,
            participant_count: 0,
            exists: false,
        }
    }
}

pub(crate) enum Command {
    Register(ClientHandle, oneshot::Sender<usize>),
    Unregister(Uuid, oneshot::Sender<usize>),
    Broadcast(Arc<str>, oneshot::Sender<FanOut>),
    Stats(oneshot::Sender<SessionStats>),
}

/// Mailbox of one session actor. Cloning is cheap; the actor stops once
/// every handle is dropped.
#[derive(Clone)]
pub(crate) struct SessionHandle {
    tx: mpsc::Sender<Command>,
}

impl SessionHandle {
    pub(crate) fn spawn(session_id: String, mailbox: usize) -> Self {
        let (tx, rx) = mpsc::channel(mailbox.max(1));
        let actor = SessionActor {
            session_id,
            clients: HashMap::new(),
        };
        tokio::spawn(actor.run(rx));
        Self { tx }
    }

    /// Queues a command without waiting for the actor to answer it.
    async fn enqueue<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Option<oneshot::Receiver<T>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send(build(reply_tx)).await.ok()?;
        Some(reply_rx)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        self.enqueue(build).await?.await.ok()
    }

    /// Queues the registration. The receiver yields the session's client
    /// count once the actor has added the client.
    pub(crate) async fn enqueue_register(
        &self,
        client: ClientHandle,
    ) -> Option<oneshot::Receiver<usize>> {
        self.enqueue(|reply| Command::Register(client, reply)).await
    }

    pub(crate) async fn unregister(&self, client_id: Uuid) -> Option<usize> {
        self.request(|reply| Command::Unregister(client_id, reply)).await
    }

    pub(crate) async fn broadcast(&self, payload: Arc<str>) -> Option<FanOut> {
        self.request(|reply| Command::Broadcast(payload, reply)).await
    }

    pub(crate) async fn stats(&self) -> Option<SessionStats> {
        self.request(Command::Stats).await
    }
}

struct SessionActor {
    session_id: String,
    clients: HashMap<Uuid, ClientHandle>,
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        debug!(session_id = %self.session_id, "Session hub started");
        while let Some(command) = rx.recv().await {
            match command {
                Command::Register(client, reply) => {
                    debug!(
                        session_id = %self.session_id,
                        client_id = %client.id,
                        user_type = %client.user_type,
                        "Client registered"
                    );
                    self.clients.insert(client.id, client);
                    let _ = reply.send(self.clients.len());
                }
                Command::Unregister(client_id, reply) => {
                    if self.clients.remove(&client_id).is_some() {
                        debug!(session_id = %self.session_id, %client_id, "Client unregistered");
                    }
                    let _ = reply.send(self.clients.len());
                }
                Command::Broadcast(payload, reply) => {
                    let _ = reply.send(self.fan_out(payload));
                }
                Command::Stats(reply) => {
                    let _ = reply.send(self.stats());
                }
            }
        }
        debug!(session_id = %self.session_id, "Session hub stopped");
    }

    /// Never waits on a client: a full queue evicts the client, dropping its
    /// sender and closing the connection.
    fn fan_out(&mut self, payload: Arc<str>) -> FanOut {
        let mut report = FanOut::default();
        let mut gone = Vec::new();

        for (id, client) in &self.clients {
            match client.try_deliver(Arc::clone(&payload)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        session_id = %self.session_id,
                        client_id = %id,
                        user_id = %client.user_id,
                        "Evicting slow consumer"
                    );
                    report.evicted += 1;
                    gone.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    report.disconnected += 1;
                    gone.push(*id);
                }
            }
        }

        for id in gone {
            self.clients.remove(&id);
        }
        report.remaining = self.clients.len();

        if report.evicted > 0 {
            info!(
                session_id = %self.session_id,
                delivered = report.delivered,
                evicted = report.evicted,
                "Broadcast completed with evictions"
            );
        }
        report
    }

    fn stats(&self) -> SessionStats {
        let organizers = self
            .clients
            .values()
            .filter(|c| c.user_type == UserType::Organizer)
            .count();
        SessionStats {
            session_id: self.session_id.clone(),
            active_connections: self.clients.len(),
            organizer_count: organizers,
            participant_count: self.clients.len() - organizers,
            exists: true,
        }
    }
}
