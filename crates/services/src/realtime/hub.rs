use std::collections::HashMap;
use std::sync::Arc;

use livepoll_config::HubSettings;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use super::client::{ClientHandle, UserType};
use super::session_hub::{FanOut, SessionHandle, SessionStats};

/// Global registry of session actors. The lock only guards creating and
/// tearing down sessions; broadcasts run against a cloned handle.
pub struct Hub {
    sessions: Mutex<HashMap<String, SessionHandle>>,
    settings: HubSettings,
}

impl Hub {
    pub fn new(settings: HubSettings) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            settings,
        }
    }

    pub fn settings(&self) -> &HubSettings {
        &self.settings
    }

    /// Builds a handle sized by the configured outbound queue capacity.
    pub fn new_client(
        &self,
        session_id: &str,
        user_type: UserType,
        user_id: &str,
    ) -> (ClientHandle, tokio::sync::mpsc::Receiver<Arc<str>>) {
        ClientHandle::new(
            session_id,
            user_type,
            user_id,
            self.settings.client_queue_capacity,
        )
    }

    /// Adds `client` to its session, starting the session actor on first
    /// use. Returns the session's client count.
    pub async fn register(&self, client: ClientHandle) -> usize {
        let session_id = client.session_id.clone();
        let pending = {
            let mut sessions = self.sessions.lock().await;
            let handle = sessions.entry(session_id.clone()).or_insert_with(|| {
                info!(session_id = %session_id, "Session hub created");
                SessionHandle::spawn(session_id.clone(), self.settings.session_mailbox)
            });
            // Queued under the lock so a concurrent reap counts this client.
            handle.enqueue_register(client).await
        };
        match pending {
            Some(reply) => reply.await.unwrap_or_default(),
            None => 0,
        }
    }

    /// Removes the client; the session is torn down once it is empty.
    /// Returns `false` if the session was unknown.
    pub async fn unregister(&self, session_id: &str, client_id: Uuid) -> bool {
        let handle = self.sessions.lock().await.get(session_id).cloned();
        let Some(handle) = handle else {
            return false;
        };
        if handle.unregister(client_id).await.unwrap_or_default() == 0 {
            self.reap(session_id).await;
        }
        true
    }

    /// Delivers `payload` to every client of the session without waiting on
    /// any of them.
    pub async fn broadcast_to_session(&self, session_id: &str, payload: Arc<str>) -> FanOut {
        let handle = self.sessions.lock().await.get(session_id).cloned();
        let Some(handle) = handle else {
            debug!(%session_id, "No listeners for session");
            return FanOut::default();
        };

        let report = handle.broadcast(payload).await.unwrap_or_default();
        if report.remaining == 0 && report.evicted + report.disconnected > 0 {
            self.reap(session_id).await;
        }
        report
    }

    pub async fn session_stats(&self, session_id: &str) -> SessionStats {
        let handle = self.sessions.lock().await.get(session_id).cloned();
        match handle {
            Some(handle) => handle
                .stats()
                .await
                .unwrap_or_else(|| SessionStats::missing(session_id)),
            None => SessionStats::missing(session_id),
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Drops an emptied session, re-checked under the registry lock so a
    /// client that registered meanwhile keeps it alive. Registrations are
    /// queued under the same lock, so the stats reply already counts them.
    async fn reap(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().await;
        let Some(handle) = sessions.get(session_id).cloned() else {
            return;
        };
        let empty = handle
            .stats()
            .await
            .is_none_or(|stats| stats.active_connections == 0);
        if empty {
            sessions.remove(session_id);
            info!(%session_id, "Session hub removed");
        }
    }
}
