use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Organizer,
    Participant,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Organizer => "organizer",
            UserType::Participant => "participant",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "organizer" => Ok(UserType::Organizer),
            "participant" => Ok(UserType::Participant),
            other => Err(format!("unknown user type: {other}")),
        }
    }
}

/// The hub's side of one live connection. The hub holds the only strong
/// sender of the outbound queue, so dropping the handle closes the queue and
/// lets the connection's write loop finish.
#[derive(Debug)]
pub struct ClientHandle {
    pub id: Uuid,
    pub session_id: String,
    pub user_type: UserType,
    pub user_id: String,
    tx: mpsc::Sender<Arc<str>>,
}

impl ClientHandle {
    /// Creates the handle and the receiving end of its bounded outbound
    /// queue.
    pub fn new(
        session_id: impl Into<String>,
        user_type: UserType,
        user_id: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            user_type,
            user_id: user_id.into(),
            tx,
        };
        (handle, rx)
    }

    /// Sender for direct replies that does not keep the queue alive.
    pub fn reply_sender(&self) -> mpsc::WeakSender<Arc<str>> {
        self.tx.downgrade()
    }

    pub(crate) fn try_deliver(&self, payload: Arc<str>) -> Result<(), TrySendError<Arc<str>>> {
        self.tx.try_send(payload)
    }
}
