use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use livepoll_db::models::QuestionResult;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::retry::RetryPolicy;
use crate::bus::{BusMessage, EventSubscription, PollEvent, ResultsUpdatedEvent};
use crate::realtime::{FanOut, Hub};

/// Client-facing push for a fresh results snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsEnvelope<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub session_id: &'a str,
    pub question_id: &'a str,
    pub results: &'a QuestionResult,
    pub timestamp: DateTime<Utc>,
    pub event_id: &'a str,
}

impl<'a> ResultsEnvelope<'a> {
    pub fn from_event(event: &'a ResultsUpdatedEvent) -> Self {
        Self {
            kind: "results_updated",
            session_id: &event.session_id,
            question_id: &event.question_id,
            results: &event.results,
            timestamp: event.timestamp,
            event_id: &event.event_id,
        }
    }
}

/// Moves results-updated events from the bus into the hub.
#[derive(Clone)]
pub struct ResultsBroadcaster {
    hub: Arc<Hub>,
    retry: RetryPolicy,
}

impl ResultsBroadcaster {
    pub fn new(hub: Arc<Hub>, retry: RetryPolicy) -> Self {
        Self { hub, retry }
    }

    /// Returns `None` when the message was skipped.
    pub async fn handle_message(&self, message: &BusMessage) -> Option<FanOut> {
        let event = match message.decode::<PollEvent>() {
            Ok(PollEvent::ResultsUpdated(event)) => event,
            Ok(other) => {
                warn!(topic = %message.topic, kind = other.topic(), "Unexpected event on results topic");
                return None;
            }
            Err(e) => {
                error!(topic = %message.topic, offset = %message.offset, %e, "Dropping undecodable results event");
                return None;
            }
        };

        let payload: Arc<str> = match serde_json::to_string(&ResultsEnvelope::from_event(&event)) {
            Ok(json) => json.into(),
            Err(e) => {
                error!(event_id = %event.event_id, %e, "Failed to encode results push");
                return None;
            }
        };

        let report = self.hub.broadcast_to_session(&event.session_id, payload).await;
        debug!(
            session_id = %event.session_id,
            question_id = %event.question_id,
            delivered = report.delivered,
            evicted = report.evicted,
            "Results broadcast"
        );
        Some(report)
    }

    pub async fn run(
        self,
        mut subscription: EventSubscription,
        max_wait: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(topic = subscription.topic(), group = subscription.group(), "Results broadcaster started");
        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                next = subscription.next(max_wait) => match next {
                    Ok(Some(message)) => {
                        self.handle_message(&message).await;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        error!(%e, "Results subscription failed");
                        tokio::time::sleep(self.retry.delay(0)).await;
                    }
                },
            }
        }
        info!("Results broadcaster stopped");
    }
}
