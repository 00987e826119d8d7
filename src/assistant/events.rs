//! Worker → interactive layer events
//!
//! A single unbounded channel keeps events in production order. Sending never
//! blocks the worker and nothing is dropped while a receiver exists.

use tokio::sync::mpsc;

use super::state::AssistantState;

/// Something the interactive layer should show
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistantEvent {
    /// Human-readable status line
    Status(String),
    /// Microphone capture started (`true`) or ended (`false`)
    Listening(bool),
    /// The loop moved to a new state
    State(AssistantState),
}

/// Cloneable sending half of the event channel
#[derive(Debug, Clone)]
pub struct EventSender(mpsc::UnboundedSender<AssistantEvent>);

/// Create a connected sender/receiver pair
#[must_use]
pub fn event_channel() -> (EventSender, mpsc::UnboundedReceiver<AssistantEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender(tx), rx)
}

impl EventSender {
    pub fn send(&self, event: AssistantEvent) {
        if self.0.send(event).is_err() {
            tracing::trace!("event receiver gone, dropping event");
        }
    }

    pub fn status(&self, text: impl Into<String>) {
        self.send(AssistantEvent::Status(text.into()));
    }

    pub fn listening(&self, active: bool) {
        self.send(AssistantEvent::Listening(active));
    }

    pub fn state(&self, state: AssistantState) {
        self.send(AssistantEvent::State(state));
    }
}
