use tokio::sync::mpsc;

use crate::capture::CaptureEvent;
use crate::gateway::{ChannelEvent, ConnectionConfig};

/// Identifies one turn. Allocated when listening starts.
pub type TurnId = u64;

/// Requests coming from the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    Start,
    /// Stops listening, or cancels a turn that is waiting on the gateway.
    Stop,
    /// Start when idle, stop otherwise.
    Toggle,
}

/// Everything the controller reacts to. All sources funnel into one queue.
#[derive(Debug)]
pub enum SessionEvent {
    Command(UserCommand),
    ConfigChanged(ConnectionConfig),
    Turn { turn: TurnId, event: TurnEvent },
    Shutdown,
}

/// Events produced by the leaves on behalf of a specific turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    Capture(CaptureEvent),
    Channel(ChannelEvent),
    SynthesisFinished { utterance: u64 },
}

impl From<CaptureEvent> for TurnEvent {
    fn from(event: CaptureEvent) -> Self {
        TurnEvent::Capture(event)
    }
}

impl From<ChannelEvent> for TurnEvent {
    fn from(event: ChannelEvent) -> Self {
        TurnEvent::Channel(event)
    }
}

/// Sender handed to a leaf for the duration of one turn. Every event it
/// emits is stamped with the turn id, so anything arriving after the turn
/// ended is recognised as stale.
#[derive(Debug, Clone)]
pub struct TurnEvents {
    turn: TurnId,
    tx: mpsc::Sender<SessionEvent>,
}

impl TurnEvents {
    pub fn new(turn: TurnId, tx: mpsc::Sender<SessionEvent>) -> Self {
        Self { turn, tx }
    }

    pub fn turn(&self) -> TurnId {
        self.turn
    }

    /// Non-blocking so it can be called from engine callbacks.
    pub fn emit(&self, event: impl Into<TurnEvent>) {
        let event = SessionEvent::Turn {
            turn: self.turn,
            event: event.into(),
        };
        if let Err(e) = self.tx.try_send(event) {
            tracing::warn!("Failed to queue event for turn {}: {}", self.turn, e);
        }
    }
}
