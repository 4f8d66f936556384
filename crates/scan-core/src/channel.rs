use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tokio::sync::{broadcast, oneshot};

use crate::types::{ScanOutcome, SessionEvent};

/// Broadcast event stream type used by session observers.
pub type EventStream = broadcast::Receiver<SessionEvent>;

/// Errors returned by outcome delivery.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OutcomeError {
    /// The slot was already completed; the second outcome was discarded.
    #[error("scan outcome was already delivered")]
    AlreadyDelivered,
    /// The host dropped its receiver before the outcome arrived.
    #[error("outcome receiver was dropped")]
    ReceiverDropped,
    /// The session was dropped without producing an outcome.
    #[error("session ended without an outcome")]
    SessionDropped,
}

/// Single-fire outcome slot. The first `complete` wins; later calls are rejected.
#[derive(Debug)]
pub struct OutcomeSlot {
    sender: Mutex<Option<oneshot::Sender<ScanOutcome>>>,
}

/// Host side of an [`OutcomeSlot`].
#[derive(Debug)]
pub struct OutcomeReceiver {
    receiver: oneshot::Receiver<ScanOutcome>,
}

impl OutcomeSlot {
    /// Create a slot and the receiver the host awaits.
    pub fn new() -> (Self, OutcomeReceiver) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                sender: Mutex::new(Some(sender)),
            },
            OutcomeReceiver { receiver },
        )
    }

    /// Deliver the outcome.
    ///
    /// Returns `AlreadyDelivered` when the slot was completed before. When the receiver
    /// is gone the slot still counts as completed.
    pub fn complete(&self, outcome: ScanOutcome) -> Result<(), OutcomeError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(OutcomeError::AlreadyDelivered)?;
        sender
            .send(outcome)
            .map_err(|_| OutcomeError::ReceiverDropped)
    }

    /// `true` once `complete` has been called.
    pub fn is_completed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl OutcomeReceiver {
    /// Wait for the session outcome.
    pub async fn recv(self) -> Result<ScanOutcome, OutcomeError> {
        self.receiver
            .await
            .map_err(|_| OutcomeError::SessionDropped)
    }

    /// Non-blocking check, `Ok(None)` while the session is still running.
    pub fn try_recv(&mut self) -> Result<Option<ScanOutcome>, OutcomeError> {
        match self.receiver.try_recv() {
            Ok(outcome) => Ok(Some(outcome)),
            Err(oneshot::error::TryRecvError::Empty) => Ok(None),
            Err(oneshot::error::TryRecvError::Closed) => Err(OutcomeError::SessionDropped),
        }
    }
}

/// Session event fan-out shared by the controller and UI observers.
#[derive(Clone, Debug)]
pub struct SessionChannels {
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionChannels {
    /// Create a channel set with the given event buffer.
    pub fn new(event_buffer: usize) -> Self {
        let (event_tx, _) = broadcast::channel(event_buffer.max(1));
        Self { event_tx }
    }

    /// Subscribe to emitted session events.
    pub fn subscribe(&self) -> EventStream {
        self.event_tx.subscribe()
    }

    /// Emit an event to all subscribers.
    ///
    /// Emission is best-effort; lagged subscribers are handled by `broadcast`.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }
}
