// MIT License - Copyright (c) 2021 TJForc
// Panel worker events

/// All events that can be emitted by the panel worker.
///
/// Users subscribe via `panel.subscribe()` to receive a
/// `tokio::sync::broadcast::Receiver<PanelEvent>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelEvent {
    /// A poll succeeded and a new snapshot was published
    SnapshotUpdated,
    /// A poll failed; the previous snapshot is still current
    UpdateFailed { message: String },
    /// A fresh session was authenticated
    Authenticated,
    /// An authenticated session was lost
    ConnectionLost,
    /// An on-demand command failed
    CommandFailed { command: String, message: String },
    /// The worker stopped and the connection is closed
    Shutdown,
}

/// Type alias for the broadcast sender.
pub type EventSender = tokio::sync::broadcast::Sender<PanelEvent>;

/// Type alias for the broadcast receiver.
pub type EventReceiver = tokio::sync::broadcast::Receiver<PanelEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    tokio::sync::broadcast::channel(capacity)
}
