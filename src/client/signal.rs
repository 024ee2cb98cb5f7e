use tokio::sync::broadcast;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// Renewal failed or no renewal credential was available.
    SessionExpired,
    /// The user signed out.
    UserInitiated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutEvent {
    pub reason: LogoutReason,
}

/// Process-wide "you are logged out" notification. The top-level application
/// subscribes once and routes back to the entry page when it fires.
#[derive(Clone)]
pub struct LogoutSignal {
    tx: broadcast::Sender<LogoutEvent>,
}

impl Default for LogoutSignal {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }
}

impl LogoutSignal {
    pub fn new() -> Self { Self::default() }

    pub fn subscribe(&self) -> broadcast::Receiver<LogoutEvent> { self.tx.subscribe() }

    /// Returns how many subscribers were notified.
    pub fn publish(&self, reason: LogoutReason) -> usize {
        let delivered = self.tx.send(LogoutEvent { reason }).unwrap_or(0);
        info!(target: "client", ?reason, subscribers = delivered, "logout signalled");
        delivered
    }
}
