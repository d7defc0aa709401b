use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};

const DEFAULT_CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
struct Signal {
    origin: Option<String>,
}

/// What a subscriber should do next. Neither variant says *what* changed:
/// consumers always re-read from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeNotice {
    Changed,
    /// Signals were dropped while this subscriber was slow; do a full re-read.
    Resync,
}

/// Best-effort, payload-free change broadcast between client sessions.
///
/// A session never receives signals it published itself, so a mutating session must
/// refresh its own view after the write returns.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    sender: broadcast::Sender<Signal>,
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, origin: Option<&str>) {
        let signal = Signal {
            origin: origin.map(str::to_string),
        };

        if let Err(e) = self.sender.send(signal) {
            // Nobody listening; they will catch up on their next full read.
            debug!("Change signal dropped: {}", e);
        }
    }

    pub fn subscribe(&self, session_id: impl Into<String>) -> ChangeSubscription {
        ChangeSubscription {
            session_id: session_id.into(),
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ChangeSubscription {
    session_id: String,
    receiver: broadcast::Receiver<Signal>,
}

impl ChangeSubscription {
    fn is_own(&self, signal: &Signal) -> bool {
        signal.origin.as_deref() == Some(self.session_id.as_str())
    }

    /// Waits for the next foreign signal. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<ChangeNotice> {
        loop {
            match self.receiver.recv().await {
                Ok(signal) if self.is_own(&signal) => continue,
                Ok(_) => return Some(ChangeNotice::Changed),
                Err(RecvError::Lagged(missed)) => {
                    warn!(
                        "Session {} missed {} change signals, requesting resync",
                        self.session_id, missed
                    );
                    return Some(ChangeNotice::Resync);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<ChangeNotice> {
        loop {
            match self.receiver.try_recv() {
                Ok(signal) if self.is_own(&signal) => continue,
                Ok(_) => return Some(ChangeNotice::Changed),
                Err(TryRecvError::Lagged(_)) => return Some(ChangeNotice::Resync),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}
