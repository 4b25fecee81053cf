use tokio::sync::mpsc;

use crate::home::StateKey;
use crate::port::{HistoryDispatch, HistoryStore};

/// "This device was last set to this state" — the audit record emitted
/// after every successful apply.
#[derive(Debug, Clone)]
pub struct DeviceStateChange {
    pub device_id: String,
    pub preset_id: String,
    pub state_key: StateKey,
    pub response: serde_json::Value,
}

/// Engine-side handle. `notify` never blocks and never fails the
/// caller; a full or closed queue only drops the event with a log line.
#[derive(Debug, Clone)]
pub struct HistoryDispatcher {
    tx: mpsc::Sender<DeviceStateChange>,
}

pub struct HistoryWorker<S> {
    rx: mpsc::Receiver<DeviceStateChange>,
    store: S,
}

pub fn new_dispatcher<S: HistoryStore>(store: S, capacity: usize) -> (HistoryDispatcher, HistoryWorker<S>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (HistoryDispatcher { tx }, HistoryWorker { rx, store })
}

impl HistoryDispatch for HistoryDispatcher {
    fn notify(&self, change: DeviceStateChange) {
        if let Err(e) = self.tx.try_send(change) {
            tracing::warn!("Dropping device history event, queue unavailable: {}", e);
        }
    }
}

impl<S: HistoryStore> HistoryWorker<S> {
    pub async fn run(mut self) {
        while let Some(change) = self.rx.recv().await {
            if let Err(e) = self.store.insert(&change).await {
                tracing::error!("Error persisting device history for {}: {:?}", change.device_id, e);
            }
        }
    }
}
