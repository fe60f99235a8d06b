// Registered viewer set.
//
// Each viewer owns a bounded outbound queue drained by its own session task.
// Broadcast snapshots the senders first and then try_sends into each queue, so
// a full or closed queue only affects that viewer.

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Serialized frame shared by every recipient of one broadcast
pub type Frame = Arc<str>;

pub type ViewerId = Uuid;

/// A single viewer's send failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    /// Outbound queue full: the viewer is not keeping up
    Lagging(ViewerId),
    /// Session ended without unregistering yet
    Closed(ViewerId),
}

impl fmt::Display for BroadcastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BroadcastError::Lagging(id) => write!(f, "viewer {} outbound queue full", id),
            BroadcastError::Closed(id) => write!(f, "viewer {} connection closed", id),
        }
    }
}

impl std::error::Error for BroadcastError {}

/// Outcome of one broadcast
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: Vec<ViewerId>,
}

pub struct ViewerRegistry {
    viewers: DashMap<ViewerId, mpsc::Sender<Frame>>,
    queue_capacity: usize,
}

impl ViewerRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            viewers: DashMap::new(),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a new viewer; the receiver feeds its session's socket.
    pub fn register(&self) -> (ViewerId, mpsc::Receiver<Frame>) {
        self.insert(None)
    }

    /// Register with `first` already queued, ahead of any broadcast.
    pub fn register_with(&self, first: Frame) -> (ViewerId, mpsc::Receiver<Frame>) {
        self.insert(Some(first))
    }

    fn insert(&self, first: Option<Frame>) -> (ViewerId, mpsc::Receiver<Frame>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        if let Some(frame) = first {
            // Capacity is at least one and nothing else holds the sender yet
            let _ = tx.try_send(frame);
        }
        self.viewers.insert(id, tx);
        info!(viewer_id = %id, viewers = self.viewers.len(), "Viewer registered");
        (id, rx)
    }

    /// Returns false if the viewer was already gone
    pub fn unregister(&self, id: &ViewerId) -> bool {
        let removed = self.viewers.remove(id).is_some();
        if removed {
            info!(viewer_id = %id, viewers = self.viewers.len(), "Viewer unregistered");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }

    pub fn contains(&self, id: &ViewerId) -> bool {
        self.viewers.contains_key(id)
    }

    /// Queue a frame for one viewer. On failure the viewer is removed.
    pub fn send_to(&self, id: &ViewerId, frame: Frame) -> Result<(), BroadcastError> {
        let tx = match self.viewers.get(id) {
            Some(entry) => entry.value().clone(),
            None => return Err(BroadcastError::Closed(*id)),
        };
        self.try_deliver(id, &tx, frame)
    }

    /// Queue a frame for every registered viewer.
    ///
    /// Never blocks. Viewers whose queue is full or closed are logged and
    /// removed; everyone else still gets the frame.
    pub fn broadcast(&self, frame: Frame) -> BroadcastReport {
        // Snapshot so registration changes during delivery are not observed
        let snapshot: Vec<(ViewerId, mpsc::Sender<Frame>)> = self
            .viewers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut report = BroadcastReport::default();
        for (id, tx) in snapshot {
            match self.try_deliver(&id, &tx, Arc::clone(&frame)) {
                Ok(()) => report.delivered += 1,
                Err(_) => report.dropped.push(id),
            }
        }

        debug!(
            delivered = report.delivered,
            dropped = report.dropped.len(),
            "Broadcast complete"
        );
        report
    }

    fn try_deliver(
        &self,
        id: &ViewerId,
        tx: &mpsc::Sender<Frame>,
        frame: Frame,
    ) -> Result<(), BroadcastError> {
        let err = match tx.try_send(frame) {
            Ok(()) => return Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => BroadcastError::Lagging(*id),
            Err(mpsc::error::TrySendError::Closed(_)) => BroadcastError::Closed(*id),
        };
        warn!(viewer_id = %id, error = %err, "Dropping viewer");
        self.viewers.remove(id);
        Err(err)
    }
}
