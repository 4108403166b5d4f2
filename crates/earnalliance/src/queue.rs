//! Pending event and identifier queues.

use crate::types::{Event, IdentifierRecord};
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct Pending {
    events: Vec<Event>,
    identifiers: Vec<IdentifierRecord>,
}

impl Pending {
    fn len(&self) -> usize {
        self.events.len() + self.identifiers.len()
    }
}

/// A batch removed from the queue.
#[derive(Debug, Default)]
pub struct Batch {
    pub events: Vec<Event>,
    pub identifiers: Vec<IdentifierRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.events.len() + self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// FIFO queues of events and identifier updates behind a single lock.
#[derive(Debug)]
pub struct EventQueue {
    pending: Mutex<Pending>,
    batch_size: usize,
}

impl EventQueue {
    /// Create a new queue.
    pub fn new(batch_size: usize) -> Self {
        Self {
            pending: Mutex::new(Pending::default()),
            batch_size,
        }
    }

    /// Append an event. Returns the combined pending count.
    pub async fn push_event(&self, event: Event) -> usize {
        let mut pending = self.pending.lock().await;
        pending.events.push(event);
        pending.len()
    }

    /// Append an identifier update. Returns the combined pending count.
    pub async fn push_identifier(&self, record: IdentifierRecord) -> usize {
        let mut pending = self.pending.lock().await;
        pending.identifiers.push(record);
        pending.len()
    }

    /// Check whether the queue holds at least a full batch.
    pub fn is_full(&self, len: usize) -> bool {
        len >= self.batch_size
    }

    /// Get the combined number of pending records.
    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Remove up to one batch from the front of the queues.
    ///
    /// Identifiers are taken first; events fill what is left of the batch.
    pub async fn drain(&self) -> Batch {
        let mut pending = self.pending.lock().await;

        let take = pending.identifiers.len().min(self.batch_size);
        let identifiers: Vec<_> = pending.identifiers.drain(..take).collect();

        let take = pending.events.len().min(self.batch_size - identifiers.len());
        let events: Vec<_> = pending.events.drain(..take).collect();

        Batch {
            events,
            identifiers,
        }
    }
}
