use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use strum::Display;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use crate::config::{StoreBackend, StoreOptions};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Field the store stamps with its commit time when a document is added.
pub const CREATED_AT_FIELD: &str = "createdAt";
/// Field the store stamps with its commit time on every write.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

pub type Fields = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum WriteOp {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{operation} failed: {reason}")]
    Write { operation: WriteOp, reason: String },
    #[error("document {id} not found")]
    NotFound { id: String },
    #[error("document {id} could not be decoded: {reason}")]
    Decode { id: String, reason: String },
    #[error("reading from the store failed: {reason}")]
    Read { reason: String },
    #[error("opening subscription failed: {reason}")]
    Subscribe { reason: String },
}

impl StoreError {
    pub(crate) fn write(operation: WriteOp, reason: impl fmt::Display) -> Self {
        StoreError::Write {
            operation,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn read(reason: impl fmt::Display) -> Self {
        StoreError::Read {
            reason: reason.to_string(),
        }
    }
}

/// A document as the store hands it out: its identity plus every field,
/// server timestamps included.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

/// The complete contents of one collection at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub collection: String,
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Receiving end of a collection subscription. The first snapshot is the
/// current contents; one more arrives after every committed write.
#[derive(Debug)]
pub struct Listener {
    pub id: ListenerId,
    pub receiver: Receiver<Snapshot>,
}

/// A document database with collection-level push notifications and
/// server-assigned identities and timestamps.
pub trait DocumentStore: Send + Sync {
    /// Adds a document and returns its store-assigned id.
    fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError>;

    /// Merges `fields` into an existing document. Missing ids are an error,
    /// never an upsert.
    fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError>;

    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Returns whether a document was actually removed.
    fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError>;

    fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    fn listen(&self, collection: &str) -> Result<Listener, StoreError>;

    /// Drops a listener's sender. Unknown ids are ignored.
    fn unlisten(&self, id: ListenerId);
}

pub fn open(options: &StoreOptions, offline: bool) -> Result<Arc<dyn DocumentStore>> {
    match options.backend {
        StoreBackend::Memory => {
            let store = MemoryStore::new();
            store.set_offline(offline);
            Ok(Arc::new(store))
        }
        StoreBackend::Sqlite => {
            if offline {
                tracing::warn!("--offline only applies to the memory store; ignoring");
            }
            let store = SqliteStore::open(&options.database_path).with_context(|| {
                format!("opening note store {}", options.database_path.display())
            })?;
            Ok(Arc::new(store))
        }
    }
}

pub(crate) fn stamp(
    fields: &mut Fields,
    field: &str,
    at: OffsetDateTime,
    operation: WriteOp,
) -> Result<(), StoreError> {
    let formatted = at
        .format(&Rfc3339)
        .map_err(|err| StoreError::write(operation, err))?;
    fields.insert(field.to_owned(), Value::String(formatted));
    Ok(())
}

#[derive(Debug)]
struct Registered {
    id: ListenerId,
    collection: String,
    sender: Sender<Snapshot>,
}

#[derive(Debug, Default)]
pub(crate) struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<Registered>>,
}

impl ListenerRegistry {
    /// Callers hold their write lock while registering so the initial
    /// snapshot cannot interleave with a concurrent publish.
    pub(crate) fn register(&self, collection: &str, initial: Vec<Document>) -> Listener {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = crossbeam_channel::unbounded();
        let _ = sender.send(Snapshot {
            collection: collection.to_owned(),
            documents: initial,
        });
        self.listeners.lock().push(Registered {
            id,
            collection: collection.to_owned(),
            sender,
        });
        tracing::debug!(collection, listener = id.0, "listener registered");
        Listener { id, receiver }
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|listener| listener.id != id);
        before != listeners.len()
    }

    pub(crate) fn has_listeners(&self, collection: &str) -> bool {
        self.listeners
            .lock()
            .iter()
            .any(|listener| listener.collection == collection)
    }

    /// Pushes a snapshot to every listener on `collection`, dropping those
    /// whose receiving end has gone away.
    pub(crate) fn publish(&self, collection: &str, documents: Vec<Document>) {
        let mut listeners = self.listeners.lock();
        listeners.retain(|listener| {
            if listener.collection != collection {
                return true;
            }
            let delivered = listener
                .sender
                .send(Snapshot {
                    collection: collection.to_owned(),
                    documents: documents.clone(),
                })
                .is_ok();
            if !delivered {
                tracing::debug!(collection, listener = listener.id.0, "dropping closed listener");
            }
            delivered
        });
    }
}

/// Hands out strictly increasing commit times, even when the wall clock
/// stalls or steps backwards.
#[derive(Debug)]
pub(crate) struct CommitClock {
    last: Mutex<OffsetDateTime>,
}

impl CommitClock {
    pub(crate) fn starting_after(last: OffsetDateTime) -> Self {
        Self {
            last: Mutex::new(last),
        }
    }

    pub(crate) fn next(&self) -> OffsetDateTime {
        let mut last = self.last.lock();
        let now = OffsetDateTime::now_utc();
        let next = if now > *last {
            now
        } else {
            *last + Duration::microseconds(1)
        };
        *last = next;
        next
    }
}

impl Default for CommitClock {
    fn default() -> Self {
        Self::starting_after(OffsetDateTime::UNIX_EPOCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_clock_never_repeats_an_instant() {
        let far_future = OffsetDateTime::now_utc() + Duration::days(1);
        let clock = CommitClock::starting_after(far_future);
        let first = clock.next();
        let second = clock.next();
        assert!(first > far_future);
        assert!(second > first);
    }

    #[test]
    fn publish_skips_other_collections_and_prunes_closed_listeners() {
        let registry = ListenerRegistry::default();
        let notes = registry.register("Notes", Vec::new());
        let other = registry.register("Other", Vec::new());
        let closed = registry.register("Notes", Vec::new());
        drop(closed);

        registry.publish("Notes", Vec::new());

        assert_eq!(notes.receiver.len(), 2);
        assert_eq!(other.receiver.len(), 1);
        assert_eq!(registry.listeners.lock().len(), 2);
    }

    #[test]
    fn remove_reports_whether_listener_existed() {
        let registry = ListenerRegistry::default();
        let listener = registry.register("Notes", Vec::new());
        assert!(registry.remove(listener.id));
        assert!(!registry.remove(listener.id));
        assert!(!registry.has_listeners("Notes"));
    }
}
