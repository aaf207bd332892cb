use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexMap;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{
    stamp, CommitClock, Document, DocumentStore, Fields, Listener, ListenerId, ListenerRegistry,
    StoreError, WriteOp, CREATED_AT_FIELD, UPDATED_AT_FIELD,
};

type Collection = IndexMap<String, Fields>;

/// In-process document store. Nothing survives a restart; writes can be
/// made to fail with [`MemoryStore::set_offline`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Collection>>,
    listeners: ListenerRegistry,
    clock: CommitClock,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every write fails with [`StoreError::Write`]; reads and
    /// subscriptions keep serving the last committed state.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
        tracing::info!(offline, "memory store connectivity changed");
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    fn ensure_online(&self, operation: WriteOp) -> Result<(), StoreError> {
        if self.is_offline() {
            return Err(StoreError::write(operation, "store unreachable"));
        }
        Ok(())
    }
}

fn documents_of(collection: Option<&Collection>) -> Vec<Document> {
    collection
        .map(|docs| {
            docs.iter()
                .map(|(id, fields)| Document {
                    id: id.clone(),
                    fields: fields.clone(),
                })
                .collect()
        })
        .unwrap_or_default()
}

impl DocumentStore for MemoryStore {
    fn add(&self, collection: &str, mut fields: Fields) -> Result<String, StoreError> {
        self.ensure_online(WriteOp::Create)?;
        let mut collections = self.collections.lock();
        let now = self.clock.next();
        stamp(&mut fields, CREATED_AT_FIELD, now, WriteOp::Create)?;
        stamp(&mut fields, UPDATED_AT_FIELD, now, WriteOp::Create)?;
        let id = Uuid::new_v4().simple().to_string();
        let docs = collections.entry(collection.to_owned()).or_default();
        docs.insert(id.clone(), fields);
        self.listeners.publish(collection, documents_of(Some(&*docs)));
        Ok(id)
    }

    fn update(&self, collection: &str, id: &str, mut fields: Fields) -> Result<(), StoreError> {
        self.ensure_online(WriteOp::Update)?;
        let mut collections = self.collections.lock();
        let Some(docs) = collections.get_mut(collection) else {
            return Err(StoreError::NotFound { id: id.to_owned() });
        };
        let Some(existing) = docs.get_mut(id) else {
            return Err(StoreError::NotFound { id: id.to_owned() });
        };
        stamp(&mut fields, UPDATED_AT_FIELD, self.clock.next(), WriteOp::Update)?;
        existing.extend(fields);
        self.listeners.publish(collection, documents_of(Some(&*docs)));
        Ok(())
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let collections = self.collections.lock();
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document {
                id: id.to_owned(),
                fields: fields.clone(),
            }))
    }

    fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        self.ensure_online(WriteOp::Delete)?;
        let mut collections = self.collections.lock();
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(false);
        };
        if docs.shift_remove(id).is_none() {
            return Ok(false);
        }
        self.listeners.publish(collection, documents_of(Some(&*docs)));
        Ok(true)
    }

    fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.lock();
        Ok(documents_of(collections.get(collection)))
    }

    fn listen(&self, collection: &str) -> Result<Listener, StoreError> {
        let collections = self.collections.lock();
        let initial = documents_of(collections.get(collection));
        Ok(self.listeners.register(collection, initial))
    }

    fn unlisten(&self, id: ListenerId) {
        self.listeners.remove(id);
    }
}
