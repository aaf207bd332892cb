use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use serde::Deserialize;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::{Note, NoteId, Timestamp};
use crate::store::{Document, DocumentStore, Fields, ListenerId, Snapshot, StoreError};

pub const DEFAULT_COLLECTION: &str = "Notes";

/// Note-level access to one collection of a [`DocumentStore`]. Holds no
/// note state of its own.
#[derive(Clone)]
pub struct NoteRepository {
    store: Arc<dyn DocumentStore>,
    collection: Arc<str>,
}

impl NoteRepository {
    pub fn new(store: Arc<dyn DocumentStore>, collection: impl Into<Arc<str>>) -> Self {
        Self {
            store,
            collection: collection.into(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Opens one long-lived subscription. `on_change` runs on a dispatcher
    /// thread with the complete decoded collection, once for the initial
    /// contents and again after every committed change, in store order.
    pub fn subscribe<F>(&self, mut on_change: F) -> Result<Subscription, StoreError>
    where
        F: FnMut(Vec<Note>) + Send + 'static,
    {
        let listener = self.store.listen(&self.collection)?;
        let receiver = listener.receiver;
        let worker = thread::Builder::new()
            .name(format!("{}-subscription", self.collection))
            .spawn(move || {
                for snapshot in receiver.iter() {
                    on_change(decode_snapshot(&snapshot));
                }
                tracing::debug!("subscription dispatcher finished");
            });
        let worker = match worker {
            Ok(worker) => worker,
            Err(err) => {
                self.store.unlisten(listener.id);
                return Err(StoreError::Subscribe {
                    reason: err.to_string(),
                });
            }
        };
        tracing::info!(collection = %self.collection, "opened note subscription");
        Ok(Subscription {
            store: Arc::clone(&self.store),
            listener: Some(listener.id),
            worker: Some(worker),
        })
    }

    /// Subscription whose snapshots are forwarded into a channel, for event
    /// loops that poll rather than take callbacks.
    pub fn subscribe_channel(&self) -> Result<(Subscription, Receiver<Vec<Note>>), StoreError> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let subscription = self.subscribe(move |notes| {
            let _ = sender.send(notes);
        })?;
        Ok((subscription, receiver))
    }

    /// Returns the new note with its store-assigned id. Its timestamps stay
    /// `Unresolved`; the stamped copy arrives through the subscription.
    pub fn create(&self, title: &str, content: &str) -> Result<Note, StoreError> {
        let id = self
            .store
            .add(&self.collection, note_fields(title, content))?;
        tracing::info!(note_id = %id, "created note");
        Ok(Note {
            id: NoteId::Existing(id),
            title: title.to_owned(),
            content: content.to_owned(),
            created_at: Timestamp::Unresolved,
            updated_at: Timestamp::Unresolved,
        })
    }

    /// Fails with [`StoreError::NotFound`] when `id` is gone; never recreates
    /// it. Returns the document as read back after the write.
    pub fn update(&self, id: &str, title: &str, content: &str) -> Result<Note, StoreError> {
        self.store
            .update(&self.collection, id, note_fields(title, content))?;
        tracing::info!(note_id = id, "updated note");
        match self.store.get(&self.collection, id)? {
            Some(document) => decode_note(&document),
            // Deleted between the write and the read back.
            None => Err(StoreError::NotFound { id: id.to_owned() }),
        }
    }

    /// Deleting an id that no longer exists succeeds.
    pub fn delete(&self, id: &str) -> Result<(), StoreError> {
        if self.store.delete(&self.collection, id)? {
            tracing::info!(note_id = id, "deleted note");
        } else {
            tracing::debug!(note_id = id, "delete of absent note ignored");
        }
        Ok(())
    }

    pub fn fetch_all(&self) -> Result<Vec<Note>, StoreError> {
        let documents = self.store.list(&self.collection)?;
        Ok(decode_documents(&documents))
    }
}

/// Handle to an open subscription. Closing is idempotent, and dropping the
/// handle closes it.
pub struct Subscription {
    store: Arc<dyn DocumentStore>,
    listener: Option<ListenerId>,
    worker: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn close(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        self.store.unlisten(listener);
        if let Some(worker) = self.worker.take() {
            // Closing from inside the callback must not join its own thread.
            if worker.thread().id() != thread::current().id() && worker.join().is_err() {
                tracing::warn!("subscription dispatcher panicked");
            }
        }
        tracing::info!("closed note subscription");
    }

    pub fn is_open(&self) -> bool {
        self.listener.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

fn note_fields(title: &str, content: &str) -> Fields {
    let mut fields = Fields::new();
    fields.insert("title".into(), Value::String(title.to_owned()));
    fields.insert("content".into(), Value::String(content.to_owned()));
    fields
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NoteDocument {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

pub(crate) fn decode_note(document: &Document) -> Result<Note, StoreError> {
    let decode_err = |reason: String| StoreError::Decode {
        id: document.id.clone(),
        reason,
    };
    let parsed: NoteDocument = serde_json::from_value(Value::Object(document.fields.clone()))
        .map_err(|err| decode_err(err.to_string()))?;
    let parse_stamp = |raw: Option<String>| -> Result<Timestamp, StoreError> {
        raw.map(|raw| OffsetDateTime::parse(&raw, &Rfc3339))
            .transpose()
            .map(Timestamp::from)
            .map_err(|err| decode_err(err.to_string()))
    };
    Ok(Note {
        id: NoteId::Existing(document.id.clone()),
        title: parsed.title,
        content: parsed.content,
        created_at: parse_stamp(parsed.created_at)?,
        updated_at: parse_stamp(parsed.updated_at)?,
    })
}

fn decode_documents(documents: &[Document]) -> Vec<Note> {
    documents
        .iter()
        .filter_map(|document| match decode_note(document) {
            Ok(note) => Some(note),
            Err(err) => {
                tracing::warn!(?err, "skipping undecodable note document");
                None
            }
        })
        .collect()
}

fn decode_snapshot(snapshot: &Snapshot) -> Vec<Note> {
    decode_documents(&snapshot.documents)
}
