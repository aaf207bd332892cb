use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{
    stamp, CommitClock, Document, DocumentStore, Fields, Listener, ListenerId, ListenerRegistry,
    StoreError, WriteOp, CREATED_AT_FIELD, UPDATED_AT_FIELD,
};

mod schema;

/// Document store persisted in a local SQLite file. Documents are kept as
/// JSON objects; the commit time is mirrored into an integer column so the
/// clock can resume past the newest write after a restart.
pub struct SqliteStore {
    db_path: Arc<PathBuf>,
    listeners: ListenerRegistry,
    clock: CommitClock,
    write_lock: Mutex<()>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating data directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening database {}", path.display()))?;
        prepare_connection(&conn)?;
        schema::apply(&conn)?;

        let newest: Option<i64> = conn
            .query_row("SELECT MAX(updated_at) FROM documents", [], |row| row.get(0))
            .context("reading newest commit time")?;
        let clock = match newest {
            Some(nanos) => CommitClock::starting_after(
                OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos))
                    .context("decoding newest commit time")?,
            ),
            None => CommitClock::default(),
        };

        tracing::info!(path = %path.display(), "opened sqlite note store");
        Ok(Self {
            db_path: Arc::new(path.to_path_buf()),
            listeners: ListenerRegistry::default(),
            clock,
            write_lock: Mutex::new(()),
        })
    }

    fn connect(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&*self.db_path)?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(conn)
    }

    fn with_connection<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self.connect().map_err(StoreError::read)?;
        f(&conn).map_err(StoreError::read)
    }

    fn write<F, T>(&self, operation: WriteOp, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self
            .connect()
            .map_err(|err| StoreError::write(operation, err))?;
        f(&conn)
    }

    fn publish(&self, conn: &Connection, collection: &str) {
        if !self.listeners.has_listeners(collection) {
            return;
        }
        match fetch_documents(conn, collection) {
            Ok(documents) => self.listeners.publish(collection, documents),
            Err(err) => tracing::error!(?err, collection, "failed to load snapshot for listeners"),
        }
    }
}

impl DocumentStore for SqliteStore {
    fn add(&self, collection: &str, mut fields: Fields) -> Result<String, StoreError> {
        let _guard = self.write_lock.lock();
        self.write(WriteOp::Create, |conn| {
            let now = self.clock.next();
            stamp(&mut fields, CREATED_AT_FIELD, now, WriteOp::Create)?;
            stamp(&mut fields, UPDATED_AT_FIELD, now, WriteOp::Create)?;
            let nanos = commit_nanos(now, WriteOp::Create)?;
            let data = serde_json::to_string(&fields)
                .map_err(|err| StoreError::write(WriteOp::Create, err))?;
            let id = Uuid::new_v4().simple().to_string();
            conn.execute(
                "INSERT INTO documents (collection, id, data, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![collection, id, data, nanos],
            )
            .map_err(|err| StoreError::write(WriteOp::Create, err))?;
            self.publish(conn, collection);
            Ok(id)
        })
    }

    fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        self.write(WriteOp::Update, |conn| {
            let Some(mut existing) = fetch_fields(conn, collection, id)
                .map_err(|err| StoreError::write(WriteOp::Update, err))?
            else {
                return Err(StoreError::NotFound { id: id.to_owned() });
            };
            existing.extend(fields);
            let now = self.clock.next();
            stamp(&mut existing, UPDATED_AT_FIELD, now, WriteOp::Update)?;
            let nanos = commit_nanos(now, WriteOp::Update)?;
            let data = serde_json::to_string(&existing)
                .map_err(|err| StoreError::write(WriteOp::Update, err))?;
            conn.execute(
                "UPDATE documents SET data = ?1, updated_at = ?2
                 WHERE collection = ?3 AND id = ?4",
                params![data, nanos, collection, id],
            )
            .map_err(|err| StoreError::write(WriteOp::Update, err))?;
            self.publish(conn, collection);
            Ok(())
        })
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let fields = self.with_connection(|conn| fetch_fields(conn, collection, id))?;
        Ok(fields.map(|fields| Document {
            id: id.to_owned(),
            fields,
        }))
    }

    fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock();
        self.write(WriteOp::Delete, |conn| {
            let removed = conn
                .execute(
                    "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                )
                .map_err(|err| StoreError::write(WriteOp::Delete, err))?;
            if removed > 0 {
                self.publish(conn, collection);
            }
            Ok(removed > 0)
        })
    }

    fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        self.with_connection(|conn| fetch_documents(conn, collection))
    }

    fn listen(&self, collection: &str) -> Result<Listener, StoreError> {
        let _guard = self.write_lock.lock();
        let initial = self.with_connection(|conn| fetch_documents(conn, collection))?;
        Ok(self.listeners.register(collection, initial))
    }

    fn unlisten(&self, id: ListenerId) {
        self.listeners.remove(id);
    }
}

fn prepare_connection(conn: &Connection) -> anyhow::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    Ok(())
}

fn commit_nanos(at: OffsetDateTime, operation: WriteOp) -> Result<i64, StoreError> {
    i64::try_from(at.unix_timestamp_nanos())
        .map_err(|_| StoreError::write(operation, "commit time out of range"))
}

fn fetch_fields(conn: &Connection, collection: &str, id: &str) -> rusqlite::Result<Option<Fields>> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(data.and_then(|raw| parse_fields(id, &raw)))
}

fn fetch_documents(conn: &Connection, collection: &str) -> rusqlite::Result<Vec<Document>> {
    let mut stmt = conn.prepare(
        "SELECT id, data FROM documents
         WHERE collection = ?1
         ORDER BY rowid",
    )?;
    let rows = stmt.query_map(params![collection], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut documents = Vec::new();
    for row in rows {
        let (id, raw) = row?;
        if let Some(fields) = parse_fields(&id, &raw) {
            documents.push(Document { id, fields });
        }
    }
    Ok(documents)
}

fn parse_fields(id: &str, raw: &str) -> Option<Fields> {
    match serde_json::from_str::<Fields>(raw) {
        Ok(fields) => Some(fields),
        Err(err) => {
            tracing::warn!(?err, id, "skipping document with malformed data");
            None
        }
    }
}
