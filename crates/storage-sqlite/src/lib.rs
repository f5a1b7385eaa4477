//! Sqlite-backed document store for the station-local side of the engine.
//!
//! Collections map to tables holding one JSON body per row. Filters are
//! evaluated in Rust against the parsed bodies, which keeps the query
//! surface identical between this adapter and the remote one at the cost of
//! scanning the collection. Station datasets are small by construction
//! (thousands of feeds, not millions), so scans are fine here.

use async_trait::async_trait;
use log::debug;
use rusqlite::{params, Connection};
use serde_json::Value;
use std::path::{Path, PathBuf};

use wastehub_core::errors::{Error, Result};
use wastehub_core::store::{apply_patch, DocumentStore, Filter, WriteOutcome};

/// Document store over a single sqlite database file.
///
/// Connections are opened per operation inside `spawn_blocking`; sqlite in
/// WAL mode handles the concurrency, and the busy timeout covers writer
/// overlap between the periodic jobs.
pub struct SqliteDocumentStore {
    path: PathBuf,
}

impl SqliteDocumentStore {
    /// Open (creating if needed) the database at `path`. The parent
    /// directory must already exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = connect(&path)?;
        drop(conn);
        debug!("Opened station store at {}", path.display());
        Ok(Self { path })
    }

    async fn with_connection<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = connect(&path)?;
            job(&mut conn)
        })
        .await
        .map_err(|err| Error::database(format!("store worker failed: {}", err)))?
    }
}

fn connect(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).map_err(db_err)?;
    conn.pragma_update(None, "journal_mode", "WAL").map_err(db_err)?;
    conn.pragma_update(None, "busy_timeout", 5_000).map_err(db_err)?;
    Ok(conn)
}

fn db_err(err: rusqlite::Error) -> Error {
    Error::database(err.to_string())
}

/// Collection names come from compile-time constants, but they end up inside
/// SQL identifiers, so reject anything unexpected outright.
fn validate_collection(collection: &str) -> Result<()> {
    let ok = !collection.is_empty()
        && collection
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(Error::database(format!(
            "invalid collection name '{}'",
            collection
        )))
    }
}

fn quote_identifier(value: &str) -> String {
    format!("`{}`", value.replace('`', "``"))
}

/// Create the collection table on first touch. `seq` preserves insertion
/// order; the partial unique index rejects duplicate document ids while
/// allowing documents without one (queue entries key on `entryId` instead).
fn ensure_collection(conn: &Connection, collection: &str) -> Result<()> {
    validate_collection(collection)?;
    let table = quote_identifier(collection);
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            doc_id TEXT,
            body TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS `idx_{collection}_doc_id`
            ON {table} (doc_id) WHERE doc_id IS NOT NULL;"
    ))
    .map_err(db_err)
}

fn load_rows(conn: &Connection, collection: &str) -> Result<Vec<(i64, Value)>> {
    let table = quote_identifier(collection);
    let mut statement = conn
        .prepare(&format!("SELECT seq, body FROM {table} ORDER BY seq"))
        .map_err(db_err)?;
    let rows = statement
        .query_map([], |row| {
            let seq: i64 = row.get(0)?;
            let body: String = row.get(1)?;
            Ok((seq, body))
        })
        .map_err(db_err)?;

    let mut documents = Vec::new();
    for row in rows {
        let (seq, body) = row.map_err(db_err)?;
        documents.push((seq, serde_json::from_str(&body)?));
    }
    Ok(documents)
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>> {
        let collection = collection.to_string();
        let filter = filter.clone();
        self.with_connection(move |conn| {
            ensure_collection(conn, &collection)?;
            Ok(load_rows(conn, &collection)?
                .into_iter()
                .map(|(_, document)| document)
                .filter(|document| filter.matches(document))
                .collect())
        })
        .await
    }

    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Value>> {
        let collection = collection.to_string();
        let filter = filter.clone();
        self.with_connection(move |conn| {
            ensure_collection(conn, &collection)?;
            Ok(load_rows(conn, &collection)?
                .into_iter()
                .map(|(_, document)| document)
                .find(|document| filter.matches(document)))
        })
        .await
    }

    async fn insert(&self, collection: &str, document: &Value) -> Result<()> {
        let collection = collection.to_string();
        let document = document.clone();
        self.with_connection(move |conn| {
            ensure_collection(conn, &collection)?;
            let table = quote_identifier(&collection);
            let doc_id = document.get("id").and_then(Value::as_str).map(String::from);
            let body = serde_json::to_string(&document)?;
            conn.execute(
                &format!("INSERT INTO {table} (doc_id, body) VALUES (?1, ?2)"),
                params![doc_id, body],
            )
            .map_err(db_err)?;
            Ok(())
        })
        .await
    }

    async fn update(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &Value,
    ) -> Result<WriteOutcome> {
        let collection = collection.to_string();
        let filter = filter.clone();
        let patch = patch.clone();
        self.with_connection(move |conn| {
            ensure_collection(conn, &collection)?;
            let rows = load_rows(conn, &collection)?;
            let table = quote_identifier(&collection);
            let tx = conn.transaction().map_err(db_err)?;
            let mut outcome = WriteOutcome::default();
            for (seq, mut document) in rows {
                if !filter.matches(&document) {
                    continue;
                }
                outcome.matched += 1;
                if apply_patch(&mut document, &patch) {
                    let body = serde_json::to_string(&document)?;
                    tx.execute(
                        &format!("UPDATE {table} SET body = ?1 WHERE seq = ?2"),
                        params![body, seq],
                    )
                    .map_err(db_err)?;
                    outcome.modified += 1;
                }
            }
            tx.commit().map_err(db_err)?;
            Ok(outcome)
        })
        .await
    }

    async fn delete(&self, collection: &str, filter: &Filter) -> Result<WriteOutcome> {
        let collection = collection.to_string();
        let filter = filter.clone();
        self.with_connection(move |conn| {
            ensure_collection(conn, &collection)?;
            let rows = load_rows(conn, &collection)?;
            let table = quote_identifier(&collection);
            let tx = conn.transaction().map_err(db_err)?;
            let mut outcome = WriteOutcome::default();
            for (seq, document) in rows {
                if !filter.matches(&document) {
                    continue;
                }
                tx.execute(&format!("DELETE FROM {table} WHERE seq = ?1"), params![seq])
                    .map_err(db_err)?;
                outcome.matched += 1;
                outcome.modified += 1;
            }
            tx.commit().map_err(db_err)?;
            Ok(outcome)
        })
        .await
    }
}
