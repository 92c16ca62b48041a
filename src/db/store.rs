//! Key-value persistence partitioned into named collections.
//!
//! Every collection is a single JSON document addressed by
//! `collection#scopeKey`. Writes replace the whole document, and
//! read-modify-write runs inside one transaction on the connection thread,
//! so readers never see a half-applied change and updates are never lost.

use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{Collection, ScopeKey};

use super::schema::SCHEMA;

/// What a [`ScopedStore::modify`] callback decided to do with the document.
pub enum Mutation<R> {
    /// Write the (possibly changed) document back.
    Persist(R),
    /// Leave storage untouched.
    Skip(R),
}

pub struct ScopedStore {
    conn: Connection,
}

impl ScopedStore {
    pub async fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    /// Raw payload for a collection. Missing keys yield the collection's empty
    /// default rather than an error.
    pub async fn get(&self, collection: Collection, scope: &ScopeKey) -> Result<String> {
        let key = address(collection, scope);
        let payload = self
            .conn
            .call(move |conn| {
                let payload = read_payload(conn, &key)?;
                Ok(payload)
            })
            .await?;
        Ok(payload.unwrap_or_else(|| collection.empty_payload().to_string()))
    }

    pub async fn put(&self, collection: Collection, scope: &ScopeKey, payload: String) -> Result<()> {
        let key = address(collection, scope);
        let scope_key = scope.as_str().to_string();
        self.conn
            .call(move |conn| {
                write_payload(conn, &key, collection, &scope_key, &payload)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Decodes a collection, treating absent or malformed data as empty.
    pub async fn load<T>(&self, collection: Collection, scope: &ScopeKey) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let payload = self.get(collection, scope).await?;
        Ok(decode_or_default(collection, &payload))
    }

    /// Read-modify-write of one collection in a single transaction.
    pub async fn modify<T, R, F>(&self, collection: Collection, scope: &ScopeKey, f: F) -> Result<R>
    where
        T: DeserializeOwned + Serialize + Default + 'static,
        R: Send + 'static,
        F: FnOnce(&mut T) -> Mutation<R> + Send + 'static,
    {
        let key = address(collection, scope);
        let scope_key = scope.as_str().to_string();

        let result = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;

                let mut value: T = match read_payload(&tx, &key)? {
                    Some(payload) => decode_or_default(collection, &payload),
                    None => T::default(),
                };

                let result = match f(&mut value) {
                    Mutation::Persist(result) => {
                        let payload = serde_json::to_string(&value)
                            .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
                        write_payload(&tx, &key, collection, &scope_key, &payload)?;
                        result
                    }
                    Mutation::Skip(result) => result,
                };

                tx.commit()?;
                Ok(result)
            })
            .await?;
        Ok(result)
    }

    /// Replaces a collection with its empty default.
    pub async fn reset(&self, collection: Collection, scope: &ScopeKey) -> Result<()> {
        self.put(collection, scope, collection.empty_payload().to_string())
            .await
    }
}

fn address(collection: Collection, scope: &ScopeKey) -> String {
    format!("{}#{}", collection.as_str(), scope.as_str())
}

fn read_payload(conn: &rusqlite::Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT payload FROM collections WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

fn write_payload(
    conn: &rusqlite::Connection,
    key: &str,
    collection: Collection,
    scope_key: &str,
    payload: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        r#"INSERT INTO collections (key, collection, scope_key, payload)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(key) DO UPDATE SET
               payload = excluded.payload,
               updated_at = datetime('now')"#,
        params![key, collection.as_str(), scope_key, payload],
    )?;
    Ok(())
}

fn decode_or_default<T>(collection: Collection, payload: &str) -> T
where
    T: DeserializeOwned + Default,
{
    match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(
                "Discarding malformed {} payload: {}",
                collection.as_str(),
                e
            );
            T::default()
        }
    }
}
