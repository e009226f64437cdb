//! Captured response CRUD operations.
//!
//! Every operation is a single-key read, overwrite or delete, with one
//! exception: `put_all` writes a batch inside one transaction so a precache
//! install is all-or-nothing.

use super::connection::ContentStore;
use super::key::RequestKey;
use super::partitions::{PartitionName, insert_partition};
use crate::exchange::{Headers, Request, Response};
use crate::Error;
use bytes::Bytes;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

/// A response read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResponse {
    pub partition: String,
    pub key: RequestKey,
    pub response: Response,
    /// RFC 3339 capture time.
    pub stored_at: String,
}

struct EntryRow {
    method: String,
    url: String,
    status: u16,
    headers_json: String,
    body: Bytes,
}

impl EntryRow {
    fn encode(request: &Request, response: &Response) -> Result<Self, Error> {
        if !request.is_get() {
            return Err(Error::InvalidInput(format!("only GET responses are stored, got {}", request.method)));
        }
        let key = RequestKey::from(request);
        Ok(Self {
            method: key.method,
            url: key.url,
            status: response.status,
            headers_json: serde_json::to_string(&response.headers)?,
            body: response.body.clone(),
        })
    }

    fn write(&self, conn: &rusqlite::Connection, partition: &str, stored_at: &str) -> Result<(), rusqlite::Error> {
        conn.execute(
            "INSERT INTO entries (partition, method, url, status, headers_json, body, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(partition, method, url) DO UPDATE SET
                status = excluded.status,
                headers_json = excluded.headers_json,
                body = excluded.body,
                stored_at = excluded.stored_at",
            params![
                partition,
                &self.method,
                &self.url,
                self.status,
                &self.headers_json,
                self.body.as_ref(),
                stored_at,
            ],
        )?;
        Ok(())
    }
}

impl ContentStore {
    /// Store a response under the request's key, replacing any previous value.
    ///
    /// The partition is created on first write.
    pub async fn put(&self, partition: &PartitionName, request: &Request, response: &Response) -> Result<(), Error> {
        let row = EntryRow::encode(request, response)?;
        let partition = partition.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                insert_partition(conn, &partition)?;
                row.write(conn, &partition.to_string(), &chrono::Utc::now().to_rfc3339())?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Store a batch of responses atomically: either every entry (and the
    /// partition row) commits, or nothing does.
    pub async fn put_all(&self, partition: &PartitionName, batch: &[(Request, Response)]) -> Result<(), Error> {
        let rows = batch
            .iter()
            .map(|(req, resp)| EntryRow::encode(req, resp))
            .collect::<Result<Vec<_>, _>>()?;
        let partition = partition.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                let tx = conn.transaction()?;
                insert_partition(&tx, &partition)?;
                let name = partition.to_string();
                let now = chrono::Utc::now().to_rfc3339();
                for row in &rows {
                    row.write(&tx, &name, &now)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Look up a key in one partition.
    pub async fn get(&self, partition: &PartitionName, key: &RequestKey) -> Result<Option<StoredResponse>, Error> {
        self.match_first(std::slice::from_ref(partition), key).await
    }

    /// Look up a key in each partition in order, returning the first hit.
    pub async fn match_first(
        &self, partitions: &[PartitionName], key: &RequestKey,
    ) -> Result<Option<StoredResponse>, Error> {
        let names: Vec<String> = partitions.iter().map(ToString::to_string).collect();
        let key = key.clone();
        self.conn
            .call(move |conn| -> Result<Option<StoredResponse>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT status, headers_json, body, stored_at
                     FROM entries WHERE partition = ?1 AND method = ?2 AND url = ?3",
                )?;

                for name in names {
                    let result = stmt.query_row(params![&name, &key.method, &key.url], |row| {
                        Ok((
                            row.get::<_, u16>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Vec<u8>>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    });

                    match result {
                        Ok((status, headers_json, body, stored_at)) => {
                            let headers: Headers = serde_json::from_str(&headers_json)
                                .map_err(|e| Error::CorruptEntry(format!("{key}: {e}")))?;
                            return Ok(Some(StoredResponse {
                                partition: name,
                                key,
                                response: Response { status, headers, body: Bytes::from(body) },
                                stored_at,
                            }));
                        }
                        Err(rusqlite::Error::QueryReturnedNoRows) => continue,
                        Err(e) => return Err(e.into()),
                    }
                }

                Ok(None)
            })
            .await
            .map_err(Error::from)
    }

    /// Evict one entry. Returns whether it existed.
    pub async fn delete_entry(&self, partition: &PartitionName, key: &RequestKey) -> Result<bool, Error> {
        let name = partition.to_string();
        let key = key.clone();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute(
                    "DELETE FROM entries WHERE partition = ?1 AND method = ?2 AND url = ?3",
                    params![name, key.method, key.url],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries stored in a partition.
    pub async fn count_entries(&self, partition: &PartitionName) -> Result<u64, Error> {
        let name = partition.to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM entries WHERE partition = ?1", params![name], |row| {
                        row.get(0)
                    })?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
