//! Replay queue of mutating requests captured while the origin was unreachable.
//!
//! Items live in a runtime partition and are identified by the request
//! fingerprint. They are inserted once and deleted on successful replay;
//! nothing updates an item in place.

use super::connection::ContentStore;
use super::key::fingerprint;
use super::partitions::{PartitionName, insert_partition};
use crate::exchange::{Headers, Request};
use crate::Error;
use bytes::Bytes;
use tokio_rusqlite::params;

/// A queued request as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedRequest {
    pub fingerprint: String,
    pub request: Request,
    /// RFC 3339 capture time.
    pub queued_at: String,
}

fn decode(url: &str, headers_json: &str) -> Result<(url::Url, Headers), Error> {
    let url = url::Url::parse(url).map_err(|e| Error::CorruptEntry(format!("url: {e}")))?;
    let headers = serde_json::from_str(headers_json).map_err(|e| Error::CorruptEntry(format!("headers: {e}")))?;
    Ok((url, headers))
}

impl ContentStore {
    /// Capture a request into the partition's queue.
    ///
    /// Capturing an identical request twice keeps a single item.
    /// Returns the item's fingerprint.
    pub async fn enqueue(&self, partition: &PartitionName, request: &Request) -> Result<String, Error> {
        let id = fingerprint(request);
        let headers_json = serde_json::to_string(&request.headers)?;
        let partition = partition.clone();
        let request = request.clone();
        let fp = id.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                insert_partition(conn, &partition)?;
                conn.execute(
                    "INSERT OR IGNORE INTO replay_queue (partition, fingerprint, method, url, headers_json, body, queued_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        partition.to_string(),
                        fp,
                        &request.method,
                        request.url.as_str(),
                        headers_json,
                        request.body.as_ref(),
                        chrono::Utc::now().to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)?;
        Ok(id)
    }

    /// Snapshot of the partition's queue, oldest first.
    ///
    /// Items enqueued after this call returns are not included. Rows that
    /// no longer decode are logged and left out so the rest stay reachable.
    pub async fn queued(&self, partition: &PartitionName) -> Result<Vec<QueuedRequest>, Error> {
        let name = partition.to_string();
        let rows = self
            .conn
            .call(move |conn| -> Result<Vec<(String, String, String, String, Vec<u8>, String)>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT fingerprint, method, url, headers_json, body, queued_at
                     FROM replay_queue WHERE partition = ?1
                     ORDER BY queued_at ASC, rowid ASC",
                )?;
                let rows = stmt
                    .query_map(params![name], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)?;

        let items = rows
            .into_iter()
            .filter_map(|(fingerprint, method, url, headers_json, body, queued_at)| {
                match decode(&url, &headers_json) {
                    Ok((url, headers)) => {
                        let request = Request { method, url, headers, body: Bytes::from(body), mode: None };
                        Some(QueuedRequest { fingerprint, request, queued_at })
                    }
                    Err(e) => {
                        tracing::warn!(%fingerprint, error = %e, "skipping undecodable queue item");
                        None
                    }
                }
            })
            .collect();
        Ok(items)
    }

    /// Remove a replayed item. Returns whether it was still queued.
    pub async fn dequeue(&self, partition: &PartitionName, fingerprint: &str) -> Result<bool, Error> {
        let name = partition.to_string();
        let fingerprint = fingerprint.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute(
                    "DELETE FROM replay_queue WHERE partition = ?1 AND fingerprint = ?2",
                    params![name, fingerprint],
                )?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Move queued items from the given partitions into `into`.
    ///
    /// Used before stale runtime partitions are deleted so an upgrade keeps
    /// pending work. Returns the number of items moved.
    pub async fn adopt_queued(&self, from: &[String], into: &PartitionName) -> Result<u64, Error> {
        let from = from.to_vec();
        let into = into.clone();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let target = into.to_string();
                let mut moved = 0u64;
                for name in from.iter().filter(|n| **n != target) {
                    let pending: i64 = conn.query_row(
                        "SELECT COUNT(*) FROM replay_queue WHERE partition = ?1",
                        params![name],
                        |row| row.get(0),
                    )?;
                    if pending == 0 {
                        continue;
                    }
                    insert_partition(conn, &into)?;
                    let count = conn.execute(
                        "UPDATE OR REPLACE replay_queue SET partition = ?1 WHERE partition = ?2",
                        params![&target, name],
                    )?;
                    moved += count as u64;
                }
                Ok(moved)
            })
            .await
            .map_err(Error::from)
    }
}
