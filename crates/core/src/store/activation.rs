//! Record of the version that last completed activation.
//!
//! Survives process restarts so an agent for the same version can resume
//! serving from its partitions without reinstalling.

use super::connection::ContentStore;
use crate::Error;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::OptionalExtension;

impl ContentStore {
    /// Mark `version` as the active one, replacing any previous record.
    pub async fn set_active_version(&self, version: &str) -> Result<(), Error> {
        let version = version.to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO active_version (id, version, activated_at) VALUES (1, ?1, ?2)
                     ON CONFLICT(id) DO UPDATE SET version = excluded.version, activated_at = excluded.activated_at",
                    params![version, chrono::Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// The version that last activated on this store, if any.
    pub async fn active_version(&self) -> Result<Option<String>, Error> {
        self.conn
            .call(|conn| -> Result<Option<String>, Error> {
                let version = conn
                    .query_row("SELECT version FROM active_version WHERE id = 1", [], |row| row.get(0))
                    .optional()?;
                Ok(version)
            })
            .await
            .map_err(Error::from)
    }
}
