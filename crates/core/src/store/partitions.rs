//! Versioned partition naming and the partition table.
//!
//! A partition name is `<role>-<version>`. The agent running a given version
//! treats exactly two names as current; everything else in the table is stale.

use std::fmt;
use std::str::FromStr;

use super::connection::ContentStore;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

/// Logical role of a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Immutable build-time assets, populated during install.
    Precache,
    /// Responses and queued requests collected while running.
    Runtime,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Precache => "static",
            Role::Runtime => "dynamic",
        }
    }
}

/// Name of a single partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionName {
    pub role: Role,
    pub version: String,
}

impl PartitionName {
    pub fn precache(version: &str) -> Self {
        Self { role: Role::Precache, version: version.to_string() }
    }

    pub fn runtime(version: &str) -> Self {
        Self { role: Role::Runtime, version: version.to_string() }
    }
}

impl fmt::Display for PartitionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.role.as_str(), self.version)
    }
}

impl FromStr for PartitionName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let (role, version) = s
            .split_once('-')
            .ok_or_else(|| Error::InvalidInput(format!("partition name without role: {s}")))?;
        let role = match role {
            "static" => Role::Precache,
            "dynamic" => Role::Runtime,
            other => return Err(Error::InvalidInput(format!("unknown partition role: {other}"))),
        };
        if version.is_empty() {
            return Err(Error::InvalidInput(format!("partition name without version: {s}")));
        }
        Ok(Self { role, version: version.to_string() })
    }
}

impl ContentStore {
    /// Create the partition row if it does not exist yet.
    pub async fn ensure_partition(&self, name: &PartitionName) -> Result<(), Error> {
        let name = name.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                insert_partition(conn, &name)?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// All partition names currently in the table, including ones this
    /// build cannot parse.
    pub async fn list_partitions(&self) -> Result<Vec<String>, Error> {
        self.conn
            .call(|conn| -> Result<Vec<String>, Error> {
                let mut stmt = conn.prepare("SELECT name FROM partitions ORDER BY name")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(names)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete a partition with all of its entries and queued requests.
    ///
    /// Returns whether a partition was removed.
    pub async fn delete_partition(&self, name: &str) -> Result<bool, Error> {
        let name = name.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM partitions WHERE name = ?1", params![name])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }
}

pub(crate) fn insert_partition(
    conn: &tokio_rusqlite::rusqlite::Connection, name: &PartitionName,
) -> Result<(), tokio_rusqlite::rusqlite::Error> {
    conn.execute(
        "INSERT OR IGNORE INTO partitions (name, role, version, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![name.to_string(), name.role.as_str(), &name.version, chrono::Utc::now().to_rfc3339()],
    )?;
    Ok(())
}
