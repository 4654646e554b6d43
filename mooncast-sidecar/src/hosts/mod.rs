//! Persistent address to host name mapping
//!
//! The streaming client lists hosts by name, while cast requests arrive by
//! address. A name learned once is remembered for later requests that do not
//! carry one.

pub mod repository;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use repository::SqliteHostRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    pub address: String,
    pub host_name: String,
    pub updated_at: DateTime<Utc>,
}

/// Address to host name store
pub trait HostRegistry: Send + Sync {
    fn get(&self, address: &str) -> Result<Option<String>>;

    /// Insert or replace the name for `address`
    fn put(&self, address: &str, host_name: &str) -> Result<()>;

    fn list(&self) -> Result<Vec<HostRecord>>;

    /// Returns `true` if a record was removed
    fn remove(&self, address: &str) -> Result<bool>;
}
