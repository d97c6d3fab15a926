/*!
Remote "save by passphrase" record store.

A snapshot (or its encrypted envelope) is stored as a record
`{name, passphrase, data}` in a REST collection. The passphrase is generated
by a separate word-list service and is the only credential needed to fetch
the record again, so it is treated as a secret and never logged.

Records are write-once: this client exposes no update or delete.
*/

pub mod filter;
pub mod http;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

#[cfg(feature = "metrics")]
use crate::observability::MetricsTimer;
use crate::{config::RemoteConfig, BrowserBytesError, Result};

pub use filter::Filter;
pub use http::{HttpPassphraseGenerator, PocketBaseBackend};
pub use memory::{CountingPassphraseGenerator, MemoryRecordStore};

/// Field holding the retrieval passphrase
pub const PASSPHRASE_FIELD: &str = "passphrase";

/// Fields submitted when creating a record
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub name: String,
    pub passphrase: String,
    pub data: String,
}

/// A record as returned by the store
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Record {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    // Collections may hide the passphrase from list responses
    #[serde(default)]
    pub passphrase: String,
    #[serde(deserialize_with = "deserialize_data")]
    pub data: String,
}

// Older records hold `data` as an embedded JSON object instead of a string.
fn deserialize_data<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

/// What a successful save hands back to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveReceipt {
    pub passphrase: String,
    pub record_id: String,
}

/// Generic REST record collection
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordBackend: Send + Sync {
    /// Create a record and return it with its server-assigned id
    async fn create(&self, record: &NewRecord) -> Result<Record>;

    /// Return at most `limit` records matching `filter`
    async fn query(&self, filter: &Filter, limit: u32) -> Result<Vec<Record>>;
}

/// Source of human-readable random passphrases
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PassphraseGenerator: Send + Sync {
    async fn generate(&self) -> Result<String>;
}

/// Client that stores and fetches payloads by passphrase
///
/// # Example
/// ```rust
/// use browserbytes_core::remote::{
///     CountingPassphraseGenerator, MemoryRecordStore, RecordStoreClient,
/// };
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> browserbytes_core::Result<()> {
/// let client = RecordStoreClient::new(
///     MemoryRecordStore::new(),
///     CountingPassphraseGenerator::new("blue-otter"),
/// );
/// let receipt = client.save("work laptop", "{}").await?;
/// assert_eq!(client.load(&receipt.passphrase).await?, "{}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RecordStoreClient {
    backend: Arc<dyn RecordBackend>,
    generator: Arc<dyn PassphraseGenerator>,
}

impl RecordStoreClient {
    pub fn new<B, G>(backend: B, generator: G) -> Self
    where
        B: RecordBackend + 'static,
        G: PassphraseGenerator + 'static,
    {
        Self {
            backend: Arc::new(backend),
            generator: Arc::new(generator),
        }
    }

    /// Build a client that talks HTTP to the configured endpoints
    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            PocketBaseBackend::from_config(config)?,
            HttpPassphraseGenerator::from_config(config)?,
        ))
    }

    /// Store `payload` under a freshly generated passphrase.
    ///
    /// # Arguments
    /// * `name` - Label shown to the user for this record
    /// * `payload` - Serialized snapshot or envelope
    ///
    /// # Errors
    /// * `BrowserBytesError::Validation` - `name` is blank
    /// * `BrowserBytesError::Generator` - no passphrase could be generated
    /// * `BrowserBytesError::Store` - the create request failed
    pub async fn save(&self, name: &str, payload: &str) -> Result<SaveReceipt> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BrowserBytesError::validation(
                "Please enter a name for your saved data",
            ));
        }

        let passphrase = timed("generate_passphrase", self.generator.generate()).await?;
        if passphrase.trim().is_empty() {
            return Err(BrowserBytesError::generator("generator returned an empty passphrase"));
        }

        let record = NewRecord {
            name: name.to_string(),
            passphrase,
            data: payload.to_string(),
        };
        let created = timed("create_record", self.backend.create(&record)).await?;

        info!(record_id = %created.id, size = payload.len(), "saved record");
        Ok(SaveReceipt {
            passphrase: record.passphrase,
            record_id: created.id,
        })
    }

    /// Fetch the payload stored under `passphrase`.
    ///
    /// # Errors
    /// * `BrowserBytesError::Validation` - `passphrase` is blank
    /// * `BrowserBytesError::NotFound` - no record matches
    /// * `BrowserBytesError::Store` - the query failed
    pub async fn load(&self, passphrase: &str) -> Result<String> {
        let passphrase = passphrase.trim();
        if passphrase.is_empty() {
            return Err(BrowserBytesError::validation("Please enter your passphrase"));
        }

        let filter = Filter::eq(PASSPHRASE_FIELD, passphrase)?;
        let records = timed("query_records", self.backend.query(&filter, 1)).await?;
        let record = records.into_iter().next().ok_or(BrowserBytesError::NotFound)?;

        debug!(record_id = %record.id, size = record.data.len(), "loaded record");
        Ok(record.data)
    }
}

#[cfg(feature = "metrics")]
async fn timed<T>(operation: &'static str, future: impl Future<Output = Result<T>>) -> Result<T> {
    let timer = MetricsTimer::start_remote(operation);
    let result = future.await;
    match &result {
        Ok(_) => timer.finish(),
        Err(_) => timer.finish_with_error(),
    }
    result
}

#[cfg(not(feature = "metrics"))]
async fn timed<T>(_operation: &'static str, future: impl Future<Output = Result<T>>) -> Result<T> {
    future.await
}
