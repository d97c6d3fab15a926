/*!
In-process implementations of the remote ports, for tests and offline use.
*/

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::{Filter, NewRecord, PassphraseGenerator, Record, RecordBackend};
use crate::Result;

/// Record backend keeping records in memory
///
/// Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    records: Arc<Mutex<Vec<Record>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored record, oldest first
    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

fn field<'a>(record: &'a Record, name: &str) -> Option<&'a str> {
    match name {
        "id" => Some(&record.id),
        "name" => Some(&record.name),
        "passphrase" => Some(&record.passphrase),
        "data" => Some(&record.data),
        _ => None,
    }
}

#[async_trait]
impl RecordBackend for MemoryRecordStore {
    async fn create(&self, record: &NewRecord) -> Result<Record> {
        let created = Record {
            id: Uuid::new_v4().simple().to_string(),
            name: record.name.clone(),
            passphrase: record.passphrase.clone(),
            data: record.data.clone(),
        };
        self.records
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(created.clone());
        Ok(created)
    }

    async fn query(&self, filter: &Filter, limit: u32) -> Result<Vec<Record>> {
        let records = self.records.lock().unwrap_or_else(|p| p.into_inner());
        Ok(records
            .iter()
            .filter(|r| filter.matches(|name| field(r, name)))
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

/// Generator yielding `{prefix}-1`, `{prefix}-2`, ...
#[derive(Debug)]
pub struct CountingPassphraseGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl CountingPassphraseGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            counter: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl PassphraseGenerator for CountingPassphraseGenerator {
    async fn generate(&self) -> Result<String> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(format!("{}-{n}", self.prefix))
    }
}
