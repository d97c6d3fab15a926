/*!
# BrowserBytes Core Engine

Capture a browser tab's `localStorage` and cookies into a portable snapshot,
optionally encrypt it under a passphrase, and restore it later from a file or
from a cloud record fetched by a generated passphrase.

- Snapshot codec: deterministic JSON plus an optional Base64 text wrapping
- Encryption envelope: PBKDF2-HMAC-SHA256 and AES-256-GCM
- Remote record store client: save and load records by passphrase
- Restore orchestrator: destructive storage overwrite and per-cookie
  remove-then-set with partial-failure reporting

## Architecture

Browsers and remote services are reached through adapter traits
([`browser::WebStorageAdapter`], [`browser::CookieAdapter`],
[`remote::RecordBackend`], [`remote::PassphraseGenerator`]). The
[`TransferEngine`] composes them into the export, import and cloud flows.

## Usage

```rust
use browserbytes_core::{Cookie, Envelope, Snapshot};
use std::collections::BTreeMap;

let mut storage = BTreeMap::new();
storage.insert("theme".to_string(), "dark".to_string());
let snapshot = Snapshot::new(storage, vec![Cookie::new("sid", "x", "example.com")]);

let envelope = Envelope::seal(&snapshot.to_json()?, "hunter2")?;
let restored = Snapshot::from_json(&envelope.open("hunter2")?)?;
assert_eq!(restored, snapshot);
# Ok::<(), browserbytes_core::BrowserBytesError>(())
```
*/

pub mod browser;
pub mod capture;
pub mod codec;
pub mod config;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod observability;
pub mod remote;
pub mod restore;
pub mod snapshot;

#[cfg(test)]
mod error_tests;

pub use browser::{CookieAdapter, TabContext, WebStorageAdapter};
pub use capture::{capture, CaptureOptions};
pub use codec::{ExportFormat, Payload};
pub use config::{BytesConfig, ExportConfig, RemoteConfig};
pub use engine::{ExportArtifact, ExportOptions, ImportOptions, TransferEngine};
pub use envelope::Envelope;
pub use error::{BrowserBytesError, Result};
pub use remote::{RecordStoreClient, SaveReceipt};
pub use restore::{restore, RestoreOptions, RestoreReport};
pub use snapshot::{Cookie, SameSite, Snapshot};
