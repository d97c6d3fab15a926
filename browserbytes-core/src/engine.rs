/*!
Transfer engine: the export, import and cloud flows in one place.

Every flow is capture or parse, optionally seal or open, then write or
restore. Encryption is switched on by passing a key; there is no separate
"encrypted" variant of any flow.
*/

use chrono::Utc;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[cfg(feature = "metrics")]
use crate::observability::BytesMetrics;
use crate::{
    browser::{CookieAdapter, TabContext, WebStorageAdapter},
    capture::{capture, CaptureOptions},
    codec::{decode_import, encode_export, export_filename, ExportFormat, Payload},
    config::BytesConfig,
    envelope::Envelope,
    remote::{RecordStoreClient, SaveReceipt},
    restore::{restore, RestoreOptions, RestoreReport},
    BrowserBytesError, Result, Snapshot,
};

/// Message returned when an encrypted payload is opened without a key
pub const KEY_REQUIRED_MESSAGE: &str =
    "Data is encrypted. A decryption key is required to decrypt.";

/// Options for a file export
#[derive(Clone, Default)]
pub struct ExportOptions {
    pub format: ExportFormat,
    /// Seal the snapshot under this passphrase when set and not blank
    pub encryption_key: Option<String>,
}

impl ExportOptions {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            encryption_key: None,
        }
    }

    pub fn with_encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }
}

impl fmt::Debug for ExportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportOptions")
            .field("format", &self.format)
            .field("encrypted", &usable_key(self.encryption_key.as_deref()).is_some())
            .finish()
    }
}

/// Options for a file import
#[derive(Clone, Default)]
pub struct ImportOptions {
    pub format: ExportFormat,
    /// Key for opening an encrypted export
    pub decryption_key: Option<String>,
}

impl ImportOptions {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            decryption_key: None,
        }
    }

    pub fn with_decryption_key(mut self, key: impl Into<String>) -> Self {
        self.decryption_key = Some(key.into());
        self
    }
}

impl fmt::Debug for ImportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImportOptions")
            .field("format", &self.format)
            .field("has_key", &usable_key(self.decryption_key.as_deref()).is_some())
            .finish()
    }
}

/// A rendered export, ready to be written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub filename: String,
    pub contents: String,
    pub mime_type: &'static str,
    pub encrypted: bool,
}

impl ExportArtifact {
    /// Write the export into `dir` under its generated file name
    ///
    /// # Returns
    /// The full path of the written file
    pub fn write_to<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let dir = dir.as_ref();
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)?;
        }
        let path = dir.join(&self.filename);
        fs::write(&path, &self.contents)?;
        info!(path = %path.display(), size = self.contents.len(), "wrote export");
        Ok(path)
    }
}

/// Blank keys count as no key
fn usable_key(key: Option<&str>) -> Option<&str> {
    key.map(str::trim).filter(|k| !k.is_empty())
}

/// Serialize `snapshot`, sealing it when a usable key is given
fn seal_snapshot(snapshot: Snapshot, key: Option<&str>) -> Result<Payload> {
    match usable_key(key) {
        Some(key) => Ok(Payload::Sealed(Envelope::seal(&snapshot.to_json()?, key)?)),
        None => Ok(Payload::Plain(snapshot)),
    }
}

/// Turn a parsed payload into a snapshot, opening it when it is sealed.
///
/// # Errors
/// * `BrowserBytesError::Validation` - the payload is sealed and no key was given
/// * `BrowserBytesError::Decryption` - the key does not open the envelope
/// * `BrowserBytesError::Format` - the plaintext is not a snapshot, or is
///   itself another envelope
pub fn open_payload(payload: Payload, key: Option<&str>) -> Result<Snapshot> {
    match payload {
        Payload::Plain(snapshot) => Ok(snapshot),
        Payload::Sealed(envelope) => {
            let key = usable_key(key)
                .ok_or_else(|| BrowserBytesError::validation(KEY_REQUIRED_MESSAGE))?;
            let plaintext = envelope.open(key)?;
            match Payload::parse(&plaintext)? {
                Payload::Plain(snapshot) => Ok(snapshot),
                Payload::Sealed(_) => Err(BrowserBytesError::format(
                    "Decrypted data is another encrypted envelope",
                )),
            }
        }
    }
}

/// Parse export text into a snapshot without touching a browser
///
/// # Errors
/// * `BrowserBytesError::Format` - the text is not valid for `options.format`
/// * the errors of [`open_payload`]
pub fn read_import(text: &str, options: &ImportOptions) -> Result<Snapshot> {
    let payload = decode_import(text, options.format)?;
    open_payload(payload, options.decryption_key.as_deref())
}

/// Orchestrates capture, export, import and the cloud round trip for one browser
///
/// # Example
/// ```rust
/// use browserbytes_core::{
///     browser::{MemoryBrowser, TabContext},
///     config::BytesConfig,
///     engine::{ExportOptions, ImportOptions, TransferEngine},
/// };
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> browserbytes_core::Result<()> {
/// let engine = TransferEngine::new(
///     MemoryBrowser::new().with_local_storage([("theme", "dark")]),
///     BytesConfig::default(),
/// );
/// let tab = TabContext::parse(1, "https://example.com/", "Example")?;
///
/// let artifact = engine.export(&tab, &ExportOptions::default()).await?;
/// assert_eq!(artifact.filename, "browserbytes_Example_json.json");
///
/// let report = engine
///     .import_text(&tab, &artifact.contents, &ImportOptions::default())
///     .await?;
/// assert_eq!(report.storage_count, 1);
/// # Ok(())
/// # }
/// ```
pub struct TransferEngine<B>
where
    B: WebStorageAdapter + CookieAdapter,
{
    browser: B,
    config: BytesConfig,
    remote: Option<RecordStoreClient>,
}

impl<B> TransferEngine<B>
where
    B: WebStorageAdapter + CookieAdapter,
{
    /// Create an engine without a record store
    pub fn new(browser: B, config: BytesConfig) -> Self {
        Self {
            browser,
            config,
            remote: None,
        }
    }

    /// Create an engine whose record store is built from `config.remote`
    ///
    /// # Errors
    /// * `BrowserBytesError::Config` - the configuration is invalid
    pub fn from_config(browser: B, config: BytesConfig) -> Result<Self> {
        config.validate()?;
        let remote = RecordStoreClient::from_config(&config.remote)?;
        Ok(Self::new(browser, config).with_remote(remote))
    }

    pub fn with_remote(mut self, remote: RecordStoreClient) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    pub fn config(&self) -> &BytesConfig {
        &self.config
    }

    fn remote(&self) -> Result<&RecordStoreClient> {
        self.remote
            .as_ref()
            .ok_or_else(|| BrowserBytesError::config("No record store configured"))
    }

    fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            include_session_storage: self.config.include_session_storage,
            deadline: self.config.browser_timeout(),
        }
    }

    fn restore_options(&self) -> RestoreOptions {
        RestoreOptions {
            deadline: self.config.browser_timeout(),
        }
    }

    /// Capture the tab's storage and cookies
    pub async fn capture(&self, tab: &TabContext) -> Result<Snapshot> {
        capture(tab, &self.browser, &self.browser, &self.capture_options()).await
    }

    /// Apply `snapshot` to the tab
    pub async fn restore(&self, tab: &TabContext, snapshot: &Snapshot) -> Result<RestoreReport> {
        let report = restore(
            tab,
            snapshot,
            &self.browser,
            &self.browser,
            &self.restore_options(),
        )
        .await?;

        #[cfg(feature = "metrics")]
        BytesMetrics::global()
            .record_restore(report.cookies_restored, report.cookies_failed.len());

        Ok(report)
    }

    /// Capture the tab and render it as an export file.
    ///
    /// The file holds the pretty-printed snapshot, or the pretty-printed
    /// envelope when a key is given, in the requested format.
    ///
    /// # Arguments
    /// * `tab` - Tab to capture
    /// * `options` - Output format and optional encryption key
    ///
    /// # Returns
    /// The file name, contents and MIME type of the export
    pub async fn export(&self, tab: &TabContext, options: &ExportOptions) -> Result<ExportArtifact> {
        let snapshot = self.capture(tab).await?;
        let payload = seal_snapshot(snapshot, options.encryption_key.as_deref())?;

        let contents = encode_export(&payload, options.format)?;

        #[cfg(feature = "metrics")]
        BytesMetrics::global().record_export(contents.len());

        let artifact = ExportArtifact {
            filename: export_filename(
                &self.config.export.file_prefix,
                &tab.title,
                options.format,
                Utc::now(),
            ),
            contents,
            mime_type: options.format.mime_type(),
            encrypted: payload.is_encrypted(),
        };
        debug!(
            tab = tab.id,
            filename = %artifact.filename,
            encrypted = artifact.encrypted,
            "rendered export"
        );
        Ok(artifact)
    }

    /// Parse export text and restore it into the tab.
    ///
    /// Nothing is applied when the text cannot be parsed or opened.
    pub async fn import_text(
        &self,
        tab: &TabContext,
        text: &str,
        options: &ImportOptions,
    ) -> Result<RestoreReport> {
        let snapshot = read_import(text, options)?;
        self.restore(tab, &snapshot).await
    }

    /// Capture the tab and store it as a cloud record named `name`.
    ///
    /// # Returns
    /// The generated passphrase and the record id
    ///
    /// # Errors
    /// * `BrowserBytesError::Validation` - `name` is blank
    /// * `BrowserBytesError::Config` - the engine has no record store
    /// * `BrowserBytesError::Generator` / `BrowserBytesError::Store` - remote failure
    pub async fn save_to_cloud(
        &self,
        tab: &TabContext,
        name: &str,
        encryption_key: Option<&str>,
    ) -> Result<SaveReceipt> {
        let remote = self.remote()?;
        if name.trim().is_empty() {
            return Err(BrowserBytesError::validation(
                "Please enter a name for your saved data",
            ));
        }

        let snapshot = self.capture(tab).await?;
        let payload = seal_snapshot(snapshot, encryption_key)?.to_json()?;

        #[cfg(feature = "metrics")]
        BytesMetrics::global().record_export(payload.len());

        let receipt = remote.save(name, &payload).await?;
        info!(
            tab = tab.id,
            record_id = %receipt.record_id,
            encrypted = usable_key(encryption_key).is_some(),
            "saved snapshot to the record store"
        );
        Ok(receipt)
    }

    /// Fetch the record stored under `passphrase` and open it
    pub async fn fetch_from_cloud(
        &self,
        passphrase: &str,
        decryption_key: Option<&str>,
    ) -> Result<Snapshot> {
        let data = self.remote()?.load(passphrase).await?;
        open_payload(Payload::parse(&data)?, decryption_key)
    }

    /// Fetch the record stored under `passphrase` and restore it into the tab
    pub async fn retrieve_from_cloud(
        &self,
        tab: &TabContext,
        passphrase: &str,
        decryption_key: Option<&str>,
    ) -> Result<RestoreReport> {
        let snapshot = self.fetch_from_cloud(passphrase, decryption_key).await?;
        self.restore(tab, &snapshot).await
    }
}
