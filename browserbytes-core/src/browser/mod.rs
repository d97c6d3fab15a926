/*!
Browser adapters: the ports through which snapshots are captured and restored.

The engine never talks to a browser directly. It goes through
[`WebStorageAdapter`] for `localStorage`/`sessionStorage` and [`CookieAdapter`]
for cookies, mirroring the extension APIs (script injection for storage,
cookie get-all/set/remove scoped by URL). Two adapters ship with the crate:

- [`MemoryBrowser`] keeps everything in memory and can be told to fail
  specific cookie writes
- [`ProfileBrowser`] persists one tab's state in a JSON profile file
*/

pub mod jar;
pub mod memory;
pub mod profile;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use url::Url;

use crate::{BrowserBytesError, Cookie, Result};

pub use jar::CookieJar;
pub use memory::{BrowserOp, MemoryBrowser};
pub use profile::{ProfileBrowser, TabProfile};

/// The tab a snapshot is captured from or restored into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabContext {
    pub id: i64,
    pub url: Url,
    pub title: String,
}

impl TabContext {
    pub fn new(id: i64, url: Url, title: impl Into<String>) -> Self {
        Self {
            id,
            url,
            title: title.into(),
        }
    }

    /// Parse `url` and build a context for it
    pub fn parse(id: i64, url: &str, title: impl Into<String>) -> Result<Self> {
        let url = Url::parse(url)
            .map_err(|e| BrowserBytesError::validation(format!("Invalid tab URL '{url}': {e}")))?;
        Ok(Self::new(id, url, title))
    }
}

/// Which Web Storage area of the tab to touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageArea {
    Local,
    Session,
}

impl StorageArea {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageArea::Local => "localStorage",
            StorageArea::Session => "sessionStorage",
        }
    }
}

/// Access to a tab's Web Storage
#[async_trait]
pub trait WebStorageAdapter: Send + Sync {
    /// Read every key/value pair of `area`
    async fn read_all(&self, tab: &TabContext, area: StorageArea)
        -> Result<BTreeMap<String, String>>;

    /// Clear `area` and then write every entry of `entries`
    async fn replace_all(
        &self,
        tab: &TabContext,
        area: StorageArea,
        entries: &BTreeMap<String, String>,
    ) -> Result<()>;
}

/// Access to the cookies visible to a URL
#[async_trait]
pub trait CookieAdapter: Send + Sync {
    /// All cookies the browser would send to `url`
    async fn get_all(&self, url: &Url) -> Result<Vec<Cookie>>;

    /// Set `cookie` in the context of `url`.
    ///
    /// The browser may reject the cookie (domain mismatch, `Secure` over
    /// plain HTTP, ...), which surfaces as `BrowserBytesError::Browser`.
    async fn set(&self, url: &Url, cookie: &Cookie) -> Result<()>;

    /// Remove the cookie named `name` for `url`.
    ///
    /// Returns `false` when there was nothing to remove.
    async fn remove(&self, url: &Url, name: &str) -> Result<bool>;
}

/// Run a browser call under a deadline
pub(crate) async fn with_deadline<T, F>(
    operation: &'static str,
    deadline: Duration,
    future: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, future).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, ?deadline, "browser call timed out");
            Err(BrowserBytesError::Timeout { operation })
        }
    }
}
