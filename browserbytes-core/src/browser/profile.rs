/*!
Profile-file browser adapter.

A profile file is a JSON document holding one tab's URL, title, Web Storage
areas and cookie jar. It lets the command-line tool capture from and restore
into a tab state without a live browser.
*/

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;
use url::Url;

use super::{CookieAdapter, CookieJar, StorageArea, TabContext, WebStorageAdapter};
use crate::{BrowserBytesError, Cookie, Result};

/// On-disk shape of a profile file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabProfile {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub local_storage: BTreeMap<String, String>,
    #[serde(default)]
    pub session_storage: BTreeMap<String, String>,
    #[serde(default)]
    pub cookies: CookieJar,
}

impl TabProfile {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    fn area_mut(&mut self, area: StorageArea) -> &mut BTreeMap<String, String> {
        match area {
            StorageArea::Local => &mut self.local_storage,
            StorageArea::Session => &mut self.session_storage,
        }
    }
}

/// Browser adapter backed by a [`TabProfile`] JSON file
///
/// Every call reads the file, applies the change and writes it back. Calls
/// are serialized through an internal lock so concurrent storage and cookie
/// restores do not overwrite each other.
///
/// # Example
/// ```rust,no_run
/// use browserbytes_core::browser::{ProfileBrowser, TabProfile};
///
/// let browser = ProfileBrowser::create(
///     "/tmp/tab.json",
///     &TabProfile::new("https://example.com/", "Example"),
/// )?;
/// let tab = browser.tab()?;
/// # Ok::<(), browserbytes_core::BrowserBytesError>(())
/// ```
#[derive(Debug)]
pub struct ProfileBrowser {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ProfileBrowser {
    /// Use an existing profile file
    ///
    /// # Errors
    /// * `BrowserBytesError::Browser` - the file does not exist
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(BrowserBytesError::browser(format!(
                "Profile file {} does not exist",
                path.display()
            )));
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// Write `profile` to `path`, creating parent directories, and use it
    pub fn create<P: AsRef<Path>>(path: P, profile: &TabProfile) -> Result<Self> {
        let browser = Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        };
        browser.save(profile)?;
        Ok(browser)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The tab described by the profile (id is always 1)
    pub fn tab(&self) -> Result<TabContext> {
        let profile = self.load()?;
        TabContext::parse(1, &profile.url, profile.title)
    }

    /// Read the profile file
    pub fn load(&self) -> Result<TabProfile> {
        let text = fs::read_to_string(&self.path).map_err(|e| {
            BrowserBytesError::browser(format!(
                "Failed to read profile {}: {e}",
                self.path.display()
            ))
        })?;
        serde_json::from_str(&text).map_err(|e| {
            BrowserBytesError::browser(format!(
                "Profile {} is not valid: {e}",
                self.path.display()
            ))
        })
    }

    fn save(&self, profile: &TabProfile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(profile)?;
        fs::write(&self.path, text).map_err(|e| {
            BrowserBytesError::browser(format!(
                "Failed to write profile {}: {e}",
                self.path.display()
            ))
        })
    }

    fn update<T>(&self, f: impl FnOnce(&mut TabProfile) -> Result<T>) -> Result<T> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut profile = self.load()?;
        let out = f(&mut profile)?;
        self.save(&profile)?;
        Ok(out)
    }

    fn read<T>(&self, f: impl FnOnce(&TabProfile) -> T) -> Result<T> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        Ok(f(&self.load()?))
    }
}

#[async_trait]
impl WebStorageAdapter for ProfileBrowser {
    async fn read_all(
        &self,
        _tab: &TabContext,
        area: StorageArea,
    ) -> Result<BTreeMap<String, String>> {
        self.read(|profile| match area {
            StorageArea::Local => profile.local_storage.clone(),
            StorageArea::Session => profile.session_storage.clone(),
        })
    }

    async fn replace_all(
        &self,
        _tab: &TabContext,
        area: StorageArea,
        entries: &BTreeMap<String, String>,
    ) -> Result<()> {
        debug!(path = %self.path.display(), area = area.as_str(), entries = entries.len(), "replacing storage");
        self.update(|profile| {
            *profile.area_mut(area) = entries.clone();
            Ok(())
        })
    }
}

#[async_trait]
impl CookieAdapter for ProfileBrowser {
    async fn get_all(&self, url: &Url) -> Result<Vec<Cookie>> {
        self.read(|profile| profile.cookies.visible_to(url))
    }

    async fn set(&self, url: &Url, cookie: &Cookie) -> Result<()> {
        self.update(|profile| profile.cookies.set(url, cookie))
    }

    async fn remove(&self, url: &Url, name: &str) -> Result<bool> {
        self.update(|profile| Ok(profile.cookies.remove(url, name)))
    }
}
