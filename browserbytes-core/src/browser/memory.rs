/*!
In-memory browser adapter.
*/

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use url::Url;

use super::{CookieAdapter, CookieJar, StorageArea, TabContext, WebStorageAdapter};
use crate::{BrowserBytesError, Cookie, Result};

/// A call observed by [`MemoryBrowser`], in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserOp {
    ReadStorage(StorageArea),
    ReplaceStorage(StorageArea),
    GetCookies,
    SetCookie(String),
    RemoveCookie(String),
}

#[derive(Default)]
struct BrowserState {
    local: BTreeMap<String, String>,
    session: BTreeMap<String, String>,
    jar: CookieJar,
    failing_sets: HashSet<String>,
    ops: Vec<BrowserOp>,
}

impl BrowserState {
    fn area_mut(&mut self, area: StorageArea) -> &mut BTreeMap<String, String> {
        match area {
            StorageArea::Local => &mut self.local,
            StorageArea::Session => &mut self.session,
        }
    }
}

/// Browser adapter that keeps one tab's storage and cookies in memory
///
/// Useful for tests and for embedding the engine where the real browser
/// state is mirrored elsewhere. Cookie writes follow [`CookieJar`] rules,
/// and individual cookie names can be made to fail on `set`.
///
/// # Example
/// ```rust
/// use browserbytes_core::browser::MemoryBrowser;
///
/// let browser = MemoryBrowser::new()
///     .with_local_storage([("theme", "dark")])
///     .fail_set_for("broken");
/// assert_eq!(browser.local_storage()["theme"], "dark");
/// ```
#[derive(Default)]
pub struct MemoryBrowser {
    state: Mutex<BrowserState>,
    latency: Option<Duration>,
}

impl MemoryBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed `localStorage`
    pub fn with_local_storage<I, K, V>(self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.lock()
            .local
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Seed `sessionStorage`
    pub fn with_session_storage<I, K, V>(self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.lock()
            .session
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Seed a cookie as if set by a page at `url`
    pub fn with_cookie(self, url: &Url, cookie: Cookie) -> Result<Self> {
        self.lock().jar.set(url, &cookie)?;
        Ok(self)
    }

    /// Make every `set` of the cookie called `name` fail
    pub fn fail_set_for(self, name: impl Into<String>) -> Self {
        self.lock().failing_sets.insert(name.into());
        self
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn local_storage(&self) -> BTreeMap<String, String> {
        self.lock().local.clone()
    }

    pub fn session_storage(&self) -> BTreeMap<String, String> {
        self.lock().session.clone()
    }

    pub fn cookie_jar(&self) -> CookieJar {
        self.lock().jar.clone()
    }

    /// Calls made so far, oldest first
    pub fn operations(&self) -> Vec<BrowserOp> {
        self.lock().ops.clone()
    }

    fn lock(&self) -> MutexGuard<'_, BrowserState> {
        // A poisoned lock only means another test thread panicked mid-call.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl WebStorageAdapter for MemoryBrowser {
    async fn read_all(
        &self,
        _tab: &TabContext,
        area: StorageArea,
    ) -> Result<BTreeMap<String, String>> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.ops.push(BrowserOp::ReadStorage(area));
        Ok(state.area_mut(area).clone())
    }

    async fn replace_all(
        &self,
        _tab: &TabContext,
        area: StorageArea,
        entries: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.ops.push(BrowserOp::ReplaceStorage(area));
        let target = state.area_mut(area);
        target.clear();
        target.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}

#[async_trait]
impl CookieAdapter for MemoryBrowser {
    async fn get_all(&self, url: &Url) -> Result<Vec<Cookie>> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.ops.push(BrowserOp::GetCookies);
        Ok(state.jar.visible_to(url))
    }

    async fn set(&self, url: &Url, cookie: &Cookie) -> Result<()> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.ops.push(BrowserOp::SetCookie(cookie.name.clone()));
        if state.failing_sets.contains(&cookie.name) {
            return Err(BrowserBytesError::browser(format!(
                "Failed to set cookie '{}'",
                cookie.name
            )));
        }
        state.jar.set(url, cookie)
    }

    async fn remove(&self, url: &Url, name: &str) -> Result<bool> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.ops.push(BrowserOp::RemoveCookie(name.to_string()));
        Ok(state.jar.remove(url, name))
    }
}
