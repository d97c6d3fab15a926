/*!
Restore orchestrator: applies a snapshot back onto a tab.

Storage restore is a destructive overwrite: the area is cleared and then
filled from the snapshot, so keys that were not captured are gone afterwards.
Cookie restore removes any existing cookie of the same name before setting
the captured one; a cookie that fails to set is logged and counted, and the
remaining cookies are still restored.
*/

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::browser::{with_deadline, CookieAdapter, StorageArea, TabContext, WebStorageAdapter};
use crate::capture::DEFAULT_BROWSER_DEADLINE;
use crate::{Result, Snapshot};

/// Outcome of a restore
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    /// Number of `localStorage` entries written
    pub storage_count: usize,
    /// Number of `sessionStorage` entries written, when the snapshot had any
    pub session_count: Option<usize>,
    /// Cookies whose `set` succeeded
    pub cookies_restored: usize,
    /// Names of cookies whose `set` failed
    pub cookies_failed: Vec<String>,
}

impl RestoreReport {
    pub fn cookies_attempted(&self) -> usize {
        self.cookies_restored + self.cookies_failed.len()
    }

    /// True when at least one cookie could not be restored
    pub fn is_partial(&self) -> bool {
        !self.cookies_failed.is_empty()
    }
}

/// Knobs for [`restore`]
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Deadline applied to each browser call
    pub deadline: Duration,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_BROWSER_DEADLINE,
        }
    }
}

/// Apply `snapshot` to `tab`.
///
/// Storage and cookies are restored concurrently. Within cookie restore each
/// cookie is removed and then set before moving on to the next one.
///
/// # Returns
/// A [`RestoreReport`]; `cookies_restored < snapshot.cookies().len()` means
/// some cookies were rejected.
///
/// # Errors
/// * `BrowserBytesError::Browser` / `BrowserBytesError::Timeout` - the storage
///   restore failed. Cookie failures never produce an error.
pub async fn restore<W, C>(
    tab: &TabContext,
    snapshot: &Snapshot,
    storage: &W,
    cookies: &C,
    options: &RestoreOptions,
) -> Result<RestoreReport>
where
    W: WebStorageAdapter + ?Sized,
    C: CookieAdapter + ?Sized,
{
    let (storage_result, (cookies_restored, cookies_failed)) = futures::join!(
        restore_storage(tab, snapshot, storage, options.deadline),
        restore_cookies(tab, snapshot, cookies, options.deadline)
    );
    let (storage_count, session_count) = storage_result?;

    let report = RestoreReport {
        storage_count,
        session_count,
        cookies_restored,
        cookies_failed,
    };

    info!(
        tab = tab.id,
        storage = report.storage_count,
        cookies_restored = report.cookies_restored,
        cookies_failed = report.cookies_failed.len(),
        "restore finished"
    );
    Ok(report)
}

async fn restore_storage<W>(
    tab: &TabContext,
    snapshot: &Snapshot,
    storage: &W,
    deadline: Duration,
) -> Result<(usize, Option<usize>)>
where
    W: WebStorageAdapter + ?Sized,
{
    let local = snapshot.local_storage();
    with_deadline(
        "restore_local_storage",
        deadline,
        storage.replace_all(tab, StorageArea::Local, local),
    )
    .await?;

    let session_count = match snapshot.session_storage() {
        Some(session) => {
            with_deadline(
                "restore_session_storage",
                deadline,
                storage.replace_all(tab, StorageArea::Session, session),
            )
            .await?;
            Some(session.len())
        }
        None => None,
    };

    Ok((local.len(), session_count))
}

async fn restore_cookies<C>(
    tab: &TabContext,
    snapshot: &Snapshot,
    cookies: &C,
    deadline: Duration,
) -> (usize, Vec<String>)
where
    C: CookieAdapter + ?Sized,
{
    let mut restored = 0;
    let mut failed = Vec::new();

    for (name, cookie) in snapshot.cookies() {
        // Absence is fine; anything else is only worth a debug line since the
        // set below decides whether the cookie made it.
        match with_deadline("remove_cookie", deadline, cookies.remove(&tab.url, name)).await {
            Ok(removed) => debug!(cookie = %name, removed, "cleared existing cookie"),
            Err(e) => debug!(cookie = %name, error = %e, "could not clear existing cookie"),
        }

        match with_deadline("set_cookie", deadline, cookies.set(&tab.url, cookie)).await {
            Ok(()) => restored += 1,
            Err(e) => {
                warn!(cookie = %name, error = %e, "Error setting cookie");
                failed.push(name.clone());
            }
        }
    }

    (restored, failed)
}
