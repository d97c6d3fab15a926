/*!
Snapshot capture from a tab.
*/

use std::time::Duration;
use tracing::debug;

use crate::browser::{with_deadline, CookieAdapter, StorageArea, TabContext, WebStorageAdapter};
use crate::{Result, Snapshot};

/// Default deadline for a single browser call
pub const DEFAULT_BROWSER_DEADLINE: Duration = Duration::from_secs(30);

/// Knobs for [`capture`]
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Also capture `sessionStorage`
    pub include_session_storage: bool,
    /// Deadline applied to each browser call
    pub deadline: Duration,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            include_session_storage: false,
            deadline: DEFAULT_BROWSER_DEADLINE,
        }
    }
}

/// Read the tab's storage and the cookies scoped to its URL into a snapshot.
///
/// Storage and cookies are read concurrently; both must succeed. Cookies
/// sharing a name collapse to the last one reported by the browser.
///
/// # Errors
/// * `BrowserBytesError::Browser` - an adapter call failed
/// * `BrowserBytesError::Timeout` - an adapter call exceeded the deadline
pub async fn capture<W, C>(
    tab: &TabContext,
    storage: &W,
    cookies: &C,
    options: &CaptureOptions,
) -> Result<Snapshot>
where
    W: WebStorageAdapter + ?Sized,
    C: CookieAdapter + ?Sized,
{
    let local = with_deadline(
        "read_local_storage",
        options.deadline,
        storage.read_all(tab, StorageArea::Local),
    );
    let session = async {
        if options.include_session_storage {
            with_deadline(
                "read_session_storage",
                options.deadline,
                storage.read_all(tab, StorageArea::Session),
            )
            .await
            .map(Some)
        } else {
            Ok(None)
        }
    };
    let cookie_list = with_deadline("get_all_cookies", options.deadline, cookies.get_all(&tab.url));

    let (local, session, cookie_list) = futures::try_join!(local, session, cookie_list)?;

    let reported = cookie_list.len();
    let mut snapshot = Snapshot::new(local, cookie_list);
    if let Some(session) = session {
        snapshot = snapshot.with_session_storage(session);
    }

    debug!(
        tab = tab.id,
        storage_entries = snapshot.local_storage().len(),
        cookies = snapshot.cookies().len(),
        collapsed = reported - snapshot.cookies().len(),
        "captured snapshot"
    );
    Ok(snapshot)
}
