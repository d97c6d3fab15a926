/*!
Cookie storage with the scoping rules of a browser cookie store.

Used by the in-memory and profile-file adapters so that restoring a snapshot
behaves like the extension cookie API: cookies are scoped by domain and path,
`Secure` cookies are only visible over HTTPS, and writes that a browser would
refuse are rejected.
*/

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{snapshot::SameSite, BrowserBytesError, Cookie, Result};

/// Ordered set of cookies, unique per (name, domain, path)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CookieJar {
    cookies: Vec<Cookie>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.iter()
    }

    /// Cookies a request to `url` would carry, expired ones excluded
    pub fn visible_to(&self, url: &Url) -> Vec<Cookie> {
        let now = now_epoch();
        self.cookies
            .iter()
            .filter(|c| is_visible(c, url) && !is_expired(c, now))
            .cloned()
            .collect()
    }

    /// Store `cookie` as if set by a page at `url`.
    ///
    /// An existing cookie with the same name, domain and path is replaced.
    /// A cookie whose expiry is already in the past deletes that entry
    /// instead of being stored.
    ///
    /// # Errors
    /// * `BrowserBytesError::Browser` - the URL has no host, the cookie domain
    ///   does not cover the URL host, a `Secure` cookie is set over plain
    ///   HTTP, or `SameSite=None` is used without `Secure`
    pub fn set(&mut self, url: &Url, cookie: &Cookie) -> Result<()> {
        let host = url
            .host_str()
            .ok_or_else(|| BrowserBytesError::browser(format!("URL '{url}' has no host")))?
            .to_ascii_lowercase();

        let mut cookie = cookie.clone();
        if cookie.domain.is_empty() {
            cookie.domain = host.clone();
        }
        if cookie.path.is_empty() {
            cookie.path = "/".to_string();
        }

        if !domain_matches(&host, &cookie.domain) {
            return Err(BrowserBytesError::browser(format!(
                "Cookie '{}' domain '{}' does not match host '{host}'",
                cookie.name, cookie.domain
            )));
        }
        if cookie.secure && url.scheme() != "https" {
            return Err(BrowserBytesError::browser(format!(
                "Secure cookie '{}' cannot be set over {}",
                cookie.name,
                url.scheme()
            )));
        }
        if cookie.same_site == Some(SameSite::NoRestriction) && !cookie.secure {
            return Err(BrowserBytesError::browser(format!(
                "Cookie '{}' uses SameSite=None without Secure",
                cookie.name
            )));
        }

        self.cookies.retain(|existing| !same_slot(existing, &cookie));
        if !is_expired(&cookie, now_epoch()) {
            self.cookies.push(cookie);
        }
        Ok(())
    }

    /// Remove every cookie named `name` that is visible to `url`
    pub fn remove(&mut self, url: &Url, name: &str) -> bool {
        let before = self.cookies.len();
        self.cookies
            .retain(|c| !(c.name == name && is_visible(c, url)));
        self.cookies.len() != before
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }
}

fn now_epoch() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

fn normalized_domain(domain: &str) -> String {
    domain.trim_start_matches('.').to_ascii_lowercase()
}

fn same_slot(a: &Cookie, b: &Cookie) -> bool {
    a.name == b.name
        && a.path == b.path
        && normalized_domain(&a.domain) == normalized_domain(&b.domain)
}

fn is_expired(cookie: &Cookie, now: f64) -> bool {
    cookie.expiration_date.is_some_and(|exp| exp <= now)
}

fn domain_matches(host: &str, cookie_domain: &str) -> bool {
    let domain = normalized_domain(cookie_domain);
    host == domain || host.ends_with(&format!(".{domain}"))
}

fn path_matches(request_path: &str, cookie_path: &str) -> bool {
    if request_path == cookie_path {
        return true;
    }
    request_path.starts_with(cookie_path)
        && (cookie_path.ends_with('/')
            || request_path.as_bytes().get(cookie_path.len()) == Some(&b'/'))
}

fn is_visible(cookie: &Cookie, url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    domain_matches(&host.to_ascii_lowercase(), &cookie.domain)
        && path_matches(url.path(), &cookie.path)
        && (!cookie.secure || url.scheme() == "https")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_set_and_read_back() {
        let mut jar = CookieJar::new();
        let site = url("https://app.example.com/dashboard");

        jar.set(&site, &Cookie::new("sid", "x", "example.com")).unwrap();
        jar.set(&site, &Cookie::new("local", "y", "")).unwrap();

        let visible = jar.visible_to(&site);
        assert_eq!(visible.len(), 2);
        let local = visible.iter().find(|c| c.name == "local").unwrap();
        assert_eq!(local.domain, "app.example.com");
    }

    #[test]
    fn test_same_slot_is_replaced() {
        let mut jar = CookieJar::new();
        let site = url("https://example.com/");

        jar.set(&site, &Cookie::new("sid", "old", "example.com")).unwrap();
        jar.set(&site, &Cookie::new("sid", "new", ".example.com")).unwrap();
        jar.set(&site, &Cookie::new("sid", "scoped", "example.com").with_path("/app"))
            .unwrap();

        assert_eq!(jar.len(), 2);
        assert!(jar.iter().any(|c| c.value == "new"));
        assert!(!jar.iter().any(|c| c.value == "old"));
    }

    #[test]
    fn test_rejections() {
        let mut jar = CookieJar::new();
        let https = url("https://example.com/");
        let http = url("http://example.com/");

        assert!(jar.set(&https, &Cookie::new("a", "1", "other.org")).is_err());
        assert!(jar
            .set(&http, &Cookie::new("b", "1", "example.com").with_secure(true))
            .is_err());
        assert!(jar
            .set(
                &https,
                &Cookie::new("c", "1", "example.com").with_same_site(SameSite::NoRestriction)
            )
            .is_err());
        assert!(jar.is_empty());
    }

    #[test]
    fn test_scoping_rules() {
        let mut jar = CookieJar::new();
        let https = url("https://shop.example.com/cart/items");

        jar.set(&https, &Cookie::new("root", "1", "example.com")).unwrap();
        jar.set(&https, &Cookie::new("cart", "1", "example.com").with_path("/cart"))
            .unwrap();
        jar.set(&https, &Cookie::new("other", "1", "example.com").with_path("/account"))
            .unwrap();
        jar.set(&https, &Cookie::new("sec", "1", "example.com").with_secure(true))
            .unwrap();

        let names = |u: &str| -> Vec<String> {
            let mut names: Vec<String> =
                jar.visible_to(&url(u)).into_iter().map(|c| c.name).collect();
            names.sort();
            names
        };

        assert_eq!(names("https://shop.example.com/cart/items"), ["cart", "root", "sec"]);
        assert_eq!(names("http://example.com/cartoon"), ["root"]);
        assert_eq!(names("https://example.org/"), Vec::<String>::new());
    }

    #[test]
    fn test_expired_cookie_deletes_slot() {
        let mut jar = CookieJar::new();
        let site = url("https://example.com/");

        jar.set(&site, &Cookie::new("sid", "x", "example.com")).unwrap();
        jar.set(&site, &Cookie::new("sid", "gone", "example.com").with_expiration(1.0))
            .unwrap();

        assert!(jar.is_empty());
    }

    #[test]
    fn test_remove() {
        let mut jar = CookieJar::new();
        let site = url("https://example.com/");

        jar.set(&site, &Cookie::new("sid", "x", "example.com")).unwrap();
        assert!(jar.remove(&site, "sid"));
        assert!(!jar.remove(&site, "sid"));
        assert!(jar.is_empty());
    }
}
