/*!
Snapshot data model: one browsing context's storage and cookies.

A [`Snapshot`] is built fresh for every export and dropped once the export or
restore finishes. Cookies are keyed by name only, so two cookies sharing a
name but differing in path or domain cannot both be represented; the later
one wins. This mirrors what the browser extension has always exported.
*/

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::{BrowserBytesError, Result};

/// Cookie `SameSite` policy as reported by the browser cookie API
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SameSite {
    NoRestriction,
    Lax,
    Strict,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::NoRestriction => "no_restriction",
            SameSite::Lax => "lax",
            SameSite::Strict => "strict",
        }
    }
}

/// A single cookie with the attributes needed to set it again
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_same_site"
    )]
    pub same_site: Option<SameSite>,
    /// Expiry in epoch seconds; `None` means a session cookie
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<f64>,
}

impl Cookie {
    /// Create a session cookie with `path = "/"` and no flags set
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: "/".to_string(),
            secure: false,
            http_only: false,
            same_site: None,
            expiration_date: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    pub fn with_expiration(mut self, epoch_seconds: f64) -> Self {
        self.expiration_date = Some(epoch_seconds);
        self
    }

    /// True when the cookie has no expiry and lives for the browser session
    pub fn is_session(&self) -> bool {
        self.expiration_date.is_none()
    }
}

// Browsers report "unspecified" when no policy was given; treat it as absent.
fn deserialize_same_site<'de, D>(deserializer: D) -> std::result::Result<Option<SameSite>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("unspecified") | Some("") => Ok(None),
        Some("no_restriction") | Some("none") => Ok(Some(SameSite::NoRestriction)),
        Some("lax") => Ok(Some(SameSite::Lax)),
        Some("strict") => Ok(Some(SameSite::Strict)),
        Some(other) => Err(serde::de::Error::unknown_variant(
            other,
            &["no_restriction", "lax", "strict", "unspecified"],
        )),
    }
}

/// Captured `{localStorage, cookies}` pair for one browsing context
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(try_from = "RawSnapshot")]
pub struct Snapshot {
    #[serde(rename = "localStorage")]
    local_storage: BTreeMap<String, String>,
    #[serde(rename = "sessionStorage", skip_serializing_if = "Option::is_none")]
    session_storage: Option<BTreeMap<String, String>>,
    cookies: BTreeMap<String, Cookie>,
}

impl Snapshot {
    /// Build a snapshot from storage entries and a cookie list.
    ///
    /// Cookies are keyed by name; when several share a name the last one in
    /// `cookies` is kept.
    pub fn new<I>(local_storage: BTreeMap<String, String>, cookies: I) -> Self
    where
        I: IntoIterator<Item = Cookie>,
    {
        let mut snapshot = Self {
            local_storage,
            session_storage: None,
            cookies: BTreeMap::new(),
        };
        for cookie in cookies {
            snapshot.insert_cookie(cookie);
        }
        snapshot
    }

    /// Attach session storage entries to the snapshot
    pub fn with_session_storage(mut self, entries: BTreeMap<String, String>) -> Self {
        self.session_storage = Some(entries);
        self
    }

    /// Insert a cookie under its own name, returning the one it replaced
    pub fn insert_cookie(&mut self, cookie: Cookie) -> Option<Cookie> {
        self.cookies.insert(cookie.name.clone(), cookie)
    }

    pub fn local_storage(&self) -> &BTreeMap<String, String> {
        &self.local_storage
    }

    pub fn session_storage(&self) -> Option<&BTreeMap<String, String>> {
        self.session_storage.as_ref()
    }

    pub fn cookies(&self) -> &BTreeMap<String, Cookie> {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&Cookie> {
        self.cookies.get(name)
    }

    /// Compact JSON, used for cloud records and as the plaintext to encrypt
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Pretty-printed JSON, used for file exports
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a serialized snapshot.
    ///
    /// # Errors
    /// * `BrowserBytesError::Format` - invalid JSON, missing `localStorage` or
    ///   `cookies`, an incomplete cookie, or a cookie stored under a key that
    ///   differs from its name
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| BrowserBytesError::format(e.to_string()))
    }
}

/// Cookies as written on disk: a name-keyed map, or the list form produced
/// by the earliest exporter.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawCookies {
    Map(BTreeMap<String, Cookie>),
    List(Vec<Cookie>),
}

#[derive(Deserialize)]
struct RawSnapshot {
    #[serde(rename = "localStorage")]
    local_storage: BTreeMap<String, String>,
    #[serde(rename = "sessionStorage", default)]
    session_storage: Option<BTreeMap<String, String>>,
    cookies: RawCookies,
}

impl TryFrom<RawSnapshot> for Snapshot {
    type Error = String;

    fn try_from(raw: RawSnapshot) -> std::result::Result<Self, Self::Error> {
        let cookies = match raw.cookies {
            RawCookies::Map(map) => {
                if let Some((key, cookie)) = map.iter().find(|(key, c)| **key != c.name) {
                    return Err(format!(
                        "cookie stored under key '{key}' is named '{}'",
                        cookie.name
                    ));
                }
                map
            }
            RawCookies::List(list) => list
                .into_iter()
                .map(|cookie| (cookie.name.clone(), cookie))
                .collect(),
        };

        Ok(Snapshot {
            local_storage: raw.local_storage,
            session_storage: raw.session_storage,
            cookies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> Snapshot {
        let mut storage = BTreeMap::new();
        storage.insert("theme".to_string(), "dark".to_string());
        storage.insert("token".to_string(), "{\"exp\":123}".to_string());

        Snapshot::new(
            storage,
            vec![
                Cookie::new("sid", "x", "example.com").with_secure(true),
                Cookie::new("prefs", "compact", ".example.com")
                    .with_path("/app")
                    .with_http_only(true)
                    .with_same_site(SameSite::Lax)
                    .with_expiration(1_893_456_000.5),
            ],
        )
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let snapshot = sample_snapshot();

        let compact = snapshot.to_json().unwrap();
        assert_eq!(Snapshot::from_json(&compact).unwrap(), snapshot);

        let pretty = snapshot.to_json_pretty().unwrap();
        assert!(pretty.contains('\n'));
        assert_eq!(Snapshot::from_json(&pretty).unwrap(), snapshot);
    }

    #[test]
    fn test_wire_field_names() {
        let json = sample_snapshot().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert!(value.get("localStorage").is_some());
        assert!(value.get("sessionStorage").is_none());
        let prefs = &value["cookies"]["prefs"];
        assert_eq!(prefs["httpOnly"], true);
        assert_eq!(prefs["sameSite"], "lax");
        assert_eq!(prefs["expirationDate"], 1_893_456_000.5);
        assert!(value["cookies"]["sid"].get("expirationDate").is_none());
    }

    #[test]
    fn test_duplicate_cookie_names_keep_last() {
        let snapshot = Snapshot::new(
            BTreeMap::new(),
            vec![
                Cookie::new("sid", "first", "example.com").with_path("/a"),
                Cookie::new("sid", "second", "example.com").with_path("/b"),
            ],
        );

        assert_eq!(snapshot.cookies().len(), 1);
        assert_eq!(snapshot.cookie("sid").unwrap().value, "second");
    }

    #[test]
    fn test_legacy_cookie_list_accepted() {
        let json = r#"{
            "localStorage": {"a": "1"},
            "cookies": [
                {"name": "sid", "value": "x", "domain": "example.com", "path": "/",
                 "secure": true, "httpOnly": false, "sameSite": "unspecified",
                 "hostOnly": true, "session": true, "storeId": "0"}
            ]
        }"#;

        let snapshot = Snapshot::from_json(json).unwrap();
        let sid = snapshot.cookie("sid").unwrap();
        assert!(sid.secure);
        assert_eq!(sid.same_site, None);
        assert!(sid.is_session());
    }

    #[test]
    fn test_cookie_key_must_match_name() {
        let json = r#"{
            "localStorage": {},
            "cookies": {"sid": {"name": "other", "value": "x", "domain": "example.com", "path": "/"}}
        }"#;

        let err = Snapshot::from_json(json).unwrap_err();
        assert!(matches!(err, BrowserBytesError::Format(_)));
    }

    #[test]
    fn test_missing_required_fields() {
        for json in [
            r#"{"cookies": {}}"#,
            r#"{"localStorage": {}}"#,
            r#"{"localStorage": {}, "cookies": {"sid": {"name": "sid", "value": "x"}}}"#,
            r#"{"localStorage": {}, "cookies": {}"#,
            "not json at all",
        ] {
            let result = Snapshot::from_json(json);
            assert!(
                matches!(result, Err(BrowserBytesError::Format(_))),
                "expected format error for {json}"
            );
        }
    }

    #[test]
    fn test_unknown_same_site_rejected() {
        let json = r#"{"localStorage": {}, "cookies": {"sid":
            {"name": "sid", "value": "x", "domain": "d", "path": "/", "sameSite": "sometimes"}}}"#;
        assert!(Snapshot::from_json(json).is_err());
    }

    #[test]
    fn test_session_storage_roundtrip() {
        let mut session = BTreeMap::new();
        session.insert("draft".to_string(), "hello".to_string());
        let snapshot = sample_snapshot().with_session_storage(session);

        let json = snapshot.to_json().unwrap();
        assert!(json.contains("sessionStorage"));
        let restored = Snapshot::from_json(&json).unwrap();
        assert_eq!(restored.session_storage().unwrap()["draft"], "hello");
    }
}
