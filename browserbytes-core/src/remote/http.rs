/*!
HTTP implementations of the remote ports.

`PocketBaseBackend` talks to a PocketBase-style collection API and
`HttpPassphraseGenerator` to a word-list passphrase service. Both share one
`reqwest::Client` per instance with the configured request timeout.
*/

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::{Filter, NewRecord, PassphraseGenerator, Record, RecordBackend};
use crate::{config::RemoteConfig, BrowserBytesError, Result};

/// List response of the collection API
#[derive(Debug, Deserialize)]
struct RecordPage {
    #[serde(default)]
    items: Vec<Record>,
}

/// Response of the passphrase service
#[derive(Debug, Deserialize)]
struct PassphraseResponse {
    #[serde(default)]
    pws: Vec<String>,
}

fn build_client(config: &RemoteConfig) -> Result<Client> {
    Client::builder()
        .timeout(config.request_timeout())
        .build()
        .map_err(|e| BrowserBytesError::config(format!("Failed to build HTTP client: {e}")))
}

fn parse_url(value: &str, what: &str) -> Result<Url> {
    Url::parse(value).map_err(|e| BrowserBytesError::config(format!("Invalid {what} '{value}': {e}")))
}

/// Map a transport error, keeping timeouts distinguishable
fn transport_error(
    operation: &'static str,
    err: reqwest::Error,
    wrap: fn(String) -> BrowserBytesError,
) -> BrowserBytesError {
    if err.is_timeout() {
        warn!(operation, "request timed out");
        BrowserBytesError::Timeout { operation }
    } else {
        wrap(err.to_string())
    }
}

fn check_status(response: &Response, wrap: fn(String) -> BrowserBytesError) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(wrap(format!("API Error: {}", status.as_u16())))
    }
}

/// Record backend for a PocketBase collection
///
/// # Example
/// ```rust,no_run
/// use browserbytes_core::config::RemoteConfig;
/// use browserbytes_core::remote::PocketBaseBackend;
///
/// let backend = PocketBaseBackend::from_config(&RemoteConfig::haveloc())?;
/// assert!(backend.records_url().path().ends_with("/havelocCreds/records"));
/// # Ok::<(), browserbytes_core::BrowserBytesError>(())
/// ```
#[derive(Debug, Clone)]
pub struct PocketBaseBackend {
    client: Client,
    base_url: Url,
    collection: String,
}

impl PocketBaseBackend {
    pub fn new(client: Client, base_url: Url, collection: impl Into<String>) -> Self {
        Self {
            client,
            base_url,
            collection: collection.into(),
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        Ok(Self::new(
            build_client(config)?,
            parse_url(&config.base_url, "record store URL")?,
            config.collection.clone(),
        ))
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// `{base}/api/collections/{collection}/records`
    pub fn records_url(&self) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["api", "collections", &self.collection, "records"]);
        }
        url
    }

    /// Listing URL for `filter`, first page only.
    ///
    /// Each equality is also mirrored as a plain query parameter so that
    /// collection API rules can refer to it.
    pub fn query_url(&self, filter: &Filter, limit: u32) -> Url {
        let mut url = self.records_url();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("page", "1")
                .append_pair("perPage", &limit.to_string())
                .append_pair("filter", &filter.to_string());
            for (field, value) in filter.equalities() {
                query.append_pair(field, value);
            }
        }
        url
    }
}

#[async_trait]
impl RecordBackend for PocketBaseBackend {
    async fn create(&self, record: &NewRecord) -> Result<Record> {
        debug!(collection = %self.collection, size = record.data.len(), "creating record");
        let response = self
            .client
            .post(self.records_url())
            .json(record)
            .send()
            .await
            .map_err(|e| transport_error("create_record", e, BrowserBytesError::Store))?;
        check_status(&response, BrowserBytesError::Store)?;

        let text = response
            .text()
            .await
            .map_err(|e| transport_error("create_record", e, BrowserBytesError::Store))?;
        parse_created(&text)
    }

    async fn query(&self, filter: &Filter, limit: u32) -> Result<Vec<Record>> {
        debug!(collection = %self.collection, limit, "querying records");
        let response = self
            .client
            .get(self.query_url(filter, limit))
            .send()
            .await
            .map_err(|e| transport_error("query_records", e, BrowserBytesError::Store))?;
        check_status(&response, BrowserBytesError::Store)?;

        let text = response
            .text()
            .await
            .map_err(|e| transport_error("query_records", e, BrowserBytesError::Store))?;
        parse_page(&text)
    }
}

fn parse_created(text: &str) -> Result<Record> {
    serde_json::from_str(text)
        .map_err(|e| BrowserBytesError::store(format!("Unexpected create response: {e}")))
}

fn parse_page(text: &str) -> Result<Vec<Record>> {
    serde_json::from_str::<RecordPage>(text)
        .map(|page| page.items)
        .map_err(|e| BrowserBytesError::store(format!("Unexpected list response: {e}")))
}

/// Passphrase generator backed by a `{pws: [...]}` JSON endpoint
#[derive(Debug, Clone)]
pub struct HttpPassphraseGenerator {
    client: Client,
    url: Url,
}

impl HttpPassphraseGenerator {
    pub fn new(client: Client, url: Url) -> Self {
        Self { client, url }
    }

    pub fn from_config(config: &RemoteConfig) -> Result<Self> {
        Ok(Self::new(
            build_client(config)?,
            parse_url(&config.passphrase_url, "passphrase service URL")?,
        ))
    }
}

#[async_trait]
impl PassphraseGenerator for HttpPassphraseGenerator {
    async fn generate(&self) -> Result<String> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| transport_error("generate_passphrase", e, BrowserBytesError::Generator))?;
        check_status(&response, BrowserBytesError::Generator)?;

        let text = response
            .text()
            .await
            .map_err(|e| transport_error("generate_passphrase", e, BrowserBytesError::Generator))?;
        parse_passphrase(&text)
    }
}

fn parse_passphrase(text: &str) -> Result<String> {
    let response: PassphraseResponse = serde_json::from_str(text).map_err(|e| {
        BrowserBytesError::generator(format!("Unexpected passphrase response: {e}"))
    })?;
    response
        .pws
        .into_iter()
        .next()
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| BrowserBytesError::generator("Passphrase service returned no passphrase"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    fn backend(base: &str, collection: &str) -> PocketBaseBackend {
        PocketBaseBackend::new(Client::new(), Url::parse(base).unwrap(), collection)
    }

    fn client_with_timeout(secs: u64) -> Client {
        Client::builder()
            .timeout(Duration::from_secs(secs))
            .build()
            .unwrap()
    }

    /// Read one HTTP/1.1 request, including a `content-length` body
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + body_len {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Serve a single canned response and hand back the request it answered
    async fn serve_once(status: &'static str, body: &'static str) -> (Url, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let request = read_request(&mut socket).await;
            let response = format!(
                "HTTP/1.1 {status}\r\n\
                 content-type: application/json\r\n\
                 content-length: {}\r\n\
                 connection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            request
        });
        (url, handle)
    }

    /// Accept a connection, read the request and never answer
    async fn serve_stalled() -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}/", listener.local_addr().unwrap())).unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(socket);
        });
        url
    }

    fn new_record() -> NewRecord {
        NewRecord {
            name: "laptop".into(),
            passphrase: "Crisp Apple Yonder".into(),
            data: "{}".into(),
        }
    }

    #[test]
    fn test_records_url() {
        let url = backend("https://wtf.pockethost.io", "browserBytes").records_url();
        assert_eq!(
            url.as_str(),
            "https://wtf.pockethost.io/api/collections/browserBytes/records"
        );

        // A trailing slash or a path prefix on the base is kept once
        let url = backend("https://host.example/pb/", "havelocCreds").records_url();
        assert_eq!(
            url.as_str(),
            "https://host.example/pb/api/collections/havelocCreds/records"
        );
    }

    #[test]
    fn test_query_url_encodes_filter() {
        let filter = Filter::eq("passphrase", "Brave \"Owl\" & Co").unwrap();
        let url = backend("https://wtf.pockethost.io", "browserBytes").query_url(&filter, 1);

        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("page".into(), "1".into()),
                ("perPage".into(), "1".into()),
                ("filter".into(), r#"passphrase = "Brave \"Owl\" & Co""#.into()),
                ("passphrase".into(), "Brave \"Owl\" & Co".into()),
            ]
        );
        assert!(!url.query().unwrap().contains('"'));
    }

    #[test]
    fn test_parse_page() {
        let items = parse_page(
            r#"{"page":1,"perPage":1,"totalItems":1,"items":[
                {"id":"r1","name":"n","passphrase":"p","data":"{}"}]}"#,
        )
        .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "r1");

        assert!(parse_page(r#"{"items":[]}"#).unwrap().is_empty());
        assert!(matches!(parse_page("<html>"), Err(BrowserBytesError::Store(_))));
    }

    #[test]
    fn test_parse_created() {
        let record =
            parse_created(r#"{"id":"abc123","name":"n","passphrase":"p","data":"x"}"#).unwrap();
        assert_eq!(record.id, "abc123");
    }

    #[test]
    fn test_parse_passphrase() {
        assert_eq!(
            parse_passphrase(r#"{"pws":["Crisp Apple Yonder","Other"]}"#).unwrap(),
            "Crisp Apple Yonder"
        );
        for bad in [r#"{"pws":[]}"#, r#"{}"#, r#"{"pws":[" "]}"#, "nope"] {
            assert!(
                matches!(parse_passphrase(bad), Err(BrowserBytesError::Generator(_))),
                "accepted {bad}"
            );
        }
    }

    #[test]
    fn test_parse_page_without_passphrase_field() {
        let items = parse_page(r#"{"items":[{"id":"r1","name":"n","data":"{}"}]}"#).unwrap();
        assert_eq!(items[0].data, "{}");
        assert!(items[0].passphrase.is_empty());
    }

    #[tokio::test]
    async fn test_create_posts_record() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"id":"abc123","name":"laptop","passphrase":"Crisp Apple Yonder","data":"{}"}"#,
        )
        .await;
        let backend = PocketBaseBackend::new(client_with_timeout(5), url, "browserBytes");

        let record = backend.create(&new_record()).await.unwrap();
        assert_eq!(record.id, "abc123");

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/collections/browserBytes/records HTTP/1.1"));
        assert!(request.contains(r#""name":"laptop""#));
    }

    #[tokio::test]
    async fn test_create_non_success_status_is_store_error() {
        let (url, _server) = serve_once("500 Internal Server Error", "{}").await;
        let backend = PocketBaseBackend::new(client_with_timeout(5), url, "browserBytes");

        match backend.create(&new_record()).await {
            Err(BrowserBytesError::Store(message)) => assert_eq!(message, "API Error: 500"),
            other => panic!("expected a store error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_query_sends_filter_and_maps_status() {
        let (url, server) = serve_once("404 Not Found", r#"{"message":"missing"}"#).await;
        let backend = PocketBaseBackend::new(client_with_timeout(5), url, "browserBytes");
        let filter = Filter::eq("passphrase", "Crisp Apple Yonder").unwrap();

        match backend.query(&filter, 1).await {
            Err(BrowserBytesError::Store(message)) => assert_eq!(message, "API Error: 404"),
            other => panic!("expected a store error, got {other:?}"),
        }

        let request = server.await.unwrap();
        assert!(request
            .starts_with("GET /api/collections/browserBytes/records?page=1&perPage=1&filter="));
    }

    #[tokio::test]
    async fn test_query_returns_items() {
        let (url, _server) = serve_once(
            "200 OK",
            r#"{"page":1,"perPage":1,"items":[{"id":"r1","name":"laptop","data":{"a":1}}]}"#,
        )
        .await;
        let backend = PocketBaseBackend::new(client_with_timeout(5), url, "browserBytes");
        let filter = Filter::eq("passphrase", "Crisp Apple Yonder").unwrap();

        let items = backend.query(&filter, 1).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].data, r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn test_generator_reads_first_passphrase() {
        let (url, _server) = serve_once("200 OK", r#"{"pws":["Quiet Fox Meadow"]}"#).await;
        let generator = HttpPassphraseGenerator::new(client_with_timeout(5), url);

        assert_eq!(generator.generate().await.unwrap(), "Quiet Fox Meadow");
    }

    #[tokio::test]
    async fn test_generator_non_success_status_is_generator_error() {
        let (url, _server) = serve_once("503 Service Unavailable", "{}").await;
        let generator = HttpPassphraseGenerator::new(client_with_timeout(5), url);

        match generator.generate().await {
            Err(BrowserBytesError::Generator(message)) => assert_eq!(message, "API Error: 503"),
            other => panic!("expected a generator error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stalled_server_times_out() {
        let url = serve_stalled().await;
        let backend = PocketBaseBackend::new(client_with_timeout(1), url, "browserBytes");

        let result = backend.create(&new_record()).await;
        assert!(
            matches!(result, Err(BrowserBytesError::Timeout { operation: "create_record" })),
            "got {result:?}"
        );
    }

    #[test]
    fn test_from_config_rejects_bad_url() {
        let mut config = RemoteConfig::browser_bytes();
        config.base_url = "not a url".into();
        assert!(matches!(
            PocketBaseBackend::from_config(&config),
            Err(BrowserBytesError::Config(_))
        ));
    }
}
