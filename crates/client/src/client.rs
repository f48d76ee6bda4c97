//! HTTP adapter backing the query and mutation interfaces with a REST API.
//!
//! GET  {base}/collections/{query_key}?page=N&filter=..
//! POST {base}/mutations/{mutation_name}

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use rollcall_core::config::{RollcallConfig, DEFAULT_REQUEST_TIMEOUT_SECS};
use rollcall_core::offline::{MutationError, MutationInterface, MutationRequest, MutationResult};
use rollcall_core::query::{QueryInterface, QueryParams, QuerySnapshot};
use rollcall_core::records::Record;

use crate::error::{ClientError, Result};

const MAX_LOG_BODY_CHARS: usize = 512;
const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Collection endpoints answer either with a bare array or with `{"data": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CollectionResponse {
    Items(Vec<Record>),
    Envelope { data: Vec<Record> },
}

impl CollectionResponse {
    fn into_records(self) -> Vec<Record> {
        match self {
            Self::Items(items) | Self::Envelope { data: items } => items,
        }
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
    send_idempotency_key: bool,
}

impl RestClient {
    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("[RestClient] Response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("[RestClient] Response error ({}): {}", status, preview);
    }

    /// Create a client with the default request timeout.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API root, e.g. "https://api.example.com/v1"
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
            .expect("Failed to build HTTP client")
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token: None,
            send_idempotency_key: false,
        })
    }

    /// Builds the client from `ROLLCALL_API_URL` / `ROLLCALL_REQUEST_TIMEOUT_SECS`.
    pub fn from_config(config: &RollcallConfig) -> rollcall_core::Result<Self> {
        let base_url = config
            .api_base_url
            .as_deref()
            .ok_or_else(|| rollcall_core::Error::config("No API base URL configured"))?;
        Self::with_timeout(base_url, Duration::from_secs(config.request_timeout_secs))
            .map_err(|e| rollcall_core::Error::config(e.to_string()))
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Forward each request's idempotency key as an `Idempotency-Key` header. Only
    /// useful against backends that de-duplicate on it.
    pub fn with_idempotency_header(mut self, enabled: bool) -> Self {
        self.send_idempotency_key = enabled;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn headers(&self, idempotency_key: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = &self.bearer_token {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ClientError::invalid_request("Invalid access token format"))?;
            headers.insert(AUTHORIZATION, auth_value);
        }

        if let (true, Some(key)) = (self.send_idempotency_key, idempotency_key) {
            let key_value = HeaderValue::from_str(key)
                .map_err(|_| ClientError::invalid_request("Invalid idempotency key format"))?;
            headers.insert(IDEMPOTENCY_KEY_HEADER, key_value);
        }

        Ok(headers)
    }

    fn collection_url(&self, query_key: &str, params: &QueryParams) -> String {
        let mut url = format!(
            "{}/collections/{}",
            self.base_url,
            urlencoding::encode(query_key)
        );
        let query = params
            .iter()
            .map(|(name, value)| {
                format!(
                    "{}={}",
                    urlencoding::encode(name),
                    urlencoding::encode(&query_value(value))
                )
            })
            .collect::<Vec<_>>();
        if !query.is_empty() {
            url.push('?');
            url.push_str(&query.join("&"));
        }
        url
    }

    /// Read the body, logging it, and turn non-success statuses into API errors.
    async fn read_body(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            #[derive(Deserialize)]
            struct ApiErrorBody {
                message: String,
            }
            if let Ok(error) = serde_json::from_str::<ApiErrorBody>(&body) {
                return Err(ClientError::api(status.as_u16(), error.message));
            }
            return Err(ClientError::api(
                status.as_u16(),
                format!("Request failed: {}", body),
            ));
        }
        Ok(body)
    }

    /// Fetch one page of a collection.
    ///
    /// GET /collections/{query_key}?{params}
    pub async fn fetch_page(&self, query_key: &str, params: &QueryParams) -> Result<Vec<Record>> {
        let url = self.collection_url(query_key, params);
        debug!("[RestClient] fetch URL: {}", url);

        let response = self
            .client
            .get(&url)
            .headers(self.headers(None)?)
            .send()
            .await?;
        let body = Self::read_body(response).await?;
        let parsed: CollectionResponse = serde_json::from_str(&body)?;
        Ok(parsed.into_records())
    }

    /// Perform a named mutation. An empty or non-object body yields `None`.
    ///
    /// POST /mutations/{mutation_name}
    pub async fn post_mutation(&self, request: &MutationRequest) -> Result<Option<Record>> {
        if request.mutation_name.trim().is_empty() {
            return Err(ClientError::invalid_request("Mutation name is empty"));
        }
        let url = format!(
            "{}/mutations/{}",
            self.base_url,
            urlencoding::encode(&request.mutation_name)
        );

        let response = self
            .client
            .post(&url)
            .headers(self.headers(request.idempotency_key.as_deref())?)
            .json(&request.payload)
            .send()
            .await?;
        let body = Self::read_body(response).await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let value: Value = serde_json::from_str(&body)?;
        Ok(Record::from_value(value))
    }
}

#[async_trait]
impl QueryInterface for RestClient {
    async fn fetch(&self, query_key: &str, params: &QueryParams) -> QuerySnapshot {
        match self.fetch_page(query_key, params).await {
            Ok(records) => QuerySnapshot::success(records),
            Err(err) => {
                warn!("[RestClient] Query '{}' failed: {}", query_key, err);
                QuerySnapshot::failure(err.to_string())
            }
        }
    }
}

#[async_trait]
impl MutationInterface for RestClient {
    async fn mutate(&self, request: &MutationRequest) -> MutationResult {
        self.post_mutation(request).await.map_err(|err| {
            let mapped = MutationError::from(err);
            debug!(
                "[RestClient] Mutation '{}' failed ({}): {}",
                request.mutation_name,
                mapped.code(),
                mapped
            );
            mapped
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::Mutex as TokioMutex;

    #[derive(Debug, Clone)]
    struct CapturedRequest {
        request_line: String,
        headers: HashMap<String, String>,
        body: String,
    }

    #[derive(Debug, Clone)]
    struct MockResponse {
        status: u16,
        body: String,
    }

    impl MockResponse {
        fn new(status: u16, body: impl Into<String>) -> Self {
            Self {
                status,
                body: body.into(),
            }
        }
    }

    fn header_end_offset(buffer: &[u8]) -> Option<usize> {
        buffer.windows(4).position(|window| window == b"\r\n\r\n")
    }

    async fn read_http_request(stream: &mut tokio::net::TcpStream) -> Option<CapturedRequest> {
        let mut buffer = Vec::new();
        loop {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                return None;
            }
            buffer.extend_from_slice(&chunk[..read]);
            if header_end_offset(&buffer).is_some() {
                break;
            }
        }

        let header_end = header_end_offset(&buffer)?;
        let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
        let mut lines = head.lines();
        let request_line = lines.next()?.to_string();

        let mut headers = HashMap::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        let content_length = headers
            .get("content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);

        let mut body = buffer[header_end + 4..].to_vec();
        while body.len() < content_length {
            let mut chunk = [0_u8; 2048];
            let read = stream.read(&mut chunk).await.ok()?;
            if read == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..read]);
        }

        Some(CapturedRequest {
            request_line,
            headers,
            body: String::from_utf8_lossy(&body).to_string(),
        })
    }

    fn status_text(status: u16) -> &'static str {
        match status {
            200 => "OK",
            201 => "Created",
            204 => "No Content",
            422 => "Unprocessable Entity",
            500 => "Internal Server Error",
            _ => "Error",
        }
    }

    async fn write_http_response(
        stream: &mut tokio::net::TcpStream,
        status: u16,
        body: &str,
    ) -> std::io::Result<()> {
        let response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            status_text(status),
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        stream.flush().await
    }

    async fn start_mock_server(
        responses: Vec<MockResponse>,
    ) -> (
        String,
        Arc<TokioMutex<Vec<CapturedRequest>>>,
        tokio::task::JoinHandle<()>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        let captured = Arc::new(TokioMutex::new(Vec::<CapturedRequest>::new()));
        let scripted = Arc::new(TokioMutex::new(VecDeque::from(responses)));
        let captured_clone = Arc::clone(&captured);

        let handle = tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(value) => value,
                    Err(_) => break,
                };
                let Some(request) = read_http_request(&mut stream).await else {
                    continue;
                };
                captured_clone.lock().await.push(request);
                let response = scripted
                    .lock()
                    .await
                    .pop_front()
                    .unwrap_or_else(|| MockResponse::new(500, r#"{"message":"unexpected"}"#));
                let _ = write_http_response(&mut stream, response.status, &response.body).await;
            }
        });

        (format!("http://{}", addr), captured, handle)
    }

    #[tokio::test]
    async fn fetch_page_sends_params_and_reads_bare_arrays() {
        let (base_url, captured, server) = start_mock_server(vec![MockResponse::new(
            200,
            r#"[{"id":1,"name":"Ada"},{"id":2,"name":"Grace"}]"#,
        )])
        .await;

        let client = RestClient::new(&base_url);
        let params = QueryParams::new().with("groupId", "g 1").for_page(2);
        let records = client
            .fetch_page("members", &params)
            .await
            .expect("fetch page");

        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("name"), Some(&json!("Grace")));
        let requests = captured.lock().await.clone();
        assert_eq!(
            requests[0].request_line,
            "GET /collections/members?groupId=g%201&page=2 HTTP/1.1"
        );
        assert!(!requests[0].headers.contains_key("authorization"));

        server.abort();
    }

    #[tokio::test]
    async fn query_interface_reports_envelopes_and_failures() {
        let (base_url, _captured, server) = start_mock_server(vec![
            MockResponse::new(200, r#"{"data":[{"id":"a"}]}"#),
            MockResponse::new(500, r#"{"message":"database down"}"#),
        ])
        .await;

        let client = RestClient::new(&base_url).with_bearer_token("secret");
        let ok = client.fetch("members", &QueryParams::new().for_page(1)).await;
        assert!(ok.is_success);
        assert_eq!(ok.data.map(|d| d.len()), Some(1));

        let failed = client.fetch("members", &QueryParams::new().for_page(2)).await;
        assert!(failed.is_error);
        assert!(failed.data.is_none());
        assert!(failed
            .error
            .unwrap_or_default()
            .contains("database down"));

        server.abort();
    }

    #[tokio::test]
    async fn mutate_posts_payload_without_idempotency_header_by_default() {
        let (base_url, captured, server) = start_mock_server(vec![
            MockResponse::new(200, r#"{"id":7,"checkedIn":true}"#),
            MockResponse::new(204, ""),
        ])
        .await;

        let client = RestClient::new(&base_url);
        let payload = Record::from_value(json!({ "guestId": 7 })).expect("object");
        let request =
            MutationRequest::new("checkIn", payload.clone()).with_idempotency_key("sha256:ab");

        let result = client.mutate(&request).await.expect("mutate");
        assert_eq!(result.and_then(|r| r.get("checkedIn").cloned()), Some(json!(true)));

        let client = client.with_idempotency_header(true);
        let result = client.mutate(&request).await.expect("mutate again");
        assert_eq!(result, None);

        let requests = captured.lock().await.clone();
        assert_eq!(requests[0].request_line, "POST /mutations/checkIn HTTP/1.1");
        assert_eq!(
            serde_json::from_str::<Value>(&requests[0].body).expect("json body"),
            json!({ "guestId": 7 })
        );
        assert!(!requests[0].headers.contains_key(IDEMPOTENCY_KEY_HEADER));
        assert_eq!(
            requests[1].headers.get(IDEMPOTENCY_KEY_HEADER).map(String::as_str),
            Some("sha256:ab")
        );

        server.abort();
    }

    #[tokio::test]
    async fn server_rejection_is_not_a_network_failure() {
        let (base_url, _captured, server) = start_mock_server(vec![MockResponse::new(
            422,
            r#"{"message":"guest already checked in"}"#,
        )])
        .await;

        let client = RestClient::new(&base_url);
        let err = client
            .mutate(&MutationRequest::new("checkIn", Record::new()))
            .await
            .expect_err("rejected");
        assert_eq!(
            err,
            MutationError::rejected(Some(422), "guest already checked in")
        );

        server.abort();
    }

    #[tokio::test]
    async fn unreachable_server_maps_to_network_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener addr");
        drop(listener);

        let client = RestClient::new(&format!("http://{}", addr));
        let err = client
            .mutate(&MutationRequest::new("checkIn", Record::new()))
            .await
            .expect_err("connection refused");
        assert!(err.is_network_unreachable());
        assert_eq!(err.code(), "network_unreachable");
    }

    #[test]
    fn from_config_requires_a_base_url() {
        assert!(RestClient::from_config(&RollcallConfig::default()).is_err());

        let config = RollcallConfig {
            api_base_url: Some("http://localhost:8080/api/".to_string()),
            ..RollcallConfig::default()
        };
        let client = RestClient::from_config(&config).expect("client");
        assert_eq!(client.base_url(), "http://localhost:8080/api");
    }
}
