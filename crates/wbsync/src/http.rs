use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// HTTP methods used by the marketplace and catalog services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

/// HTTP headers represented as key/value pairs.
///
/// Header names are treated case-insensitively by helper functions.
pub type HttpHeaders = Vec<(String, String)>;

/// A minimal HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
    /// Per-request timeout; the transport default applies when `None`.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Build a JSON POST request.
    #[must_use]
    pub fn post_json(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body,
            timeout: None,
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a bearer token, skipping empty tokens.
    #[must_use]
    pub fn bearer(self, token: &str) -> Self {
        if token.is_empty() {
            return self;
        }
        self.header("Authorization", format!("Bearer {token}"))
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A minimal HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as lossy UTF-8, for diagnostics.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("http transport error: {message}")]
    Transport { message: String, retryable: bool },

    #[error("http request timed out")]
    Timeout,

    #[error("no mock response registered for {method} {url}")]
    NoMockResponse { method: String, url: String },
}

impl HttpError {
    /// Create a non-retryable transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }
}

/// Transport boundary for all HTTP I/O.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// Get the first header value matching `name` (case-insensitive).
#[must_use]
pub fn header_get<'a>(headers: &'a HttpHeaders, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

pub mod reqwest_transport {
    use super::*;

    use std::io::ErrorKind;

    /// A real HTTP transport backed by a shared, pooled reqwest client.
    #[derive(Clone)]
    pub struct ReqwestTransport {
        client: reqwest::Client,
    }

    impl ReqwestTransport {
        pub fn new(client: reqwest::Client) -> Self {
            Self { client }
        }

        pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
            let client = reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| HttpError::transport(e.to_string()))?;
            Ok(Self { client })
        }
    }

    /// Map a reqwest error, flagging connection drops as retryable.
    pub(crate) fn classify(err: reqwest::Error) -> HttpError {
        if err.is_timeout() {
            return HttpError::Timeout;
        }
        let retryable = err.is_connect() || has_reset_source(&err);
        HttpError::Transport {
            message: err.to_string(),
            retryable,
        }
    }

    fn has_reset_source(err: &reqwest::Error) -> bool {
        let mut source = std::error::Error::source(err);
        while let Some(inner) = source {
            if let Some(io) = inner.downcast_ref::<std::io::Error>() {
                return matches!(
                    io.kind(),
                    ErrorKind::ConnectionReset
                        | ErrorKind::ConnectionAborted
                        | ErrorKind::BrokenPipe
                        | ErrorKind::UnexpectedEof
                );
            }
            source = inner.source();
        }
        false
    }

    #[async_trait]
    impl HttpTransport for ReqwestTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let method = match request.method {
                HttpMethod::Get => reqwest::Method::GET,
                HttpMethod::Post => reqwest::Method::POST,
            };

            let mut builder = self.client.request(method, &request.url);
            for (k, v) in request.headers {
                builder = builder.header(&k, &v);
            }
            if let Some(timeout) = request.timeout {
                builder = builder.timeout(timeout);
            }
            if !request.body.is_empty() {
                builder = builder.body(request.body);
            }

            let resp = builder.send().await.map_err(classify)?;

            let status = resp.status().as_u16();
            let mut headers: HttpHeaders = Vec::new();
            for (name, value) in resp.headers().iter() {
                headers.push((
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                ));
            }

            let body = resp.bytes().await.map_err(classify)?.to_vec();

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        }
    }
}

// ---------- Test-only mock transport ----------

#[cfg(test)]
use std::collections::{HashMap, VecDeque};
#[cfg(test)]
use std::sync::{Arc, Mutex, MutexGuard};

#[cfg(test)]
type MockHandler = dyn Fn(&HttpRequest) -> Option<Result<HttpResponse, HttpError>> + Send + Sync;

#[cfg(test)]
type Route = (HttpMethod, String);

/// In-memory transport for unit tests.
///
/// Queued replies for a method + URL are served in FIFO order. Once a route
/// runs dry the optional handler answers, so tests can react to the request
/// body (listing cursors, upload batches). Every request is recorded.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    handler: Option<Arc<MockHandler>>,
}

#[cfg(test)]
#[derive(Default)]
struct MockState {
    queued: HashMap<Route, VecDeque<Result<HttpResponse, HttpError>>>,
    seen: Vec<HttpRequest>,
}

#[cfg(test)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&HttpRequest) -> Option<Result<HttpResponse, HttpError>> + Send + Sync + 'static,
    {
        Self {
            state: Arc::default(),
            handler: Some(Arc::new(handler)),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push_response(&self, method: HttpMethod, url: impl Into<String>, response: HttpResponse) {
        self.enqueue((method, url.into()), Ok(response));
    }

    pub fn push_error(&self, method: HttpMethod, url: impl Into<String>, error: HttpError) {
        self.enqueue((method, url.into()), Err(error));
    }

    fn enqueue(&self, route: Route, reply: Result<HttpResponse, HttpError>) {
        self.state().queued.entry(route).or_default().push_back(reply);
    }

    /// Requests in the order they were sent.
    #[must_use]
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.state().seen.clone()
    }
}

/// JSON reply with the given status.
#[cfg(test)]
pub fn json_response(status: u16, body: serde_json::Value) -> HttpResponse {
    HttpResponse {
        status,
        headers: vec![("Content-Type".to_string(), "application/json".to_string())],
        body: body.to_string().into_bytes(),
    }
}

#[cfg(test)]
#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let queued = {
            let mut state = self.state();
            state.seen.push(request.clone());
            state
                .queued
                .get_mut(&(request.method, request.url.clone()))
                .and_then(VecDeque::pop_front)
        };

        if let Some(reply) = queued {
            return reply;
        }
        if let Some(handler) = &self.handler
            && let Some(reply) = handler(&request)
        {
            return reply;
        }
        Err(HttpError::NoMockResponse {
            method: request.method.as_str().to_string(),
            url: request.url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use reqwest_transport::ReqwestTransport;

    const UPDATE_URL: &str = "https://content-api.wildberries.ru/content/v2/cards/update";

    /// Read one HTTP/1.1 request: head plus a `Content-Length` body.
    async fn read_request(stream: &mut tokio::net::TcpStream) -> (String, Vec<u8>) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let head_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending headers");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
        let length: usize = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .map(|v| v.trim().parse().unwrap())
            .unwrap_or(0);

        let mut body = buf[head_end..].to_vec();
        while body.len() < length {
            let n = stream.read(&mut chunk).await.unwrap();
            body.extend_from_slice(&chunk[..n]);
        }
        (head, body)
    }

    #[test]
    fn header_lookup_ignores_case() {
        let headers: HttpHeaders = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            ("content-type".to_string(), "text/plain".to_string()),
        ];
        assert_eq!(header_get(&headers, "CONTENT-TYPE"), Some("application/json"));
        assert_eq!(header_get(&headers, "authorization"), None);
    }

    #[test]
    fn upload_request_carries_json_bearer_and_timeout() {
        let req = HttpRequest::post_json(UPDATE_URL, b"[]".to_vec())
            .bearer("wb-token")
            .timeout(Duration::from_secs(60));

        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(header_get(&req.headers, "content-type"), Some("application/json"));
        assert_eq!(header_get(&req.headers, "authorization"), Some("Bearer wb-token"));
        assert_eq!(req.timeout, Some(Duration::from_secs(60)));
    }

    #[test]
    fn empty_token_sends_no_authorization() {
        let req = HttpRequest::post_json("http://catalog.test/api/globalids", Vec::new()).bearer("");
        assert_eq!(header_get(&req.headers, "authorization"), None);
    }

    #[test]
    fn only_2xx_is_success() {
        let mut resp = json_response(200, json!({"error": false}));
        assert!(resp.is_success());
        resp.status = 400;
        assert!(!resp.is_success());
        assert_eq!(resp.body_text(), r#"{"error":false}"#);
    }

    #[tokio::test]
    async fn mock_serves_queue_in_order_then_handler() {
        let transport = MockTransport::with_handler(|req| {
            req.url
                .ends_with("/api/globalids")
                .then(|| Ok(json_response(200, json!([1, 2, 3]))))
        });
        transport.push_response(HttpMethod::Post, UPDATE_URL, json_response(400, json!({})));
        transport.push_error(
            HttpMethod::Post,
            UPDATE_URL,
            HttpError::Transport {
                message: "connection reset".to_string(),
                retryable: true,
            },
        );

        let first = transport
            .send(HttpRequest::post_json(UPDATE_URL, Vec::new()))
            .await
            .unwrap();
        assert_eq!(first.status, 400);

        let second = transport
            .send(HttpRequest::post_json(UPDATE_URL, Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(second, HttpError::Transport { retryable: true, .. }));

        let ids = transport
            .send(HttpRequest::post_json("http://catalog.test/api/globalids", Vec::new()))
            .await
            .unwrap();
        assert_eq!(ids.body, b"[1,2,3]".to_vec());

        let unrouted = transport
            .send(HttpRequest::post_json(UPDATE_URL, Vec::new()))
            .await
            .unwrap_err();
        match unrouted {
            HttpError::NoMockResponse { method, url } => {
                assert_eq!(method, "POST");
                assert_eq!(url, UPDATE_URL);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(transport.requests().len(), 4);
    }

    #[tokio::test]
    async fn reqwest_posts_body_and_reads_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let (head, body) = read_request(&mut stream).await;

            let reply = br#"{"error":false}"#;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                reply.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.write_all(reply).await.unwrap();
            (head, body)
        });

        let transport = ReqwestTransport::with_timeout(Duration::from_secs(5)).unwrap();
        let req = HttpRequest::post_json(
            format!("http://{addr}/content/v2/cards/update"),
            br#"[{"nmID":42}]"#.to_vec(),
        )
        .bearer("wb-token");

        let resp = transport.send(req).await.unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.header("content-type"), Some("application/json"));
        assert_eq!(resp.body_text(), r#"{"error":false}"#);

        let (head, body) = server.await.unwrap();
        assert!(head.starts_with("post /content/v2/cards/update "), "{head}");
        assert!(head.contains("authorization: bearer wb-token"));
        assert_eq!(body, br#"[{"nmID":42}]"#.to_vec());
    }

    #[tokio::test]
    async fn reqwest_times_out_on_silent_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let transport = ReqwestTransport::new(reqwest::Client::new());
        let req = HttpRequest::post_json(format!("http://{addr}/api/titles"), b"{}".to_vec())
            .timeout(Duration::from_millis(100));

        let err = transport.send(req).await.unwrap_err();
        assert!(matches!(err, HttpError::Timeout));
        server.abort();
    }

    #[tokio::test]
    async fn refused_connection_is_retryable() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let transport = ReqwestTransport::new(reqwest::Client::new());
        let err = transport
            .send(HttpRequest::post_json(format!("http://{addr}/"), Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Transport { retryable: true, .. }));
    }

    #[tokio::test]
    async fn malformed_url_is_not_retryable() {
        let transport = ReqwestTransport::new(reqwest::Client::new());
        let err = transport
            .send(HttpRequest::post_json("content-api without scheme", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Transport { retryable: false, .. }));
    }
}
