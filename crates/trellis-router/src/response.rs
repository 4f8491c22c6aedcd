//! HTTP response type.

use std::collections::HashMap;

/// What an action hands back to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// No body.
    Empty,
    /// A text body; the content type is guessed when not already set.
    Text(String),
    /// A JSON document.
    Json(serde_json::Value),
    /// Raw bytes, passed through without touching headers.
    Bytes(Vec<u8>),
}

impl From<String> for Content {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Content {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<serde_json::Value> for Content {
    fn from(v: serde_json::Value) -> Self {
        Self::Json(v)
    }
}

impl From<Vec<u8>> for Content {
    fn from(b: Vec<u8>) -> Self {
        Self::Bytes(b)
    }
}

/// An HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Vec<u8>,
}

impl Response {
    /// Creates a new response with the given status.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    /// Creates a 200 OK response.
    pub fn ok() -> Self {
        Self::new(200)
    }

    /// Sets a header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets the status code.
    #[must_use]
    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the body as a string.
    pub fn body_string(&self) -> Option<String> {
        String::from_utf8(self.body.clone()).ok()
    }

    /// Gets a header value.
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Returns the `Content-Type` header.
    pub fn content_type(&self) -> Option<&str> {
        self.get_header("Content-Type")
    }

    /// Returns the status text for the current status code.
    pub fn status_text(&self) -> &'static str {
        status_text(self.status)
    }

    /// Stores an action's content as the body, filling in
    /// `Content-Length` and a default `Content-Type`.
    pub fn set_content(&mut self, content: Content) {
        match content {
            Content::Empty => {
                self.body.clear();
                self.set_length();
                self.default_type("application/octet-stream");
            }
            Content::Json(value) => {
                // Serializing a `Value` cannot fail.
                self.body = serde_json::to_vec(&value).unwrap_or_default();
                self.set_length();
                self.default_type("application/json");
            }
            Content::Text(text) => {
                self.body = text.into_bytes();
                self.set_length();
                if let Some(guess) = guess_content_type(&self.body) {
                    self.default_type(guess);
                }
            }
            Content::Bytes(bytes) => self.body = bytes,
        }
    }

    fn set_length(&mut self) {
        self.headers
            .insert("Content-Length".to_string(), self.body.len().to_string());
    }

    fn default_type(&mut self, content_type: &str) {
        self.headers
            .entry("Content-Type".to_string())
            .or_insert_with(|| content_type.to_string());
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::ok()
    }
}

/// Guesses HTML or JSON from the first non-blank byte.
fn guess_content_type(body: &[u8]) -> Option<&'static str> {
    match body.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'<') => Some("text/html; charset=utf-8"),
        Some(b'{') => Some("application/json"),
        _ => None,
    }
}

/// Returns the reason phrase for a status code.
pub fn status_text(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        101 => "Switching Protocols",
        102 => "Processing",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        207 => "Multi-Status",
        208 => "Already Reported",
        226 => "IM Used",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        305 => "Use Proxy",
        307 => "Temporary Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Request Entity Too Large",
        414 => "Request-URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Requested Range Not Satisfiable",
        417 => "Expectation Failed",
        418 => "I'm a teapot",
        422 => "Unprocessable Entity",
        423 => "Locked",
        424 => "Failed Dependency",
        426 => "Upgrade Required",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        506 => "Variant Also Negotiates",
        507 => "Insufficient Storage",
        508 => "Loop Detected",
        510 => "Not Extended",
        _ => "Unknown",
    }
}
