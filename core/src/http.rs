//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! Requests and responses are plain data. `HubClient` builds `HttpRequest`
//! values and classifies `HttpResponse` values without touching the network;
//! a `Transport` (see `transport.rs`) performs the actual round-trip.
//!
//! Header names are stored lowercase so lookups are a plain string compare.

use std::borrow::Cow;
use std::fmt;

pub const CONTENT_TYPE: &str = "content-type";
pub const X_REQUESTED_WITH: &str = "x-requested-with";
pub const COOKIE: &str = "cookie";
pub const USER_AGENT: &str = "user-agent";

pub const APPLICATION_JSON: &str = "application/json";

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Only POST and PUT carry a JSON body.
    pub fn allows_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(format!("unsupported method: {other}")),
        }
    }
}

/// An HTTP request described as plain data.
///
/// `body` holds the encoded payload (JSON text or a multipart form); its
/// media type is in the `content-type` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// An HTTP response described as plain data.
///
/// `body` is kept as raw bytes so downloads survive intact; classification
/// reads it through `text()`.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE)
    }

    pub fn is_json(&self) -> bool {
        self.content_type()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains(APPLICATION_JSON))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The body as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(content_type: Option<&str>, status: u16) -> HttpResponse {
        HttpResponse {
            status,
            headers: content_type
                .map(|ct| vec![("Content-Type".to_string(), ct.to_string())])
                .unwrap_or_default(),
            body: Vec::new(),
        }
    }

    #[test]
    fn header_lookup_ignores_case() {
        let resp = response(Some("application/json"), 200);
        assert_eq!(resp.header("content-type"), Some("application/json"));
        assert_eq!(resp.header("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn json_detection_accepts_charset_suffix() {
        assert!(response(Some("application/json; charset=utf-8"), 200).is_json());
        assert!(!response(Some("text/html; charset=utf-8"), 200).is_json());
        assert!(!response(None, 200).is_json());
    }

    #[test]
    fn success_range_is_2xx() {
        assert!(response(None, 200).is_success());
        assert!(response(None, 204).is_success());
        assert!(!response(None, 199).is_success());
        assert!(!response(None, 301).is_success());
        assert!(!response(None, 400).is_success());
    }

    #[test]
    fn text_replaces_invalid_utf8() {
        let resp = HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: vec![b'o', b'k', 0xff],
        };
        assert_eq!(resp.text(), "ok\u{fffd}");
    }

    #[test]
    fn only_post_and_put_allow_body() {
        assert!(HttpMethod::Post.allows_body());
        assert!(HttpMethod::Put.allows_body());
        assert!(!HttpMethod::Get.allows_body());
        assert!(!HttpMethod::Delete.allows_body());
    }

    #[test]
    fn method_parses_case_insensitively() {
        assert_eq!("delete".parse::<HttpMethod>(), Ok(HttpMethod::Delete));
        assert_eq!("PUT".parse::<HttpMethod>(), Ok(HttpMethod::Put));
        assert!("PATCH".parse::<HttpMethod>().is_err());
    }
}
