//! Stateless HTTP request builder and response classifier for the hub API.
//!
//! # Design
//! `HubClient` holds only the base URL and a few fixed headers and carries no
//! mutable state between calls. `build_request` produces an `HttpRequest`
//! and `parse_response` turns an `HttpResponse` into either the decoded JSON
//! value or a classified `ApiError`. The round-trip in between belongs to a
//! `Transport`, which keeps this half deterministic and easy to test.

use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::config::ClientConfig;
use crate::error::{ApiError, Result};
use crate::http::{
    HttpMethod, HttpRequest, HttpResponse, APPLICATION_JSON, CONTENT_TYPE, COOKIE, USER_AGENT,
    X_REQUESTED_WITH,
};
use crate::multipart::MultipartForm;

/// Value of `X-Requested-With`; marks the call as programmatic so the server
/// does not answer with a page.
pub const XHR_MARKER: &str = "XMLHttpRequest";

/// Synchronous, stateless request builder and response classifier.
#[derive(Debug, Clone)]
pub struct HubClient {
    base_url: String,
    session_cookie: Option<String>,
    user_agent: Option<String>,
}

impl HubClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            session_cookie: None,
            user_agent: None,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            session_cookie: config.session_cookie.clone(),
            user_agent: Some(config.user_agent.clone()),
            ..Self::new(&config.base_url)
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join `endpoint` onto the base URL with exactly one slash.
    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Build a request for `endpoint`. `body` is attached only for POST and
    /// PUT; for GET and DELETE it is dropped.
    pub fn build_request(
        &self,
        endpoint: &str,
        method: HttpMethod,
        body: Option<&Value>,
    ) -> Result<HttpRequest> {
        let body = match body {
            Some(value) if method.allows_body() => Some(
                serde_json::to_vec(value).map_err(|e| ApiError::Serialization(e.to_string()))?,
            ),
            Some(_) => {
                warn!(%method, endpoint, "dropping request body for method without body");
                None
            }
            None => None,
        };
        let payload = body.map(|bytes| (APPLICATION_JSON.to_string(), bytes));
        Ok(self.assemble(endpoint, method, payload))
    }

    /// Build a multipart POST carrying `form`.
    pub fn build_upload(&self, endpoint: &str, form: MultipartForm) -> HttpRequest {
        let content_type = form.content_type();
        self.assemble(endpoint, HttpMethod::Post, Some((content_type, form.into_body())))
    }

    fn assemble(
        &self,
        endpoint: &str,
        method: HttpMethod,
        payload: Option<(String, Vec<u8>)>,
    ) -> HttpRequest {
        let mut headers = vec![(X_REQUESTED_WITH.to_string(), XHR_MARKER.to_string())];
        let body = payload.map(|(content_type, bytes)| {
            headers.push((CONTENT_TYPE.to_string(), content_type));
            bytes
        });
        if let Some(cookie) = &self.session_cookie {
            headers.push((COOKIE.to_string(), cookie.clone()));
        }
        if let Some(agent) = &self.user_agent {
            headers.push((USER_AGENT.to_string(), agent.clone()));
        }
        HttpRequest {
            method,
            url: self.url_for(endpoint),
            headers,
            body,
        }
    }

    /// Classify a response received for `endpoint`.
    ///
    /// Order: 404, 500, then JSON vs. non-JSON content, then the 2xx check.
    /// A non-JSON 2xx body yields `{"success": true}`.
    pub fn parse_response(&self, endpoint: &str, response: HttpResponse) -> Result<Value> {
        log_response(endpoint, &response);
        let result = classify(endpoint, &response);
        log_failure(endpoint, &result);
        result
    }

    /// Classify a download. Failures follow the same rules as
    /// `parse_response`; a 2xx body is returned as raw bytes whatever its
    /// content type.
    pub fn parse_download(&self, endpoint: &str, response: HttpResponse) -> Result<Vec<u8>> {
        log_response(endpoint, &response);
        let result = check_status(endpoint, &response).map(|()| response.body);
        log_failure(endpoint, &result);
        result
    }
}

fn log_response(endpoint: &str, response: &HttpResponse) {
    debug!(
        endpoint,
        status = response.status,
        content_type = response.content_type().unwrap_or(""),
        bytes = response.body.len(),
        "received response"
    );
}

fn log_failure<T>(endpoint: &str, result: &Result<T>) {
    if let Err(err) = result {
        error!(endpoint, error = %err, "API request failed");
    }
}

fn classify(endpoint: &str, response: &HttpResponse) -> Result<Value> {
    check_status(endpoint, response)?;
    if response.is_json() {
        return parse_json(response);
    }
    Ok(json!({ "success": true }))
}

/// `Ok` for a 2xx response; otherwise the classified failure.
fn check_status(endpoint: &str, response: &HttpResponse) -> Result<()> {
    let status = response.status;
    match status {
        404 => {
            return Err(ApiError::NotFound {
                endpoint: endpoint.to_string(),
            })
        }
        500 => return Err(ApiError::ServerError),
        _ if response.is_success() => return Ok(()),
        _ => {}
    }

    if response.is_json() {
        let value = parse_json(response)?;
        return Err(match error_field(&value) {
            Some(message) => ApiError::Application {
                status,
                message: message.to_string(),
            },
            None => ApiError::Http { status },
        });
    }

    Err(if response.body.is_empty() {
        ApiError::Http { status }
    } else {
        ApiError::Application {
            status,
            message: response.text().into_owned(),
        }
    })
}

fn parse_json(response: &HttpResponse) -> Result<Value> {
    serde_json::from_slice(&response.body).map_err(|e| ApiError::Transport(e.to_string()))
}

fn error_field(value: &Value) -> Option<&str> {
    value
        .get("error")
        .and_then(Value::as_str)
        .filter(|message| !message.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HubClient {
        HubClient::new("http://localhost:5000")
    }

    fn json_response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: body.as_bytes().to_vec(),
        }
    }

    fn text_response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: vec![("content-type".to_string(), "text/plain; charset=utf-8".to_string())],
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn build_get_carries_xhr_marker_only() {
        let req = client().build_request("api/users", HttpMethod::Get, None).unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.url, "http://localhost:5000/api/users");
        assert_eq!(req.header("x-requested-with"), Some("XMLHttpRequest"));
        assert!(req.header("content-type").is_none());
        assert!(req.body.is_none());
    }

    #[test]
    fn build_post_serializes_body() {
        let body = json!({"username": "ana", "email": "a@b.com", "role": "admin"});
        let req = client()
            .build_request("api/users", HttpMethod::Post, Some(&body))
            .unwrap();
        assert_eq!(req.header("content-type"), Some("application/json"));
        let sent: Value = serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(sent, body);
    }

    #[test]
    fn build_delete_drops_body() {
        let body = json!({"ignored": true});
        let req = client()
            .build_request("api/users/3", HttpMethod::Delete, Some(&body))
            .unwrap();
        assert!(req.body.is_none());
        assert!(req.header("content-type").is_none());
    }

    #[test]
    fn url_join_uses_single_slash() {
        let c = HubClient::new("http://localhost:5000/");
        assert_eq!(c.url_for("/api/weather"), "http://localhost:5000/api/weather");
        assert_eq!(c.url_for("api/weather"), "http://localhost:5000/api/weather");
    }

    #[test]
    fn empty_base_url_yields_root_relative_path() {
        let c = HubClient::new("");
        assert_eq!(c.url_for("users"), "/users");
    }

    #[test]
    fn config_headers_are_attached() {
        let config = ClientConfig {
            base_url: "http://hub.local".to_string(),
            session_cookie: Some("session=abc".to_string()),
            user_agent: "hubctl/test".to_string(),
        };
        let req = HubClient::from_config(&config)
            .build_request("api/user/settings", HttpMethod::Get, None)
            .unwrap();
        assert_eq!(req.header("cookie"), Some("session=abc"));
        assert_eq!(req.header("user-agent"), Some("hubctl/test"));
    }

    #[test]
    fn json_success_is_returned_unchanged() {
        let value = client()
            .parse_response("api/users", json_response(201, r#"{"message":"User created","id":7}"#))
            .unwrap();
        assert_eq!(value, json!({"message": "User created", "id": 7}));
    }

    #[test]
    fn json_primitives_pass_through() {
        let value = client().parse_response("x", json_response(200, "42")).unwrap();
        assert_eq!(value, json!(42));
    }

    #[test]
    fn not_found_names_endpoint_regardless_of_body() {
        let err = client()
            .parse_response("users/999", json_response(404, r#"{"error":"User not found"}"#))
            .unwrap_err();
        assert_eq!(
            err,
            ApiError::NotFound {
                endpoint: "users/999".to_string()
            }
        );
    }

    #[test]
    fn server_error_ignores_body() {
        let err = client()
            .parse_response("api/weather", json_response(500, r#"{"error":"boom"}"#))
            .unwrap_err();
        assert_eq!(err, ApiError::ServerError);
    }

    #[test]
    fn json_error_field_becomes_message() {
        let err = client()
            .parse_response("api/users", json_response(400, r#"{"error":"Invalid role"}"#))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid role");
    }

    #[test]
    fn non_string_error_field_falls_back_to_status() {
        let err = client()
            .parse_response("api/users", json_response(409, r#"{"error":{"code":1}}"#))
            .unwrap_err();
        assert_eq!(err.to_string(), "HTTP error 409");
    }

    #[test]
    fn text_error_uses_body_or_status() {
        let err = client()
            .parse_response("api/files/list", text_response(403, "Permission denied"))
            .unwrap_err();
        assert_eq!(err.to_string(), "Permission denied");

        let err = client()
            .parse_response("api/files/list", text_response(405, ""))
            .unwrap_err();
        assert_eq!(err.to_string(), "HTTP error 405");
    }

    #[test]
    fn text_success_yields_sentinel() {
        let value = client()
            .parse_response("api/files/preview", text_response(200, "<binary>"))
            .unwrap();
        assert_eq!(value, json!({"success": true}));
    }

    #[test]
    fn malformed_json_is_transport_error() {
        let err = client()
            .parse_response("api/users", json_response(200, "{not json"))
            .unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }

    #[test]
    fn upload_carries_form_content_type() {
        let form = MultipartForm::single_file("file", "a.txt", b"abc");
        let content_type = form.content_type();
        let req = client().build_upload("api/files/upload", form);
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.header("content-type"), Some(content_type.as_str()));
        assert_eq!(req.header("x-requested-with"), Some("XMLHttpRequest"));
        assert!(req.body.is_some_and(|b| b.ends_with(b"--\r\n")));
    }

    #[test]
    fn download_returns_raw_bytes_for_any_content_type() {
        let bytes = vec![0x89, b'P', b'N', b'G', 0xff];
        let resp = HttpResponse {
            status: 200,
            headers: vec![("content-type".to_string(), "image/png".to_string())],
            body: bytes.clone(),
        };
        assert_eq!(client().parse_download("api/files/download", resp).unwrap(), bytes);

        let resp = json_response(200, r#"{"kept":"verbatim"}"#);
        assert_eq!(
            client().parse_download("api/files/download", resp).unwrap(),
            br#"{"kept":"verbatim"}"#.to_vec()
        );
    }

    #[test]
    fn download_failures_match_request_failures() {
        let err = client()
            .parse_download("api/files/download?path=x", json_response(404, "{}"))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);

        let err = client()
            .parse_download("api/files/download", json_response(403, r#"{"error":"Invalid path"}"#))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid path");
    }
}
