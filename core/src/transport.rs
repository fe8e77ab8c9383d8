//! The I/O half of the client: executing an `HttpRequest`.
//!
//! `Transport` is the seam between the deterministic request/response code
//! and the network. `UreqTransport` is the production implementation; tests
//! can pass a closure instead.

use tracing::debug;
use ureq::Agent;

use crate::error::{ApiError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Executes one HTTP round-trip.
///
/// Implementations must return non-2xx responses as data, not as errors;
/// `Err` is reserved for failures where no response was obtained.
pub trait Transport: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

impl<F> Transport for F
where
    F: Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync,
{
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        self(request)
    }
}

/// Blocking transport backed by a `ureq::Agent`.
///
/// The agent keeps a cookie jar, so a session cookie set by the server is
/// replayed on later calls. Cloning shares the agent and its jar.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: Agent,
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }

    /// Use a caller-configured agent, e.g. one with timeouts. The agent must
    /// be built with `http_status_as_error(false)` or non-2xx replies surface
    /// as transport failures instead of being classified.
    pub fn with_agent(agent: Agent) -> Self {
        Self { agent }
    }
}

impl Transport for UreqTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
        debug!(method = %request.method, url = %request.url, "sending request");

        let body = request.body.as_deref();
        let result = match request.method {
            HttpMethod::Get => with_headers(self.agent.get(&request.url), request).call(),
            HttpMethod::Delete => with_headers(self.agent.delete(&request.url), request).call(),
            HttpMethod::Post => match body {
                Some(body) => with_headers(self.agent.post(&request.url), request).send(body),
                None => with_headers(self.agent.post(&request.url), request).send_empty(),
            },
            HttpMethod::Put => match body {
                Some(body) => with_headers(self.agent.put(&request.url), request).send(body),
                None => with_headers(self.agent.put(&request.url), request).send_empty(),
            },
        };
        let mut response = result.map_err(transport_error)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        // No size cap: binary previews and downloads routinely exceed
        // ureq's 10 MiB default.
        let body = response
            .body_mut()
            .with_config()
            .limit(u64::MAX)
            .read_to_vec()
            .map_err(transport_error)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    request: &HttpRequest,
) -> ureq::RequestBuilder<B> {
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

fn transport_error(err: ureq::Error) -> ApiError {
    ApiError::Transport(err.to_string())
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    use super::*;

    /// Answer one connection with `reply` once the request head has arrived.
    fn serve_once(reply: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            stream.write_all(&reply).unwrap();
        });
        format!("http://{addr}/")
    }

    fn reply(status: &str, content_type: &str, body: &[u8]) -> Vec<u8> {
        let mut out = format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .into_bytes();
        out.extend_from_slice(body);
        out
    }

    fn get(url: String) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url,
            headers: vec![("x-requested-with".to_string(), "XMLHttpRequest".to_string())],
            body: None,
        }
    }

    #[test]
    fn bodies_over_ten_mebibytes_are_read_whole() {
        let payload = vec![0xabu8; 12 * 1024 * 1024];
        let url = serve_once(reply("200 OK", "image/png", &payload));

        let response = UreqTransport::new().execute(&get(url)).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.content_type(), Some("image/png"));
        assert_eq!(response.body.len(), payload.len());
    }

    #[test]
    fn error_statuses_come_back_as_data() {
        let url = serve_once(reply("404 Not Found", "application/json", br#"{"error":"gone"}"#));

        let response = UreqTransport::default().execute(&get(url)).unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.body, br#"{"error":"gone"}"#.to_vec());
    }

    #[test]
    fn custom_agent_timeout_is_a_transport_error() {
        // Accepts and then stays silent past the agent's timeout.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let (_stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_secs(2));
        });

        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(Duration::from_millis(200)))
            .build()
            .new_agent();
        let err = UreqTransport::with_agent(agent)
            .execute(&get(format!("http://{addr}/")))
            .unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }

    #[test]
    fn closures_are_transports() {
        let transport = |req: &HttpRequest| -> Result<HttpResponse> {
            Ok(HttpResponse {
                status: 204,
                headers: Vec::new(),
                body: req.url.clone().into_bytes(),
            })
        };
        let response = transport.execute(&get("http://hub/x".to_string())).unwrap();
        assert_eq!(response.body, b"http://hub/x".to_vec());
    }
}
