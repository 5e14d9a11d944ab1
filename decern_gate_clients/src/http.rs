use std::time::Duration;

use decern_gate_client_api::{ClientError, ClientResult, ServiceEndpoint};
use reqwest::blocking::{Client, RequestBuilder, Response};
use secrecy::ExposeSecret;

const USER_AGENT: &str = concat!("decern-gate/", env!("CARGO_PKG_VERSION"));
const BODY_EXCERPT_CHARS: usize = 200;

/// Blocking HTTP client shared by the service calls.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Construct a transport with redirects disabled.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Transport`] if the TLS backend cannot start.
    pub fn new() -> ClientResult<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| ClientError::Transport {
                operation: "client setup",
                message: err.to_string(),
            })?;
        Ok(Self { client })
    }

    pub(crate) fn get(&self, endpoint: &ServiceEndpoint, path: &str) -> RequestBuilder {
        authorize(self.client.get(endpoint.url(path)), endpoint)
    }

    pub(crate) fn post(&self, endpoint: &ServiceEndpoint, path: &str) -> RequestBuilder {
        authorize(self.client.post(endpoint.url(path)), endpoint)
    }
}

fn authorize(request: RequestBuilder, endpoint: &ServiceEndpoint) -> RequestBuilder {
    request
        .bearer_auth(endpoint.token.expose_secret())
        .timeout(endpoint.timeout)
}

/// Send a request once and read its status and body.
pub(crate) fn send(
    operation: &'static str,
    timeout: Duration,
    request: RequestBuilder,
) -> ClientResult<(u16, String)> {
    let response: Response = request
        .send()
        .map_err(|err| request_error(operation, timeout, &err))?;
    let status = response.status().as_u16();
    let body = response
        .text()
        .map_err(|err| request_error(operation, timeout, &err))?;
    Ok((status, body))
}

fn request_error(operation: &'static str, timeout: Duration, err: &reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout { operation, timeout }
    } else {
        ClientError::Transport {
            operation,
            message: err.to_string(),
        }
    }
}

/// First few characters of a body for error messages.
pub(crate) fn excerpt(body: &str) -> String {
    let trimmed = body.trim();
    let mut text: String = trimmed.chars().take(BODY_EXCERPT_CHARS).collect();
    if text.len() < trimmed.len() {
        text.push_str("...");
    }
    text
}
