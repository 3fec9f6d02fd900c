//! HTTP transport for the Mailchimp API.
//!
//! # Design
//! Requests and responses are plain data. `Connection` builds an
//! `HttpRequest`, hands it to a `Transport` for exactly one round trip, and
//! parses the `HttpResponse` it gets back. Tests swap in a canned transport;
//! production code uses `UreqTransport`.
//!
//! There are no retries and no timeout policy beyond ureq's defaults: a
//! failed round trip surfaces to the caller immediately.

use log::trace;

use crate::error::TransportError;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A single POST to the API endpoint, described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// The raw outcome of a round trip. Any status is represented here; status
/// interpretation belongs to the response parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Performs one blocking request/response round trip.
pub trait Transport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request)
    }
}

/// Default transport backed by a ureq agent.
///
/// The agent is configured so that 4xx/5xx responses come back as data
/// rather than `Err`, letting the response parser decide whether the body is
/// an API error or a protocol failure.
#[derive(Debug, Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self.agent.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let mut response = builder.send(request.body.as_bytes())?;

        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string()?;
        trace!("HTTP {status} from {} ({} bytes)", request.url, body.len());

        Ok(HttpResponse { status, body })
    }
}
