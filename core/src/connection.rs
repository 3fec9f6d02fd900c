//! The `Connection` façade.
//!
//! # Design
//! `Connection` holds the API key, the resolved endpoint and a transport,
//! and none of them change after construction. Each remote action is one
//! method that builds `Params`, then goes through `call`:
//!
//! `build_request` -> `Transport::send` -> `response::validate` -> decode
//!
//! so every action gets the same error translation. The list and campaign
//! actions live in `lists.rs` and `campaigns.rs` as further `impl` blocks.

use log::{debug, trace};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use crate::config::{mask_key, ClientConfig};
use crate::error::Result;
use crate::http::{HttpRequest, HttpResponse, Transport, UreqTransport, FORM_CONTENT_TYPE};
use crate::params::{encode_form, Params};
use crate::response;

/// A configured client for the Mailchimp 1.3 API.
#[derive(Debug, Clone)]
pub struct Connection<T = UreqTransport> {
    api_key: String,
    endpoint: Url,
    transport: T,
}

impl Connection<UreqTransport> {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_transport(config, UreqTransport::new())
    }

    /// Build a connection from `MAILCHIMP_APIKEY` / `MAILCHIMP_ENDPOINT`.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }
}

impl<T: Transport> Connection<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Result<Self> {
        let endpoint = config.endpoint()?;
        debug!(
            "Creating Connection for key {} at {endpoint}",
            mask_key(config.api_key())
        );
        Ok(Self {
            api_key: config.api_key().to_string(),
            endpoint,
            transport,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Describe the POST for `method` without sending it.
    pub fn build_request(&self, method: &str, params: &Params) -> HttpRequest {
        let fields = params.flatten();
        trace!(
            "{method} fields: {:?}",
            fields.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>()
        );

        let head = [
            ("method", method),
            ("apikey", self.api_key.as_str()),
            ("output", "json"),
        ];
        let body = encode_form(
            head.into_iter()
                .chain(fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
        );

        HttpRequest {
            url: self.endpoint.to_string(),
            headers: vec![("content-type".to_string(), FORM_CONTENT_TYPE.to_string())],
            body,
        }
    }

    /// Validate a raw response for `method`, returning the decoded JSON.
    pub fn parse_response(&self, method: &str, response: HttpResponse) -> Result<Value> {
        response::validate(method, response)
    }

    /// One round trip, returning whatever JSON the action produced.
    pub fn call_value(&self, method: &str, params: &Params) -> Result<Value> {
        debug!("Calling {method} at {}", self.endpoint);
        let request = self.build_request(method, params);
        let response = self.transport.send(&request)?;
        self.parse_response(method, response)
    }

    /// One round trip, decoded into the action's result type.
    pub fn call<R: DeserializeOwned>(&self, method: &str, params: &Params) -> Result<R> {
        let value = self.call_value(method, params)?;
        response::decode(method, value)
    }

    /// Check the key and the service are reachable.
    pub fn ping(&self) -> Result<String> {
        self.call("ping", &Params::new())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use crate::error::TransportError;
    use crate::http::{HttpRequest, HttpResponse, Transport};

    /// Replays canned bodies and records every request it was given.
    #[derive(Debug, Default)]
    pub struct Canned {
        pub replies: RefCell<VecDeque<Result<HttpResponse, TransportError>>>,
        pub requests: RefCell<Vec<HttpRequest>>,
    }

    impl Canned {
        pub fn with(bodies: &[&str]) -> Self {
            let canned = Self::default();
            for body in bodies {
                canned.replies.borrow_mut().push_back(Ok(HttpResponse {
                    status: 200,
                    body: body.to_string(),
                }));
            }
            canned
        }

        pub fn failing(err: TransportError) -> Self {
            let canned = Self::default();
            canned.replies.borrow_mut().push_back(Err(err));
            canned
        }

        /// Decoded form fields of the `n`th request.
        pub fn fields(&self, n: usize) -> Vec<(String, String)> {
            let body = self.requests.borrow()[n].body.clone();
            url::form_urlencoded::parse(body.as_bytes())
                .into_owned()
                .collect()
        }

        pub fn field(&self, n: usize, name: &str) -> Option<String> {
            self.fields(n)
                .into_iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v)
        }
    }

    impl Transport for Canned {
        fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.requests.borrow_mut().push(request.clone());
            self.replies
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| panic!("no canned reply for {}", request.body))
        }
    }
}
