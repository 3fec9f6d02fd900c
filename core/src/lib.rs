//! Synchronous client core for the Mailchimp 1.3 API.
//!
//! # Overview
//! `Connection` exposes one method per remote action. Each method shapes its
//! arguments into `Params`, the transport performs a single form-encoded POST,
//! and the response goes through one shared validation step that turns
//! remote-reported failures into `ChimpError::Api`.
//!
//! # Design
//! - `Connection` is immutable after construction: API key, resolved endpoint
//!   and transport. It is safe to share between threads whenever the
//!   transport is.
//! - Requests and responses are plain data (`HttpRequest` / `HttpResponse`),
//!   so building and parsing are testable without a network.
//! - Results are typed per action; partial batch failures and unknown
//!   addresses in multi-address lookups are returned as data.

pub mod campaigns;
pub mod config;
pub mod connection;
pub mod error;
pub mod http;
pub mod lists;
pub mod params;
pub mod response;
pub mod types;

pub use config::ClientConfig;
pub use connection::Connection;
pub use error::{ApiError, ChimpError, ConfigError, ErrorCode, Result, TransportError};
pub use http::{HttpRequest, HttpResponse, Transport, UreqTransport};
pub use params::Params;
pub use types::*;
