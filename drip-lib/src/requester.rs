//! The unit of work issued behind a throttle.
//!
//! [`Requester`] is the capability the dispatcher calls once per admission.
//! [`HttpRequester`] implements it on top of `reqwest`; tests and embedders can
//! plug in anything else.
#![allow(clippy::module_name_repetitions)]

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use http::header::{self, HeaderMap, HeaderValue};
use reqwest::Url;
use typed_builder::TypedBuilder;

use crate::{ErrorKind, Result};

/// Default timeout in seconds before a request is deemed as failed, 20.
pub const DEFAULT_TIMEOUT_SECS: usize = 20;
/// Default user agent, `drip-<PKG_VERSION>`.
pub const DEFAULT_USER_AGENT: &str = concat!("drip/", env!("CARGO_PKG_VERSION"));

// Constants currently not configurable by the user.
/// A timeout for only the connect phase of a client.
const CONNECT_TIMEOUT: u64 = 10;
/// TCP keepalive
const TCP_KEEPALIVE: u64 = 60;

/// Issues one unit of work against a target.
///
/// A returned error marks this single request as failed; it has no effect on
/// the throttle or on sibling requests.
#[async_trait]
pub trait Requester: Send + Sync + Debug {
    /// Send one request to `target` and report the response status
    ///
    /// # Errors
    ///
    /// Returns an error if no response was received.
    async fn perform(&self, target: &Url) -> Result<StatusCode>;
}

/// Builder for [`HttpRequester`].
///
/// ```
/// use drip_lib::RequesterBuilder;
/// use std::time::Duration;
///
/// let requester = RequesterBuilder::builder()
///     .timeout(Duration::from_secs(5))
///     .user_agent("load-test/1.0")
///     .build()
///     .requester()
///     .unwrap();
/// ```
#[derive(TypedBuilder, Debug, Clone)]
#[builder(field_defaults(default, setter(into)))]
pub struct RequesterBuilder {
    /// User-agent sent with every request.
    #[builder(default_code = "String::from(DEFAULT_USER_AGENT)")]
    user_agent: String,

    /// Headers sent with every request, in addition to the user agent.
    custom_headers: HeaderMap,

    /// HTTP method used for requests, e.g. `GET` or `HEAD`.
    #[builder(default = reqwest::Method::GET)]
    method: reqwest::Method,

    /// Response timeout per request.
    #[builder(default = Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS as u64)))]
    timeout: Option<Duration>,

    /// Accept invalid TLS certificates.
    allow_insecure: bool,
}

impl Default for RequesterBuilder {
    #[inline]
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RequesterBuilder {
    /// Instantiates an [`HttpRequester`].
    ///
    /// # Errors
    ///
    /// Returns an `Err` if:
    /// - The user-agent contains characters not allowed in a header.
    /// - The underlying request client cannot be created.
    pub fn requester(self) -> Result<HttpRequester> {
        let Self {
            user_agent,
            custom_headers: mut headers,
            method,
            timeout,
            allow_insecure,
        } = self;

        headers.insert(header::USER_AGENT, HeaderValue::from_str(&user_agent)?);

        let builder = reqwest::ClientBuilder::new()
            .gzip(true)
            .default_headers(headers)
            .danger_accept_invalid_certs(allow_insecure)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT))
            .tcp_keepalive(Duration::from_secs(TCP_KEEPALIVE));

        let client = (match timeout {
            Some(t) => builder.timeout(t),
            None => builder,
        })
        .build()
        .map_err(ErrorKind::BuildClient)?;

        Ok(HttpRequester { client, method })
    }
}

/// [`Requester`] sending one HTTP request per admission.
///
/// Any response counts as a completed request, whatever its status code.
#[derive(Debug, Clone)]
pub struct HttpRequester {
    client: reqwest::Client,
    method: reqwest::Method,
}

#[async_trait]
impl Requester for HttpRequester {
    async fn perform(&self, target: &Url) -> Result<StatusCode> {
        let response = self
            .client
            .request(self.method.clone(), target.clone())
            .send()
            .await
            .map_err(ErrorKind::Network)?;
        Ok(response.status())
    }
}
