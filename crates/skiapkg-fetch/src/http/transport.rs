//! Wire-level GET requests.

use std::error::Error as StdError;
use std::io;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::{header, redirect, Client};

use super::client::FetchError;

/// Response body as a stream of chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, FetchError>> + Send>>;

/// A single response, before any redirect or status handling.
pub struct TransportResponse {
    pub status: u16,
    pub location: Option<String>,
    pub content_length: Option<u64>,
    pub body: BodyStream,
}

impl TransportResponse {
    /// Build a response from an in-memory body.
    pub fn from_bytes(status: u16, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            location: None,
            content_length: Some(body.len() as u64),
            body: Box::pin(futures_util::stream::once(async move { Ok(body) })),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("location", &self.location)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Issues one GET request without following redirects.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<TransportResponse, FetchError>;
}

/// [`Transport`] backed by `reqwest`, with automatic redirects disabled.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str, connect_timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder()
            .redirect(redirect::Policy::none())
            .user_agent(user_agent);

        if let Some(timeout) = connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        Ok(Self { client: builder.build()? })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<TransportResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| classify(e, url))?;

        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let owned_url = url.to_string();
        Ok(TransportResponse {
            status: response.status().as_u16(),
            location,
            content_length: response.content_length(),
            body: Box::pin(
                response
                    .bytes_stream()
                    .map(move |chunk| chunk.map_err(|e| classify(e, &owned_url))),
            ),
        })
    }
}

/// Map a `reqwest` failure onto the fetch error classes the retry policy knows.
fn classify(error: reqwest::Error, url: &str) -> FetchError {
    if error.is_timeout() {
        return FetchError::TimedOut { url: url.to_string() };
    }

    let mut source = error.source();
    while let Some(cause) = source {
        if let Some(io_error) = cause.downcast_ref::<io::Error>() {
            match io_error.kind() {
                io::ErrorKind::ConnectionReset => {
                    return FetchError::ConnectionReset { url: url.to_string() };
                }
                io::ErrorKind::TimedOut => {
                    return FetchError::TimedOut { url: url.to_string() };
                }
                _ => {}
            }
        }
        source = cause.source();
    }

    FetchError::Request(error)
}
