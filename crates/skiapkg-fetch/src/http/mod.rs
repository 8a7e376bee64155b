//! HTTP retrieval of release assets.
//!
//! [`Fetcher`] owns the retry and redirect policy; the actual wire work goes
//! through a [`Transport`] so the policy can be exercised without a network.

mod client;
mod transport;

pub use client::{FetchError, Fetcher, FetcherConfig, DEFAULT_MAX_RETRIES, DEFAULT_USER_AGENT};
pub use transport::{BodyStream, ReqwestTransport, Transport, TransportResponse};
