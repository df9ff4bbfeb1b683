//! Backend access for PageChat.
//!
//! - [`Transport`]: one request/response exchange ([`HttpTransport`] over reqwest)
//! - [`RequestClient`]: per-attempt timeout, bounded retries and linear backoff
//! - [`ReadinessPoller`]: waits for indexing to finish via `/analyze`

mod client;
mod poller;
mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{Endpoint, RequestClient, duration_ms};
pub use poller::ReadinessPoller;
pub use transport::{ApiRequest, HttpTransport, Method, Transport};
