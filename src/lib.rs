//! `netchain` is an async request layer over a single host request primitive.
//!
//! It adds process-wide options, lifecycle events, opt-in retry and a chainable
//! response wrapper:
//! - [`Network::get`], [`Network::post`] and [`Network::request`] start a
//!   logical request and return a [`ResponseChain`]
//! - [`Network::config`] replaces the [`GlobalOptions`]
//! - [`Network::on`] observes [`Event`]s of every request
//! - [`ResponseChain::enable_retry`], [`ResponseChain::merge`] and friends
//!   compose the result before it is awaited

mod chain;
mod context;
mod error;
mod events;
mod network;
mod options;
mod payload;
mod prepare;
mod transport;
mod types;

pub use chain::{Merged, ResponseChain, ORIGINAL_KEY};
pub use context::{RequestContext, RetryPolicy, RetryPredicate};
pub use error::{NetworkError, TransportFailure};
pub use events::{Event, EventHandler, EventHub, EventPayload, SubscriptionId};
pub use network::Network;
pub use options::{
    GlobalOptions, LoadingFactory, LoadingHandle, DEFAULT_CONTENT_TYPE, DEFAULT_SOURCE,
    SOURCE_HEADER,
};
pub use payload::{Headers, Method, Payload};
pub use transport::{OutgoingRequest, ReqwestTransport, Transport};
pub use types::Response;

pub type Result<T> = std::result::Result<T, NetworkError>;
