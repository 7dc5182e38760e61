//! # Network Boundary
//!
//! - [`network_session`] - the [`NetworkSession`] trait and wire request/response types
//! - [`reqwest_session`] - production session over `reqwest`
//! - [`request_builder`] - envelope to wire request conversion

pub mod network_session;
pub mod request_builder;
pub mod reqwest_session;

pub use network_session::{HttpMethod, HttpRequest, HttpResponse, NetworkSession};
pub use request_builder::build_http_request;
pub use reqwest_session::ReqwestNetworkSession;
