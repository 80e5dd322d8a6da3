//! Request and response types shared by the cache, network, and worker layers.
//!
//! - `Request`: one outgoing resource load (method, URL, headers)
//! - `RequestKey`: normalized request identity used as the cache key
//! - `Response`: status, headers, and body of a fetched or stored resource

pub mod request;
pub mod response;

pub use request::{Request, RequestKey};
pub use response::Response;
