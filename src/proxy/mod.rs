//
// src/proxy/mod.rs
//
mod backend;
mod error;
mod forwarder;
mod transport;

pub use backend::Backend;
pub use error::ProxyError;
pub use forwarder::{Dispatched, RequestForwarder};
pub use transport::{parse_object, BackendError, HttpTransport, Transport};
