//! Request dispatch for the deskcache REST API.
//!
//! This module provides the `Dispatcher` through which every application
//! request is issued, the `Transport` boundary it sends requests over, and
//! the error taxonomy separating "no response" from "error response".

pub mod dispatcher;
pub mod error;
pub mod request;
pub mod transport;

pub use dispatcher::{Dispatcher, Fetched, Source};
pub use error::{ApiError, TransportError};
pub use request::ApiRequest;
pub use transport::{HttpRequest, RawResponse, ReqwestTransport, Transport, UNREACHABLE_HEADER};
