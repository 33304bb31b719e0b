//! HTTP transport abstraction.

mod transport;

pub use transport::{HttpTransport, ReqwestTransport, RestRequest, RestResponse};
