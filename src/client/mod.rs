//! Outbound HTTP: the raw transport seam and the authenticating interceptor on top of it.

mod transport;
mod interceptor;

pub use transport::{default_transport, ApiRequest, ApiResponse, ReqwestTransport, TimeoutTransport, Transport};
pub use interceptor::AuthenticatedClient;
