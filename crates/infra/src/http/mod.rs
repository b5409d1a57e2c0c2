//! HTTP transport and connectivity

pub mod network;
pub mod transport;

pub use network::NetworkStatusMonitor;
pub use transport::{
    HttpTransport, PreparedRequest, RawResponse, ReqwestTransport, ReqwestTransportBuilder,
    TransportError,
};
