//! Translation between runtime-native request/response shapes and the
//! canonical exchange types.

use thiserror::Error;

use crate::exchange::RequestError;

pub mod swoole;

#[cfg(feature = "http")]
pub mod psr7;

#[cfg(test)]
mod tests;

pub use swoole::{
    emit_response, NativeFile, NativeFileNode, OrderedMap, ResponseSink,
    SwooleHandler, SwooleRequest,
};

#[cfg(feature = "http")]
pub use psr7::{
    from_http_request, into_http_response, HttpTransport, Psr7Transport,
};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AdapterError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("Malformed native request: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Invalid status code: {0}")]
    InvalidStatus(u16),
}
