mod connection;
mod error;
mod http;
mod interface;
mod pool;
mod process;
mod router;
mod transport;

pub use connection::{McpConnection, McpConnector};
pub use error::ToolInvokeError;
pub use interface::{ConnectionState, ServerConnector, ToolConnection};
pub use pool::{PoolError, ServerPool, StartupFailure};
pub use router::{ShadowedTool, ToolRouter};

pub(crate) use connection::normalize_arguments;

#[cfg(test)]
pub(crate) use router::tests as test_support;
