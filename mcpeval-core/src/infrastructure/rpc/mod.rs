//! JSON-RPC 2.0 framing shared by the stdio and HTTP tool transports.

pub mod types;

pub use types::{Inbound, RpcError, RpcRequest, RpcResponse, response_key};
