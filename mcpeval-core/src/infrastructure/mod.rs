pub mod model;
pub mod rpc;
