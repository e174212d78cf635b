//! JSON-RPC 2.0 wire protocol for driving the runtime.
//!
//! Defines the message framing, error codes, the closed method set, the
//! parameter/result types for each method, and the async method handler
//! registry. This crate is transport-agnostic: the server crate owns the
//! line-oriented byte stream.

mod handler;
mod jsonrpc;
mod types;

pub use handler::{parse_params, Handler, HandlerFuture};
pub use jsonrpc::{codes, methods, Request, Response, RpcError, JSONRPC_VERSION};
pub use types::*;
