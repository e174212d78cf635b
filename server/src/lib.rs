//! The agent-mode server: session lifecycle plus the line-oriented JSON-RPC
//! serve loop that external drivers (typically an LLM) speak to.

pub mod serve;
pub mod session;

pub use serve::{serve_lines, serve_stdio, MAX_LINE_BYTES};
pub use session::{register_methods, AgentSession};
