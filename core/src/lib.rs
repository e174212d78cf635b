//! Root of the `agentrun-core` library.
//!
//! Everything the execution engine needs to turn a declarative project spec
//! into a verified, checkpointed pipeline run: the envelope data-flow model,
//! the scoped context store, the command registry, the sandbox policy, the
//! checkpoint manager, the verification engine, the spec loader/planner, and
//! the pipeline runner itself. Transport (JSON-RPC) and observation (HTTP)
//! live in sibling crates.

// Prevent accidental direct writes to stdout/stderr in library code. All
// user-visible output must go through the serve loop or the tracing stack.
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod checkpoint;
pub mod command;
pub mod config;
pub mod envelope;
pub mod events;
pub mod pipeline;
pub mod platform;
pub mod registry;
pub mod sandbox;
pub mod spec;
pub mod store;
pub mod verify;

pub use command::{CommandError, PlatformCommand, Schema, SchemaField};
pub use envelope::{Envelope, Metadata, ProvenanceStep, StepStatus};
pub use events::{Event, EventKind, MemoryBus, Subscription};
pub use pipeline::{Pipeline, PipelineResult, PipelineStep, StepResult};
pub use registry::{Registry, RegistryError};
pub use sandbox::{Sandbox, SandboxError};
pub use store::{ContextStore, Scope, StoreError};
