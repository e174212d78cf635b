//! Built-in platform commands.

pub mod fs;

use std::sync::Arc;

use crate::registry::{Registry, RegistryError};
use crate::sandbox::Sandbox;

/// Register the built-in command set against a registry.
pub fn register_builtin_commands(
    registry: &Registry,
    sandbox: Arc<Sandbox>,
) -> Result<(), RegistryError> {
    registry.register(Arc::new(fs::ReadCommand::new(Arc::clone(&sandbox))))?;
    registry.register(Arc::new(fs::WriteCommand::new(Arc::clone(&sandbox))))?;
    registry.register(Arc::new(fs::ListCommand::new(sandbox)))?;
    Ok(())
}
