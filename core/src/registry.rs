//! Namespaced catalog of platform commands.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::command::PlatformCommand;
use crate::spec::CommandLister;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("command already registered: {0}")]
    Duplicate(String),

    #[error("command not found: {0}")]
    NotFound(String),
}

/// Holds all registered platform commands, keyed by full name.
///
/// Registration is conceptually startup-only; runtime registration is
/// permitted and serialized behind the internal lock.
#[derive(Default)]
pub struct Registry {
    commands: RwLock<HashMap<String, Arc<dyn PlatformCommand>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command. Fails if the full name is already taken.
    pub fn register(&self, cmd: Arc<dyn PlatformCommand>) -> Result<(), RegistryError> {
        let mut commands = self.commands.write().expect("registry lock poisoned");
        let name = cmd.name().to_string();
        if commands.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        commands.insert(name, cmd);
        Ok(())
    }

    /// Look up a command by its full name (e.g. `fs:list`).
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn PlatformCommand>, RegistryError> {
        let commands = self.commands.read().expect("registry lock poisoned");
        commands
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// All commands, optionally restricted to one namespace, sorted by name.
    pub fn list(&self, namespace: Option<&str>) -> Vec<Arc<dyn PlatformCommand>> {
        let commands = self.commands.read().expect("registry lock poisoned");
        let mut result: Vec<Arc<dyn PlatformCommand>> = commands
            .values()
            .filter(|cmd| namespace.is_none_or(|ns| cmd.namespace() == ns))
            .cloned()
            .collect();
        result.sort_by(|a, b| a.name().cmp(b.name()));
        result
    }

    /// All registered full names, sorted.
    pub fn names(&self) -> Vec<String> {
        let commands = self.commands.read().expect("registry lock poisoned");
        let mut names: Vec<String> = commands.keys().cloned().collect();
        names.sort();
        names
    }

    /// All distinct namespaces, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        let commands = self.commands.read().expect("registry lock poisoned");
        let mut namespaces: Vec<String> = commands
            .values()
            .map(|cmd| cmd.namespace().to_string())
            .filter(|ns| !ns.is_empty())
            .collect();
        namespaces.sort();
        namespaces.dedup();
        namespaces
    }

    /// Full names matching a glob pattern, sorted. Supported patterns: `*`
    /// (everything), a trailing `*` (prefix match), or a literal name.
    pub fn match_glob(&self, pattern: &str) -> Vec<String> {
        let commands = self.commands.read().expect("registry lock poisoned");
        let mut matches: Vec<String> = commands
            .keys()
            .filter(|name| glob_matches(pattern, name))
            .cloned()
            .collect();
        matches.sort();
        matches
    }
}

impl CommandLister for Registry {
    fn names(&self) -> Vec<String> {
        Registry::names(self)
    }

    fn match_glob(&self, pattern: &str) -> Vec<String> {
        Registry::match_glob(self, pattern)
    }
}

fn glob_matches(pattern: &str, name: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return name.starts_with(prefix);
    }
    pattern == name
}
