//! Ordered plugin chain and its composition
//!
//! The chain is a list of plugins whose last element is the terminal executor. Composing it
//! yields a single call: plugin 0 runs first and reaches plugin 1 through its continuation,
//! and so on until the terminal executor runs the command. Since every plugin wraps the ones
//! registered after it, before-logic runs in registration order and after-logic in reverse.

use std::sync::Arc;

use log::debug;
use thiserror::Error;

use crate::context::ExecutionContext;
use crate::executor::ExecuteCommand;
use crate::plugin::{Next, Plugin, SharedPlugin};

/// Errors raised while changing a plugin chain
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChainError {
    #[error("A plugin chain needs at least the terminal executor")]
    Empty,
    #[error("Plugin `{0}` is not registered")]
    NotFound(String),
    #[error("Plugin `{0}` is the terminal executor and cannot be unregistered")]
    TerminalExecutor(String),
}

fn same_plugin(a: &SharedPlugin, b: &SharedPlugin) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Plugins wrapped around a command, terminal executor last.
#[derive(Clone)]
pub struct PluginChain {
    plugins: Vec<SharedPlugin>,
}

impl PluginChain {
    /// Chain holding only `terminal`.
    #[must_use]
    pub fn new(terminal: impl Plugin + 'static) -> Self {
        Self {
            plugins: vec![Arc::new(terminal)],
        }
    }

    /// Chain from an ordered list whose last element acts as the terminal executor.
    ///
    /// The list is trusted as given: only its emptiness is checked.
    ///
    /// # Errors
    ///
    /// Returns `ChainError::Empty` if `plugins` is empty.
    pub fn from_plugins(plugins: Vec<SharedPlugin>) -> Result<Self, ChainError> {
        if plugins.is_empty() {
            return Err(ChainError::Empty);
        }
        Ok(Self { plugins })
    }

    /// Insert `plugin` right before the terminal executor.
    pub fn register(&mut self, plugin: SharedPlugin) -> &mut Self {
        debug!("Registering `{}` plugin", plugin.name());
        let terminal = self.plugins.len() - 1;
        self.plugins.insert(terminal, plugin);
        self
    }

    /// Remove the first registration of this very plugin instance.
    ///
    /// # Errors
    ///
    /// Returns `ChainError::NotFound` if the plugin is not part of the chain, or
    /// `ChainError::TerminalExecutor` if it is the terminal executor.
    pub fn unregister(&mut self, plugin: &SharedPlugin) -> Result<(), ChainError> {
        let terminal = self.plugins.len() - 1;
        match self.plugins.iter().position(|p| same_plugin(p, plugin)) {
            Some(index) if index == terminal => {
                Err(ChainError::TerminalExecutor(plugin.name().to_string()))
            }
            Some(index) => {
                debug!("Unregistering `{}` plugin", plugin.name());
                self.plugins.remove(index);
                Ok(())
            }
            None => Err(ChainError::NotFound(plugin.name().to_string())),
        }
    }

    #[must_use]
    pub fn plugins(&self) -> &[SharedPlugin] {
        &self.plugins
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    #[must_use]
    pub fn terminal(&self) -> &SharedPlugin {
        &self.plugins[self.plugins.len() - 1]
    }

    /// Number of plugins, terminal executor included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Always false: a chain holds at least its terminal executor.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Compose the chain into a single call.
    ///
    /// The result borrows the chain, so it is rebuilt for every execution and can never
    /// observe a chain that changed after it was composed.
    #[must_use]
    pub fn compose(&self) -> Next<'_> {
        Next::new(&self.plugins)
    }

    /// Run the composed chain on `ctx`.
    pub fn execute(&self, ctx: &mut ExecutionContext) -> i32 {
        self.compose().run(ctx)
    }
}

impl Default for PluginChain {
    fn default() -> Self {
        Self::new(ExecuteCommand::default())
    }
}

impl std::fmt::Debug for PluginChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginChain")
            .field("plugins", &self.names())
            .finish()
    }
}
