//! Plugins and the continuation they receive
//!
//! A plugin wraps the remainder of the chain. It gets the execution context and a [`Next`]
//! continuation, may do work before and after calling [`Next::run`], or may skip the rest of
//! the chain entirely and return its own status.

use std::fmt;
use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::decorators::{Gate, Gated, Traced};

/// A plugin shared between a chain and the code that registered it.
pub type SharedPlugin = Arc<dyn Plugin>;

/// A unit of behavior wrapped around command execution.
pub trait Plugin: Send + Sync {
    /// Name used in log events.
    fn name(&self) -> &str;

    /// Run the plugin and return the exit status of the invocation.
    ///
    /// Plugins that call `next` normally return its status unchanged.
    fn invoke(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> i32;
}

impl<P: Plugin + ?Sized> Plugin for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn invoke(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> i32 {
        (**self).invoke(ctx, next)
    }
}

impl<P: Plugin + ?Sized> Plugin for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn invoke(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> i32 {
        (**self).invoke(ctx, next)
    }
}

/// The rest of a chain, as seen from one plugin.
///
/// The terminal executor receives an absent continuation (see [`Next::is_absent`]), which
/// must never be run.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    rest: &'a [SharedPlugin],
}

impl<'a> Next<'a> {
    pub(crate) fn new(rest: &'a [SharedPlugin]) -> Self {
        Self { rest }
    }

    /// The continuation handed to the last plugin of a chain.
    #[must_use]
    pub fn absent() -> Next<'static> {
        Next { rest: &[] }
    }

    #[must_use]
    pub fn is_absent(&self) -> bool {
        self.rest.is_empty()
    }

    /// Number of plugins left in the chain, terminal executor included.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.rest.len()
    }

    /// Invoke the next plugin with the remainder of the chain.
    ///
    /// # Panics
    ///
    /// Panics if the continuation is absent, which means a plugin tried to continue past
    /// the terminal executor.
    pub fn run(self, ctx: &mut ExecutionContext) -> i32 {
        let Some((plugin, rest)) = self.rest.split_first() else {
            panic!(
                "plugin chain contract violated: continuation invoked after the terminal executor"
            );
        };
        plugin.invoke(ctx, Next { rest })
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.rest.iter().map(|p| p.name()))
            .finish()
    }
}

/// Plugin backed by a closure.
pub struct FnPlugin<F> {
    name: String,
    f: F,
}

/// Build a plugin from a closure.
///
/// ```
/// use trackingshell::plugin::{plugin_fn, Plugin, PluginExt};
///
/// let stamp = plugin_fn("stamp", |ctx, next| {
///     ctx.append("plugins", "stamp");
///     next.run(ctx)
/// })
/// .shared();
/// assert_eq!(stamp.name(), "stamp");
/// ```
pub fn plugin_fn<F>(name: impl Into<String>, f: F) -> FnPlugin<F>
where
    F: Fn(&mut ExecutionContext, Next<'_>) -> i32 + Send + Sync,
{
    FnPlugin {
        name: name.into(),
        f,
    }
}

impl<F> Plugin for FnPlugin<F>
where
    F: Fn(&mut ExecutionContext, Next<'_>) -> i32 + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> i32 {
        (self.f)(ctx, next)
    }
}

/// Wrapping helpers available on every plugin.
pub trait PluginExt: Plugin + Sized {
    /// Emit trace events on entry and exit.
    fn traced(self) -> Traced<Self> {
        Traced::new(self)
    }

    /// Only run when the shell was started by make.
    fn only_in_make_level(self) -> Gated<Self> {
        Gated::new(Gate::MakeLevel, self)
    }

    /// Only run when the invocation has a target.
    fn only_with_target(self) -> Gated<Self> {
        Gated::new(Gate::Target, self)
    }

    fn shared(self) -> SharedPlugin
    where
        Self: 'static,
    {
        Arc::new(self)
    }
}

impl<P: Plugin> PluginExt for P {}
