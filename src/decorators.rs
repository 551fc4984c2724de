//! Wrappers that change when or how a plugin runs

use log::Level;

use crate::context::ExecutionContext;
use crate::plugin::{Next, Plugin};

/// Emits trace events around the wrapped plugin.
///
/// The status of the wrapped plugin is returned unchanged.
pub struct Traced<P> {
    inner: P,
}

impl<P: Plugin> Traced<P> {
    #[must_use]
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

impl<P: Plugin> Plugin for Traced<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn invoke(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> i32 {
        let sink = ctx.sink().clone();
        let tracing = sink.enabled(Level::Trace);
        if tracing {
            sink.emit(
                Level::Trace,
                format_args!("Entry point of `{}` plugin.", self.name()),
                &ctx.as_map(),
            );
        }

        let exit_code = self.inner.invoke(ctx, next);

        if tracing {
            sink.emit(
                Level::Trace,
                format_args!("`{}` plugin returned {exit_code}", self.name()),
                &ctx.as_map(),
            );
        }
        exit_code
    }
}

/// Condition checked by [`Gated`] before running its plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// The shell runs below make (`MAKELEVEL` is set).
    MakeLevel,
    /// The invocation has a make target.
    Target,
}

impl Gate {
    #[must_use]
    pub fn is_open(self, ctx: &ExecutionContext) -> bool {
        match self {
            Gate::MakeLevel => ctx.has_make_level(),
            Gate::Target => ctx.has_target(),
        }
    }
}

/// Runs the wrapped plugin only while its gate is open.
///
/// With a closed gate the plugin is skipped and the rest of the chain runs directly.
pub struct Gated<P> {
    gate: Gate,
    inner: P,
}

impl<P: Plugin> Gated<P> {
    #[must_use]
    pub fn new(gate: Gate, inner: P) -> Self {
        Self { gate, inner }
    }

    #[must_use]
    pub fn gate(&self) -> Gate {
        self.gate
    }
}

impl<P: Plugin> Plugin for Gated<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn invoke(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> i32 {
        if self.gate.is_open(ctx) {
            return self.inner.invoke(ctx, next);
        }
        log::debug!(
            "Skipping `{}` plugin: {:?} gate is closed",
            self.name(),
            self.gate
        );
        next.run(ctx)
    }
}
