//! Plugins shipped with trackingshell
//!
//! Built-ins are enabled by name from the configuration file. Each one records its name in
//! the `plugins` list attribute of the context when it runs.

use serde::{Deserialize, Serialize};

use crate::plugin::{PluginExt, SharedPlugin};

pub mod report;
pub mod timing;

/// Attribute listing the built-in plugins that ran.
pub const PLUGINS_ATTR: &str = "plugins";

/// Names of the built-in plugins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Builtin {
    Timing,
    Report,
}

impl Builtin {
    #[must_use]
    pub fn plugin(self) -> SharedPlugin {
        match self {
            Builtin::Timing => timing::Timing.shared(),
            Builtin::Report => report::Report::new().shared(),
        }
    }
}

/// How a built-in plugin is wrapped before registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Wrapping {
    pub only_with_target: bool,
    pub only_in_make_level: bool,
    pub trace: bool,
}

/// Build `builtin` wrapped as requested.
///
/// Gates are applied outside the tracing wrapper, and the make level gate is the outermost,
/// so it is checked first.
#[must_use]
pub fn build(builtin: Builtin, wrapping: Wrapping) -> SharedPlugin {
    let mut plugin = builtin.plugin();
    if wrapping.trace {
        plugin = plugin.traced().shared();
    }
    if wrapping.only_with_target {
        plugin = plugin.only_with_target().shared();
    }
    if wrapping.only_in_make_level {
        plugin = plugin.only_in_make_level().shared();
    }
    plugin
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::PluginChain;
    use crate::context::ExecutionContext;
    use crate::plugin::{Plugin, plugin_fn};

    #[test]
    fn test_builtin_names() {
        let parsed: Vec<Builtin> = serde_yaml::from_str("[timing, report]").unwrap();
        assert_eq!(parsed, vec![Builtin::Timing, Builtin::Report]);
        assert_eq!(Builtin::Timing.plugin().name(), "timing");
        assert_eq!(Builtin::Report.plugin().name(), "report");
    }

    #[test]
    fn test_build_applies_gates() {
        let mut chain = PluginChain::new(plugin_fn("terminal", |_, _| 0));
        chain.register(build(
            Builtin::Timing,
            Wrapping {
                only_with_target: true,
                only_in_make_level: true,
                trace: true,
            },
        ));
        assert_eq!(chain.names(), vec!["timing", "terminal"]);

        let target = Some("build".to_string());
        let mut ctx = ExecutionContext::new(target, "true").with_make_level(None);
        assert_eq!(chain.execute(&mut ctx), 0);
        assert!(!ctx.contains(PLUGINS_ATTR));

        let mut ctx = ctx.with_make_level(Some("1".to_string()));
        chain.execute(&mut ctx);
        assert!(ctx.contains(timing::DURATION_ATTR));
    }
}
