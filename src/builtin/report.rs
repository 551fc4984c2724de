use std::io::{IsTerminal, Write};

use anstyle::{AnsiColor, Reset, RgbColor, Style};

use crate::context::ExecutionContext;
use crate::plugin::{Next, Plugin};

use super::PLUGINS_ATTR;

const ACCENT: Style = Style::new().fg_color(Some(anstyle::Color::Rgb(RgbColor(207, 106, 76))));
const SUCCESS: Style = Style::new().fg_color(Some(anstyle::Color::Ansi(AnsiColor::Green)));
const FAILURE: Style = Style::new().fg_color(Some(anstyle::Color::Ansi(AnsiColor::Red)));
const BOLD: Style = Style::new().bold();

/// Prints a status line on stderr once the command has finished.
pub struct Report {
    color: bool,
}

impl Report {
    /// Colors are used only when stderr is a terminal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            color: std::io::stderr().is_terminal(),
        }
    }

    #[must_use]
    pub fn with_color(color: bool) -> Self {
        Self { color }
    }

    fn paint(&self, style: Style, s: &str) -> String {
        if self.color {
            format!("{style}{s}{Reset}")
        } else {
            s.to_string()
        }
    }

    /// Status line for an invocation that returned `exit_code`.
    #[must_use]
    pub fn message(&self, ctx: &ExecutionContext, exit_code: i32) -> String {
        let subject = if ctx.has_target() {
            ctx.target()
        } else {
            ctx.command()
        };
        let outcome = if exit_code == 0 {
            format!("succeeded {}", self.paint(SUCCESS, "✓"))
        } else {
            format!(
                "failed {} (exit code {exit_code})",
                self.paint(FAILURE, "✘")
            )
        };
        format!(
            "{} {} {outcome}",
            self.paint(ACCENT, "❱"),
            self.paint(BOLD, subject)
        )
    }
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for Report {
    fn name(&self) -> &str {
        "report"
    }

    fn invoke(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> i32 {
        ctx.append(PLUGINS_ATTR, self.name());
        let exit_code = next.run(ctx);
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{}", self.message(ctx, exit_code));
        exit_code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::PluginChain;
    use crate::plugin::{PluginExt, plugin_fn};

    fn ctx(target: Option<&str>) -> ExecutionContext {
        ExecutionContext::new(target.map(str::to_string), "cargo build").with_make_level(None)
    }

    #[test]
    fn test_plain_messages() {
        let report = Report::with_color(false);
        insta::assert_snapshot!(report.message(&ctx(Some("build")), 0), @"❱ build succeeded ✓");
        insta::assert_snapshot!(
            report.message(&ctx(None), 2),
            @"❱ cargo build failed ✘ (exit code 2)"
        );
    }

    #[test]
    fn test_colored_message_wraps_symbols() {
        let message = Report::with_color(true).message(&ctx(Some("build")), 1);
        assert!(message.contains(&format!("{FAILURE}✘{Reset}")));
        assert!(message.contains(&format!("{BOLD}build{Reset}")));
    }

    #[test]
    fn test_status_is_unchanged() {
        let mut chain = PluginChain::new(plugin_fn("terminal", |_, _| 9));
        chain.register(Report::with_color(false).shared());
        let mut ctx = ctx(Some("build"));
        assert_eq!(chain.execute(&mut ctx), 9);
        assert!(ctx.contains(PLUGINS_ATTR));
    }
}
