use std::time::{Duration, Instant};

use log::Level;

use crate::context::ExecutionContext;
use crate::plugin::{Next, Plugin};

use super::PLUGINS_ATTR;

/// Attribute holding the duration of the wrapped execution, in milliseconds.
pub const DURATION_ATTR: &str = "duration_ms";

/// Measures how long the rest of the chain takes.
pub struct Timing;

pub(crate) fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let tenths = d.subsec_millis() / 100;
    if total_secs < 60 {
        format!("{total_secs}.{tenths}s")
    } else {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        format!("{mins}m {secs}.{tenths}s")
    }
}

impl Plugin for Timing {
    fn name(&self) -> &str {
        "timing"
    }

    fn invoke(&self, ctx: &mut ExecutionContext, next: Next<'_>) -> i32 {
        ctx.append(PLUGINS_ATTR, self.name());
        let start = Instant::now();
        let exit_code = next.run(ctx);
        let elapsed = start.elapsed();

        ctx.set(
            DURATION_ATTR,
            i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
        );
        ctx.sink().emit(
            Level::Info,
            format_args!(
                "Command took {} (exit code {exit_code})",
                format_duration(elapsed)
            ),
            &ctx.as_map(),
        );
        exit_code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::PluginChain;
    use crate::context::AttrValue;
    use crate::log_buffer::LogBuffer;
    use crate::logger::Sink;
    use crate::plugin::{PluginExt, plugin_fn};

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(1234)), "1.2s");
        assert_eq!(format_duration(Duration::from_millis(61_500)), "1m 1.5s");
    }

    #[test]
    fn test_records_duration_and_status() {
        let buffer = LogBuffer::new();
        let mut chain = PluginChain::new(plugin_fn("terminal", |_, _| {
            std::thread::sleep(Duration::from_millis(20));
            2
        }));
        chain.register(Timing.shared());

        let mut ctx = ExecutionContext::new(None, "sleep")
            .with_make_level(None)
            .with_sink(Sink::new(buffer.clone()));
        assert_eq!(chain.execute(&mut ctx), 2);

        let duration = ctx
            .get(DURATION_ATTR)
            .and_then(AttrValue::as_int)
            .unwrap();
        assert!(duration >= 20);
        assert_eq!(
            ctx.get(PLUGINS_ATTR),
            Some(&AttrValue::from(vec!["timing"]))
        );

        let infos = buffer.at_level(Level::Info);
        assert_eq!(infos.len(), 1);
        assert!(infos[0].message.ends_with("(exit code 2)"));
        let rendered = duration.to_string();
        assert_eq!(infos[0].field(DURATION_ATTR), Some(rendered.as_str()));
    }
}
