use std::fmt;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use log::kv::{self, Key, Source, Value, VisitSource};
use log::{Level, LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;

use crate::context::Attributes;

/// Log target of every structured event emitted by the shell and its plugins.
pub const TARGET: &str = "trackingshell";

impl Source for Attributes {
    fn visit<'kvs>(&'kvs self, visitor: &mut dyn VisitSource<'kvs>) -> Result<(), kv::Error> {
        for (key, value) in self.iter() {
            visitor.visit_pair(Key::from_str(key), Value::from_display(value))?;
        }
        Ok(())
    }
}

/// Destination of the structured events of an invocation.
///
/// The shell and the plugins never log through hidden global state: the sink is handed to
/// the shell when it is built and travels with the execution context. The default sink
/// discards everything.
#[derive(Clone)]
pub struct Sink(Arc<dyn Log>);

impl Sink {
    #[must_use]
    pub fn new(logger: impl Log + 'static) -> Self {
        Self(Arc::new(logger))
    }

    #[must_use]
    pub fn from_arc(logger: Arc<dyn Log>) -> Self {
        Self(logger)
    }

    /// Sink that discards every event.
    #[must_use]
    pub fn nop() -> Self {
        Self::new(NopLogger)
    }

    /// Sink that forwards to the logger installed with the `log` crate.
    #[must_use]
    pub fn global() -> Self {
        Self::new(GlobalLogger)
    }

    #[must_use]
    pub fn enabled(&self, level: Level) -> bool {
        let metadata = Metadata::builder().level(level).target(TARGET).build();
        self.0.enabled(&metadata)
    }

    /// Emit one event with `attributes` attached as key/value fields.
    pub fn emit(&self, level: Level, message: fmt::Arguments<'_>, attributes: &Attributes) {
        if !self.enabled(level) {
            return;
        }
        self.0.log(
            &Record::builder()
                .args(message)
                .level(level)
                .target(TARGET)
                .module_path_static(Some(module_path!()))
                .key_values(attributes)
                .build(),
        );
    }

    pub fn flush(&self) {
        self.0.flush();
    }
}

impl Default for Sink {
    fn default() -> Self {
        Self::nop()
    }
}

impl fmt::Debug for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Sink").finish_non_exhaustive()
    }
}

struct NopLogger;

impl Log for NopLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        false
    }

    fn log(&self, _record: &Record) {}

    fn flush(&self) {}
}

struct GlobalLogger;

impl Log for GlobalLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        log::logger().enabled(metadata)
    }

    fn log(&self, record: &Record) {
        log::logger().log(record);
    }

    fn flush(&self) {
        log::logger().flush();
    }
}

/// Pick the level of the event reporting `exit_code`.
#[must_use]
pub fn level_for_exit_code(exit_code: i32, success: Level, failure: Level) -> Level {
    if exit_code == 0 { success } else { failure }
}

/// Renders the key/value fields of a record as ` key=value` pairs.
pub(crate) struct Fields<'a>(pub &'a dyn Source);

impl fmt::Display for Fields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        struct Writer<'a, 'b>(&'a mut fmt::Formatter<'b>);

        impl<'kvs> VisitSource<'kvs> for Writer<'_, '_> {
            fn visit_pair(&mut self, key: Key<'kvs>, value: Value<'kvs>) -> Result<(), kv::Error> {
                write!(self.0, " {key}={value}").map_err(|_| kv::Error::msg("formatting failed"))
            }
        }

        self.0.visit(&mut Writer(f)).map_err(|_| fmt::Error)
    }
}

struct FileLogger {
    file: Mutex<std::fs::File>,
    filter: LevelFilter,
    start: Instant,
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.filter
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let elapsed = self.start.elapsed().as_secs_f64();
        let _ = writeln!(
            self.file.lock(),
            "[{elapsed:.3}s] [{}] {} — {}{}",
            record.level(),
            record.target(),
            record.args(),
            Fields(record.key_values())
        );
    }

    fn flush(&self) {
        let _ = self.file.lock().flush();
    }
}

/// Resolve the level filter: `RUST_LOG` wins over `configured`, which defaults to `info`.
#[must_use]
pub fn level_filter(configured: Option<LevelFilter>) -> LevelFilter {
    std::env::var("RUST_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .or(configured)
        .unwrap_or(LevelFilter::Info)
}

/// Initialize the global logger, writing every event to `file`.
///
/// # Panics
///
/// Panics if called more than once.
pub fn init(file: std::fs::File, filter: LevelFilter) {
    let logger = FileLogger {
        file: Mutex::new(file),
        filter,
        start: Instant::now(),
    };

    log::set_boxed_logger(Box::new(logger)).expect("logger already initialized");
    log::set_max_level(filter);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::log_buffer::LogBuffer;

    fn snapshot() -> Attributes {
        ExecutionContext::new(Some("build".to_string()), "make all")
            .with_make_level(None)
            .with_attributes([("date", "2015-08-25")])
            .as_map()
    }

    #[test]
    fn test_level_for_exit_code() {
        use Level::{Debug, Error, Info, Warn};

        assert_eq!(level_for_exit_code(0, Info, Error), Info);
        assert_eq!(level_for_exit_code(2, Info, Error), Error);
        assert_eq!(level_for_exit_code(127, Debug, Warn), Warn);
    }

    #[test]
    fn test_nop_sink_is_disabled() {
        let sink = Sink::default();
        assert!(!sink.enabled(Level::Error));
        sink.emit(Level::Error, format_args!("dropped"), &snapshot());
    }

    #[test]
    fn test_emit_attaches_fields() {
        let buffer = LogBuffer::new();
        let sink = Sink::new(buffer.clone());
        sink.emit(Level::Info, format_args!("finished"), &snapshot());

        let entries = buffer.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, Level::Info);
        assert_eq!(entries[0].target, TARGET);
        assert_eq!(entries[0].message, "finished");
        assert_eq!(entries[0].field("target"), Some("build"));
        assert_eq!(entries[0].field("date"), Some("2015-08-25"));
    }

    #[test]
    fn test_fields_rendering() {
        let fields = snapshot();
        insta::assert_snapshot!(
            Fields(&fields),
            @" command=make all date=2015-08-25 target=build"
        );
    }
}
