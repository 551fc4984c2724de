use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use log::kv::{self, Key, Value, VisitSource};
use log::{Level, Log, Metadata, Record};
use parking_lot::Mutex;

const MAX_LOG_ENTRIES: usize = 1000;

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: Vec<(String, String)>,
    pub timestamp: Instant,
}

impl LogEntry {
    /// Rendered value of the key/value field `key`.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

struct FieldCollector<'a>(&'a mut Vec<(String, String)>);

impl<'kvs> VisitSource<'kvs> for FieldCollector<'_> {
    fn visit_pair(&mut self, key: Key<'kvs>, value: Value<'kvs>) -> Result<(), kv::Error> {
        self.0.push((key.to_string(), value.to_string()));
        Ok(())
    }
}

/// Thread-safe ring buffer for log entries.
///
/// Implements [`Log`], so it can back a [`crate::logger::Sink`] to inspect the events of an
/// invocation after the fact.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
    filter: log::LevelFilter,
}

impl LogBuffer {
    /// Buffer that records every level.
    #[must_use]
    pub fn new() -> Self {
        Self::with_filter(log::LevelFilter::Trace)
    }

    #[must_use]
    pub fn with_filter(filter: log::LevelFilter) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(MAX_LOG_ENTRIES))),
            filter,
        }
    }

    pub fn push(&self, entry: LogEntry) {
        let mut entries = self.entries.lock();
        if entries.len() >= MAX_LOG_ENTRIES {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Returns a snapshot of all entries.
    #[must_use]
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Entries recorded at exactly `level`.
    #[must_use]
    pub fn at_level(&self, level: Level) -> Vec<LogEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.level == level)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Log for LogBuffer {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.filter
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let mut fields = Vec::new();
        let _ = record.key_values().visit(&mut FieldCollector(&mut fields));
        self.push(LogEntry {
            level: record.level(),
            target: record.target().to_string(),
            message: format!("{}", record.args()),
            fields,
            timestamp: Instant::now(),
        });
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(message: &str) -> LogEntry {
        LogEntry {
            level: Level::Info,
            target: "test".to_string(),
            message: message.to_string(),
            fields: vec![("key".to_string(), "value".to_string())],
            timestamp: Instant::now(),
        }
    }

    #[test]
    fn test_ring_buffer_drops_oldest() {
        let buffer = LogBuffer::new();
        for i in 0..=MAX_LOG_ENTRIES {
            buffer.push(entry(&i.to_string()));
        }
        let entries = buffer.entries();
        assert_eq!(entries.len(), MAX_LOG_ENTRIES);
        assert_eq!(entries[0].message, "1");
        assert_eq!(entries[0].field("key"), Some("value"));
    }

    #[test]
    fn test_filter_applies() {
        let buffer = LogBuffer::with_filter(log::LevelFilter::Info);
        buffer.log(
            &Record::builder()
                .args(format_args!("hidden"))
                .level(Level::Debug)
                .build(),
        );
        buffer.log(
            &Record::builder()
                .args(format_args!("shown"))
                .level(Level::Error)
                .build(),
        );
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.at_level(Level::Error)[0].message, "shown");
    }
}
