//! Testing utilities to work with logs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    collections::HashMap,
    io::Write,
    sync::{Arc, Mutex},
};
use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;

/// Collects the JSON lines the test subscriber writes, so tests can look for
/// the events Smog logged while serving their requests.
#[derive(Default)]
pub struct LogWatcher {
    /// Bytes written by the subscriber and not yet parsed. A trailing partial
    /// line stays here until the rest of it arrives.
    pending: Arc<Mutex<Vec<u8>>>,

    /// Every complete event seen so far, oldest first.
    seen: Vec<TracingJsonEvent>,
}

impl LogWatcher {
    /// All events logged so far.
    pub fn events(&mut self) -> std::slice::Iter<TracingJsonEvent> {
        self.drain_pending();
        self.seen.iter()
    }

    /// Whether any event logged so far satisfies `predicate`.
    ///
    /// ```
    /// # use smog_integration_tests::LogWatcher;
    /// # let mut log_watcher = LogWatcher::default();
    /// assert!(!log_watcher.has(|event| event.field_contains("city", "krakow")));
    /// ```
    #[must_use = "LogWatcher::has does not make assertions alone, you probably want to wrap it in assert!()"]
    pub fn has<F>(&mut self, predicate: F) -> bool
    where
        F: FnMut(&TracingJsonEvent) -> bool,
    {
        self.events().any(predicate)
    }

    /// Parse every complete line in `pending` into `seen`.
    fn drain_pending(&mut self) {
        let mut pending = self.pending.lock().expect("log buffer mutex was poisoned");
        let complete = match pending.iter().rposition(|byte| *byte == b'\n') {
            Some(last_newline) => pending.drain(..=last_newline).collect::<Vec<u8>>(),
            None => return,
        };
        let text = String::from_utf8(complete).expect("logs should be utf8");

        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            let event = serde_json::from_str(line)
                .unwrap_or_else(|error| panic!("Log line is not an event ({}): {}", error, line));
            self.seen.push(event);
        }
    }
}

impl<'a> MakeWriter<'a> for LogWatcher {
    type Writer = LogWatcherWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogWatcherWriter {
            pending: self.pending.clone(),
        }
    }
}

/// The writer handed to the subscriber. It appends to the buffer of the
/// [`LogWatcher`] it was made from.
#[derive(Clone)]
pub struct LogWatcherWriter {
    /// Shared with the owning watcher.
    pending: Arc<Mutex<Vec<u8>>>,
}

impl Write for LogWatcherWriter {
    fn write(&mut self, new_bytes: &[u8]) -> std::io::Result<usize> {
        self.pending
            .lock()
            .map_err(|error| std::io::Error::new(std::io::ErrorKind::Other, error.to_string()))?
            .extend_from_slice(new_bytes);
        Ok(new_bytes.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A deserialization of [`tracing_subscriber::fmt::format::Json`]'s output format.
#[derive(Debug, Deserialize, Serialize)]
pub struct TracingJsonEvent {
    /// The key-value fields logged on the event, usually including `message`.
    pub fields: HashMap<String, Value>,
    /// The level the event was emitted at.
    #[serde(with = "serde_with::rust::display_fromstr")]
    pub level: Level,
    /// The target of the event.
    pub target: String,
    /// The time the event was emitted.
    pub timestamp: String,
}

impl TracingJsonEvent {
    /// Whether the field `name` is text containing `needle`.
    pub fn field_contains(&self, name: &str, needle: &str) -> bool {
        self.fields
            .get(name)
            .and_then(Value::as_str)
            .map_or(false, |value| value.contains(needle))
    }
}
