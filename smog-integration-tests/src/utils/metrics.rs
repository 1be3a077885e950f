//! Tools to help testing metrics

use cadence::{SpyMetricSink, StatsdClient};
use crossbeam_channel::Receiver;
use statsd_parser::{Message, Metric};

/// Helper to collect metrics during tests, and make assertions about them.
pub struct MetricsWatcher {
    /// Crossbeam channel that receives metrics lines as bytes.
    rx: Receiver<Vec<u8>>,

    /// Metric lines received by the watcher from [`rx`](Self::rx).
    lines: Vec<String>,
}

impl MetricsWatcher {
    /// Make a new metrics watcher, attach it to a [`StatsdClient`] and return both.
    pub fn new_with_client() -> (Self, StatsdClient) {
        let (rx, spy_sink) = SpyMetricSink::new();
        let metrics_client = cadence::StatsdClient::from_sink("", spy_sink);
        let metrics_watcher = Self { rx, lines: vec![] };

        (metrics_watcher, metrics_client)
    }

    /// Consume any waiting events from `rx`.
    fn process_events(&mut self) {
        self.lines.extend(
            self.rx
                .try_iter()
                .map(|bytes| String::from_utf8(bytes).expect("Invalid UTF8 in metric message")),
        );
    }

    /// Get a list of all the metric lines seen by this watcher, such as
    /// `cities.cache:1|c|#status:miss`.
    pub fn all_lines(&mut self) -> &[String] {
        self.process_events();
        self.lines.as_slice()
    }

    /// Get a list of all the metrics seen by this watcher, parsed.
    ///
    /// Lines the parser can't read are left out. Use [`has_line`](Self::has_line)
    /// to check those.
    pub fn all_messages(&mut self) -> Vec<Message> {
        self.all_lines()
            .iter()
            .filter_map(|line| statsd_parser::parse(line.clone()).ok())
            .collect()
    }

    /// Test if any metric this watcher received matches `predicate`.
    ///
    /// # Example
    ///
    /// ```
    /// # use smog_integration_tests::MetricsWatcher;
    /// # use cadence::CountedExt;
    /// # let (mut metrics_watcher, metrics_client) = MetricsWatcher::new_with_client();
    /// #
    /// use statsd_parser::{Counter, Metric};
    /// metrics_client.incr("a-metric").unwrap();
    ///
    /// assert!(metrics_watcher.has(|msg| {
    ///     msg.name == "a-metric"
    ///         && matches!(msg.metric, Metric::Counter(Counter { value, .. }) if value == 1.0)
    /// }));
    /// ```
    pub fn has<F>(&mut self, predicate: F) -> bool
    where
        F: FnMut(&Message) -> bool,
    {
        self.all_messages().iter().any(predicate)
    }

    /// Test if the exact metric line `line` was received.
    pub fn has_line(&mut self, line: &str) -> bool {
        self.all_lines().iter().any(|seen| seen == line)
    }

    /// Count the counter increments received for `name`, across all tags.
    pub fn count(&mut self, name: &str) -> f64 {
        self.all_messages()
            .iter()
            .filter(|msg| msg.name == name)
            .map(|msg| match &msg.metric {
                Metric::Counter(counter) => counter.value,
                _ => 0.0,
            })
            .sum()
    }

    /// Test if any metric this watcher received was a histogram with the given name and value.
    ///
    /// Values are compared by taking the absolute difference between them, and
    /// checking if it less than an epsilon of 0.0001.
    pub fn has_histogram(&mut self, name: &str, expected_value: f64) -> bool {
        self.has(|msg| {
            msg.name == name
                && match &msg.metric {
                    Metric::Histogram(histogram) => {
                        (histogram.value - expected_value).abs() <= 0.0001
                    }
                    _ => false,
                }
        })
    }
}
