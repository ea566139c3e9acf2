//! Metric backends that count accepted lines.
//!
//! Every accepted line increments one counter per active sink, labelled with
//! the line's label map. Sinks never block the line loop for longer than a
//! local operation: a mutex-guarded map update or a non-blocking datagram.

use crate::config::AppConfig;
use crate::error::MetricsError;
use crate::pipeline::context::LabelMap;

pub mod prometheus;
pub mod statsd;

pub use prometheus::{PrometheusConfig, PrometheusSink};
pub use statsd::{StatsdConfig, StatsdSink};

pub trait MetricSink: Send {
    fn name(&self) -> &str;
    /// Acquire the listener or client handle. Calling it again is a no-op.
    fn start(&mut self) -> Result<(), MetricsError>;
    /// Release whatever `start` acquired. Safe to call more than once.
    fn stop(&mut self);
    fn increment(&self, labels: &LabelMap);
}

/// All active sinks. Stops every sink when dropped.
#[derive(Default)]
pub struct SinkSet {
    sinks: Vec<Box<dyn MetricSink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// One sink per metrics section present in the config.
    pub fn from_config(config: &AppConfig) -> Result<Self, MetricsError> {
        let mut set = SinkSet::new();
        if let Some(prometheus) = &config.prometheus {
            set.push(Box::new(PrometheusSink::new(prometheus.clone())?));
        }
        if let Some(statsd) = &config.statsd {
            set.push(Box::new(StatsdSink::new(statsd.clone())));
        }
        Ok(set)
    }

    pub fn push(&mut self, sink: Box<dyn MetricSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Start every sink; if one fails the ones already started are stopped.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        for i in 0..self.sinks.len() {
            if let Err(e) = self.sinks[i].start() {
                for sink in self.sinks[..i].iter_mut() {
                    sink.stop();
                }
                return Err(e);
            }
            tracing::info!(sink = self.sinks[i].name(), "metrics sink started");
        }
        Ok(())
    }

    pub fn increment(&self, labels: &LabelMap) {
        for sink in &self.sinks {
            sink.increment(labels);
        }
    }

    pub fn stop(&mut self) {
        for sink in &mut self.sinks {
            sink.stop();
        }
    }
}

impl Drop for SinkSet {
    fn drop(&mut self) {
        self.stop();
    }
}
