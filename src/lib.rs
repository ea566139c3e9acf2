// src/lib.rs
pub mod config;
pub mod error;
pub mod formats;
pub mod metrics;
pub mod pipeline;
pub mod record;
pub mod source;

pub use error::*;
pub use pipeline::*;

pub use config::{AppConfig, DEFAULT_CONFIG_PATH};
pub use metrics::{MetricSink, SinkSet};
pub use record::OrderedRecord;
pub use source::{SourceLine, StreamMultiplexer, Subprocess};
