//! Detectors for well-known structured line formats.
//!
//! Detectors run after preprocessing and before pattern rules. Each one looks
//! at the current message and, when it recognizes its format, rewrites the
//! message and adds the fields it understood. Anything it does not recognize
//! is left untouched.

use crate::pipeline::config::PipelineConfig;
use crate::record::OrderedRecord;

pub mod glog;
pub mod json;

pub use glog::GlogDetector;
pub use json::JsonDetector;

pub trait FormatDetector: Send + Sync {
    /// Returns true when the message was recognized and the record rewritten.
    fn detect(&self, record: &mut OrderedRecord, config: &PipelineConfig) -> bool;
    fn name(&self) -> &str;
}

/// Detectors enabled by the config, in the order they run.
pub fn detectors_for(config: &PipelineConfig) -> Vec<Box<dyn FormatDetector>> {
    let mut detectors: Vec<Box<dyn FormatDetector>> = Vec::new();
    if config.formats.glog {
        detectors.push(Box::new(GlogDetector));
    }
    if config.formats.json {
        detectors.push(Box::new(JsonDetector));
    }
    detectors
}
