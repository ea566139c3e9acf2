use chrono::{SecondsFormat, Utc};
use regex::{Captures, Regex};

use crate::formats::{detectors_for, FormatDetector};
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::context::{DropReason, LabelMap, LineOutcome};
use crate::record::OrderedRecord;

pub const DEFAULT_LEVEL: &str = "INFO";

/// Turns one raw line into a record plus its metric labels, or drops it.
///
/// Stages run in a fixed order: seed, preprocess, structured formats,
/// pattern rules, label derivation. The pipeline holds no per-line state,
/// so one instance serves every line.
pub struct TransformPipeline {
    config: PipelineConfig,
    detectors: Vec<Box<dyn FormatDetector>>,
    sampler: fn() -> f64,
}

impl TransformPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let detectors = detectors_for(&config);
        TransformPipeline {
            config,
            detectors,
            sampler: fastrand::f64,
        }
    }

    /// Replace the uniform [0, 1) source used for `sampleRate` decisions.
    pub fn with_sampler(mut self, sampler: fn() -> f64) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn process(&self, line: &str) -> LineOutcome {
        let config = &self.config;
        let mut record = self.seed(line);

        if let Some(preprocess) = &config.preprocess {
            let message = self.message(&record);
            if let Some(captures) = preprocess.captures(&message) {
                store_captures(preprocess, &captures, &mut record);
            }
        }

        for detector in &self.detectors {
            if detector.detect(&mut record, config) {
                tracing::trace!(format = detector.name(), "structured format detected");
            }
        }

        let mut ignored: &[String] = &[];
        let message = self.message(&record);
        for (index, rule) in config.patterns.iter().enumerate() {
            let captures = match rule.regex.captures(&message) {
                Some(captures) => captures,
                None => continue,
            };

            if rule.discard {
                return LineOutcome::Dropped(DropReason::Discarded { rule: index });
            }
            if let Some(rate) = rule.sample_rate {
                if !self.admit(rate) {
                    return LineOutcome::Dropped(DropReason::SampledOut { rule: index });
                }
            }

            if let (Some(level), Some(level_key)) = (&rule.level, &config.level_key) {
                record.set(level_key.as_str(), level.as_str());
            }
            store_captures(&rule.regex, &captures, &mut record);
            record.merge(rule.add.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            ignored = &rule.ignore_metric_labels;
            break; // a line only ever matches one pattern
        }

        let labels = self.labels(&record, ignored);
        LineOutcome::Accepted { record, labels }
    }

    fn seed(&self, line: &str) -> OrderedRecord {
        let mut record = OrderedRecord::new();
        if let Some(timestamp_key) = &self.config.timestamp_key {
            record.set(
                timestamp_key.as_str(),
                Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            );
        }
        if let Some(level_key) = &self.config.level_key {
            record.set(level_key.as_str(), DEFAULT_LEVEL);
        }
        record.set(self.config.message_key.as_str(), line);
        record
    }

    fn message(&self, record: &OrderedRecord) -> String {
        record
            .get(&self.config.message_key)
            .unwrap_or_default()
            .to_string()
    }

    /// 0.0 and 1.0 are exact; anything between is a coin flip.
    fn admit(&self, rate: f64) -> bool {
        if rate >= 1.0 {
            true
        } else if rate <= 0.0 {
            false
        } else {
            (self.sampler)() <= rate
        }
    }

    fn labels(&self, record: &OrderedRecord, ignored: &[String]) -> LabelMap {
        let config = &self.config;
        record
            .iter()
            .filter(|(key, _)| !config.is_unlabelable(key))
            .filter(|(key, _)| match &config.allow_metric_labels {
                Some(allowed) => allowed.iter().any(|a| a == key),
                None => !ignored.iter().any(|i| i == key),
            })
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }
}

/// Every named group is stored; groups that did not participate store "".
fn store_captures(regex: &Regex, captures: &Captures, record: &mut OrderedRecord) {
    for (i, name) in regex.capture_names().enumerate() {
        if let Some(name) = name {
            let value = captures.get(i).map_or("", |m| m.as_str());
            record.set(name, value);
        }
    }
}
