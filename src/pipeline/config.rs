use indexmap::IndexMap;
use regex::Regex;

pub const DEFAULT_MESSAGE_KEY: &str = "message";

/// One compiled `patterns[]` entry. Immutable once built.
#[derive(Debug, Clone)]
pub struct PatternRule {
    pub regex: Regex,
    pub discard: bool,
    pub sample_rate: Option<f64>,
    pub level: Option<String>,
    /// Literal fields merged after captures, in declared order
    pub add: IndexMap<String, String>,
    pub ignore_metric_labels: Vec<String>,
}

impl PatternRule {
    pub fn new(regex: &str) -> Result<Self, regex::Error> {
        Ok(PatternRule {
            regex: Regex::new(regex)?,
            discard: false,
            sample_rate: None,
            level: None,
            add: IndexMap::new(),
            ignore_metric_labels: Vec::new(),
        })
    }

    pub fn discarding(mut self) -> Self {
        self.discard = true;
        self
    }

    pub fn with_sample_rate(mut self, rate: f64) -> Self {
        self.sample_rate = Some(rate);
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    pub fn with_add(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add.insert(key.into(), value.into());
        self
    }

    pub fn ignoring_label(mut self, label: impl Into<String>) -> Self {
        self.ignore_metric_labels.push(label.into());
        self
    }

    /// Names of the named capture groups, in pattern order.
    pub fn capture_names(&self) -> impl Iterator<Item = &str> {
        self.regex.capture_names().flatten()
    }

    /// Fields this rule can contribute as labels: captures and `add` keys
    /// minus its own ignore list.
    pub fn label_candidates(&self) -> Vec<String> {
        self.capture_names()
            .chain(self.add.keys().map(String::as_str))
            .filter(|name| !self.ignore_metric_labels.iter().any(|i| i == name))
            .map(str::to_string)
            .collect()
    }
}

/// Which structured line formats get detected before pattern matching
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StructuredFormats {
    pub glog: bool,
    pub json: bool,
}

/// Compiled, validated pipeline configuration shared read-only by every line.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub message_key: String,
    pub timestamp_key: Option<String>,
    pub level_key: Option<String>,
    pub preprocess: Option<Regex>,
    pub formats: StructuredFormats,
    pub patterns: Vec<PatternRule>,
    pub allow_metric_labels: Option<Vec<String>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            message_key: DEFAULT_MESSAGE_KEY.to_string(),
            timestamp_key: None,
            level_key: None,
            preprocess: None,
            formats: StructuredFormats::default(),
            patterns: Vec::new(),
            allow_metric_labels: None,
        }
    }
}

impl PipelineConfig {
    /// Keys that are never usable as labels: unbounded or unique values
    pub fn is_unlabelable(&self, key: &str) -> bool {
        key == self.message_key || self.timestamp_key.as_deref() == Some(key)
    }

    /// Every label that could ever be reported for this config, in a stable
    /// order. Backends with a fixed label schema register exactly these.
    pub fn possible_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = Vec::new();

        if let Some(allowed) = &self.allow_metric_labels {
            labels.extend(allowed.iter().cloned());
        } else {
            if let Some(level_key) = &self.level_key {
                labels.push(level_key.clone());
            }
            if let Some(preprocess) = &self.preprocess {
                labels.extend(preprocess.capture_names().flatten().map(str::to_string));
            }
            for pattern in self.patterns.iter().filter(|p| !p.discard) {
                labels.extend(pattern.label_candidates());
            }
        }

        let mut unique: Vec<String> = Vec::with_capacity(labels.len());
        for label in labels {
            if !self.is_unlabelable(&label) && !unique.contains(&label) {
                unique.push(label);
            }
        }
        unique
    }
}
