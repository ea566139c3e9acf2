//! Loading `logrecycler.yaml` into a validated [`AppConfig`].
//!
//! Everything that can be wrong with a config is reported here, before a
//! single line is read: unknown keys, bad regexes, out-of-range sample rates.

use std::path::Path;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;
use crate::metrics::prometheus::PrometheusConfig;
use crate::metrics::statsd::StatsdConfig;
use crate::pipeline::config::{PatternRule, PipelineConfig, StructuredFormats, DEFAULT_MESSAGE_KEY};

pub const DEFAULT_CONFIG_PATH: &str = "logrecycler.yaml";

static PROMETHEUS_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").expect("static regex"));

/// The YAML file as written by the operator.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct FileConfig {
    pub prometheus: Option<PrometheusSection>,
    pub statsd: Option<StatsdSection>,
    pub glog: Option<String>,
    pub json: Option<String>,
    pub timestamp_key: Option<String>,
    pub level_key: Option<String>,
    pub message_key: Option<String>,
    pub preprocess: Option<String>,
    pub allow_metric_labels: Option<Vec<String>>,
    #[serde(default)]
    pub patterns: Vec<PatternSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusSection {
    pub port: u16,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatsdSection {
    pub address: String,
    pub metric: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PatternSection {
    pub regex: String,
    #[serde(default)]
    pub discard: bool,
    #[serde(default, deserialize_with = "scalar_map")]
    pub add: IndexMap<String, String>,
    pub level: Option<String>,
    pub sample_rate: Option<f64>,
    #[serde(default)]
    pub ignore_metric_labels: Vec<String>,
}

/// Fully validated configuration: the pipeline plus whichever sinks are enabled.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub prometheus: Option<PrometheusConfig>,
    pub statsd: Option<StatsdConfig>,
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = if is_blank_document(content) {
            FileConfig::default()
        } else {
            serde_yaml::from_str(content)?
        };
        Self::compile(file)
    }

    pub fn compile(file: FileConfig) -> Result<Self, ConfigError> {
        let pipeline = compile_pipeline(&file)?;

        let prometheus = match file.prometheus {
            Some(section) => {
                let labels = pipeline.possible_labels();
                if let Some(bad) = labels.iter().find(|l| !is_valid_label_name(l)) {
                    return Err(ConfigError::InvalidLabel(bad.clone()));
                }
                Some(PrometheusConfig {
                    port: section.port,
                    labels,
                })
            }
            None => None,
        };

        let statsd = file.statsd.map(|section| StatsdConfig {
            address: section.address,
            metric: section.metric,
        });

        Ok(AppConfig {
            pipeline,
            prometheus,
            statsd,
        })
    }
}

fn compile_pipeline(file: &FileConfig) -> Result<PipelineConfig, ConfigError> {
    let mut patterns = Vec::with_capacity(file.patterns.len());
    for (i, section) in file.patterns.iter().enumerate() {
        let regex = compile_regex(&section.regex, format!("patterns[{}].regex", i))?;

        if let Some(rate) = section.sample_rate {
            if !(0.0..=1.0).contains(&rate) {
                return Err(ConfigError::SampleRate(rate));
            }
        }

        patterns.push(PatternRule {
            regex,
            discard: section.discard,
            sample_rate: section.sample_rate,
            level: non_empty(&section.level),
            add: section.add.clone(),
            ignore_metric_labels: section.ignore_metric_labels.clone(),
        });
    }

    let preprocess = match non_empty(&file.preprocess) {
        Some(expr) => Some(compile_regex(&expr, "preprocess".to_string())?),
        None => None,
    };

    Ok(PipelineConfig {
        message_key: non_empty(&file.message_key).unwrap_or_else(|| DEFAULT_MESSAGE_KEY.to_string()),
        timestamp_key: non_empty(&file.timestamp_key),
        level_key: non_empty(&file.level_key),
        preprocess,
        formats: StructuredFormats {
            glog: format_flag("glog", &file.glog)?,
            json: format_flag("json", &file.json)?,
        },
        patterns,
        allow_metric_labels: file.allow_metric_labels.clone(),
    })
}

fn compile_regex(expr: &str, location: String) -> Result<Regex, ConfigError> {
    Regex::new(expr).map_err(|source| ConfigError::Regex { location, source })
}

/// `glog: simple` / `json: simple`; unset or empty disables the detector
fn format_flag(key: &'static str, value: &Option<String>) -> Result<bool, ConfigError> {
    match non_empty(value).as_deref() {
        None => Ok(false),
        Some("simple") => Ok(true),
        Some(other) => Err(ConfigError::UnknownFormat {
            key,
            value: other.to_string(),
        }),
    }
}

/// An empty file, or one holding only comments and document markers
fn is_blank_document(content: &str) -> bool {
    content.lines().all(|line| {
        let line = line.trim();
        line.is_empty() || line.starts_with('#') || line == "---"
    })
}

/// `add` values are field values, so scalars of any YAML type become strings
fn scalar_map<'de, D: Deserializer<'de>>(deserializer: D) -> Result<IndexMap<String, String>, D::Error> {
    let raw = IndexMap::<String, serde_yaml::Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| match value {
            serde_yaml::Value::String(s) => Ok((key, s)),
            serde_yaml::Value::Number(n) => Ok((key, n.to_string())),
            serde_yaml::Value::Bool(b) => Ok((key, b.to_string())),
            serde_yaml::Value::Null => Ok((key, String::new())),
            _ => Err(D::Error::custom(format!("add.{}: expected a scalar value", key))),
        })
        .collect()
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.is_empty()).cloned()
}

fn is_valid_label_name(name: &str) -> bool {
    PROMETHEUS_LABEL.is_match(name) && !name.starts_with("__")
}
