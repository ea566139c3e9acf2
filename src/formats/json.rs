use serde_json::{Map, Value};

use super::FormatDetector;
use crate::pipeline::config::PipelineConfig;
use crate::record::OrderedRecord;

/// Lines that are a flat JSON object become one field per key.
pub struct JsonDetector;

impl JsonDetector {
    fn value_to_string(value: Value) -> String {
        match value {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

impl FormatDetector for JsonDetector {
    fn detect(&self, record: &mut OrderedRecord, config: &PipelineConfig) -> bool {
        let message = match record.get(&config.message_key) {
            Some(message) if message.starts_with('{') && message.ends_with('}') => message,
            _ => return false,
        };

        let object: Map<String, Value> = match serde_json::from_str(message) {
            Ok(object) => object,
            Err(e) => {
                tracing::trace!(error = %e, "message looked like JSON but did not parse");
                return false;
            }
        };

        // The object replaces the message; a "message" key inside it wins.
        record.set(config.message_key.as_str(), "");
        for (key, value) in object {
            record.set(key, Self::value_to_string(value));
        }
        true
    }

    fn name(&self) -> &str {
        "json"
    }
}
