use chrono::{Datelike, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use super::FormatDetector;
use crate::pipeline::config::PipelineConfig;
use crate::record::OrderedRecord;

/// `Lmmdd hh:mm:ss.uuuuuu threadid file:line] msg`
static GLOG_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([IWEF])(\d{2})(\d{2}) (\d{2}):(\d{2}):(\d{2})\.\d+ +\d+ \S+:\d+] ")
        .expect("static regex")
});

pub struct GlogDetector;

impl GlogDetector {
    fn level_name(code: &str) -> &'static str {
        match code {
            "W" => "WARN",
            "E" => "ERROR",
            "F" => "FATAL",
            _ => "INFO",
        }
    }

    /// glog omits the year, so the current one is assumed.
    fn timestamp(month: u32, day: u32, hour: u32, minute: u32, second: u32) -> Option<String> {
        let date = NaiveDate::from_ymd_opt(Utc::now().year(), month, day)?;
        let datetime = date.and_hms_opt(hour, minute, second)?;
        Some(datetime.format("%Y-%m-%dT%H:%M:%SZ").to_string())
    }
}

impl FormatDetector for GlogDetector {
    fn detect(&self, record: &mut OrderedRecord, config: &PipelineConfig) -> bool {
        let message = match record.get(&config.message_key) {
            Some(message) => message,
            None => return false,
        };
        let captures = match GLOG_PREFIX.captures(message) {
            Some(captures) => captures,
            None => return false,
        };

        let rest = message[captures.get(0).map_or(0, |m| m.end())..].to_string();
        let level = Self::level_name(&captures[1]);
        let number = |i: usize| captures[i].parse::<u32>().unwrap_or(0);
        let timestamp = Self::timestamp(number(2), number(3), number(4), number(5), number(6));

        record.set(config.message_key.as_str(), rest);
        if let Some(level_key) = &config.level_key {
            record.set(level_key.as_str(), level);
        }
        if let (Some(timestamp_key), Some(timestamp)) = (&config.timestamp_key, timestamp) {
            record.set(timestamp_key.as_str(), timestamp);
        }
        true
    }

    fn name(&self) -> &str {
        "glog"
    }
}
