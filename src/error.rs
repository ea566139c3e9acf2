use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("open {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("regular expression from {location}: {source}")]
    Regex {
        location: String,
        #[source]
        source: regex::Error,
    },

    #[error("sample must be between 0.0 - 1.0 but was {0:.6}")]
    SampleRate(f64),

    #[error("unsupported value '{value}' for {key}, expected 'simple'")]
    UnknownFormat { key: &'static str, value: String },

    #[error("'{0}' is not a valid prometheus label name")]
    InvalidLabel(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("metrics: {0}")]
    Metrics(#[from] MetricsError),
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("socket: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot resolve statsd address '{0}'")]
    Resolve(String),

    #[error("prometheus registry: {0}")]
    Registry(#[from] prometheus::Error),
}
