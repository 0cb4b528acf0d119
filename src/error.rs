use std::path::PathBuf;

use thiserror::Error;

/// Main application error type that encompasses all possible failure modes
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error at byte {position}: {reason}")]
    Parse { position: u64, reason: String },

    #[error("unknown encoding label: {label}")]
    UnknownEncoding { label: String },

    #[error("{} is not valid {encoding}", .path.display())]
    Decode { path: PathBuf, encoding: String },

    #[error("content cannot be encoded as {encoding}")]
    Encode { encoding: String },

    #[error("backup failed for {}: {details}", .path.display())]
    Backup { path: PathBuf, details: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("concurrent operation error: {details}")]
    Concurrency { details: String },
}

impl FormatError {
    /// Build a parse failure from any displayable parser error.
    pub fn parse(position: u64, reason: impl ToString) -> Self {
        FormatError::Parse {
            position,
            reason: reason.to_string(),
        }
    }
}

/// Configuration-specific error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {}", .path.display())]
    FileNotFound { path: PathBuf },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("unsupported configuration file format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid configuration value: {field} = {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

impl From<ConfigError> for FormatError {
    fn from(err: ConfigError) -> Self {
        FormatError::Config(err.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, FormatError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
