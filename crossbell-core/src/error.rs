use thiserror::Error;

/// Errors that can occur while repacking game data.
#[derive(Debug, Error)]
pub enum RepackError {
    /// I/O error while reading or writing a file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or contradictory run configuration
    #[error("Invalid configuration: {0}")]
    Validation(String),

    /// Requested path is absent from the active file system
    #[error("Not found: {0}")]
    NotFound(String),

    /// A record, table or instruction stream does not match its expected layout
    #[error("Format error: {0}")]
    Format(String),

    /// The image grew past the highest addressable sector
    #[error("Disc capacity exceeded: sector {required} is beyond the limit of {limit}")]
    Overflow { required: u64, limit: u64 },

    /// Translation interchange file could not be parsed
    #[error("JSON parse error in {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },

    /// Title configuration could not be parsed
    #[error("Config parse error in {path}: {source}")]
    Config {
        path: String,
        source: toml::de::Error,
    },
}

impl RepackError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Whether this error only concerns the file being processed.
    ///
    /// Format errors leave nothing half-written, so a caller may choose to
    /// skip the offending file and continue.
    pub fn is_file_local(&self) -> bool {
        matches!(self, Self::Format(_))
    }
}

pub type Result<T> = std::result::Result<T, RepackError>;
