use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Source unavailable: {path}: {reason}")]
    SourceUnavailable { path: String, reason: String },

    #[error("Field '{field}' has value '{value}' which is not a valid {expected}")]
    Coercion {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Batch log write failed: {0}")]
    LogWrite(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl ImportError {
    pub fn source_unavailable(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        ImportError::SourceUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Errors raised while handling one record that the run absorbs as a failed row.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            ImportError::Coercion { .. }
                | ImportError::MissingField(_)
                | ImportError::Store(_)
                | ImportError::Sqlite(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
