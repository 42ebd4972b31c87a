//! Error types for the page responder.

/// Configuration-related errors. Only ever fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse reply catalog: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Failures of the read-side collaborators (keyword table, user profiles).
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("{source_name} request failed: {reason}")]
    RequestFailed { source_name: String, reason: String },

    #[error("Invalid response from {source_name}: {reason}")]
    InvalidResponse { source_name: String, reason: String },
}
