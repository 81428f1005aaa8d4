use thiserror::Error;

/// Errors from repository operations (used by trait definitions in meshrelay-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,
}

/// Errors raised by a mesh transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("transport disconnected")]
    Disconnected,

    #[error("send rejected: {0}")]
    Rejected(String),
}

/// Errors loading or validating `meshrelay.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {message}")]
    Read { path: String, message: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors from a command handler.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("{0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("syntax error".to_string());
        assert_eq!(err.to_string(), "query error: syntax error");
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Read {
            path: "/etc/meshrelay.toml".to_string(),
            message: "permission denied".to_string(),
        };
        assert!(err.to_string().contains("/etc/meshrelay.toml"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_command_error_wraps_repository() {
        let err: CommandError = RepositoryError::Connection.into();
        assert_eq!(err.to_string(), "database connection error");
    }
}
