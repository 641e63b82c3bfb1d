/// Errors the Interface Configurator surfaces to the Forwarder.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("permission denied running administrative command")]
    PermissionDenied,

    #[error("required administrative command not found: {0}")]
    ToolingMissing(String),

    #[error("configuration command failed: {0}")]
    ConfigurationFailed(String),

    #[error("interface statistics unavailable")]
    StatsUnavailable,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
