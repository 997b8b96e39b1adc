use thiserror::Error;

/// Failures raised while bringing runtime infrastructure up or tearing it
/// down: sockets, pools, migrations, the tracing stack. Request-scoped
/// failures never use this type.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("database: {0}")]
    Database(String),
    #[error("telemetry: {0}")]
    Telemetry(String),
    #[error("configuration: {0}")]
    Configuration(String),
}

impl InfraError {
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
