use sql_migration_connector::ConnectorError;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Bad configuration reference, unknown app, or ambiguous app
    /// selection.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A migration artifact could not be loaded or parsed.
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// Multiple roots, no root, a cycle, or an unknown dependency in the
    /// artifact graph.
    #[error("Dependency error: {0}")]
    Dependency(String),

    /// The applied-migrations ledger is in an unexpected shape.
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// The caller-provided cancellation signal fired between operations.
    #[error("the migration run was cancelled")]
    Cancelled,

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Connector(#[from] ConnectorError),
}

impl CoreError {
    pub fn config(message: impl Into<String>) -> Self {
        CoreError::Config(message.into())
    }

    pub fn discovery(message: impl Into<String>) -> Self {
        CoreError::Discovery(message.into())
    }

    pub fn dependency(message: impl Into<String>) -> Self {
        CoreError::Dependency(message.into())
    }

    pub fn ledger(message: impl Into<String>) -> Self {
        CoreError::Ledger(message.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        CoreError::Io {
            context: context.into(),
            source,
        }
    }
}
