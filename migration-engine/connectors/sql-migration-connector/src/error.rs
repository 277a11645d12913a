use crate::model_ref::ModelRef;

pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// An operation referenced a model, field or index that does not exist
    /// in the current state, or was constructed with invalid parameters.
    #[error("Operation error: {0}")]
    Operation(String),

    /// A field type or declaration the current dialect cannot express.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A cycle of non-nullable foreign keys among models that are all being
    /// created in the same diff. No creation order exists.
    #[error("cannot create models {}: cycle of non-nullable foreign keys", models_list(.0))]
    UnbuildableCycle(Vec<ModelRef>),

    /// The underlying database driver failed. Carries the SQL that was being
    /// executed.
    #[error("Database error: {source}\n\nSQL: {sql}")]
    Execution {
        sql: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl ConnectorError {
    pub fn operation(message: impl Into<String>) -> Self {
        ConnectorError::Operation(message.into())
    }

    pub fn schema(message: impl Into<String>) -> Self {
        ConnectorError::Schema(message.into())
    }

    pub fn execution(
        sql: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::Execution {
            sql: sql.into(),
            source: Box::new(source),
        }
    }
}

fn models_list(models: &[ModelRef]) -> String {
    models
        .iter()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
