use crate::error::{ConnectorError, ConnectorResult};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// A fully qualified model reference in the `"app.Model"` format. The app
/// prefix groups models that migrate together.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelRef {
    reference: String,
    dot: usize,
}

impl ModelRef {
    pub fn new(app: &str, model_name: &str) -> Self {
        ModelRef {
            reference: format!("{}.{}", app, model_name),
            dot: app.len(),
        }
    }

    pub fn parse(reference: &str) -> ConnectorResult<Self> {
        let dot = reference.rfind('.').ok_or_else(|| {
            ConnectorError::operation(format!(
                "invalid model reference `{}`, expected the `app.Model` format",
                reference
            ))
        })?;

        if dot == 0 || dot == reference.len() - 1 {
            return Err(ConnectorError::operation(format!(
                "invalid model reference `{}`, expected the `app.Model` format",
                reference
            )));
        }

        Ok(ModelRef {
            reference: reference.to_owned(),
            dot,
        })
    }

    pub fn app(&self) -> &str {
        &self.reference[..self.dot]
    }

    pub fn model_name(&self) -> &str {
        &self.reference[self.dot + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.reference
    }
}

impl Display for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.reference)
    }
}

impl FromStr for ModelRef {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelRef::parse(s)
    }
}

impl TryFrom<String> for ModelRef {
    type Error = ConnectorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ModelRef::parse(&value)
    }
}

impl From<ModelRef> for String {
    fn from(model: ModelRef) -> String {
        model.reference
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_app_and_model_name() {
        let model: ModelRef = "blog.Comment".parse().unwrap();

        assert_eq!(model.app(), "blog");
        assert_eq!(model.model_name(), "Comment");
        assert_eq!(model.as_str(), "blog.Comment");
    }

    #[test]
    fn parse_rejects_missing_app_prefix() {
        assert!(ModelRef::parse("Comment").is_err());
        assert!(ModelRef::parse(".Comment").is_err());
        assert!(ModelRef::parse("blog.").is_err());
    }
}
