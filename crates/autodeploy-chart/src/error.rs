//! Error types for values loading and manifest rendering
//!
//! Generation itself is total. Errors only come from turning user input
//! (values files, `--set` expressions) into a `ReleaseValues`, and from
//! serializing the generated resources.

use thiserror::Error;

/// Errors raised while loading values or rendering manifests
#[derive(Debug, Error)]
pub enum ChartError {
    /// A `--set` expression could not be parsed
    #[error("invalid set expression '{expression}': {message}")]
    InvalidSetExpression {
        /// The expression as given by the user
        expression: String,
        /// Description of what's invalid
        message: String,
    },

    /// A key path tried to descend through a value of the wrong shape
    #[error("cannot set '{path}': {message}")]
    PathConflict {
        /// The full key path being assigned
        path: String,
        /// Description of the conflict
        message: String,
    },

    /// A values document is not a mapping at the top level
    #[error("values document must be a mapping, found {found}")]
    NotAMapping {
        /// Kind of YAML node found instead
        found: &'static str,
    },

    /// A values document could not be parsed or did not match the schema
    #[error("invalid values: {source}")]
    InvalidValues {
        /// The underlying serde_yaml error
        #[from]
        source: serde_yaml::Error,
    },

    /// Serializing the rendered manifests failed
    #[error("serialization error [{format}]: {message}")]
    Serialization {
        /// Output format being produced (yaml, json)
        format: &'static str,
        /// Description of what failed
        message: String,
    },
}

impl ChartError {
    /// Create an invalid set expression error
    pub fn invalid_set(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSetExpression {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Create a path conflict error
    pub fn path_conflict(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PathConflict {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a serialization error for the given output format
    pub fn serialization(format: &'static str, message: impl Into<String>) -> Self {
        Self::Serialization {
            format,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_set_message_includes_expression() {
        let err = ChartError::invalid_set("workers", "missing '='");
        assert_eq!(
            err.to_string(),
            "invalid set expression 'workers': missing '='"
        );
    }

    #[test]
    fn path_conflict_message_includes_path() {
        let err = ChartError::path_conflict("image.tag.x", "'image.tag' is not a mapping");
        assert!(err.to_string().contains("image.tag.x"));
    }

    #[test]
    fn serialization_message_includes_format() {
        let err = ChartError::serialization("json", "boom");
        assert_eq!(err.to_string(), "serialization error [json]: boom");
    }
}
