//! Error types shared by every layer of dynproj.

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for query composition, parsing and execution.
#[derive(Debug, Error)]
pub enum Error {
    /// A required input was absent or malformed.
    #[error("invalid argument: `{0}` is required")]
    InvalidArgument(&'static str),

    /// No mapping configuration could be resolved from any tier.
    #[error(
        "no mapping configuration available: call `dynproj::set_default_configuration` \
         before querying without a configuration, or use an overload that takes one"
    )]
    MissingConfiguration,

    /// Expression text could not be parsed or type-checked.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The query engine failed while composing or evaluating a pipeline.
    #[error("execution error: {0}")]
    Execution(String),

    /// A mapping configuration file could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Syntax, member-resolution or type error in an expression.
///
/// `position` is the character offset in the expression text where the
/// problem was detected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (at index {position})")]
pub struct ParseError {
    pub position: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

impl Error {
    /// Returns the inner parse error, if this is one.
    pub fn as_parse(&self) -> Option<&ParseError> {
        match self {
            Error::Parse(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display_includes_position() {
        let err = ParseError::new(4, "Unknown identifier 'Foo'");
        assert_eq!(err.to_string(), "Unknown identifier 'Foo' (at index 4)");
    }

    #[test]
    fn test_parse_error_converts_into_error() {
        let err: Error = ParseError::new(0, "Expression expected").into();
        assert!(matches!(err, Error::Parse(_)));
        assert_eq!(err.as_parse().unwrap().position, 0);
    }

    #[test]
    fn test_missing_configuration_names_initializer() {
        let msg = Error::MissingConfiguration.to_string();
        assert!(msg.contains("set_default_configuration"));
    }

    #[test]
    fn test_invalid_argument_names_argument() {
        let msg = Error::InvalidArgument("predicate").to_string();
        assert!(msg.contains("`predicate`"));
    }
}
