use super::ast::Operator;
use thiserror::Error;

/// Errors that can occur when parsing or lowering filter expressions
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Unrecognized input '{token}' at position {position}")]
    Lex { token: String, position: usize },

    #[error("Syntax error at position {position}: {message}")]
    Syntax { message: String, position: usize },

    #[error("Invalid escape sequence: \\{0}")]
    InvalidEscape(char),

    #[error("Unimplemented operator: {0}")]
    UnsupportedOperator(Operator),

    #[error("Not a field: '{0}'")]
    NotAField(String),

    #[error("Invalid target '{field}': {reason}")]
    InvalidTarget { field: String, reason: String },

    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl FilterError {
    pub(crate) fn syntax(message: impl Into<String>, position: usize) -> Self {
        FilterError::Syntax {
            message: message.into(),
            position,
        }
    }
}
