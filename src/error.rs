//! Error types for parsing, binding and evaluation.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SqlError>;

/// Errors produced by the expression core.
///
/// Parse errors carry the byte offset of the failure; binding and
/// validation errors carry the name or surface text of the offending
/// clause so a caller can pinpoint it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SqlError {
    /// Malformed syntax, unterminated literals, ambiguous names.
    #[error("parse error at offset {offset}: {message}")]
    Parse { message: String, offset: usize },

    /// A binder asked a scope for a capability it does not implement.
    #[error("binding scope '{scope}' does not support {capability} (wanted '{name}')")]
    UnsupportedCapability {
        scope: String,
        capability: &'static str,
        name: String,
    },

    /// Double registration of a live name.
    #[error("attempt to double register {kind} '{name}'")]
    DuplicateRegistration { kind: &'static str, name: String },

    /// Semantic validation failure (aggregator mixing, join-only
    /// functions outside a join, constant extraction from a
    /// non-constant expression, ...).
    #[error("{message}")]
    Semantic { message: String, surface: String },

    /// Runtime failure inside a bound evaluator.
    #[error("evaluation error: {message}")]
    Evaluation { message: String },
}

impl SqlError {
    pub fn parse(message: impl Into<String>, offset: usize) -> Self {
        SqlError::Parse {
            message: message.into(),
            offset,
        }
    }

    pub fn unsupported(
        scope: impl Into<String>,
        capability: &'static str,
        name: impl Into<String>,
    ) -> Self {
        SqlError::UnsupportedCapability {
            scope: scope.into(),
            capability,
            name: name.into(),
        }
    }

    pub fn semantic(message: impl Into<String>, surface: impl Into<String>) -> Self {
        SqlError::Semantic {
            message: message.into(),
            surface: surface.into(),
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        SqlError::Evaluation {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SqlError::parse("Expected identifier or constant", 4);
        assert_eq!(err.to_string(), "parse error at offset 4: Expected identifier or constant");

        let err = SqlError::unsupported("constant-folding scope", "column lookup", "x");
        assert!(err.to_string().contains("does not support column lookup"));
        assert!(err.to_string().contains("'x'"));

        let err = SqlError::DuplicateRegistration {
            kind: "function",
            name: "sqrt".to_string(),
        };
        assert_eq!(err.to_string(), "attempt to double register function 'sqrt'");
    }
}
