//! Script error types.

use thiserror::Error;

/// Result type for script operations.
pub type ScriptResult<T> = Result<T, ScriptError>;

/// Script error types.
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    /// Lexical error with source position.
    #[error("lexical error: {message}, near line {line}: {source_line}")]
    Lex {
        message: String,
        line: usize,
        source_line: String,
    },
    /// Syntax error during parsing.
    #[error("syntax error: {message}, near line {line}: {source_line}")]
    Syntax {
        message: String,
        line: usize,
        source_line: String,
    },
    /// Reference error (undefined variable).
    #[error("reference error: {0}")]
    Reference(String),
    /// Type error during execution.
    #[error("type error: {0}")]
    Type(String),
    /// Arithmetic error (division by zero, etc.).
    #[error("arithmetic error: {0}")]
    Arithmetic(String),
    /// Resource limit exceeded (recursion depth, etc.).
    #[error("resource error: {0}")]
    Resource(String),
    /// Error raised by a native function.
    #[error("{0}")]
    Native(String),
    /// Internal error (caller contract violation).
    #[error("internal error: {0}")]
    Internal(String),
}

impl ScriptError {
    /// Create a reference error.
    pub fn reference<S: Into<String>>(msg: S) -> Self {
        ScriptError::Reference(msg.into())
    }

    /// Create a type error.
    pub fn type_error<S: Into<String>>(msg: S) -> Self {
        ScriptError::Type(msg.into())
    }

    /// Create an arithmetic error.
    pub fn arithmetic<S: Into<String>>(msg: S) -> Self {
        ScriptError::Arithmetic(msg.into())
    }

    /// Create a resource-limit error.
    pub fn resource<S: Into<String>>(msg: S) -> Self {
        ScriptError::Resource(msg.into())
    }

    /// Create a native-function error.
    pub fn native<S: Into<String>>(msg: S) -> Self {
        ScriptError::Native(msg.into())
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        ScriptError::Internal(msg.into())
    }

    /// Get error category name.
    pub fn name(&self) -> &'static str {
        match self {
            ScriptError::Lex { .. } => "LexError",
            ScriptError::Syntax { .. } => "SyntaxError",
            ScriptError::Reference(_) => "ReferenceError",
            ScriptError::Type(_) => "TypeError",
            ScriptError::Arithmetic(_) => "ArithmeticError",
            ScriptError::Resource(_) => "ResourceError",
            ScriptError::Native(_) => "NativeError",
            ScriptError::Internal(_) => "InternalError",
        }
    }

    /// Line number for positioned errors, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            ScriptError::Lex { line, .. } | ScriptError::Syntax { line, .. } => Some(*line),
            _ => None,
        }
    }
}
