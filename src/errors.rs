//! Error types.

/// An error that occurs when translating textual IR into a `Module`.
/// Every variant carries the 1-based source line it was detected on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrontendError {
    /// A character sequence that does not form a valid token.
    Lex { line: usize, message: String },
    /// A token that does not fit the grammar at this point.
    Syntax { line: usize, message: String },
    /// A reference to an entity (value, block, function, signature
    /// or string) that is never defined.
    Undefined { line: usize, name: String },
    /// An operand, argument or return value of the wrong type or arity.
    Type { line: usize, message: String },
}

impl FrontendError {
    pub fn line(&self) -> usize {
        match self {
            FrontendError::Lex { line, .. }
            | FrontendError::Syntax { line, .. }
            | FrontendError::Undefined { line, .. }
            | FrontendError::Type { line, .. } => *line,
        }
    }
}

impl std::fmt::Display for FrontendError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FrontendError::Lex { line, message } => write!(f, "line {}: {}", line, message),
            FrontendError::Syntax { line, message } => {
                write!(f, "line {}: syntax error: {}", line, message)
            }
            FrontendError::Undefined { line, name } => {
                write!(f, "line {}: undefined entity `{}`", line, name)
            }
            FrontendError::Type { line, message } => {
                write!(f, "line {}: type error: {}", line, message)
            }
        }
    }
}

impl std::error::Error for FrontendError {}
