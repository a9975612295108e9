//! Code generation error types (§7.2, §10.1).
//!
//! `CodingError` is the non-recoverable panic family: malformed
//! intermediate meaning, reserved opcode emission, double lookahead,
//! arity/type mismatches the generator treats as an invariant violation
//! rather than a guest-recoverable condition. `CodeGenError` is the
//! two-variant shape the compiler crate's `codegen::error::CodeGenError`
//! uses — a logic error plus a wrapped lower-level error — generalized
//! here to wrap `CodingError` instead of a formatter error, since this
//! generator emits bytes rather than text.

use std::fmt;

/// An internal invariant violation: these indicate a bug in the
/// upstream evaluator (which produced malformed meaning) or in the
/// generator itself, not a guest-level mistake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodingError {
    /// The head of a meaning was neither an opcode atom nor a pair.
    MalformedMeaning(String),
    /// User code attempted to emit the internal `finish` opcode.
    ReservedOpcodeEmission(&'static str),
    /// A handle's lookahead slot was already occupied.
    DoubleLookahead,
    /// An opcode's tail had the wrong arity.
    ArityMismatch { opcode: &'static str, expected: usize, got: usize },
    /// An opcode's operand was of the wrong shape (not fixnum / symbol /
    /// pair / a recognized `kind` tag).
    OperandTypeMismatch { opcode: &'static str, expected: &'static str },
}

impl fmt::Display for CodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodingError::MalformedMeaning(s) => write!(f, "malformed intermediate meaning: {s}"),
            CodingError::ReservedOpcodeEmission(op) => {
                write!(f, "attempt to emit reserved opcode {op} from user code")
            }
            CodingError::DoubleLookahead => write!(f, "lookahead slot already occupied"),
            CodingError::ArityMismatch { opcode, expected, got } => write!(
                f,
                "{opcode}: expected {expected} operand(s), got {got}"
            ),
            CodingError::OperandTypeMismatch { opcode, expected } => {
                write!(f, "{opcode}: operand must be {expected}")
            }
        }
    }
}

impl std::error::Error for CodingError {}

/// The recoverable half: a logic error in code generation, or a wrapped
/// coding error propagated as a `Result` instead of aborting outright
/// (e.g. validation performed before any bytes are emitted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeGenError {
    /// A logical error in code generation (missing definition, invalid
    /// program shape the evaluator should have caught).
    Logic(String),
    /// A wrapped internal invariant violation.
    Coding(CodingError),
}

impl fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeGenError::Logic(s) => write!(f, "{s}"),
            CodeGenError::Coding(e) => write!(f, "coding error: {e}"),
        }
    }
}

impl std::error::Error for CodeGenError {}

impl From<String> for CodeGenError {
    fn from(s: String) -> Self {
        CodeGenError::Logic(s)
    }
}

impl From<CodingError> for CodeGenError {
    fn from(e: CodingError) -> Self {
        CodeGenError::Coding(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_wraps_coding_error() {
        let e = CodeGenError::from(CodingError::DoubleLookahead);
        assert!(e.to_string().contains("coding error"));
    }

    #[test]
    fn from_string_is_logic_error() {
        let e: CodeGenError = "missing word".to_string().into();
        assert!(matches!(e, CodeGenError::Logic(_)));
    }
}
