//! Session error kinds
//!
//! None of these are fatal: the worst outcome of any of them is that an edit
//! is not applied or a block is not reported as solved.

use thiserror::Error;

use crate::equivalence::NormalizeError;
use crate::models::Role;

/// Errors surfaced by [`SessionController`](crate::controller::SessionController)
#[derive(Error, Debug)]
pub enum SessionError {
    /// A write-restricted operation attempted by the wrong role
    #[error("A {role} may not {action} this block")]
    InvalidRole { role: Role, action: &'static str },

    /// A received edit or answer missing required fields
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Candidate or solution could not be normalized
    #[error("Equivalence check failed: {0}")]
    EquivalenceCheckFailure(#[from] NormalizeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_role_display() {
        let err = SessionError::InvalidRole {
            role: Role::Mentor,
            action: "edit",
        };
        assert_eq!(err.to_string(), "A mentor may not edit this block");
    }

    #[test]
    fn test_from_normalize_error() {
        let err: SessionError = NormalizeError::UnterminatedString { line: 3 }.into();
        assert!(matches!(err, SessionError::EquivalenceCheckFailure(_)));
        assert!(err.to_string().contains("line 3"));
    }
}
