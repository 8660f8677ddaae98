use crate::host::TargetId;
use thiserror::Error;

/// Why a revert or original lookup could not be satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevertReason {
    /// Nothing was ever applied on the slot (or every apply was reverted).
    EmptyStack,
    /// The slot has no stored original value to hand back.
    NoOriginal,
    /// Originals exist, but none was stored under the requested tag.
    TagNotFound(String),
}

impl std::fmt::Display for RevertReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RevertReason::EmptyStack => write!(f, "no apply is recorded for this slot"),
            RevertReason::NoOriginal => write!(f, "no original was stored"),
            RevertReason::TagNotFound(tag) => {
                write!(f, "no original attribute found matching the tag '{tag}'")
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatchError {
    #[error("'{target}' has no member '{member}'{}", suggestion_suffix(.suggestion))]
    NotFound {
        target: String,
        member: String,
        suggestion: Option<String>,
    },

    #[error("cannot revert '{member}' on '{target}': {reason}")]
    Revert {
        target: String,
        member: String,
        reason: RevertReason,
    },

    #[error("unknown target id {0}")]
    UnknownTarget(TargetId),

    #[error("unknown function id {0}")]
    UnknownFunction(usize),

    #[error("'{target}' is not a {expected}")]
    WrongKind {
        target: String,
        expected: &'static str,
    },

    #[error("value of '{0}' is not callable")]
    NotCallable(String),

    #[error("cannot linearize ancestors of '{0}': inconsistent base order")]
    Linearization(String),

    #[error("cannot register metadata on a plain {0} value")]
    NoIdentity(&'static str),

    #[error("patch name is required for a value without a base name")]
    Unnamed,

    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("module '{module}' failed to initialize: {message}")]
    Import { module: String, message: String },
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(name) => format!(" (did you mean '{name}'?)"),
        None => String::new(),
    }
}

impl PatchError {
    /// True for the resolve-time failure class.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PatchError::NotFound { .. })
    }

    /// True for the revert/original-lookup failure class.
    pub fn is_revert(&self) -> bool {
        matches!(self, PatchError::Revert { .. })
    }
}

pub type Result<T> = std::result::Result<T, PatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display_with_suggestion() {
        let err = PatchError::NotFound {
            target: "printer.fan.Fan".to_string(),
            member: "max_powr".to_string(),
            suggestion: Some("max_power".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("has no member 'max_powr'"));
        assert!(msg.contains("did you mean 'max_power'"));
        assert!(err.is_not_found());
        assert!(!err.is_revert());
    }

    #[test]
    fn test_revert_display() {
        let err = PatchError::Revert {
            target: "Fan".to_string(),
            member: "speed".to_string(),
            reason: RevertReason::TagNotFound("x".to_string()),
        };
        assert!(err.to_string().contains("matching the tag 'x'"));
        assert!(err.is_revert());
    }
}
