//! Error types for scoped contexts

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("No current context for {type_name}")]
    NoContext { type_name: &'static str },

    #[error("No current classwide context")]
    NoCrossTypeContext,

    #[error("Context stack underflow: exiting {type_name} without a matching enter")]
    StackUnderflow { type_name: &'static str },

    #[error("Context exited out of order: exiting {type_name} while {top} is on top")]
    OutOfOrder {
        type_name: &'static str,
        top: &'static str,
    },

    #[error("Context of type {type_name} is already active on this thread")]
    AlreadyActive { type_name: &'static str },

    #[error("Cannot enter {type_name}: the thread's context stacks are already torn down")]
    RegistryUnavailable { type_name: &'static str },
}

impl ContextError {
    /// Whether this error means the nesting invariant is broken.
    ///
    /// Fatal errors are never recoverable by the caller: every later lookup
    /// on the thread would observe stale stacks.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ContextError::StackUnderflow { .. } | ContextError::OutOfOrder { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ContextError>;
