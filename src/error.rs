//! Crate-boundary error type.
//!
//! Only programming-contract failures surface as `Err`; silent no-ops
//! (adding an already-attached component, double registration, ...)
//! are not errors and never reach this type.

use thiserror::Error;

/// Errors that can cross the public API boundary of this crate.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcsError {
    /// `World::remove` (or an `EntityMut` operation derived from it)
    /// was called on an entity the world does not currently consider
    /// live. This is a programming error in the caller, not a
    /// recoverable runtime condition.
    #[error("entity is not live in this world")]
    UnknownEntity,

    /// `World::query` was called with a spec containing no positive
    /// (`With`) terms. A query must assert at least one component.
    #[error("a query must declare at least one positive component")]
    EmptyQuery,
}

pub type EcsResult<T> = Result<T, EcsError>;
