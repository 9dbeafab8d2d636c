//! Error types for state derivation, curation and control bindings

use thiserror::Error;

use crate::state::PropertyKind;

/// Errors raised by the state synchronization engine
///
/// Everything except [`StateError::Detached`] and [`StateError::Producer`]
/// is a configuration error detected at construction time.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("No range declared for numeric property: {0}")]
    MissingRange(String),

    #[error("Invalid range for property {name}: [{min}, {max}]")]
    InvalidRange { name: String, min: f64, max: f64 },

    #[error("Range declared on non-numeric property: {0}")]
    UnexpectedRange(String),

    #[error("Property declared more than once: {0}")]
    DuplicateProperty(String),

    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    #[error("Mapped property not defined in the state type: {0}")]
    UnknownMappedProperty(String),

    #[error("Type mismatch for property {name}: expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: PropertyKind,
        actual: PropertyKind,
    },

    #[error("Control number {0} mapped more than once")]
    DuplicateControl(u8),

    #[error("Property {0} mapped to more than one control")]
    DuplicateMappedProperty(String),

    #[error("Invalid control number {0} (must be 0-127)")]
    InvalidControl(u8),

    #[error("Property {name} of type {kind} cannot be mapped to a MIDI control")]
    UnsupportedMapping { name: String, kind: PropertyKind },

    #[error("State curator is no longer available")]
    Detached,

    #[error(transparent)]
    Producer(#[from] anyhow::Error),
}

pub type StateResult<T> = Result<T, StateError>;
