//! Error types for heap navigation
//!
//! Three families of failure exist:
//!
//! - **Not found**: unknown object id, class or field. The caller can recover
//!   by asking for something else.
//! - **Consistency**: caller logic or the dump itself is wrong (class-name
//!   mismatch, reference count disagreeing with the class layout).
//! - **I/O**: the auxiliary files are missing, truncated or corrupt. Fatal at
//!   construction time.

use crate::classstore::{ClassId, ObjectId};
use thiserror::Error;

/// Errors that can occur while building or navigating a heap graph
#[derive(Error, Debug)]
pub enum NavError {
    #[error("Object {0} not found in auxiliary index")]
    ObjectNotFound(ObjectId),

    #[error("Class not found: {0}")]
    ClassNotFound(String),

    #[error("Class id {0} not found")]
    ClassIdNotFound(ClassId),

    #[error("Field {field} not found in {class}")]
    FieldNotFound { class: String, field: String },

    #[error("Expected {expected}, got {actual}")]
    ClassMismatch { expected: String, actual: String },

    #[error("Object {id} of class {class} has {actual} references, expected {expected}")]
    ReferenceCountMismatch {
        id: ObjectId,
        class: String,
        expected: usize,
        actual: usize,
    },

    #[error("Navigator has no current position")]
    NoPosition,

    #[error("Current position is the null object")]
    NullObject,

    #[error("Duplicate class definition: {0}")]
    DuplicateClass(String),

    #[error("Class hierarchy cycle through {0}")]
    ClassHierarchyCycle(String),

    #[error("Corrupt auxiliary file: {0}")]
    CorruptAuxFile(String),

    #[error("Heap source error: {0}")]
    Source(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NavError {
    /// Whether this is a recoverable lookup miss
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            NavError::ObjectNotFound(_)
                | NavError::ClassNotFound(_)
                | NavError::ClassIdNotFound(_)
                | NavError::FieldNotFound { .. }
        )
    }
}

pub type NavResult<T> = Result<T, NavError>;
