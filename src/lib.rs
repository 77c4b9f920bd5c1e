//! heapnav - random-access navigation over heap dumps
//!
//! A single streaming pre-pass over a heap dump writes two auxiliary files:
//! an offset index keyed by object id and a packed body of per-object
//! records (class id plus outgoing references). Both are then memory-mapped
//! read-only, and an [`ObjectNavigator`] answers "what is object X, what
//! does it point to, is it a root" in O(1) without touching the dump again.
//!
//! The dump parser itself is not part of this crate. Anything that can
//! stream heap events through a [`HeapVisitor`] plugs in via
//! [`HeapEventSource`]; [`snapshot::HeapSnapshot`] is a JSON-backed source.

pub mod auxfiles;
pub mod classstore;
pub mod config;
pub mod error;
pub mod navigator;
pub mod prepass;
pub mod roots;
pub mod snapshot;
pub mod source;

pub use auxfiles::{AuxFilePaths, AuxIndex};
pub use classstore::{ClassDefinition, ClassId, ClassStore, ObjectId, NULL_ID};
pub use error::{NavError, NavResult};
pub use navigator::{AuxFileNavigator, ObjectNavigator};
pub use roots::{RootKind, RootReason, RootSet};
pub use source::{HeapEventSource, HeapVisitor};
