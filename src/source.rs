//! Streaming heap-event source
//!
//! The heap-dump parser is an external collaborator. It drives a single
//! linear traversal and reports each event to a [`HeapVisitor`]. Object ids
//! handed to visitors are already remapped to the dense range
//! `1..=instance_count`; `0` is null.

use crate::classstore::{ClassId, ClassStore, ObjectId};
use crate::error::NavResult;
use crate::roots::RootReason;

/// Receives heap events during a traversal.
///
/// All methods default to no-ops so a sink only implements what it needs.
pub trait HeapVisitor {
    /// Called once before the first event
    fn pre_visit(&mut self) -> NavResult<()> {
        Ok(())
    }

    fn visit_root(&mut self, _id: ObjectId, _reason: &RootReason) -> NavResult<()> {
        Ok(())
    }

    /// `references` holds the values of the class's reference fields, in
    /// `all_ref_field_names` order
    fn visit_instance(
        &mut self,
        _id: ObjectId,
        _class_id: ClassId,
        _references: &[ObjectId],
    ) -> NavResult<()> {
        Ok(())
    }

    fn visit_object_array(
        &mut self,
        _id: ObjectId,
        _array_class_id: ClassId,
        _elements: &[ObjectId],
    ) -> NavResult<()> {
        Ok(())
    }

    fn visit_primitive_array(
        &mut self,
        _id: ObjectId,
        _array_class_id: ClassId,
        _length: usize,
    ) -> NavResult<()> {
        Ok(())
    }

    /// Called once after the last event
    fn post_visit(&mut self) -> NavResult<()> {
        Ok(())
    }
}

/// A heap dump that can be streamed through a visitor
pub trait HeapEventSource {
    /// Called once before `instance_count` and `accept`, with the class
    /// table the visitors will check records against. Sources validate their
    /// id space here so nothing is allocated for a dump that cannot be
    /// navigated.
    fn prepare(&mut self, _class_store: &ClassStore) -> NavResult<()> {
        Ok(())
    }

    /// Number of object ids in the dump; ids run `1..=instance_count()`
    fn instance_count(&self) -> u64;

    /// Run one full traversal. `label` names the pass for logging.
    fn accept(&mut self, visitor: &mut dyn HeapVisitor, label: &str) -> NavResult<()>;
}
