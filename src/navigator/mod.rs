//! Repositionable cursor over a heap object graph
//!
//! A navigator points at one object at a time. [`ObjectNavigator::go_to`]
//! moves it; everything else reads the current position or performs a
//! direct lookup by id.
//!
//! ```rust,ignore
//! use heapnav::navigator::{AuxFileNavigator, ObjectNavigator};
//!
//! let mut nav = AuxFileNavigator::create_on_auxiliary_files(&mut source, &paths, store)?;
//! for root in nav.create_roots_iterator().collect::<Vec<_>>() {
//!     nav.go_to(root, false)?;
//!     println!("{} -> {:?}", nav.get_class()?.name, nav.get_references_copy()?);
//! }
//! nav.go_to_static_field("com.example.Registry", "INSTANCE")?;
//! nav.go_to_instance_field(Some("com.example.Registry"), "entries")?;
//! ```

mod aux_files;

pub use aux_files::AuxFileNavigator;

use crate::classstore::{ClassDefinition, ClassStore, ObjectId};
use crate::error::{NavError, NavResult};
use crate::roots::RootReason;

/// Cursor-style access to a heap graph.
///
/// A navigator is not meant to be shared between threads while moving;
/// create one navigator per thread over the same shared backing store.
pub trait ObjectNavigator {
    /// Current object id, `None` before the first `go_to`
    fn id(&self) -> Option<ObjectId>;

    /// Number of object ids in the dump
    fn instance_count(&self) -> u64;

    fn class_store(&self) -> &ClassStore;

    /// Root object ids in discovery order. Create a new iterator to restart.
    fn create_roots_iterator(&self) -> impl Iterator<Item = ObjectId> + '_;

    /// Move to `id`. Soft and weak edges of the new position are reported as
    /// null unless `include_soft_weak_references` is set; the flag applies to
    /// this position only. On failure the previous position is kept.
    fn go_to(&mut self, id: ObjectId, include_soft_weak_references: bool) -> NavResult<()>;

    /// Class of the current object
    fn get_class(&self) -> NavResult<&ClassDefinition>;

    /// Outgoing references of the current object, borrowed
    fn references(&self) -> NavResult<&[ObjectId]>;

    fn get_references_copy(&self) -> NavResult<Vec<ObjectId>> {
        Ok(self.references()?.to_vec())
    }

    /// Replace the contents of `out` with the current references. Reusing
    /// one buffer across calls avoids reallocating.
    fn copy_references_to(&self, out: &mut Vec<ObjectId>) -> NavResult<()> {
        let refs = self.references()?;
        out.clear();
        out.extend_from_slice(refs);
        Ok(())
    }

    fn get_class_for_object_id(&self, id: ObjectId) -> NavResult<&ClassDefinition>;

    /// Why `id` is a GC root, or `None` if it is not one
    fn get_root_reason_for_object_id(&self, id: ObjectId) -> Option<&RootReason>;

    /// Whether the current position is the null object
    fn is_null(&self) -> bool;

    /// Object id stored in `field_name` of the current object.
    ///
    /// When `class_name` is given it must match the current class; a
    /// mismatch is a logic error in the caller and fails with
    /// [`NavError::ClassMismatch`].
    fn get_instance_field_object_id(
        &self,
        class_name: Option<&str>,
        field_name: &str,
    ) -> NavResult<ObjectId> {
        let class = self.get_class()?;
        if let Some(expected) = class_name {
            if expected != class.name {
                return Err(NavError::ClassMismatch {
                    expected: expected.to_string(),
                    actual: class.name.clone(),
                });
            }
        }

        let index = class
            .all_ref_field_names(self.class_store())
            .iter()
            .position(|&name| name == field_name)
            .ok_or_else(|| NavError::FieldNotFound {
                class: class.name.clone(),
                field: field_name.to_string(),
            })?;

        let refs = self.references()?;
        refs.get(index).copied().ok_or_else(|| {
            NavError::CorruptAuxFile(format!(
                "{} has {} references but field {} is at index {}",
                class.name,
                refs.len(),
                field_name,
                index
            ))
        })
    }

    /// Follow an instance field, including soft/weak edges at the target
    fn go_to_instance_field(&mut self, class_name: Option<&str>, field_name: &str) -> NavResult<()> {
        let id = self.get_instance_field_object_id(class_name, field_name)?;
        self.go_to(id, true)
    }

    fn get_static_field_object_id(&self, class_name: &str, field_name: &str) -> NavResult<ObjectId> {
        let class = self.class_store().get(class_name)?;
        class
            .static_field(field_name)
            .map(|f| f.object_id)
            .ok_or_else(|| NavError::FieldNotFound {
                class: class_name.to_string(),
                field: field_name.to_string(),
            })
    }

    /// Move to the object held by a static field, including soft/weak edges
    fn go_to_static_field(&mut self, class_name: &str, field_name: &str) -> NavResult<()> {
        let id = self.get_static_field_object_id(class_name, field_name)?;
        self.go_to(id, true)
    }

    /// Follow a dotted chain of instance fields, e.g. `"table.next.value"`.
    /// Stops with an error at the first missing field; the cursor is then
    /// left at the last object reached.
    fn go_to_field_path(&mut self, path: &str) -> NavResult<()> {
        for field in path.split('.').filter(|s| !s.is_empty()) {
            self.go_to_instance_field(None, field)?;
        }
        Ok(())
    }
}
