//! Navigator backed by the memory-mapped auxiliary files

use super::ObjectNavigator;
use crate::auxfiles::{AuxFilePaths, AuxIndex};
use crate::classstore::{ClassDefinition, ClassId, ClassStore, ObjectId, NULL_ID};
use crate::error::{NavError, NavResult};
use crate::prepass;
use crate::roots::{RootReason, RootSet};
use crate::source::HeapEventSource;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Position {
    #[default]
    Unset,
    Null,
    Object { id: ObjectId, class_id: ClassId },
}

/// Mutable state owned by exactly one navigator
#[derive(Debug, Default)]
struct Cursor {
    position: Position,
    references: Vec<ObjectId>,
    /// Decode target for `go_to`, swapped in on success
    spare: Vec<ObjectId>,
    include_soft_weak: bool,
}

/// Object navigator over a pre-computed offset index and packed records.
///
/// The class store, index and root set are immutable and shared; cloning
/// them into another navigator with [`AuxFileNavigator::share`] is cheap and
/// the two cursors move independently.
#[derive(Debug)]
pub struct AuxFileNavigator {
    class_store: Arc<ClassStore>,
    index: Arc<AuxIndex>,
    roots: Arc<RootSet>,
    cursor: Cursor,
}

impl AuxFileNavigator {
    /// Run the pre-pass over `source`, writing the auxiliary files to
    /// `paths`, then map them and return a navigator with no position.
    ///
    /// Files already at `paths` are replaced by rename; navigators built on
    /// them keep reading their own copy.
    pub fn create_on_auxiliary_files(
        source: &mut dyn HeapEventSource,
        paths: &AuxFilePaths,
        class_store: Arc<ClassStore>,
    ) -> NavResult<Self> {
        let output = prepass::run(source, paths, &class_store)?;
        Ok(Self::from_shared(
            class_store,
            Arc::new(output.index),
            Arc::new(output.roots),
        ))
    }

    /// Build a navigator over already-prepared parts
    pub fn from_shared(class_store: Arc<ClassStore>, index: Arc<AuxIndex>, roots: Arc<RootSet>) -> Self {
        Self {
            class_store,
            index,
            roots,
            cursor: Cursor::default(),
        }
    }

    /// A fresh navigator over the same backing data, with no position
    pub fn share(&self) -> Self {
        Self::from_shared(
            Arc::clone(&self.class_store),
            Arc::clone(&self.index),
            Arc::clone(&self.roots),
        )
    }

    pub fn roots(&self) -> &RootSet {
        &self.roots
    }

    pub fn shared_roots(&self) -> Arc<RootSet> {
        Arc::clone(&self.roots)
    }

    pub fn shared_class_store(&self) -> Arc<ClassStore> {
        Arc::clone(&self.class_store)
    }

    /// Whether soft/weak edges are visible at the current position
    pub fn includes_soft_weak_references(&self) -> bool {
        self.cursor.include_soft_weak
    }

    fn current(&self) -> NavResult<(ObjectId, ClassId)> {
        match self.cursor.position {
            Position::Unset => Err(NavError::NoPosition),
            Position::Null => Err(NavError::NullObject),
            Position::Object { id, class_id } => Ok((id, class_id)),
        }
    }
}

impl ObjectNavigator for AuxFileNavigator {
    fn id(&self) -> Option<ObjectId> {
        match self.cursor.position {
            Position::Unset => None,
            Position::Null => Some(NULL_ID),
            Position::Object { id, .. } => Some(id),
        }
    }

    fn instance_count(&self) -> u64 {
        self.index.instance_count()
    }

    fn class_store(&self) -> &ClassStore {
        &self.class_store
    }

    fn create_roots_iterator(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.roots.iter_ids()
    }

    fn go_to(&mut self, id: ObjectId, include_soft_weak_references: bool) -> NavResult<()> {
        if id == NULL_ID {
            self.cursor.position = Position::Null;
            self.cursor.references.clear();
            self.cursor.include_soft_weak = include_soft_weak_references;
            return Ok(());
        }

        let class_id =
            self.index
                .read_record(id, include_soft_weak_references, &mut self.cursor.spare)?;
        std::mem::swap(&mut self.cursor.references, &mut self.cursor.spare);
        self.cursor.position = Position::Object { id, class_id };
        self.cursor.include_soft_weak = include_soft_weak_references;
        Ok(())
    }

    fn get_class(&self) -> NavResult<&ClassDefinition> {
        let (_, class_id) = self.current()?;
        self.class_store.get_by_id(class_id)
    }

    fn references(&self) -> NavResult<&[ObjectId]> {
        match self.cursor.position {
            Position::Unset => Err(NavError::NoPosition),
            Position::Null => Ok(&[]),
            Position::Object { .. } => Ok(&self.cursor.references),
        }
    }

    fn get_class_for_object_id(&self, id: ObjectId) -> NavResult<&ClassDefinition> {
        if id == NULL_ID {
            return Err(NavError::NullObject);
        }
        let class_id = self.index.class_id_of(id)?;
        self.class_store.get_by_id(class_id).inspect_err(|_| {
            debug!("Object {} has class id {} missing from the class store", id, class_id);
        })
    }

    fn get_root_reason_for_object_id(&self, id: ObjectId) -> Option<&RootReason> {
        self.roots.get(id)
    }

    fn is_null(&self) -> bool {
        self.cursor.position == Position::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classstore::ClassDefinition;
    use crate::roots::{RootKind, RootReason};
    use crate::snapshot::HeapSnapshot;
    use tempfile::TempDir;

    fn navigator(dir: &TempDir) -> AuxFileNavigator {
        let mut snapshot = HeapSnapshot::new()
            .with_class(ClassDefinition::new(1, "Foo").with_ref_field("a").with_ref_field("b"))
            .with_root(7, RootReason::new(RootKind::JniGlobal))
            .with_instance(7, 1, &[9, 0])
            .with_instance(9, 1, &[7, 7]);
        let store = Arc::new(snapshot.class_store().unwrap());
        let paths = AuxFilePaths::in_dir(dir.path());
        AuxFileNavigator::create_on_auxiliary_files(&mut snapshot, &paths, store).unwrap()
    }

    #[test]
    fn test_no_position_before_go_to() {
        let dir = TempDir::new().unwrap();
        let nav = navigator(&dir);
        assert_eq!(nav.id(), None);
        assert!(!nav.is_null());
        assert!(matches!(nav.get_class(), Err(NavError::NoPosition)));
        assert!(matches!(nav.get_references_copy(), Err(NavError::NoPosition)));
    }

    #[test]
    fn test_failed_go_to_keeps_position() {
        let dir = TempDir::new().unwrap();
        let mut nav = navigator(&dir);
        nav.go_to(7, false).unwrap();

        assert!(matches!(nav.go_to(8, false), Err(NavError::ObjectNotFound(8))));
        assert_eq!(nav.id(), Some(7));
        assert_eq!(nav.get_references_copy().unwrap(), vec![9, 0]);
    }

    #[test]
    fn test_null_position() {
        let dir = TempDir::new().unwrap();
        let mut nav = navigator(&dir);
        nav.go_to(0, false).unwrap();
        assert!(nav.is_null());
        assert_eq!(nav.id(), Some(0));
        assert!(nav.get_references_copy().unwrap().is_empty());
        assert!(matches!(nav.get_class(), Err(NavError::NullObject)));
    }

    #[test]
    fn test_share_has_independent_cursor() {
        let dir = TempDir::new().unwrap();
        let mut nav = navigator(&dir);
        nav.go_to(9, false).unwrap();

        let mut other = nav.share();
        assert_eq!(other.id(), None);
        other.go_to(7, false).unwrap();
        assert_eq!(nav.id(), Some(9));
        assert_eq!(other.id(), Some(7));
    }
}
