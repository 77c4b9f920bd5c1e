//! Integration tests for the auxiliary-file navigator
//!
//! Every test builds its own fixture heap and writes the auxiliary files to
//! an isolated temp directory.

use heapnav::classstore::{FieldKind, SOFT_REFERENCE_CLASS, WEAK_REFERENCE_CLASS};
use heapnav::snapshot::HeapSnapshot;
use heapnav::{
    AuxFileNavigator, AuxFilePaths, AuxIndex, ClassDefinition, NavError, ObjectId,
    ObjectNavigator, RootKind, RootReason,
};
use std::sync::Arc;
use tempfile::TempDir;

/// Fixture heap:
///
/// ```text
/// #1  Registry  entries -> #3            (root: sticky class, static INSTANCE)
/// #2  Foo       a -> #7, b -> null
/// #3  Object[]  [#7, #4, null, #5]
/// #4  WeakReference  referent -> #9
/// #5  SoftReference  referent -> #7
/// #6  Bar       c -> #4, a -> #7, b -> null   (root: java frame)
/// #7  Foo       a -> #9, b -> null
/// #8  (never reported)
/// #9  Foo       a -> null, b -> null
/// #10 byte[16]                               (root: JNI local)
/// ```
fn fixture() -> HeapSnapshot {
    HeapSnapshot::new()
        .with_class(ClassDefinition::new(1, "java.lang.Object"))
        .with_class(
            ClassDefinition::new(2, "Foo")
                .with_super(1)
                .with_ref_field("a")
                .with_ref_field("b"),
        )
        .with_class(
            ClassDefinition::new(3, "java.lang.ref.Reference")
                .with_super(1)
                .with_ref_field("referent")
                .with_ref_field("queue"),
        )
        .with_class(ClassDefinition::new(4, WEAK_REFERENCE_CLASS).with_super(3))
        .with_class(ClassDefinition::new(5, SOFT_REFERENCE_CLASS).with_super(3))
        .with_class(
            ClassDefinition::new(6, "Registry")
                .with_super(1)
                .with_ref_field("entries")
                .with_static_field("INSTANCE", 1)
                .with_static_field("EMPTY", 0),
        )
        .with_class(ClassDefinition::new(7, "java.lang.Object[]"))
        .with_class(
            ClassDefinition::new(8, "Bar")
                .with_super(2)
                .with_field("n", FieldKind::Int)
                .with_ref_field("c"),
        )
        .with_class(ClassDefinition::new(9, "byte[]"))
        .with_root(1, RootReason::new(RootKind::StickyClass))
        .with_root(6, RootReason::new(RootKind::JavaFrame).with_description("main"))
        .with_root(1, RootReason::new(RootKind::JniGlobal))
        .with_root(10, RootReason::new(RootKind::JniLocal))
        .with_named_instance(1, 6, &[("entries", 3)])
        .with_instance(2, 2, &[7, 0])
        .with_object_array(3, 7, &[7, 4, 0, 5])
        .with_instance(4, 4, &[9, 0])
        .with_named_instance(5, 5, &[("referent", 7)])
        .with_named_instance(6, 8, &[("c", 4), ("a", 7)])
        .with_instance(7, 2, &[9, 0])
        .with_instance(9, 2, &[0, 0])
        .with_primitive_array(10, 9, 16)
}

/// (object id, class name) for every object in the fixture
const OBJECTS: &[(ObjectId, &str)] = &[
    (1, "Registry"),
    (2, "Foo"),
    (3, "java.lang.Object[]"),
    (4, WEAK_REFERENCE_CLASS),
    (5, SOFT_REFERENCE_CLASS),
    (6, "Bar"),
    (7, "Foo"),
    (9, "Foo"),
    (10, "byte[]"),
];

fn build(dir: &TempDir) -> (AuxFileNavigator, AuxFilePaths) {
    let mut snapshot = fixture();
    let store = Arc::new(snapshot.class_store().expect("fixture class store"));
    let paths = AuxFilePaths::in_dir(dir.path());
    let nav = AuxFileNavigator::create_on_auxiliary_files(&mut snapshot, &paths, store)
        .expect("create navigator");
    (nav, paths)
}

#[test]
fn test_scenario_foo_with_null_field() {
    let dir = TempDir::new().unwrap();
    let (mut nav, _) = build(&dir);

    nav.go_to(7, false).unwrap();
    assert_eq!(nav.get_references_copy().unwrap(), vec![9, 0]);

    nav.go_to(9, false).unwrap();
    assert!(!nav.is_null());

    nav.go_to(0, false).unwrap();
    assert!(nav.is_null());
}

#[test]
fn test_get_class_matches_class_store() {
    let dir = TempDir::new().unwrap();
    let (mut nav, _) = build(&dir);
    assert_eq!(nav.instance_count(), 10);

    for &(id, name) in OBJECTS {
        nav.go_to(id, false).unwrap();
        assert_eq!(nav.id(), Some(id));
        let class = nav.get_class().unwrap();
        assert_eq!(class.name, name, "object {}", id);
        assert_eq!(class, nav.class_store().get(name).unwrap());
        assert_eq!(nav.get_class_for_object_id(id).unwrap().name, name);
    }
}

#[test]
fn test_unknown_ids_fail_with_not_found() {
    let dir = TempDir::new().unwrap();
    let (mut nav, _) = build(&dir);

    for id in [8, 11, u64::MAX] {
        let err = nav.go_to(id, false).unwrap_err();
        assert!(matches!(err, NavError::ObjectNotFound(x) if x == id));
        assert!(err.is_not_found());
        assert!(nav.get_class_for_object_id(id).unwrap_err().is_not_found());
    }
    assert_eq!(nav.id(), None);
}

#[test]
fn test_copy_and_get_references_agree() {
    let dir = TempDir::new().unwrap();
    let (mut nav, _) = build(&dir);
    let mut buffer = vec![123, 456, 789];

    for &(id, _) in OBJECTS {
        for include in [false, true] {
            nav.go_to(id, include).unwrap();
            nav.copy_references_to(&mut buffer).unwrap();
            assert_eq!(buffer, nav.get_references_copy().unwrap(), "object {}", id);
        }
    }
}

#[test]
fn test_reference_counts_follow_class_layout() {
    let dir = TempDir::new().unwrap();
    let (mut nav, _) = build(&dir);

    nav.go_to(6, false).unwrap();
    assert_eq!(nav.get_references_copy().unwrap(), vec![4, 7, 0]);

    nav.go_to(3, false).unwrap();
    assert_eq!(nav.get_references_copy().unwrap(), vec![7, 4, 0, 5]);

    nav.go_to(10, false).unwrap();
    assert!(nav.get_references_copy().unwrap().is_empty());
}

#[test]
fn test_soft_weak_edges_follow_flag_per_position() {
    let dir = TempDir::new().unwrap();
    let (mut nav, _) = build(&dir);

    nav.go_to(4, false).unwrap();
    assert_eq!(nav.get_references_copy().unwrap(), vec![0, 0]);
    nav.go_to(4, true).unwrap();
    assert_eq!(nav.get_references_copy().unwrap(), vec![9, 0]);

    // Not carried over to the next go_to
    nav.go_to(5, false).unwrap();
    assert_eq!(nav.get_references_copy().unwrap(), vec![0, 0]);
    nav.go_to(5, true).unwrap();
    assert_eq!(nav.get_references_copy().unwrap(), vec![7, 0]);

    // Ordinary objects are unaffected
    nav.go_to(7, false).unwrap();
    assert_eq!(nav.get_references_copy().unwrap(), vec![9, 0]);
}

#[test]
fn test_instance_field_matches_manual_index() {
    let dir = TempDir::new().unwrap();
    let (mut nav, _) = build(&dir);

    for &(id, _) in OBJECTS {
        nav.go_to(id, true).unwrap();
        let class = nav.get_class().unwrap().clone();
        let names: Vec<String> = class
            .all_ref_field_names(nav.class_store())
            .into_iter()
            .map(str::to_string)
            .collect();
        let refs = nav.get_references_copy().unwrap();

        for (idx, name) in names.iter().enumerate() {
            nav.go_to(id, true).unwrap();
            let by_name = nav.get_instance_field_object_id(None, name).unwrap();
            assert_eq!(by_name, refs[idx], "{}.{}", class.name, name);

            nav.go_to_instance_field(None, name).unwrap();
            assert_eq!(nav.id(), Some(refs[idx]));
        }
    }
}

#[test]
fn test_instance_field_includes_soft_weak_at_target() {
    let dir = TempDir::new().unwrap();
    let (mut nav, _) = build(&dir);

    nav.go_to(6, false).unwrap();
    nav.go_to_instance_field(Some("Bar"), "c").unwrap();
    assert_eq!(nav.id(), Some(4));
    assert_eq!(nav.get_references_copy().unwrap(), vec![9, 0]);

    nav.go_to_instance_field(None, "referent").unwrap();
    assert_eq!(nav.id(), Some(9));
}

#[test]
fn test_instance_field_errors() {
    let dir = TempDir::new().unwrap();
    let (mut nav, _) = build(&dir);

    nav.go_to(7, false).unwrap();
    let err = nav.go_to_instance_field(Some("Bar"), "a").unwrap_err();
    assert!(matches!(err, NavError::ClassMismatch { .. }));
    assert!(!err.is_not_found());
    assert_eq!(nav.id(), Some(7));

    let err = nav.go_to_instance_field(None, "missing").unwrap_err();
    assert!(matches!(err, NavError::FieldNotFound { .. }));
    assert_eq!(nav.id(), Some(7));

    nav.go_to(0, false).unwrap();
    assert!(matches!(
        nav.go_to_instance_field(None, "a"),
        Err(NavError::NullObject)
    ));
}

#[test]
fn test_static_field_navigation() {
    let dir = TempDir::new().unwrap();
    let (mut nav, _) = build(&dir);

    nav.go_to_static_field("Registry", "INSTANCE").unwrap();
    assert_eq!(nav.id(), Some(1));
    assert_eq!(nav.get_class().unwrap().name, "Registry");

    nav.go_to_static_field("Registry", "EMPTY").unwrap();
    assert!(nav.is_null());
}

#[test]
fn test_static_field_misses_never_move_cursor() {
    let dir = TempDir::new().unwrap();
    let (mut nav, _) = build(&dir);
    nav.go_to(2, false).unwrap();

    let err = nav.go_to_static_field("NoSuchClass", "INSTANCE").unwrap_err();
    assert!(matches!(err, NavError::ClassNotFound(_)));
    assert!(err.is_not_found());
    assert_eq!(nav.id(), Some(2));

    let err = nav.go_to_static_field("Registry", "MISSING").unwrap_err();
    assert!(matches!(err, NavError::FieldNotFound { .. }));
    assert!(err.is_not_found());
    assert_eq!(nav.id(), Some(2));
}

#[test]
fn test_field_path() {
    let dir = TempDir::new().unwrap();
    let (mut nav, _) = build(&dir);

    nav.go_to(6, false).unwrap();
    nav.go_to_field_path("a.a").unwrap();
    assert_eq!(nav.id(), Some(9));

    nav.go_to(6, false).unwrap();
    assert!(nav.go_to_field_path("a.nope").is_err());
    assert_eq!(nav.id(), Some(7));
}

#[test]
fn test_roots_iterator_yields_each_root_once() {
    let dir = TempDir::new().unwrap();
    let (nav, _) = build(&dir);

    let roots: Vec<_> = nav.create_roots_iterator().collect();
    assert_eq!(roots, vec![1, 6, 10]);
    for id in &roots {
        assert!(nav.get_root_reason_for_object_id(*id).is_some());
    }
    assert_eq!(
        nav.get_root_reason_for_object_id(1).unwrap().kind,
        RootKind::StickyClass
    );
    assert_eq!(
        nav.get_root_reason_for_object_id(6).unwrap().to_string(),
        "Java frame: main"
    );
    assert!(nav.get_root_reason_for_object_id(7).is_none());

    // Restart by recreating
    assert_eq!(nav.create_roots_iterator().collect::<Vec<_>>(), roots);
}

#[test]
fn test_two_navigators_over_same_files_agree() {
    let dir = TempDir::new().unwrap();
    let (mut first, paths) = build(&dir);

    let reopened = Arc::new(AuxIndex::open(&paths).unwrap());
    let mut second = AuxFileNavigator::from_shared(
        first.shared_class_store(),
        reopened,
        first.shared_roots(),
    );

    for &(id, _) in OBJECTS {
        for include in [false, true] {
            first.go_to(id, include).unwrap();
            second.go_to(id, include).unwrap();
            assert_eq!(first.get_class().unwrap(), second.get_class().unwrap());
            assert_eq!(
                first.get_references_copy().unwrap(),
                second.get_references_copy().unwrap()
            );
        }
    }
}

#[test]
fn test_shared_navigators_across_threads() {
    let dir = TempDir::new().unwrap();
    let (nav, _) = build(&dir);

    std::thread::scope(|scope| {
        for &(id, name) in OBJECTS {
            let mut local = nav.share();
            scope.spawn(move || {
                local.go_to(id, true).unwrap();
                assert_eq!(local.get_class().unwrap().name, name);
            });
        }
    });
}

#[test]
fn test_reference_count_mismatch_fails_construction() {
    let dir = TempDir::new().unwrap();
    let mut snapshot = HeapSnapshot::new()
        .with_class(ClassDefinition::new(1, "Foo").with_ref_field("a"))
        .with_instance(1, 1, &[0, 0]);
    let store = Arc::new(snapshot.class_store().unwrap());
    let paths = AuxFilePaths::in_dir(dir.path());

    let err = AuxFileNavigator::create_on_auxiliary_files(&mut snapshot, &paths, store).unwrap_err();
    assert!(matches!(err, NavError::ReferenceCountMismatch { .. }));
    assert!(dir_entries(&dir).is_empty());
}

fn dir_entries(dir: &TempDir) -> Vec<String> {
    let mut names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn test_rebuild_over_mapped_files_keeps_first_navigator_readable() {
    let dir = TempDir::new().unwrap();
    let (mut first, paths) = build(&dir);
    first.go_to(3, false).unwrap();
    let before = first.get_references_copy().unwrap();

    let mut small = HeapSnapshot::new()
        .with_class(ClassDefinition::new(1, "Solo"))
        .with_instance(1, 1, &[]);
    let store = Arc::new(small.class_store().unwrap());
    let mut second =
        AuxFileNavigator::create_on_auxiliary_files(&mut small, &paths, store).unwrap();
    assert_eq!(second.instance_count(), 1);
    second.go_to(1, false).unwrap();
    assert_eq!(second.get_class().unwrap().name, "Solo");

    // The first navigator still reads its own build
    assert_eq!(first.instance_count(), 10);
    for &(id, name) in OBJECTS {
        first.go_to(id, true).unwrap();
        assert_eq!(first.get_class().unwrap().name, name);
    }
    first.go_to(3, false).unwrap();
    assert_eq!(first.get_references_copy().unwrap(), before);

    assert_eq!(dir_entries(&dir), vec!["objects.body", "objects.offsets"]);
}

#[test]
fn test_sparse_object_ids_fail_construction() {
    let dir = TempDir::new().unwrap();
    let mut snapshot = HeapSnapshot::new()
        .with_class(ClassDefinition::new(1, "Foo"))
        .with_instance(1 << 33, 1, &[]);
    let store = Arc::new(snapshot.class_store().unwrap());
    let paths = AuxFilePaths::in_dir(dir.path());

    let err = AuxFileNavigator::create_on_auxiliary_files(&mut snapshot, &paths, store).unwrap_err();
    assert!(matches!(err, NavError::Source(_)));
    assert!(dir_entries(&dir).is_empty());
}

#[test]
fn test_missing_aux_files_are_fatal() {
    let dir = TempDir::new().unwrap();
    let paths = AuxFilePaths::in_dir(&dir.path().join("absent"));
    assert!(matches!(AuxIndex::open(&paths), Err(NavError::Io(_))));
}
