//! Class metadata for a heap dump
//!
//! The class store is built once, before navigation begins, and is read-only
//! afterwards. Navigators share it through an `Arc`.
//!
//! Instance records list reference values in hierarchy order: the class's own
//! declared reference fields first, then its superclass's, up to the root.
//! [`ClassDefinition::all_ref_field_names`] reproduces that order so a field
//! name can be turned into an index into an object's reference list.

use crate::error::{NavError, NavResult};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Identifier of a heap object instance. Dense in `1..=instance_count`.
pub type ObjectId = u64;

/// Identifier of a class. Separate namespace from object ids.
pub type ClassId = u64;

/// The null object sentinel
pub const NULL_ID: ObjectId = 0;

pub const SOFT_REFERENCE_CLASS: &str = "java.lang.ref.SoftReference";
pub const WEAK_REFERENCE_CLASS: &str = "java.lang.ref.WeakReference";
pub const REFERENT_FIELD: &str = "referent";

/// Declared type of an instance field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Reference,
    Boolean,
    Char,
    Float,
    Double,
    Byte,
    Short,
    Int,
    Long,
}

impl FieldKind {
    pub fn is_reference(self) -> bool {
        matches!(self, FieldKind::Reference)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceField {
    pub name: String,
    #[serde(default)]
    pub kind: FieldKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticField {
    pub name: String,
    pub object_id: ObjectId,
}

/// A class as recorded in the heap dump
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDefinition {
    pub id: ClassId,
    pub name: String,
    #[serde(default)]
    pub super_class_id: Option<ClassId>,
    /// Declared instance fields in declaration order
    #[serde(default)]
    pub instance_fields: Vec<InstanceField>,
    #[serde(default)]
    pub static_fields: Vec<StaticField>,
}

impl ClassDefinition {
    pub fn new(id: ClassId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            super_class_id: None,
            instance_fields: Vec::new(),
            static_fields: Vec::new(),
        }
    }

    pub fn with_super(mut self, super_class_id: ClassId) -> Self {
        self.super_class_id = Some(super_class_id);
        self
    }

    pub fn with_field(mut self, name: &str, kind: FieldKind) -> Self {
        self.instance_fields.push(InstanceField {
            name: name.to_string(),
            kind,
        });
        self
    }

    pub fn with_ref_field(self, name: &str) -> Self {
        self.with_field(name, FieldKind::Reference)
    }

    pub fn with_static_field(mut self, name: &str, object_id: ObjectId) -> Self {
        self.static_fields.push(StaticField {
            name: name.to_string(),
            object_id,
        });
        self
    }

    /// Reference-typed fields declared directly on this class
    pub fn ref_instance_fields(&self) -> impl Iterator<Item = &InstanceField> {
        self.instance_fields.iter().filter(|f| f.kind.is_reference())
    }

    /// Object arrays carry a variable-length reference list
    pub fn is_array(&self) -> bool {
        self.name.ends_with("[]")
    }

    /// Reference field names of this class and all superclasses, in record order
    pub fn all_ref_field_names<'a>(&'a self, store: &'a ClassStore) -> Vec<&'a str> {
        let mut names = Vec::new();
        let mut current = Some(self);
        while let Some(class) = current {
            names.extend(class.ref_instance_fields().map(|f| f.name.as_str()));
            current = class.super_class_id.and_then(|id| store.try_get_by_id(id));
        }
        names
    }

    pub fn static_field(&self, name: &str) -> Option<&StaticField> {
        self.static_fields.iter().find(|f| f.name == name)
    }
}

/// Per-class facts derived once at build time
#[derive(Debug, Clone, Copy, Default)]
struct ClassLayout {
    ref_field_count: usize,
    /// Index of `referent` for soft/weak reference classes
    referent_index: Option<usize>,
}

/// Immutable mapping from class id and class name to definitions
#[derive(Debug, Default)]
pub struct ClassStore {
    classes: Vec<ClassDefinition>,
    by_id: FxHashMap<ClassId, usize>,
    by_name: FxHashMap<String, usize>,
    layouts: FxHashMap<ClassId, ClassLayout>,
}

impl ClassStore {
    pub fn builder() -> ClassStoreBuilder {
        ClassStoreBuilder::default()
    }

    /// Look up a class by name
    pub fn get(&self, name: &str) -> NavResult<&ClassDefinition> {
        self.get_by_name(name)
            .ok_or_else(|| NavError::ClassNotFound(name.to_string()))
    }

    pub fn get_by_name(&self, name: &str) -> Option<&ClassDefinition> {
        self.by_name.get(name).map(|&idx| &self.classes[idx])
    }

    pub fn get_by_id(&self, id: ClassId) -> NavResult<&ClassDefinition> {
        self.try_get_by_id(id).ok_or(NavError::ClassIdNotFound(id))
    }

    #[inline]
    pub fn try_get_by_id(&self, id: ClassId) -> Option<&ClassDefinition> {
        self.by_id.get(&id).map(|&idx| &self.classes[idx])
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassDefinition> {
        self.classes.iter()
    }

    /// The class itself followed by each superclass
    pub fn hierarchy(&self, id: ClassId) -> impl Iterator<Item = &ClassDefinition> {
        let mut next = self.try_get_by_id(id);
        std::iter::from_fn(move || {
            let current = next?;
            next = current.super_class_id.and_then(|s| self.try_get_by_id(s));
            Some(current)
        })
    }

    /// Number of reference values an instance of this class carries
    pub fn all_ref_field_count(&self, id: ClassId) -> NavResult<usize> {
        self.layouts
            .get(&id)
            .map(|l| l.ref_field_count)
            .ok_or(NavError::ClassIdNotFound(id))
    }

    /// Whether instances of this class are soft or weak references
    pub fn is_soft_or_weak_reference(&self, id: ClassId) -> bool {
        self.hierarchy(id)
            .any(|c| c.name == SOFT_REFERENCE_CLASS || c.name == WEAK_REFERENCE_CLASS)
    }

    /// Position of the `referent` edge for soft/weak reference classes
    pub fn soft_weak_referent_index(&self, id: ClassId) -> Option<usize> {
        self.layouts.get(&id).and_then(|l| l.referent_index)
    }
}

/// Collects class definitions and validates the hierarchy on `build`
#[derive(Debug, Default)]
pub struct ClassStoreBuilder {
    classes: Vec<ClassDefinition>,
}

impl ClassStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, class: ClassDefinition) -> Self {
        self.classes.push(class);
        self
    }

    pub fn push(&mut self, class: ClassDefinition) {
        self.classes.push(class);
    }

    pub fn build(self) -> NavResult<ClassStore> {
        let mut store = ClassStore {
            by_id: FxHashMap::default(),
            by_name: FxHashMap::default(),
            layouts: FxHashMap::default(),
            classes: self.classes,
        };

        for (idx, class) in store.classes.iter().enumerate() {
            if store.by_id.insert(class.id, idx).is_some()
                || store.by_name.insert(class.name.clone(), idx).is_some()
            {
                return Err(NavError::DuplicateClass(class.name.clone()));
            }
        }

        let limit = store.classes.len();
        for class in &store.classes {
            let mut steps = 0;
            let mut super_id = class.super_class_id;
            while let Some(id) = super_id {
                let parent = store.try_get_by_id(id).ok_or(NavError::ClassIdNotFound(id))?;
                steps += 1;
                if steps > limit {
                    return Err(NavError::ClassHierarchyCycle(class.name.clone()));
                }
                super_id = parent.super_class_id;
            }
        }

        let mut layouts = FxHashMap::default();
        for class in &store.classes {
            let names = class.all_ref_field_names(&store);
            let referent_index = if store.is_soft_or_weak_reference(class.id) {
                names.iter().position(|&n| n == REFERENT_FIELD)
            } else {
                None
            };
            layouts.insert(
                class.id,
                ClassLayout {
                    ref_field_count: names.len(),
                    referent_index,
                },
            );
        }
        store.layouts = layouts;

        Ok(store)
    }
}
