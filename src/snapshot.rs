//! JSON heap snapshots
//!
//! A small, human-editable stand-in for a parsed heap dump. It carries the
//! class table, the GC roots and every object, and streams them through a
//! [`HeapVisitor`] exactly like a dump parser would.
//!
//! ```json
//! {
//!   "classes": [
//!     { "id": 1, "name": "Foo",
//!       "instance_fields": [{ "name": "a" }, { "name": "b" }],
//!       "static_fields": [{ "name": "INSTANCE", "object_id": 7 }] }
//!   ],
//!   "roots": [{ "id": 7, "kind": "sticky_class" }],
//!   "objects": [
//!     { "type": "instance", "id": 7, "class_id": 1, "fields": { "a": 9 } },
//!     { "type": "instance", "id": 9, "class_id": 1, "references": [0, 0] }
//!   ]
//! }
//! ```
//!
//! Instances give their reference values either positionally
//! (`references`, in hierarchy order) or by field name (`fields`, missing
//! names are null).
//!
//! Snapshot ids are the ids the navigator answers to, so they are not
//! renumbered. Gaps are allowed, but the offset table is sized by the largest
//! id, so a snapshot whose ids leave more than [`MAX_UNUSED_IDS`] slots empty
//! is rejected.

use crate::classstore::{ClassDefinition, ClassId, ClassStore, ObjectId, NULL_ID};
use crate::error::{NavError, NavResult};
use crate::roots::{RootKind, RootReason};
use crate::source::{HeapEventSource, HeapVisitor};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Largest number of ids in `1..=max id` that may have no object
pub const MAX_UNUSED_IDS: u64 = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRoot {
    pub id: ObjectId,
    #[serde(default)]
    pub kind: RootKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SnapshotObject {
    Instance {
        id: ObjectId,
        class_id: ClassId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        references: Option<Vec<ObjectId>>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        fields: BTreeMap<String, ObjectId>,
    },
    ObjectArray {
        id: ObjectId,
        class_id: ClassId,
        #[serde(default)]
        elements: Vec<ObjectId>,
    },
    PrimitiveArray {
        id: ObjectId,
        class_id: ClassId,
        #[serde(default)]
        length: usize,
    },
}

impl SnapshotObject {
    pub fn id(&self) -> ObjectId {
        match self {
            SnapshotObject::Instance { id, .. }
            | SnapshotObject::ObjectArray { id, .. }
            | SnapshotObject::PrimitiveArray { id, .. } => *id,
        }
    }
}

/// A complete heap description
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapSnapshot {
    #[serde(default)]
    pub classes: Vec<ClassDefinition>,
    #[serde(default)]
    pub roots: Vec<SnapshotRoot>,
    #[serde(default)]
    pub objects: Vec<SnapshotObject>,
    /// Named-field instances resolved into hierarchy order by `prepare`,
    /// keyed by index into `objects`
    #[serde(skip)]
    resolved: FxHashMap<usize, Vec<ObjectId>>,
}

impl HeapSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> NavResult<Self> {
        serde_json::from_str(text).map_err(|e| NavError::Source(format!("invalid snapshot: {}", e)))
    }

    pub fn load(path: &Path) -> NavResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json(&self) -> NavResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| NavError::Source(e.to_string()))
    }

    pub fn with_class(mut self, class: ClassDefinition) -> Self {
        self.classes.push(class);
        self
    }

    pub fn with_root(mut self, id: ObjectId, reason: RootReason) -> Self {
        self.roots.push(SnapshotRoot {
            id,
            kind: reason.kind,
            description: reason.description,
        });
        self
    }

    pub fn with_instance(mut self, id: ObjectId, class_id: ClassId, references: &[ObjectId]) -> Self {
        self.objects.push(SnapshotObject::Instance {
            id,
            class_id,
            references: Some(references.to_vec()),
            fields: BTreeMap::new(),
        });
        self
    }

    pub fn with_named_instance(
        mut self,
        id: ObjectId,
        class_id: ClassId,
        fields: &[(&str, ObjectId)],
    ) -> Self {
        self.objects.push(SnapshotObject::Instance {
            id,
            class_id,
            references: None,
            fields: fields.iter().map(|&(n, v)| (n.to_string(), v)).collect(),
        });
        self
    }

    pub fn with_object_array(mut self, id: ObjectId, class_id: ClassId, elements: &[ObjectId]) -> Self {
        self.objects.push(SnapshotObject::ObjectArray {
            id,
            class_id,
            elements: elements.to_vec(),
        });
        self
    }

    pub fn with_primitive_array(mut self, id: ObjectId, class_id: ClassId, length: usize) -> Self {
        self.objects.push(SnapshotObject::PrimitiveArray {
            id,
            class_id,
            length,
        });
        self
    }

    /// Build the class store described by this snapshot
    pub fn class_store(&self) -> NavResult<ClassStore> {
        let mut builder = ClassStore::builder();
        for class in &self.classes {
            builder.push(class.clone());
        }
        builder.build()
    }

    fn check_id_space(&self) -> NavResult<()> {
        let max_id = self.instance_count();
        let unused = max_id.saturating_sub(self.objects.len() as u64);
        if unused > MAX_UNUSED_IDS {
            return Err(NavError::Source(format!(
                "object id {} leaves {} unused ids for {} objects; renumber ids densely",
                max_id,
                unused,
                self.objects.len()
            )));
        }
        Ok(())
    }
}

/// Resolve named field values into hierarchy order
fn order_fields(
    store: &ClassStore,
    class_id: ClassId,
    fields: &BTreeMap<String, ObjectId>,
    out: &mut Vec<ObjectId>,
) -> NavResult<()> {
    let class = store.get_by_id(class_id)?;
    let names = class.all_ref_field_names(store);
    out.clear();
    out.resize(names.len(), NULL_ID);
    for (name, &value) in fields {
        let idx = names
            .iter()
            .position(|n| *n == name.as_str())
            .ok_or_else(|| NavError::FieldNotFound {
                class: class.name.clone(),
                field: name.clone(),
            })?;
        out[idx] = value;
    }
    Ok(())
}

impl HeapEventSource for HeapSnapshot {
    fn prepare(&mut self, class_store: &ClassStore) -> NavResult<()> {
        self.check_id_space()?;
        self.resolved.clear();
        for (index, object) in self.objects.iter().enumerate() {
            if let SnapshotObject::Instance {
                class_id,
                references: None,
                fields,
                ..
            } = object
            {
                let mut ordered = Vec::new();
                order_fields(class_store, *class_id, fields, &mut ordered)?;
                self.resolved.insert(index, ordered);
            }
        }
        Ok(())
    }

    fn instance_count(&self) -> u64 {
        self.objects.iter().map(SnapshotObject::id).max().unwrap_or(0)
    }

    fn accept(&mut self, visitor: &mut dyn HeapVisitor, label: &str) -> NavResult<()> {
        debug!(
            "Streaming snapshot for '{}': {} roots, {} objects",
            label,
            self.roots.len(),
            self.objects.len()
        );

        visitor.pre_visit()?;
        for root in &self.roots {
            let reason = RootReason {
                kind: root.kind,
                description: root.description.clone(),
            };
            visitor.visit_root(root.id, &reason)?;
        }
        for (index, object) in self.objects.iter().enumerate() {
            match object {
                SnapshotObject::Instance {
                    id,
                    class_id,
                    references: Some(references),
                    ..
                } => visitor.visit_instance(*id, *class_id, references)?,
                SnapshotObject::Instance {
                    id,
                    class_id,
                    references: None,
                    ..
                } => {
                    let references = self.resolved.get(&index).ok_or_else(|| {
                        NavError::Source(format!(
                            "object {} has named fields that were not resolved; call prepare first",
                            id
                        ))
                    })?;
                    visitor.visit_instance(*id, *class_id, references)?;
                }
                SnapshotObject::ObjectArray {
                    id,
                    class_id,
                    elements,
                } => visitor.visit_object_array(*id, *class_id, elements)?,
                SnapshotObject::PrimitiveArray {
                    id,
                    class_id,
                    length,
                } => visitor.visit_primitive_array(*id, *class_id, *length)?,
            }
        }
        visitor.post_visit()
    }
}
