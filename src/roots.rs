//! GC root bookkeeping
//!
//! Roots are discovered during the pre-pass, in dump order. The root set
//! keeps that order so iteration is stable across runs over the same dump.

use crate::classstore::{ObjectId, NULL_ID};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an object is a GC root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RootKind {
    #[default]
    Unknown,
    JniGlobal,
    JniLocal,
    JavaFrame,
    NativeStack,
    StickyClass,
    ThreadBlock,
    MonitorUsed,
    ThreadObject,
    InternedString,
    Finalizing,
    Debugger,
    VmInternal,
}

impl fmt::Display for RootKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RootKind::Unknown => "Unknown",
            RootKind::JniGlobal => "JNI global",
            RootKind::JniLocal => "JNI local",
            RootKind::JavaFrame => "Java frame",
            RootKind::NativeStack => "Native stack",
            RootKind::StickyClass => "Sticky class",
            RootKind::ThreadBlock => "Thread block",
            RootKind::MonitorUsed => "Monitor used",
            RootKind::ThreadObject => "Thread object",
            RootKind::InternedString => "Interned string",
            RootKind::Finalizing => "Finalizing",
            RootKind::Debugger => "Debugger",
            RootKind::VmInternal => "VM internal",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootReason {
    pub kind: RootKind,
    /// Extra detail, e.g. the thread and frame holding a local
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RootReason {
    pub fn new(kind: RootKind) -> Self {
        Self {
            kind,
            description: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

impl fmt::Display for RootReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(desc) => write!(f, "{}: {}", self.kind, desc),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Insertion-ordered mapping from root object id to its reason
#[derive(Debug, Default, Clone)]
pub struct RootSet {
    roots: IndexMap<ObjectId, RootReason>,
}

impl RootSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a root. Returns false if the id was already a root or is null;
    /// the first reason seen is kept.
    pub fn insert(&mut self, id: ObjectId, reason: RootReason) -> bool {
        if id == NULL_ID || self.roots.contains_key(&id) {
            return false;
        }
        self.roots.insert(id, reason);
        true
    }

    pub fn get(&self, id: ObjectId) -> Option<&RootReason> {
        self.roots.get(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.roots.contains_key(&id)
    }

    /// Root ids in discovery order
    pub fn iter_ids(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.roots.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &RootReason)> {
        self.roots.iter().map(|(&id, reason)| (id, reason))
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_reason_wins() {
        let mut roots = RootSet::new();
        assert!(roots.insert(5, RootReason::new(RootKind::JavaFrame)));
        assert!(!roots.insert(5, RootReason::new(RootKind::JniGlobal)));
        assert_eq!(roots.get(5).unwrap().kind, RootKind::JavaFrame);
        assert_eq!(roots.len(), 1);
    }

    #[test]
    fn test_discovery_order_kept() {
        let mut roots = RootSet::new();
        for id in [9, 2, 7, 2, 4] {
            roots.insert(id, RootReason::new(RootKind::StickyClass));
        }
        assert_eq!(roots.iter_ids().collect::<Vec<_>>(), vec![9, 2, 7, 4]);
    }

    #[test]
    fn test_null_is_never_a_root() {
        let mut roots = RootSet::new();
        assert!(!roots.insert(NULL_ID, RootReason::new(RootKind::Unknown)));
        assert!(roots.is_empty());
    }

    #[test]
    fn test_display() {
        let reason = RootReason::new(RootKind::JavaFrame).with_description("main @ Foo.run");
        assert_eq!(reason.to_string(), "Java frame: main @ Foo.run");
        assert_eq!(RootReason::new(RootKind::JniGlobal).to_string(), "JNI global");
    }
}
