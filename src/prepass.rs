//! One-shot pre-pass over the heap dump
//!
//! ```text
//! Phase 1: stream every heap event once
//!   source.accept(PrePass) ──> RootReasonCollector  (root id -> reason)
//!                          └─> AuxFilesWriter       (offsets + packed records)
//!
//! Phase 2: finish each sink
//!   - collector yields the RootSet
//!   - writer syncs and maps its files, then renames them into place
//! ```
//!
//! The pre-pass must complete before the files are mapped. A failure in
//! either phase leaves no usable navigator, and files from an earlier build
//! at the same paths stay as they were.

use crate::auxfiles::{AuxFilePaths, AuxFilesWriter, AuxIndex, AuxWriteStats};
use crate::classstore::{ClassId, ClassStore, ObjectId};
use crate::error::NavResult;
use crate::roots::{RootReason, RootSet};
use crate::source::{HeapEventSource, HeapVisitor};
use std::time::Instant;
use tracing::{debug, info};

/// Traversal label passed to the source
pub const PRE_PASS_LABEL: &str = "roots/auxFiles";

/// Collects GC roots in discovery order
#[derive(Debug, Default)]
pub struct RootReasonCollector {
    roots: RootSet,
    duplicates: usize,
}

impl RootReasonCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_roots(self) -> RootSet {
        if self.duplicates > 0 {
            debug!("Ignored {} repeated root reports", self.duplicates);
        }
        self.roots
    }
}

impl HeapVisitor for RootReasonCollector {
    fn visit_root(&mut self, id: ObjectId, reason: &RootReason) -> NavResult<()> {
        if !self.roots.insert(id, reason.clone()) {
            self.duplicates += 1;
        }
        Ok(())
    }
}

/// Both sinks of the pre-pass, fed from a single traversal
pub struct PrePass<'a> {
    roots: RootReasonCollector,
    aux: AuxFilesWriter<'a>,
}

/// Everything the pre-pass produces
#[derive(Debug)]
pub struct PrePassOutput {
    pub roots: RootSet,
    pub stats: AuxWriteStats,
    /// The files this pass wrote, already mapped
    pub index: AuxIndex,
}

impl<'a> PrePass<'a> {
    pub fn new(
        paths: &AuxFilePaths,
        class_store: &'a ClassStore,
        instance_count: u64,
    ) -> NavResult<Self> {
        Ok(Self {
            roots: RootReasonCollector::new(),
            aux: AuxFilesWriter::create(paths, class_store, instance_count)?,
        })
    }

    /// Phase 2: finalize each sink in order
    pub fn finish(self) -> NavResult<PrePassOutput> {
        let (stats, index) = self.aux.finish()?;
        Ok(PrePassOutput {
            roots: self.roots.into_roots(),
            stats,
            index,
        })
    }

    /// Abandon the pass after a failed traversal
    pub fn discard(self) {
        self.aux.discard();
    }
}

impl HeapVisitor for PrePass<'_> {
    fn pre_visit(&mut self) -> NavResult<()> {
        self.roots.pre_visit()?;
        self.aux.pre_visit()
    }

    fn visit_root(&mut self, id: ObjectId, reason: &RootReason) -> NavResult<()> {
        self.roots.visit_root(id, reason)?;
        self.aux.visit_root(id, reason)
    }

    fn visit_instance(
        &mut self,
        id: ObjectId,
        class_id: ClassId,
        references: &[ObjectId],
    ) -> NavResult<()> {
        self.roots.visit_instance(id, class_id, references)?;
        self.aux.visit_instance(id, class_id, references)
    }

    fn visit_object_array(
        &mut self,
        id: ObjectId,
        array_class_id: ClassId,
        elements: &[ObjectId],
    ) -> NavResult<()> {
        self.roots.visit_object_array(id, array_class_id, elements)?;
        self.aux.visit_object_array(id, array_class_id, elements)
    }

    fn visit_primitive_array(
        &mut self,
        id: ObjectId,
        array_class_id: ClassId,
        length: usize,
    ) -> NavResult<()> {
        self.roots.visit_primitive_array(id, array_class_id, length)?;
        self.aux.visit_primitive_array(id, array_class_id, length)
    }

    fn post_visit(&mut self) -> NavResult<()> {
        self.roots.post_visit()?;
        self.aux.post_visit()
    }
}

/// Run both phases over `source`, writing the files named by `paths`
pub fn run(
    source: &mut dyn HeapEventSource,
    paths: &AuxFilePaths,
    class_store: &ClassStore,
) -> NavResult<PrePassOutput> {
    let start = Instant::now();
    source.prepare(class_store)?;
    let instance_count = source.instance_count();
    info!(
        "Pre-pass '{}': {} objects, {} classes",
        PRE_PASS_LABEL,
        instance_count,
        class_store.len()
    );

    let mut pass = PrePass::new(paths, class_store, instance_count)?;
    if let Err(e) = source.accept(&mut pass, PRE_PASS_LABEL) {
        pass.discard();
        return Err(e);
    }
    let output = pass.finish()?;

    info!(
        "Pre-pass done in {:.2?}: {} records, {} references, {} roots, {} body bytes",
        start.elapsed(),
        output.stats.records,
        output.stats.references,
        output.roots.len(),
        output.stats.body_bytes
    );
    Ok(output)
}
