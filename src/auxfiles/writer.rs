//! Writes the auxiliary files during the pre-pass

use super::varint::write_varint;
use super::{
    AuxFilePaths, AuxIndex, BODY_HEADER_SIZE, BODY_MAGIC, FORMAT_VERSION, MISSING_OFFSET,
    OFFSETS_HEADER_SIZE, OFFSETS_MAGIC, SOFT_WEAK_BIT,
};
use crate::classstore::{ClassId, ClassStore, ObjectId, NULL_ID};
use crate::error::{NavError, NavResult};
use crate::source::HeapVisitor;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::debug;

/// Counters reported once the files are complete
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuxWriteStats {
    pub records: u64,
    pub references: u64,
    pub soft_weak_references: u64,
    pub body_bytes: u64,
}

/// Heap visitor that appends one packed record per object.
///
/// Records go to staging files; [`AuxFilesWriter::finish`] renames them over
/// the target paths. A writer that fails or is discarded leaves the targets
/// untouched.
pub struct AuxFilesWriter<'a> {
    class_store: &'a ClassStore,
    target: AuxFilePaths,
    staging: AuxFilePaths,
    offsets_file: File,
    body: BufWriter<File>,
    body_len: u64,
    offsets: Vec<u64>,
    record: Vec<u8>,
    stats: AuxWriteStats,
}

fn create_new(path: &Path) -> NavResult<File> {
    let file = OpenOptions::new().write(true).create_new(true).open(path)?;
    Ok(file)
}

/// One slot per id plus slot 0, allocated without aborting on huge counts
fn offset_table(instance_count: u64) -> NavResult<Vec<u64>> {
    let too_large =
        || NavError::Source(format!("instance count {} too large", instance_count));
    let slots = usize::try_from(instance_count)
        .ok()
        .and_then(|n| n.checked_add(1))
        .ok_or_else(too_large)?;
    let mut offsets = Vec::new();
    offsets.try_reserve_exact(slots).map_err(|_| too_large())?;
    offsets.resize(slots, MISSING_OFFSET);
    Ok(offsets)
}

impl<'a> AuxFilesWriter<'a> {
    /// Allocate the offset table, create both staging files and write the
    /// body header
    pub fn create(
        paths: &AuxFilePaths,
        class_store: &'a ClassStore,
        instance_count: u64,
    ) -> NavResult<Self> {
        let offsets = offset_table(instance_count)?;
        let staging = paths.staging();
        let opened = create_new(&staging.offsets).and_then(|offsets_file| {
            let mut body = BufWriter::new(create_new(&staging.body)?);
            let mut header = [0u8; BODY_HEADER_SIZE];
            header[0..8].copy_from_slice(BODY_MAGIC);
            header[8..12].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
            body.write_all(&header)?;
            Ok((offsets_file, body))
        });
        let (offsets_file, body) = match opened {
            Ok(files) => files,
            Err(e) => {
                let _ = staging.remove();
                return Err(e);
            }
        };

        Ok(Self {
            class_store,
            target: paths.clone(),
            staging,
            offsets_file,
            body,
            body_len: BODY_HEADER_SIZE as u64,
            offsets,
            record: Vec::with_capacity(64),
            stats: AuxWriteStats::default(),
        })
    }

    fn instance_count(&self) -> u64 {
        (self.offsets.len() - 1) as u64
    }

    fn write_record(
        &mut self,
        id: ObjectId,
        class_id: ClassId,
        references: &[ObjectId],
        referent_index: Option<usize>,
    ) -> NavResult<()> {
        if id == NULL_ID || id > self.instance_count() {
            return Err(NavError::Source(format!(
                "object id {} outside 1..={}",
                id,
                self.instance_count()
            )));
        }
        let slot = &mut self.offsets[id as usize];
        if *slot != MISSING_OFFSET {
            return Err(NavError::Source(format!("object {} reported twice", id)));
        }
        *slot = self.body_len;

        self.record.clear();
        write_varint(&mut self.record, class_id);
        write_varint(&mut self.record, references.len() as u64);
        for (idx, &target) in references.iter().enumerate() {
            if target > u64::MAX >> 1 {
                return Err(NavError::Source(format!(
                    "object {} references out-of-range id {}",
                    id, target
                )));
            }
            let mut encoded = target << 1;
            if referent_index == Some(idx) {
                encoded |= SOFT_WEAK_BIT;
                self.stats.soft_weak_references += 1;
            }
            write_varint(&mut self.record, encoded);
        }

        self.body.write_all(&self.record)?;
        self.body_len += self.record.len() as u64;
        self.stats.records += 1;
        self.stats.references += references.len() as u64;
        Ok(())
    }

    /// Flush and sync both staging files, map them, then move them over the
    /// targets. The returned index reads this build even if another build
    /// replaces the targets afterwards.
    pub fn finish(self) -> NavResult<(AuxWriteStats, AuxIndex)> {
        let target = self.target.clone();
        let staging = self.staging.clone();
        let result = self.write_offsets().and_then(|stats| {
            let index = AuxIndex::open(&staging)?;
            fs::rename(&staging.body, &target.body)?;
            fs::rename(&staging.offsets, &target.offsets)?;
            Ok((stats, index))
        });
        if result.is_err() {
            let _ = staging.remove();
        }
        result
    }

    /// Drop a build that will not be finished, deleting its staging files
    pub fn discard(self) {
        let staging = self.staging.clone();
        drop(self);
        if let Err(e) = staging.remove() {
            debug!("Failed to remove staging files: {}", e);
        }
    }

    fn write_offsets(self) -> NavResult<AuxWriteStats> {
        let body = self
            .body
            .into_inner()
            .map_err(|e| NavError::Io(e.into_error()))?;
        body.sync_all()?;

        let instance_count = (self.offsets.len() - 1) as u64;
        let mut out = BufWriter::new(self.offsets_file);
        let mut header = [0u8; OFFSETS_HEADER_SIZE];
        header[0..8].copy_from_slice(OFFSETS_MAGIC);
        header[8..12].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        header[16..24].copy_from_slice(&instance_count.to_le_bytes());
        header[24..32].copy_from_slice(&self.body_len.to_le_bytes());
        out.write_all(&header)?;
        for offset in &self.offsets {
            out.write_all(&offset.to_le_bytes())?;
        }
        let offsets_file = out.into_inner().map_err(|e| NavError::Io(e.into_error()))?;
        offsets_file.sync_all()?;

        Ok(AuxWriteStats {
            body_bytes: self.body_len,
            ..self.stats
        })
    }
}

impl HeapVisitor for AuxFilesWriter<'_> {
    fn visit_instance(
        &mut self,
        id: ObjectId,
        class_id: ClassId,
        references: &[ObjectId],
    ) -> NavResult<()> {
        let expected = self.class_store.all_ref_field_count(class_id)?;
        if references.len() != expected {
            return Err(NavError::ReferenceCountMismatch {
                id,
                class: self.class_store.get_by_id(class_id)?.name.clone(),
                expected,
                actual: references.len(),
            });
        }
        let referent_index = self.class_store.soft_weak_referent_index(class_id);
        self.write_record(id, class_id, references, referent_index)
    }

    fn visit_object_array(
        &mut self,
        id: ObjectId,
        array_class_id: ClassId,
        elements: &[ObjectId],
    ) -> NavResult<()> {
        self.class_store.get_by_id(array_class_id)?;
        self.write_record(id, array_class_id, elements, None)
    }

    fn visit_primitive_array(
        &mut self,
        id: ObjectId,
        array_class_id: ClassId,
        _length: usize,
    ) -> NavResult<()> {
        self.class_store.get_by_id(array_class_id)?;
        self.write_record(id, array_class_id, &[], None)
    }
}
