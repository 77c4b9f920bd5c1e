//! Read-only, memory-mapped view of the auxiliary files

use super::varint::read_varint;
use super::{
    read_u32_le, read_u64_le, AuxFilePaths, BODY_HEADER_SIZE, BODY_MAGIC, FORMAT_VERSION,
    MISSING_OFFSET, OFFSETS_HEADER_SIZE, OFFSETS_MAGIC, SOFT_WEAK_BIT,
};
use crate::classstore::{ClassId, ObjectId, NULL_ID};
use crate::error::{NavError, NavResult};
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// Both auxiliary files, mapped read-only.
///
/// Never mutated after `open`, so one index can back any number of
/// navigators across threads.
pub struct AuxIndex {
    offsets: Mmap,
    body: Mmap,
    instance_count: u64,
}

impl std::fmt::Debug for AuxIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuxIndex")
            .field("instance_count", &self.instance_count)
            .field("offsets_bytes", &self.offsets.len())
            .field("body_bytes", &self.body.len())
            .finish()
    }
}

fn corrupt(msg: impl Into<String>) -> NavError {
    NavError::CorruptAuxFile(msg.into())
}

fn map_read_only(path: &Path) -> NavResult<Mmap> {
    let file = File::open(path)?;
    // SAFETY: The mapping is read-only. `AuxFilesWriter` never opens a
    // target path for writing: it builds fresh staging files and renames them
    // into place, so a mapped file is only ever unlinked, never modified.
    // Editing the files by other means while mapped is unsupported.
    let mmap = unsafe { MmapOptions::new().map(&file)? };
    Ok(mmap)
}

impl AuxIndex {
    /// Map both files and validate their headers and sizes
    pub fn open(paths: &AuxFilePaths) -> NavResult<Self> {
        let offsets = map_read_only(&paths.offsets)?;
        let body = map_read_only(&paths.body)?;

        if offsets.len() < OFFSETS_HEADER_SIZE {
            return Err(corrupt(format!(
                "offsets file is {} bytes, smaller than its header",
                offsets.len()
            )));
        }
        if &offsets[0..8] != OFFSETS_MAGIC {
            return Err(corrupt("offsets file: bad magic"));
        }
        let version = read_u32_le(&offsets, 8).ok_or_else(|| corrupt("offsets header"))?;
        if version != FORMAT_VERSION {
            return Err(corrupt(format!("unsupported offsets version {}", version)));
        }
        let instance_count =
            read_u64_le(&offsets, 16).ok_or_else(|| corrupt("offsets header"))?;
        let body_len = read_u64_le(&offsets, 24).ok_or_else(|| corrupt("offsets header"))?;

        let expected_len = usize::try_from(instance_count)
            .ok()
            .and_then(|n| n.checked_add(1))
            .and_then(|slots| slots.checked_mul(8))
            .and_then(|bytes| bytes.checked_add(OFFSETS_HEADER_SIZE))
            .ok_or_else(|| corrupt("offsets region size overflow"))?;
        if offsets.len() != expected_len {
            return Err(corrupt(format!(
                "offsets file is {} bytes, expected {} for {} objects",
                offsets.len(),
                expected_len,
                instance_count
            )));
        }

        if body.len() < BODY_HEADER_SIZE {
            return Err(corrupt(format!(
                "body file is {} bytes, smaller than its header",
                body.len()
            )));
        }
        if &body[0..8] != BODY_MAGIC {
            return Err(corrupt("body file: bad magic"));
        }
        let version = read_u32_le(&body, 8).ok_or_else(|| corrupt("body header"))?;
        if version != FORMAT_VERSION {
            return Err(corrupt(format!("unsupported body version {}", version)));
        }
        if body.len() as u64 != body_len {
            return Err(corrupt(format!(
                "body file is {} bytes, offsets file expects {}",
                body.len(),
                body_len
            )));
        }

        debug!(
            "Mapped auxiliary files: {} objects, {} offset bytes, {} body bytes",
            instance_count,
            offsets.len(),
            body.len()
        );

        Ok(Self {
            offsets,
            body,
            instance_count,
        })
    }

    pub fn instance_count(&self) -> u64 {
        self.instance_count
    }

    /// Whether a record exists for `id`. Null has no record.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.offset_of(id).is_ok()
    }

    fn offset_of(&self, id: ObjectId) -> NavResult<usize> {
        if id == NULL_ID || id > self.instance_count {
            return Err(NavError::ObjectNotFound(id));
        }
        let slot = OFFSETS_HEADER_SIZE + (id as usize) * 8;
        let offset = read_u64_le(&self.offsets, slot)
            .ok_or_else(|| corrupt(format!("offset slot for object {} out of bounds", id)))?;
        if offset == MISSING_OFFSET {
            return Err(NavError::ObjectNotFound(id));
        }
        if offset < BODY_HEADER_SIZE as u64 || offset >= self.body.len() as u64 {
            return Err(corrupt(format!(
                "object {} points at offset {} outside the body file",
                id, offset
            )));
        }
        Ok(offset as usize)
    }

    /// Class id of the object's record, without decoding its references
    pub fn class_id_of(&self, id: ObjectId) -> NavResult<ClassId> {
        let mut pos = self.offset_of(id)?;
        read_varint(&self.body, &mut pos)
            .ok_or_else(|| corrupt(format!("truncated record for object {}", id)))
    }

    /// Decode the record for `id` into `out` (cleared first) and return its
    /// class id. Soft/weak edges come back as null unless
    /// `include_soft_weak` is set.
    pub fn read_record(
        &self,
        id: ObjectId,
        include_soft_weak: bool,
        out: &mut Vec<ObjectId>,
    ) -> NavResult<ClassId> {
        let truncated = || corrupt(format!("truncated record for object {}", id));

        let mut pos = self.offset_of(id)?;
        let class_id = read_varint(&self.body, &mut pos).ok_or_else(truncated)?;
        let count = read_varint(&self.body, &mut pos).ok_or_else(truncated)?;

        // Every encoded reference takes at least one byte
        let remaining = (self.body.len() - pos) as u64;
        if count > remaining {
            return Err(truncated());
        }

        out.clear();
        out.reserve(count as usize);
        for _ in 0..count {
            let encoded = read_varint(&self.body, &mut pos).ok_or_else(truncated)?;
            let target = encoded >> 1;
            if encoded & SOFT_WEAK_BIT != 0 && !include_soft_weak {
                out.push(NULL_ID);
            } else {
                out.push(target);
            }
        }
        Ok(class_id)
    }
}
