//! Auxiliary files for O(1) object lookup
//!
//! The pre-pass writes two files, then navigation maps both read-only.
//!
//! ```text
//! offsets file                         body file
//! +---------------------------+        +---------------------------+
//! | magic "HNAVOFFS"  (8)     |        | magic "HNAVBODY"  (8)     |
//! | version           (4)     |        | version           (4)     |
//! | reserved          (4)     |        | reserved          (4)     |
//! | instance count    (8)     |        +---------------------------+
//! | body length       (8)     |        | record for some object    |
//! +---------------------------+        |   varint class id         |
//! | u64 offset of id 0        |  --->  |   varint ref count        |
//! | u64 offset of id 1        |        |   varint (ref << 1 | sw)  |
//! | ...                       |        |   ...                     |
//! +---------------------------+        +---------------------------+
//! ```
//!
//! `sw` marks the `referent` edge of soft/weak reference objects. Slot 0 and
//! any id the dump never produced hold [`MISSING_OFFSET`].
//!
//! The format is a private cache. It carries a version so stale files are
//! rejected, but no compatibility is kept across versions.
//!
//! Files are never rewritten in place. The writer builds uniquely named
//! staging files next to the targets and renames them over the targets once
//! complete, so an index mapped from an earlier build keeps reading the old
//! (unlinked) files.

mod index;
pub mod varint;
mod writer;

pub use index::AuxIndex;
pub use writer::{AuxFilesWriter, AuxWriteStats};

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) const OFFSETS_MAGIC: &[u8; 8] = b"HNAVOFFS";
pub(crate) const BODY_MAGIC: &[u8; 8] = b"HNAVBODY";
pub(crate) const FORMAT_VERSION: u32 = 1;
pub(crate) const OFFSETS_HEADER_SIZE: usize = 32;
pub(crate) const BODY_HEADER_SIZE: usize = 16;

/// Offset slot value for ids with no record
pub const MISSING_OFFSET: u64 = u64::MAX;

/// Tag bit on an encoded reference marking a soft/weak edge
pub(crate) const SOFT_WEAK_BIT: u64 = 1;

/// Locations of the two auxiliary files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxFilePaths {
    pub offsets: PathBuf,
    pub body: PathBuf,
}

impl AuxFilePaths {
    pub fn new(offsets: impl Into<PathBuf>, body: impl Into<PathBuf>) -> Self {
        Self {
            offsets: offsets.into(),
            body: body.into(),
        }
    }

    /// Standard file names inside `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join("objects.offsets"), dir.join("objects.body"))
    }

    /// Fresh sibling paths for a build in progress, unique per process and
    /// per call
    pub(crate) fn staging(&self) -> Self {
        static SEQ: AtomicU64 = AtomicU64::new(0);
        let tag = format!(
            ".{}-{}.tmp",
            std::process::id(),
            SEQ.fetch_add(1, Ordering::Relaxed)
        );
        Self::new(with_suffix(&self.offsets, &tag), with_suffix(&self.body, &tag))
    }

    /// Delete both files, ignoring ones that are already gone
    pub fn remove(&self) -> std::io::Result<()> {
        for path in [&self.offsets, &self.body] {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

#[inline]
pub(crate) fn read_u32_le(buf: &[u8], pos: usize) -> Option<u32> {
    Some(u32::from_le_bytes(buf.get(pos..pos + 4)?.try_into().ok()?))
}

#[inline]
pub(crate) fn read_u64_le(buf: &[u8], pos: usize) -> Option<u64> {
    Some(u64::from_le_bytes(buf.get(pos..pos + 8)?.try_into().ok()?))
}
