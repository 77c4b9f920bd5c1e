//! Auxiliary file locations - uses ~/.cache/heapnav/<dump-hash>/ by default

use std::path::{Path, PathBuf};

/// Base cache directory for heapnav.
/// ~/.cache/heapnav on Unix, %LOCALAPPDATA%/heapnav on Windows.
pub fn get_cache_dir() -> PathBuf {
    let base = if cfg!(windows) {
        std::env::var("LOCALAPPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".")))
    } else {
        dirs::cache_dir().unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".cache"))
                .unwrap_or_else(|| PathBuf::from("."))
        })
    };

    base.join("heapnav")
}

/// Directory holding the auxiliary files for one dump
pub fn get_aux_dir(dump_path: &Path) -> PathBuf {
    get_cache_dir().join(hash_path(dump_path))
}

/// Create a directory (and parents) if missing
pub fn ensure_dir(dir: &Path) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    Ok(dir.to_path_buf())
}

/// Deterministic directory name for a dump: `<file-stem>-<hash>`.
/// Uses the canonical path so `./a.json` and `a.json` agree.
fn hash_path(path: &Path) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let mut hasher = DefaultHasher::new();
    canonical.to_string_lossy().hash(&mut hasher);
    let hash = hasher.finish();

    let stem = canonical
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dump".to_string());

    format!("{}-{:016x}", stem, hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aux_dir_is_stable_and_named_after_dump() {
        let a = get_aux_dir(Path::new("/tmp/heaps/app.hprof"));
        let b = get_aux_dir(Path::new("/tmp/heaps/app.hprof"));
        assert_eq!(a, b);
        let name = a.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("app-"), "{}", name);
        assert!(a.starts_with(get_cache_dir()));
    }

    #[test]
    fn test_different_dumps_get_different_dirs() {
        assert_ne!(
            get_aux_dir(Path::new("/tmp/heaps/one.hprof")),
            get_aux_dir(Path::new("/tmp/heaps/two.hprof"))
        );
    }
}
