use std::fs::File;
use std::io;
use std::path::Path;

use memmap2::Mmap;

/// Threshold above which we use mmap instead of buffered read.
/// mmap has overhead from page table setup; for small files buffered read wins.
pub const MMAP_THRESHOLD: u64 = 64 * 1024; // 64KB

/// Memory-map a file for zero-copy access.
///
/// Returns the Mmap handle. Caller must ensure the file is not modified
/// while the mapping is alive.
pub fn mmap_file(file: &File) -> io::Result<Mmap> {
    // SAFETY: read-only mapping; file must not be truncated during use.
    unsafe { Mmap::map(file) }
}

/// Whether a file at `path` is a candidate for memory mapping: a regular
/// file at least MMAP_THRESHOLD bytes long.
pub fn should_mmap(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() >= MMAP_THRESHOLD)
        .unwrap_or(false)
}
