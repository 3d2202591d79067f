/// The spill-file set: one append-only binary file per sorted run,
/// named by a monotonically increasing index inside a private temporary
/// directory. Files store raw nodes back to back with no framing.
use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::trace;
use tempfile::TempDir;

use crate::record::core::read_block_from;

const RUN_BUF_SIZE: usize = 256 * 1024;

pub struct TempFileSet {
    dir: TempDir,
    next_idx: u64,
}

impl TempFileSet {
    /// Create a private run directory under `parent` (or the system temp
    /// directory). The directory and anything left in it are removed on
    /// drop, including the error path out of a failed sort.
    pub fn new(parent: Option<&Path>) -> io::Result<TempFileSet> {
        let builder_dir = match parent {
            Some(p) => tempfile::Builder::new().prefix("fflowsort-").tempdir_in(p)?,
            None => tempfile::Builder::new().prefix("fflowsort-").tempdir()?,
        };
        Ok(TempFileSet {
            dir: builder_dir,
            next_idx: 0,
        })
    }

    pub fn path_of(&self, idx: u64) -> PathBuf {
        self.dir.path().join(format!("{idx:06x}"))
    }

    /// Display name of run `idx`, for diagnostics.
    pub fn name(&self, idx: u64) -> String {
        self.path_of(idx).display().to_string()
    }

    /// Create the next run file and return its writer and index.
    pub fn create(&mut self) -> io::Result<(RunWriter, u64)> {
        let idx = self.next_idx;
        let file = File::create(self.path_of(idx))?;
        self.next_idx += 1;
        trace!("created temp run #{idx}");
        Ok((
            RunWriter {
                w: BufWriter::with_capacity(RUN_BUF_SIZE, file),
            },
            idx,
        ))
    }

    /// Open run `idx` for reading. Resource failures (EMFILE/ENOMEM) are
    /// reported as-is for the merger to classify.
    pub fn open(&self, idx: u64) -> io::Result<RunReader> {
        let file = File::open(self.path_of(idx))?;
        Ok(RunReader {
            r: BufReader::with_capacity(RUN_BUF_SIZE, file),
        })
    }

    /// Delete run `idx`. Missing files are fine: a pass removes every
    /// index it was scheduled for, whether or not the open succeeded.
    pub fn remove(&self, idx: u64) -> io::Result<()> {
        trace!("removing temp run #{idx}");
        match std::fs::remove_file(self.path_of(idx)) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// Writes one sorted run of raw nodes.
pub struct RunWriter {
    w: BufWriter<File>,
}

impl RunWriter {
    #[inline]
    pub fn write_node(&mut self, node: &[u8]) -> io::Result<()> {
        self.w.write_all(node)
    }

    pub fn finish(mut self) -> io::Result<()> {
        self.w.flush()
    }
}

/// Reads one run of raw nodes.
pub struct RunReader {
    r: BufReader<File>,
}

impl RunReader {
    /// Fill `node` with the next node, or return false at end of run.
    #[inline]
    pub fn read_node(&mut self, node: &mut [u8]) -> io::Result<bool> {
        read_block_from(&mut self.r, node)
    }
}
