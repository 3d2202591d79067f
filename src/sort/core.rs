/// Core sorting logic for fflowsort.
///
/// Records are read into fixed-size nodes (record bytes plus plug-in key
/// bytes), sorted in a budget-bounded buffer, and spilled as sorted runs
/// when the buffer fills. Temp runs are reconciled by the cascading
/// k-way merger. Presorted inputs skip the run-producing phase and feed
/// the merger directly.
use std::io::{self, Write};
use std::path::PathBuf;

use log::debug;
use thiserror::Error;

use super::buffer::RunBuffer;
use super::compare::NodeComparator;
use super::field::{FieldSpec, KeyFieldError, MAX_NODE_SIZE};
use super::merge::{merge_temp_runs, run_merge_pass, MergeDest, NodeSource};
use super::plan::SortPlan;
use super::temp::TempFileSet;
use crate::record::{OutputSink, RecordReader, RecordWriter};

/// Default ceiling on the record buffer, in bytes.
pub const DEFAULT_SORT_BUFFER_SIZE: u64 = 1 << 30;

/// Default maximum number of run readers open in one merge pass.
pub const MAX_MERGE_FILES: usize = 64;

/// Divisor for the initial buffer chunk: the buffer starts at
/// 1/SORT_NUM_CHUNKS of the budget and grows chunk by chunk.
pub const SORT_NUM_CHUNKS: usize = 4;

/// Smallest initial chunk worth trying, in records. Below this the sort
/// would thrash temp files; allocation failure at this size is fatal.
pub const MIN_IN_CORE_RECORDS: usize = 1000;

#[derive(Debug, Error)]
pub enum SortError {
    #[error("{0}")]
    Config(String),
    #[error("error reading {path}: {source}")]
    Input { path: String, source: io::Error },
    #[error("error creating temporary file: {0}")]
    TempCreate(io::Error),
    #[error("error opening temporary file '{name}': {source}")]
    TempOpen { name: String, source: io::Error },
    #[error("error reading temporary file '{name}': {source}")]
    TempRead { name: String, source: io::Error },
    #[error("error writing temporary file '{name}': {source}")]
    TempWrite { name: String, source: io::Error },
    #[error("error removing temporary file '{name}': {source}")]
    TempRemove { name: String, source: io::Error },
    #[error("error writing output: {0}")]
    Output(io::Error),
    #[error("cannot allocate space for {0} records")]
    Memory(usize),
    #[error("key field {field} failed {op}: {source}")]
    Plugin {
        field: String,
        op: &'static str,
        source: KeyFieldError,
    },
}

/// Whether an open failed for lack of descriptors or memory. The merger
/// reacts to these by narrowing a pass; everything else is fatal.
pub(crate) fn is_resource_error(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(code) if code == libc::EMFILE || code == libc::ENOMEM)
}

/// Configuration for a sort operation.
#[derive(Debug, Clone)]
pub struct SortConfig {
    /// Composite key, applied left to right.
    pub fields: Vec<FieldSpec>,
    /// Reverse the result of comparisons.
    pub reverse: bool,
    /// Inputs are already sorted under the same fields and direction.
    pub presorted_input: bool,
    /// Ceiling on the record buffer, in bytes.
    pub sort_buffer_size: u64,
    /// Maximum run readers open in one merge pass.
    pub merge_fanout: usize,
    /// Parent directory for the private temp-run directory.
    pub temp_dir: Option<PathBuf>,
    /// Output file (None = stdout).
    pub output_path: Option<PathBuf>,
}

impl Default for SortConfig {
    fn default() -> Self {
        SortConfig {
            fields: Vec::new(),
            reverse: false,
            presorted_input: false,
            sort_buffer_size: DEFAULT_SORT_BUFFER_SIZE,
            merge_fanout: MAX_MERGE_FILES,
            temp_dir: None,
            output_path: None,
        }
    }
}

/// The not-yet-opened tail of the input list. A resource failure leaves
/// the cursor in place so the file is retried by the next merge batch.
struct InputQueue {
    paths: Vec<String>,
    pos: usize,
}

enum OpenNext {
    Exhausted,
    Opened(RecordReader),
    Resource(io::Error),
    Fatal { path: String, source: io::Error },
}

impl InputQueue {
    fn new(paths: &[String]) -> InputQueue {
        let paths = if paths.is_empty() {
            vec!["-".to_string()]
        } else {
            paths.to_vec()
        };
        InputQueue { paths, pos: 0 }
    }

    fn current_path(&self) -> String {
        self.paths
            .get(self.pos)
            .cloned()
            .unwrap_or_else(|| "-".to_string())
    }

    fn open_next(&mut self) -> OpenNext {
        let Some(path) = self.paths.get(self.pos) else {
            return OpenNext::Exhausted;
        };
        match RecordReader::open(path) {
            Ok(reader) => {
                self.pos += 1;
                OpenNext::Opened(reader)
            }
            Err(e) if is_resource_error(&e) => OpenNext::Resource(e),
            Err(e) => OpenNext::Fatal {
                path: path.clone(),
                source: e,
            },
        }
    }
}

/// A presorted input stream as a merge source: reads a record and
/// extracts its plug-in key bytes on the fly.
struct StreamSource<'a> {
    reader: RecordReader,
    plan: &'a SortPlan,
}

impl NodeSource for StreamSource<'_> {
    fn refill(&mut self, node: &mut [u8]) -> Result<bool, SortError> {
        let got = self.reader.read_into(node).map_err(|e| SortError::Input {
            path: self.reader.path().to_string(),
            source: e,
        })?;
        if got {
            self.plan.fill_node(node)?;
        }
        Ok(got)
    }
}

/// Write the buffer's sorted nodes as a new temp run.
fn spill_run(
    tmp: &mut TempFileSet,
    buffer: &RunBuffer,
    last_temp: &mut Option<u64>,
) -> Result<(), SortError> {
    let (mut w, idx) = tmp.create().map_err(SortError::TempCreate)?;
    let name = tmp.name(idx);
    for &i in buffer.indices() {
        w.write_node(buffer.node(i))
            .map_err(|e| SortError::TempWrite {
                name: name.clone(),
                source: e,
            })?;
    }
    w.finish().map_err(|e| SortError::TempWrite {
        name,
        source: e,
    })?;
    debug!("spilled run of {} nodes to temp #{idx}", buffer.len());
    *last_temp = Some(idx);
    Ok(())
}

/// The random-input path: fill the run buffer from the inputs, spilling
/// sorted runs as it overflows. Returns the last temp run index, or None
/// if everything fit in memory and was written straight to the output.
fn sort_random<W: Write>(
    plan: &SortPlan,
    config: &SortConfig,
    queue: &mut InputQueue,
    tmp: &mut TempFileSet,
    out: &mut RecordWriter<W>,
) -> Result<Option<u64>, SortError> {
    let mut buffer = RunBuffer::new(config.sort_buffer_size, plan.node_size())?;
    let cmp = NodeComparator::new(plan);
    let mut last_temp: Option<u64> = None;

    // Inputs are consumed one at a time, so an open failure here is
    // fatal even when it is a resource error.
    let mut current = match queue.open_next() {
        OpenNext::Exhausted => return Ok(None),
        OpenNext::Opened(reader) => reader,
        OpenNext::Resource(e) => {
            return Err(SortError::Input {
                path: queue.current_path(),
                source: e,
            })
        }
        OpenNext::Fatal { path, source } => return Err(SortError::Input { path, source }),
    };

    loop {
        let got = current
            .read_into(buffer.slot())
            .map_err(|e| SortError::Input {
                path: current.path().to_string(),
                source: e,
            })?;
        if !got {
            match queue.open_next() {
                OpenNext::Exhausted => break,
                OpenNext::Opened(reader) => current = reader,
                OpenNext::Resource(e) => {
                    return Err(SortError::Input {
                        path: queue.current_path(),
                        source: e,
                    })
                }
                OpenNext::Fatal { path, source } => {
                    return Err(SortError::Input { path, source })
                }
            }
            continue;
        }

        plan.fill_node(buffer.slot())?;
        buffer.commit();

        if buffer.full() {
            buffer.sort(&cmp)?;
            spill_run(tmp, &buffer, &mut last_temp)?;
            buffer.clear();
        }
    }

    // Sort (and maybe store) the last batch of records.
    if !buffer.is_empty() {
        buffer.sort(&cmp)?;
        if last_temp.is_some() {
            spill_run(tmp, &buffer, &mut last_temp)?;
        } else {
            // The only run: no merge needed, write it out directly.
            debug!("writing {} records directly to output", buffer.len());
            for &i in buffer.indices() {
                out.write_node(buffer.node(i)).map_err(SortError::Output)?;
            }
        }
    }

    Ok(last_temp)
}

/// The presorted path: inputs are already ordered under the configured
/// key, so they feed the merger directly. Batches that cannot cover all
/// inputs at once spill to temp runs for a final merge.
fn sort_presorted<W: Write>(
    plan: &SortPlan,
    config: &SortConfig,
    queue: &mut InputQueue,
    tmp: &mut TempFileSet,
    out: &mut RecordWriter<W>,
) -> Result<Option<u64>, SortError> {
    let fanout = config.merge_fanout;
    let node_size = plan.node_size();
    let cmp = NodeComparator::new(plan);
    let mut scratch = vec![0u8; fanout * MAX_NODE_SIZE];
    let mut last_temp: Option<u64> = None;

    loop {
        let (inter_w, inter_idx) = tmp.create().map_err(SortError::TempCreate)?;

        let mut sources: Vec<StreamSource<'_>> = Vec::with_capacity(fanout);
        let mut all_inputs_open = false;
        while sources.len() < fanout {
            match queue.open_next() {
                OpenNext::Exhausted => {
                    all_inputs_open = true;
                    break;
                }
                OpenNext::Opened(reader) => sources.push(StreamSource { reader, plan }),
                OpenNext::Resource(_) if !sources.is_empty() => {
                    debug!(
                        "resource limit hit after {} inputs; batching into temp #{inter_idx}",
                        sources.len()
                    );
                    break;
                }
                OpenNext::Resource(e) => {
                    return Err(SortError::Input {
                        path: queue.current_path(),
                        source: e,
                    })
                }
                OpenNext::Fatal { path, source } => {
                    return Err(SortError::Input { path, source })
                }
            }
        }

        // Only a first batch that covers every input may write straight
        // to the output; later batches go through temp runs so the final
        // merge sees them all.
        let direct = all_inputs_open && inter_idx == 0;
        let mut dest = if direct {
            drop(inter_w);
            tmp.remove(inter_idx).map_err(|e| SortError::TempRemove {
                name: tmp.name(inter_idx),
                source: e,
            })?;
            MergeDest::Final(&mut *out)
        } else {
            last_temp = Some(inter_idx);
            MergeDest::Temp {
                w: inter_w,
                name: tmp.name(inter_idx),
            }
        };

        debug!("merging {} presorted inputs", sources.len());
        run_merge_pass(&mut sources, &mut scratch, &cmp, node_size, &mut dest)?;
        dest.finish()?;

        if all_inputs_open {
            break;
        }
    }

    Ok(last_temp)
}

/// Main sort entry point.
///
/// Sorts the record streams named by `inputs` ("-" is standard input; an
/// empty list reads standard input) under `config` and writes one record
/// stream to the configured output. All temp runs are deleted before
/// returning, on success and on error.
pub fn sort_and_output(inputs: &[String], config: &SortConfig) -> Result<(), SortError> {
    if config.merge_fanout < 2 || config.merge_fanout > u16::MAX as usize {
        return Err(SortError::Config(format!(
            "merge fanout {} out of range",
            config.merge_fanout
        )));
    }
    if inputs.iter().filter(|p| p.as_str() == "-").count() > 1 {
        return Err(SortError::Config(
            "standard input may be named at most once".to_string(),
        ));
    }

    let plan = SortPlan::new(&config.fields, config.reverse)?;
    let mut tmp = TempFileSet::new(config.temp_dir.as_deref()).map_err(SortError::TempCreate)?;
    let sink = OutputSink::create(config.output_path.as_deref()).map_err(SortError::Output)?;
    let mut out = RecordWriter::new(sink);
    let mut queue = InputQueue::new(inputs);

    let last_temp = if config.presorted_input {
        sort_presorted(&plan, config, &mut queue, &mut tmp, &mut out)?
    } else {
        sort_random(&plan, config, &mut queue, &mut tmp, &mut out)?
    };

    if let Some(last) = last_temp {
        merge_temp_runs(&plan, &mut tmp, last, config.merge_fanout, &mut out)?;
    }

    if out.record_count() == 0 {
        // No records were read at all; the output still gets its header.
        out.write_header().map_err(SortError::Output)?;
    }
    out.flush().map_err(SortError::Output)
}

/// Parse a buffer size string like "10K", "1M", "1G".
pub fn parse_buffer_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty buffer size".to_string());
    }

    let (num_part, suffix) = if s.ends_with(|c: char| c.is_ascii_alphabetic()) {
        let (n, s) = s.split_at(s.len() - 1);
        (n, s.chars().next())
    } else {
        (s, None)
    };

    let base: u64 = num_part
        .parse()
        .map_err(|_| format!("invalid buffer size: {}", s))?;

    let multiplier = match suffix {
        Some('K') | Some('k') => 1024,
        Some('M') | Some('m') => 1024 * 1024,
        Some('G') | Some('g') => 1024 * 1024 * 1024,
        Some('T') | Some('t') => 1024u64.pow(4),
        Some(c) => return Err(format!("invalid suffix '{}' in buffer size", c)),
        None => 1,
    };

    Ok(base * multiplier)
}
