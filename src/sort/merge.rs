/// The k-way merger.
///
/// A pass opens up to `fanout` run readers, seeds a min-heap with one
/// node per reader, and drains the heap into its destination. The heap
/// stores small reader indices; nodes live in a flat scratch array with
/// one MAX_NODE_SIZE slot per reader, so heap moves shuffle u16s rather
/// than node bytes.
///
/// Opening a reader can fail at any point with EMFILE or ENOMEM. When
/// that happens after at least one reader is open, the pass truncates its
/// range and merges what it has into an intermediate run, which re-enters
/// the set; the merge depth is never planned ahead. Only a failure on the
/// first reader of a pass is fatal.
use std::cmp::Ordering;
use std::io::Write;

use log::{debug, trace};

use super::compare::NodeComparator;
use super::core::{is_resource_error, SortError};
use super::field::MAX_NODE_SIZE;
use super::plan::SortPlan;
use super::temp::{RunReader, RunWriter, TempFileSet};
use crate::record::RecordWriter;

/// Min-heap of reader slots, keyed externally: every operation takes the
/// comparator so the scratch array stays borrowable between operations.
pub(crate) struct MergeHeap {
    slots: Vec<u16>,
}

impl MergeHeap {
    pub fn with_capacity(n: usize) -> MergeHeap {
        MergeHeap {
            slots: Vec::with_capacity(n),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// The slot whose node is smallest.
    #[inline]
    pub fn peek(&self) -> Option<u16> {
        self.slots.first().copied()
    }

    pub fn push(&mut self, v: u16, cmp: impl Fn(u16, u16) -> Ordering) {
        self.slots.push(v);
        self.sift_up(self.slots.len() - 1, &cmp);
    }

    /// Restore heap order after the top slot's node was replaced.
    pub fn replace_top(&mut self, cmp: impl Fn(u16, u16) -> Ordering) {
        self.sift_down(0, &cmp);
    }

    pub fn pop(&mut self, cmp: impl Fn(u16, u16) -> Ordering) -> Option<u16> {
        if self.slots.is_empty() {
            return None;
        }
        let top = self.slots.swap_remove(0);
        if !self.slots.is_empty() {
            self.sift_down(0, &cmp);
        }
        Some(top)
    }

    fn sift_up(&mut self, mut i: usize, cmp: &impl Fn(u16, u16) -> Ordering) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if cmp(self.slots[i], self.slots[parent]) == Ordering::Less {
                self.slots.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut i: usize, cmp: &impl Fn(u16, u16) -> Ordering) {
        let len = self.slots.len();
        loop {
            let left = 2 * i + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut child = left;
            if right < len && cmp(self.slots[right], self.slots[left]) == Ordering::Less {
                child = right;
            }
            if cmp(self.slots[child], self.slots[i]) == Ordering::Less {
                self.slots.swap(i, child);
                i = child;
            } else {
                break;
            }
        }
    }
}

/// Anything a merge pass can pull nodes from: a temp run, or (in the
/// presorted path) an input stream with key extraction on the fly.
pub(crate) trait NodeSource {
    /// Fill `node` with the next node, or return false when drained.
    fn refill(&mut self, node: &mut [u8]) -> Result<bool, SortError>;
}

pub(crate) struct TempRunSource {
    pub reader: RunReader,
    pub name: String,
}

impl NodeSource for TempRunSource {
    fn refill(&mut self, node: &mut [u8]) -> Result<bool, SortError> {
        self.reader.read_node(node).map_err(|e| SortError::TempRead {
            name: self.name.clone(),
            source: e,
        })
    }
}

/// Where a pass sends its nodes: an intermediate run that re-enters the
/// merge, or the final record stream (record bytes only).
pub(crate) enum MergeDest<'a, W: Write> {
    Temp { w: RunWriter, name: String },
    Final(&'a mut RecordWriter<W>),
}

impl<W: Write> MergeDest<'_, W> {
    fn write_node(&mut self, node: &[u8]) -> Result<(), SortError> {
        match self {
            MergeDest::Temp { w, name } => w.write_node(node).map_err(|e| SortError::TempWrite {
                name: name.clone(),
                source: e,
            }),
            MergeDest::Final(out) => out.write_node(node).map_err(SortError::Output),
        }
    }

    pub(crate) fn finish(self) -> Result<(), SortError> {
        match self {
            MergeDest::Temp { w, name } => w.finish().map_err(|e| SortError::TempWrite {
                name,
                source: e,
            }),
            MergeDest::Final(_) => Ok(()),
        }
    }
}

#[inline]
fn node_at(scratch: &[u8], slot: u16, node_size: usize) -> &[u8] {
    &scratch[slot as usize * MAX_NODE_SIZE..][..node_size]
}

#[inline]
fn slot_mut(scratch: &mut [u8], slot: usize, node_size: usize) -> &mut [u8] {
    &mut scratch[slot * MAX_NODE_SIZE..][..node_size]
}

/// Drain `sources` into `dest` in key order.
///
/// Seeds one node per source (sources that are empty up front are
/// dropped silently), then pops the minimum and refills from its source
/// until a single source remains, which is copied through directly.
pub(crate) fn run_merge_pass<S: NodeSource, W: Write>(
    sources: &mut [S],
    scratch: &mut [u8],
    cmp: &NodeComparator<'_>,
    node_size: usize,
    dest: &mut MergeDest<'_, W>,
) -> Result<(), SortError> {
    let mut heap = MergeHeap::with_capacity(sources.len());

    for (i, src) in sources.iter_mut().enumerate() {
        if src.refill(slot_mut(scratch, i, node_size))? {
            heap.push(i as u16, |x, y| {
                cmp.compare(node_at(scratch, x, node_size), node_at(scratch, y, node_size))
            });
            cmp.check()?;
        } else {
            trace!("dropping empty source #{i}");
        }
    }

    trace!("merging {} sources", heap.len());

    while heap.len() > 1 {
        let lowest = heap.peek().expect("non-empty heap");
        dest.write_node(node_at(scratch, lowest, node_size))?;

        if sources[lowest as usize].refill(slot_mut(scratch, lowest as usize, node_size))? {
            heap.replace_top(|x, y| {
                cmp.compare(node_at(scratch, x, node_size), node_at(scratch, y, node_size))
            });
        } else {
            trace!("source #{lowest} drained");
            heap.pop(|x, y| {
                cmp.compare(node_at(scratch, x, node_size), node_at(scratch, y, node_size))
            });
        }
        cmp.check()?;
    }

    // Last source standing: copy it through without heap traffic.
    if let Some(last) = heap.pop(|x, y| {
        cmp.compare(node_at(scratch, x, node_size), node_at(scratch, y, node_size))
    }) {
        loop {
            dest.write_node(node_at(scratch, last, node_size))?;
            if !sources[last as usize].refill(slot_mut(scratch, last as usize, node_size))? {
                break;
            }
        }
        trace!("source #{last} drained");
    }

    Ok(())
}

/// Merge temp runs `0..=last` into `out`, cascading through intermediate
/// runs whenever a pass cannot open its whole remaining range.
pub(crate) fn merge_temp_runs<W: Write>(
    plan: &SortPlan,
    tmp: &mut TempFileSet,
    mut last: u64,
    fanout: usize,
    out: &mut RecordWriter<W>,
) -> Result<(), SortError> {
    let node_size = plan.node_size();
    let cmp = NodeComparator::new(plan);
    let mut scratch = vec![0u8; fanout * MAX_NODE_SIZE];
    let mut first = 0u64;

    loop {
        // Widest range this pass could cover.
        let mut upper = if last - first < fanout as u64 - 1 {
            last
        } else {
            first + fanout as u64 - 1
        };

        // The intermediate run is created up front; it is discarded if
        // this pass turns out to cover the whole remaining range.
        let (inter_w, inter_idx) = tmp.create().map_err(SortError::TempCreate)?;

        let mut sources: Vec<TempRunSource> = Vec::with_capacity((upper - first + 1) as usize);
        let mut idx = first;
        while idx <= upper {
            match tmp.open(idx) {
                Ok(reader) => sources.push(TempRunSource {
                    reader,
                    name: tmp.name(idx),
                }),
                Err(e) if !sources.is_empty() && is_resource_error(&e) => {
                    // Out of descriptors or memory; the rest of the range
                    // is picked up by a later pass.
                    upper = idx - 1;
                    debug!(
                        "resource limit hit: merging #{first} through #{upper} into #{inter_idx}"
                    );
                    break;
                }
                Err(e) => {
                    return Err(SortError::TempOpen {
                        name: tmp.name(idx),
                        source: e,
                    })
                }
            }
            idx += 1;
        }

        let covers_rest = upper == last;
        let mut dest = if covers_rest {
            drop(inter_w);
            tmp.remove(inter_idx).map_err(|e| SortError::TempRemove {
                name: tmp.name(inter_idx),
                source: e,
            })?;
            MergeDest::Final(&mut *out)
        } else {
            last = inter_idx;
            MergeDest::Temp {
                w: inter_w,
                name: tmp.name(inter_idx),
            }
        };

        debug!(
            "merging runs #{first}..=#{upper} into {}",
            if covers_rest { "output".to_string() } else { format!("run #{inter_idx}") }
        );

        run_merge_pass(&mut sources, &mut scratch, &cmp, node_size, &mut dest)?;
        dest.finish()?;
        drop(sources);

        // Every scheduled run is consumed, even ones whose open failed.
        for idx in first..=upper {
            tmp.remove(idx).map_err(|e| SortError::TempRemove {
                name: tmp.name(idx),
                source: e,
            })?;
        }

        if covers_rest {
            return Ok(());
        }
        first = upper + 1;
    }
}
