/// The in-memory run buffer: a contiguous region of fixed-width nodes
/// sized by the sort-buffer budget.
///
/// The buffer starts at a fraction of the budget and grows in chunks so
/// that an over-committed allocation fails here, at reserve time, where
/// we can react: a failed growth pins the current capacity as the new
/// ceiling instead of aborting.
use log::{debug, trace};

use super::compare::NodeComparator;
use super::core::{SortError, MIN_IN_CORE_RECORDS, SORT_NUM_CHUNKS};

pub struct RunBuffer {
    buf: Vec<u8>,
    node_size: usize,
    /// Nodes currently stored.
    count: usize,
    /// Nodes the buffer can hold without growing.
    cap_nodes: usize,
    /// Ceiling in nodes; budget-derived, lowered if a growth fails.
    max_nodes: usize,
    /// Growth step in nodes.
    chunk_nodes: usize,
    /// Sort order of the stored nodes, valid after sort().
    indices: Vec<u32>,
}

impl RunBuffer {
    /// Allocate the initial chunk. If the allocation fails, halve the
    /// chunk (by doubling the divisor) and retry; give up once the chunk
    /// would drop below MIN_IN_CORE_RECORDS nodes.
    pub fn new(budget_bytes: u64, node_size: usize) -> Result<RunBuffer, SortError> {
        let max_nodes = (budget_bytes / node_size as u64) as usize;
        if max_nodes == 0 {
            return Err(SortError::Config(format!(
                "sort buffer of {budget_bytes} bytes is smaller than one {node_size}-byte node"
            )));
        }

        let mut divisor = SORT_NUM_CHUNKS;
        loop {
            let chunk_nodes = (max_nodes / divisor).max(1);
            let mut buf = Vec::new();
            if buf.try_reserve_exact(chunk_nodes * node_size).is_ok() {
                buf.resize(chunk_nodes * node_size, 0);
                debug!(
                    "run buffer: {} of {} nodes ({} bytes each)",
                    chunk_nodes, max_nodes, node_size
                );
                return Ok(RunBuffer {
                    buf,
                    node_size,
                    count: 0,
                    cap_nodes: chunk_nodes,
                    max_nodes,
                    chunk_nodes,
                    indices: Vec::new(),
                });
            }
            if chunk_nodes < MIN_IN_CORE_RECORDS {
                return Err(SortError::Memory(MIN_IN_CORE_RECORDS));
            }
            trace!("initial allocation of {chunk_nodes} nodes failed; retrying smaller");
            divisor *= 2;
        }
    }

    /// The slot for the next node. Valid until commit().
    #[inline]
    pub fn slot(&mut self) -> &mut [u8] {
        let off = self.count * self.node_size;
        &mut self.buf[off..off + self.node_size]
    }

    /// Account for a node written into slot(). Grows the buffer by one
    /// chunk when the current capacity fills, unless the ceiling has been
    /// reached; a failed growth pins the ceiling at the current count.
    pub fn commit(&mut self) {
        self.count += 1;
        if self.count == self.cap_nodes && self.cap_nodes < self.max_nodes {
            self.grow();
        }
    }

    fn grow(&mut self) {
        let mut new_cap = self.cap_nodes + self.chunk_nodes;
        if new_cap + self.chunk_nodes > self.max_nodes {
            new_cap = self.max_nodes;
        }
        let additional = (new_cap - self.cap_nodes) * self.node_size;
        if self.buf.try_reserve_exact(additional).is_ok() {
            self.buf.resize(new_cap * self.node_size, 0);
            trace!("run buffer grown to {} nodes", new_cap);
            self.cap_nodes = new_cap;
        } else {
            debug!(
                "run buffer growth failed; capacity pinned at {} nodes",
                self.cap_nodes
            );
            self.max_nodes = self.cap_nodes;
        }
    }

    /// True once the buffer holds as many nodes as it will ever hold;
    /// the caller must sort and emit the run.
    #[inline]
    pub fn full(&self) -> bool {
        self.count == self.max_nodes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Ceiling in nodes; shrinks if a growth ever failed.
    #[inline]
    pub fn max_nodes(&self) -> usize {
        self.max_nodes
    }

    #[inline]
    pub fn node(&self, i: u32) -> &[u8] {
        let off = i as usize * self.node_size;
        &self.buf[off..off + self.node_size]
    }

    /// Sort the stored nodes. An index sort: the nodes stay put and
    /// indices() yields them in key order.
    pub fn sort(&mut self, cmp: &NodeComparator<'_>) -> Result<(), SortError> {
        let RunBuffer {
            ref buf,
            node_size,
            count,
            ref mut indices,
            ..
        } = *self;
        indices.clear();
        indices.extend(0..count as u32);
        indices.sort_unstable_by(|&x, &y| {
            let a = &buf[x as usize * node_size..(x as usize + 1) * node_size];
            let b = &buf[y as usize * node_size..(y as usize + 1) * node_size];
            cmp.compare(a, b)
        });
        cmp.check()
    }

    /// Node indices in sorted order; valid after the last sort().
    #[inline]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Forget the stored nodes, keeping the allocation for the next run.
    pub fn clear(&mut self) {
        self.count = 0;
        self.indices.clear();
    }
}
