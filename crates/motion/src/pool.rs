//! The block pool: a fixed-size, circularly-linked ring of planning blocks
//! with three logical cursors (§4.1).
//!
//! The three-cursor design is what lets the planner and the executor share
//! the ring without synchronization: the planner only ever writes behind
//! `queue` (slots in `Queued` state, not yet `Running`), and the executor
//! only ever mutates the slot at `run`. `N` is a const generic so the ring
//! lives inline with no heap allocation, matching the "no dynamic memory
//! allocation" non-goal.

use crate::block::{Block, BlockState, MoveState, MoveType};

/// A fixed-size ring of `N` planning blocks.
pub struct BlockPool<const N: usize> {
    blocks: [Block; N],
    /// Next `Empty` slot to hand out via `acquire_write`.
    write: usize,
    /// Next `Loading` slot to commit via `commit_write`.
    queue: usize,
    /// Current or next `Running` slot.
    run: usize,
    available: usize,
}

impl<const N: usize> Default for BlockPool<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> BlockPool<N> {
    pub fn new() -> Self {
        assert!(N >= 2, "block pool needs at least 2 slots to form a ring");
        let mut blocks = [Block::default(); N];
        for i in 0..N {
            blocks[i].prev = (i + N - 1) % N;
            blocks[i].next = (i + 1) % N;
        }
        Self {
            blocks,
            write: 0,
            queue: 0,
            run: 0,
            available: N,
        }
    }

    pub fn capacity(&self) -> usize {
        N
    }

    /// Count of `Empty` slots. Exposed upward as
    /// `get_planner_buffers_available` (§6).
    pub fn available(&self) -> usize {
        self.available
    }

    pub fn block(&self, idx: usize) -> &Block {
        &self.blocks[idx]
    }

    pub fn block_mut(&mut self, idx: usize) -> &mut Block {
        &mut self.blocks[idx]
    }

    pub fn run_index(&self) -> usize {
        self.run
    }

    /// Hands out the next `Empty` slot, or `None` if the ring is full
    /// (backpressure signal to the caller — §5 "Backpressure").
    pub fn acquire_write(&mut self, lineindex: u32) -> Option<usize> {
        let idx = self.write;
        if self.blocks[idx].state != BlockState::Empty {
            return None;
        }
        self.blocks[idx].reset_preserving_links();
        self.blocks[idx].lineindex = lineindex;
        self.blocks[idx].state = BlockState::Loading;
        self.write = self.blocks[idx].next;
        self.available -= 1;
        Some(idx)
    }

    /// Commits the slot at `queue` as ready to run.
    pub fn commit_write(&mut self, move_type: MoveType) {
        let idx = self.queue;
        self.blocks[idx].move_type = move_type;
        self.blocks[idx].move_state = MoveState::New;
        self.blocks[idx].state = BlockState::Queued;
        self.queue = self.blocks[idx].next;
    }

    /// Promotes the slot at `run` to `Running`, idempotently. Returns
    /// `None` if there is nothing runnable yet.
    pub fn acquire_run(&mut self) -> Option<usize> {
        let idx = self.run;
        match self.blocks[idx].state {
            BlockState::Queued | BlockState::Pending => {
                self.blocks[idx].state = BlockState::Running;
                Some(idx)
            }
            BlockState::Running => Some(idx),
            _ => None,
        }
    }

    /// Frees the `Running` slot at `run`, advances the run cursor, and
    /// promotes the new head from `Queued` to `Pending` if one is waiting.
    /// Returns `true` if the queue is now empty (the caller should end the
    /// motion cycle).
    pub fn free_run(&mut self) -> bool {
        let idx = self.run;
        self.blocks[idx].reset_preserving_links();
        self.run = self.blocks[idx].next;
        self.available += 1;

        if self.blocks[self.run].state == BlockState::Queued {
            self.blocks[self.run].state = BlockState::Pending;
            false
        } else {
            self.blocks[self.run].state != BlockState::Running
        }
    }

    /// Discards a queued-but-not-yet-running block, returning its slot to
    /// `Empty` immediately rather than waiting for the run cursor to reach
    /// it. Used by the feedhold controller to drop everything after the
    /// block it's decelerating within (§4.5 "a hold pre-empts whatever was
    /// coming next").
    pub fn discard(&mut self, idx: usize) {
        if self.blocks[idx].state == BlockState::Empty {
            return;
        }
        self.blocks[idx].reset_preserving_links();
        self.available += 1;
    }

    /// First block in run order, or `None` if the queue is empty.
    pub fn first(&self) -> Option<usize> {
        if self.blocks[self.run].move_state == MoveState::Off {
            None
        } else {
            Some(self.run)
        }
    }

    /// Last queued/pending/running block, walking forward from `run`. O(N);
    /// used only during replans (§4.1).
    pub fn last(&self) -> Option<usize> {
        let mut idx = self.run;
        if self.blocks[idx].move_state == MoveState::Off {
            return None;
        }
        loop {
            let next = self.blocks[idx].next;
            if next == self.run || self.blocks[next].move_state == MoveState::Off {
                return Some(idx);
            }
            idx = next;
        }
    }

    /// Iterates block indices from `run` forward, stopping before wrapping
    /// or hitting an unused slot. Used by the planner's backward/forward
    /// passes and the feedhold replan.
    pub fn iter_queue(&self) -> QueueIter<'_, N> {
        QueueIter {
            pool: self,
            next: self.first(),
            started: false,
        }
    }
}

pub struct QueueIter<'a, const N: usize> {
    pool: &'a BlockPool<N>,
    next: Option<usize>,
    started: bool,
}

impl<'a, const N: usize> Iterator for QueueIter<'a, N> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let cur = self.next?;
        if self.started && cur == self.pool.run {
            self.next = None;
            return None;
        }
        self.started = true;
        let nxt = self.pool.blocks[cur].next;
        if nxt == self.pool.run || self.pool.blocks[nxt].move_state == MoveState::Off {
            self.next = None;
        } else {
            self.next = Some(nxt);
        }
        Some(cur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Payload;

    #[test]
    fn acquire_write_then_commit_makes_block_runnable() {
        let mut pool: BlockPool<4> = BlockPool::new();
        assert_eq!(pool.available(), 4);

        let idx = pool.acquire_write(1).expect("slot available");
        assert_eq!(pool.available(), 3);
        pool.block_mut(idx).payload = Payload::Dwell { seconds: 1.0 };
        pool.commit_write(MoveType::Dwell);

        let run_idx = pool.acquire_run().expect("runnable");
        assert_eq!(run_idx, idx);
        assert_eq!(pool.block(run_idx).state, BlockState::Running);
    }

    #[test]
    fn acquire_run_is_idempotent() {
        let mut pool: BlockPool<4> = BlockPool::new();
        let idx = pool.acquire_write(1).unwrap();
        pool.commit_write(MoveType::Dwell);
        let first = pool.acquire_run().unwrap();
        let second = pool.acquire_run().unwrap();
        assert_eq!(first, second);
        assert_eq!(idx, first);
    }

    #[test]
    fn full_cycle_returns_available_to_initial_value() {
        let mut pool: BlockPool<4> = BlockPool::new();
        let initial = pool.available();
        for line in 0..4u32 {
            let idx = pool.acquire_write(line).unwrap();
            pool.block_mut(idx).payload = Payload::Dwell { seconds: 0.0 };
            pool.commit_write(MoveType::Dwell);
        }
        assert_eq!(pool.acquire_write(99), None);

        for _ in 0..4 {
            pool.acquire_run().unwrap();
            pool.free_run();
        }
        assert_eq!(pool.available(), initial);
    }

    #[test]
    fn write_buffer_full_returns_none_not_panic() {
        let mut pool: BlockPool<2> = BlockPool::new();
        assert!(pool.acquire_write(1).is_some());
        assert!(pool.acquire_write(2).is_some());
        assert_eq!(pool.acquire_write(3), None);
    }
}
