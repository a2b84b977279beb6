//! Thread-local recycling of graph-walk scratch buffers.
//!
//! A full restore runs one resolver per target graph, potentially on many
//! threads, and each resolver pass performs several breadth-first and
//! topological walks. The walks rent their queue and bookkeeping buffers
//! from a per-thread pool instead of reallocating on every pass.
//!
//! Ownership contract: rent, use, clear, return. The pool slot is left
//! empty while rented, so a nested rent gets a fresh allocation instead of
//! aliasing the outer one, and returning never overwrites an occupied slot.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};

/// Reusable scratch space for graph walks.
///
/// Buffers hold raw arena indices, keeping this crate independent of the
/// graph crate's id types.
#[derive(Debug, Default)]
pub struct Scratch {
    pub queue: VecDeque<u32>,
    pub seen: HashSet<u32>,
    pub counts: HashMap<u32, i64>,
}

impl Scratch {
    /// Empty all buffers, keeping their capacity.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.seen.clear();
        self.counts.clear();
    }
}

thread_local! {
    static POOL: RefCell<Option<Box<Scratch>>> = const { RefCell::new(None) };
}

/// Rent the thread's scratch buffers, run `f`, then clear and return them.
pub fn with_scratch<R>(f: impl FnOnce(&mut Scratch) -> R) -> R {
    let mut scratch = POOL
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_default();
    let result = f(&mut scratch);
    scratch.clear();
    POOL.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_none() {
            *slot = Some(scratch);
        }
    });
    result
}
