use std::collections::{HashMap, HashSet, VecDeque};

use super::{Lock, TransactionID};
use crate::btree::page::BTreePageID;

/// Records which page (and with which intent) every blocked
/// transaction is waiting on.
///
/// The "waits for" edges are not stored, they are derived from the
/// current lock holders when a cycle is searched, so grants and
/// releases never leave stale edges behind.
pub(crate) struct WaitForGraph {
    waiting: HashMap<TransactionID, (BTreePageID, Lock)>,
}

impl WaitForGraph {
    pub(crate) fn new() -> Self {
        Self {
            waiting: HashMap::new(),
        }
    }

    pub(crate) fn add_waiter(&mut self, tid: TransactionID, pid: &BTreePageID, lock: Lock) {
        self.waiting.insert(tid, (*pid, lock));
    }

    pub(crate) fn remove_waiter(&mut self, tid: TransactionID) {
        self.waiting.remove(&tid);
    }

    #[cfg(test)]
    pub(crate) fn get_waiting(&self, tid: TransactionID) -> Option<&(BTreePageID, Lock)> {
        self.waiting.get(&tid)
    }

    pub(crate) fn waiters_count(&self) -> usize {
        self.waiting.len()
    }

    /// Search (breadth first) for a path of waits that starts at
    /// `start` and leads back to it.
    ///
    /// `holders(pid, lock, waiter)` returns the transactions holding a
    /// lock on `pid` that conflicts with `lock`.
    ///
    /// Returns the transactions on the cycle, `start` first.
    pub(crate) fn find_cycle<F>(&self, start: TransactionID, holders: F) -> Option<Vec<TransactionID>>
    where
        F: Fn(&BTreePageID, &Lock, TransactionID) -> Vec<TransactionID>,
    {
        let mut visited: HashSet<TransactionID> = HashSet::new();
        let mut came_from: HashMap<TransactionID, TransactionID> = HashMap::new();
        let mut queue = VecDeque::new();

        visited.insert(start);
        queue.push_back(start);

        while let Some(current) = queue.pop_front() {
            let (pid, lock) = match self.waiting.get(&current) {
                Some(wait) => wait,
                None => continue,
            };

            for holder in holders(pid, lock, current) {
                if holder == start {
                    let mut cycle = vec![current];
                    let mut cursor = current;
                    while let Some(prev) = came_from.get(&cursor) {
                        cycle.push(*prev);
                        cursor = *prev;
                    }
                    cycle.reverse();
                    return Some(cycle);
                }

                if visited.insert(holder) {
                    came_from.insert(holder, current);
                    queue.push_back(holder);
                }
            }
        }

        None
    }
}
