use core::fmt;
use std::{
    collections::{HashMap, HashSet},
    sync::{Condvar, Mutex, MutexGuard},
};

use itertools::Itertools;
use log::{debug, warn};

use super::{wait_for_graph::WaitForGraph, Transaction, TransactionID};
use crate::{btree::page::BTreePageID, error::SmallError, types::SmallResult, utils::HandyMutex};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Lock {
    XLock,
    SLock,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

impl Permission {
    pub fn to_lock(&self) -> Lock {
        match self {
            Permission::ReadOnly => Lock::SLock,
            Permission::ReadWrite => Lock::XLock,
        }
    }
}

/// The lock a transaction holds on a page. Only escalates
/// (Free -> Read -> Write) until the transaction completes.
#[derive(Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
pub enum LockState {
    Free,
    Read,
    Write,
}

struct LockTable {
    s_latch_map: HashMap<BTreePageID, HashSet<TransactionID>>,
    x_latch_map: HashMap<BTreePageID, TransactionID>,

    hold_pages: HashMap<TransactionID, HashSet<BTreePageID>>,

    wait_for_graph: WaitForGraph,
}

/// Page level shared/exclusive locks under strict two phase locking.
///
/// All the bookkeeping lives in one table guarded by a single mutex,
/// blocked requests sleep on `lock_released` and retry whenever a
/// transaction gives up a lock.
pub struct ConcurrentStatus {
    table: Mutex<LockTable>,
    lock_released: Condvar,
}

impl ConcurrentStatus {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(LockTable {
                s_latch_map: HashMap::new(),
                x_latch_map: HashMap::new(),
                hold_pages: HashMap::new(),
                wait_for_graph: WaitForGraph::new(),
            }),
            lock_released: Condvar::new(),
        }
    }

    /// Request a lock on the given page. This api is blocking.
    ///
    /// If the request has to wait and the wait would close a cycle
    /// in the wait-for graph, it fails with a `LockAbort` error
    /// instead of blocking.
    pub fn request_lock(&self, tx: &Transaction, lock: &Lock, page_id: &BTreePageID) -> SmallResult {
        let tid = tx.get_id();
        let mut table = self.table.ml();

        if table.add_latch(tid, lock, page_id) {
            return Ok(());
        }

        table.wait_for_graph.add_waiter(tid, page_id, *lock);
        if let Some(cycle) = table.find_cycle(tid) {
            table.wait_for_graph.remove_waiter(tid);

            let err = SmallError::lock_abort(&format!(
                "deadlock detected, {} requests {:?} on {}, cycle: {}",
                tx,
                lock,
                page_id,
                cycle.iter().map(|tid| format!("tx_{}", tid)).join(" -> "),
            ));
            warn!("{}", err);
            debug!("concurrent status: {}", table);
            return Err(err);
        }

        debug!("{} waits for {:?} on {}", tx, lock, page_id);
        loop {
            table = self.wait(table)?;

            if table.add_latch(tid, lock, page_id) {
                // at this point, "tx" doesn't wait on any other transactions since
                // "Transaction" can only be used by single thread.
                table.wait_for_graph.remove_waiter(tid);
                debug!("{} granted {:?} on {} after waiting", tx, lock, page_id);
                return Ok(());
            }
        }
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, LockTable>) -> Result<MutexGuard<'a, LockTable>, SmallError> {
        self.lock_released
            .wait(guard)
            .map_err(|_| SmallError::inconsistency("lock table poisoned"))
    }

    pub fn lock_state(&self, tx: &Transaction, page_id: &BTreePageID) -> LockState {
        self.table.ml().lock_state(tx.get_id(), page_id)
    }

    pub fn holds_lock(&self, tx: &Transaction, page_id: &BTreePageID) -> bool {
        self.lock_state(tx, page_id) != LockState::Free
    }

    /// Pages on which `tx` holds the exclusive lock.
    pub fn get_write_pages(&self, tx: &Transaction) -> Vec<BTreePageID> {
        let table = self.table.ml();
        let tid = tx.get_id();
        match table.hold_pages.get(&tid) {
            Some(pages) => pages
                .iter()
                .filter(|pid| table.x_latch_map.get(pid) == Some(&tid))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Give up the lock on one page before the transaction ends.
    ///
    /// Breaks two phase locking, only meant for pages the transaction
    /// has not modified.
    pub fn release_page(&self, tx: &Transaction, page_id: &BTreePageID) {
        let mut table = self.table.ml();
        let tid = tx.get_id();
        table.release_latch(tid, page_id);
        if let Some(pages) = table.hold_pages.get_mut(&tid) {
            pages.remove(page_id);
        }
        self.lock_released.notify_all();
    }

    /// Release every lock of the transaction and forget it in the
    /// wait-for graph.
    pub fn release_all(&self, tx: &Transaction) {
        let mut table = self.table.ml();
        let tid = tx.get_id();

        if let Some(pages) = table.hold_pages.remove(&tid) {
            for page_id in pages {
                table.release_latch(tid, &page_id);
            }
        }
        table.wait_for_graph.remove_waiter(tid);

        self.lock_released.notify_all();
    }

    /// Number of transactions blocked in `request_lock`.
    pub fn waiters_count(&self) -> usize {
        self.table.ml().wait_for_graph.waiters_count()
    }
}

impl Default for ConcurrentStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl LockTable {
    // Try to grant a lock, idempotent.
    //
    // Returns whether the lock is held by `tid` afterwards.
    fn add_latch(&mut self, tid: TransactionID, lock: &Lock, page_id: &BTreePageID) -> bool {
        // If the page hold by another transaction with X-Latch, fail
        if let Some(holder) = self.x_latch_map.get(page_id) {
            return *holder == tid;
        }

        match lock {
            Lock::SLock => {
                self.s_latch_map
                    .entry(*page_id)
                    .or_insert_with(HashSet::new)
                    .insert(tid);
            }
            Lock::XLock => {
                // If the page hold by another transaction with S-Latch, fail
                if let Some(readers) = self.s_latch_map.get(page_id) {
                    if readers.iter().any(|reader| *reader != tid) {
                        return false;
                    }
                }

                // upgrade (if any)
                self.s_latch_map.remove(page_id);
                self.x_latch_map.insert(*page_id, tid);
            }
        }

        self.hold_pages
            .entry(tid)
            .or_insert_with(HashSet::new)
            .insert(*page_id);
        true
    }

    fn release_latch(&mut self, tid: TransactionID, page_id: &BTreePageID) {
        if let Some(readers) = self.s_latch_map.get_mut(page_id) {
            readers.remove(&tid);
            if readers.is_empty() {
                self.s_latch_map.remove(page_id);
            }
        }

        if self.x_latch_map.get(page_id) == Some(&tid) {
            self.x_latch_map.remove(page_id);
        }
    }

    fn lock_state(&self, tid: TransactionID, page_id: &BTreePageID) -> LockState {
        if self.x_latch_map.get(page_id) == Some(&tid) {
            return LockState::Write;
        }
        match self.s_latch_map.get(page_id) {
            Some(readers) if readers.contains(&tid) => LockState::Read,
            _ => LockState::Free,
        }
    }

    /// Holders of `page_id` conflicting with a `lock` request of
    /// `waiter`. A read request only conflicts with the writer.
    fn conflicting_holders(&self, page_id: &BTreePageID, lock: &Lock, waiter: TransactionID) -> Vec<TransactionID> {
        let mut holders = Vec::new();
        if let Some(writer) = self.x_latch_map.get(page_id) {
            if *writer != waiter {
                holders.push(*writer);
            }
        }

        if *lock == Lock::XLock {
            if let Some(readers) = self.s_latch_map.get(page_id) {
                holders.extend(readers.iter().filter(|reader| **reader != waiter));
            }
        }
        holders
    }

    fn find_cycle(&self, tid: TransactionID) -> Option<Vec<TransactionID>> {
        self.wait_for_graph
            .find_cycle(tid, |pid: &BTreePageID, lock: &Lock, waiter: TransactionID| {
                self.conflicting_holders(pid, lock, waiter)
            })
    }
}

impl fmt::Display for LockTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut depiction = "\n".to_string();

        depiction.push_str("s_latch_map: {");
        for (k, v) in self.s_latch_map.iter() {
            depiction.push_str(&format!(
                "\n\t{} -> [{}]",
                k.get_short_repr(),
                v.iter().sorted().map(|tid| format!("tx_{}", tid)).join(", ")
            ));
        }
        depiction.push_str("\n}\n");

        depiction.push_str("x_latch_map: {");
        for (k, v) in self.x_latch_map.iter() {
            depiction.push_str(&format!("\n\t{} -> tx_{}", k.get_short_repr(), v));
        }
        depiction.push_str("\n}\n");

        depiction.push_str("hold_pages: {");
        for (k, v) in self.hold_pages.iter() {
            depiction.push_str(&format!(
                "\n\ttx_{} -> [{}]",
                k,
                v.iter().map(|pid| pid.get_short_repr()).sorted().join(", ")
            ));
        }
        depiction.push_str("\n}\n");

        write!(f, "{}", depiction)
    }
}

impl fmt::Display for ConcurrentStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.table.ml())
    }
}

impl fmt::Debug for ConcurrentStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use super::*;
    use crate::{btree::page::PageCategory, error::ErrorKind};

    fn page(index: u32) -> BTreePageID {
        BTreePageID::new(PageCategory::Leaf, 1, index)
    }

    #[test]
    fn test_shared_and_upgrade() {
        let status = ConcurrentStatus::new();
        let t1 = Transaction::new();
        let t2 = Transaction::new();

        status.request_lock(&t1, &Lock::SLock, &page(1)).unwrap();
        status.request_lock(&t2, &Lock::SLock, &page(1)).unwrap();
        assert_eq!(status.lock_state(&t1, &page(1)), LockState::Read);
        assert_eq!(status.lock_state(&t2, &page(1)), LockState::Read);

        status.release_all(&t2);
        assert_eq!(status.lock_state(&t2, &page(1)), LockState::Free);

        // the only reader may upgrade
        status.request_lock(&t1, &Lock::XLock, &page(1)).unwrap();
        assert_eq!(status.lock_state(&t1, &page(1)), LockState::Write);

        // a writer asking for a read lock keeps the write lock
        status.request_lock(&t1, &Lock::SLock, &page(1)).unwrap();
        assert_eq!(status.lock_state(&t1, &page(1)), LockState::Write);
        assert_eq!(status.get_write_pages(&t1), vec![page(1)]);

        status.release_all(&t1);
        assert!(!status.holds_lock(&t1, &page(1)));
    }

    #[test]
    fn test_blocked_until_release() {
        let status = Arc::new(ConcurrentStatus::new());
        let t1 = Transaction::new();
        let t2 = Transaction::new();

        status.request_lock(&t1, &Lock::XLock, &page(1)).unwrap();

        let handle = {
            let status = Arc::clone(&status);
            thread::spawn(move || {
                status.request_lock(&t2, &Lock::SLock, &page(1)).unwrap();
                status.lock_state(&t2, &page(1))
            })
        };

        while status.waiters_count() == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(status.lock_state(&t2, &page(1)), LockState::Free);

        status.release_all(&t1);
        assert_eq!(handle.join().unwrap(), LockState::Read);
    }

    #[test]
    fn test_deadlock_detected() {
        let status = Arc::new(ConcurrentStatus::new());
        let t1 = Transaction::new();
        let t2 = Transaction::new();

        status.request_lock(&t1, &Lock::XLock, &page(1)).unwrap();
        status.request_lock(&t2, &Lock::XLock, &page(2)).unwrap();

        let handle = {
            let status = Arc::clone(&status);
            thread::spawn(move || status.request_lock(&t1, &Lock::XLock, &page(2)))
        };

        while status.waiters_count() == 0 {
            thread::sleep(Duration::from_millis(1));
        }

        // t2 would close the cycle, it is refused without blocking
        let err = status
            .request_lock(&t2, &Lock::XLock, &page(1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LockAbort);

        // once t2 gives up, t1 goes through
        status.release_all(&t2);
        assert!(handle.join().unwrap().is_ok());
        assert_eq!(status.lock_state(&t1, &page(2)), LockState::Write);
    }

    #[test]
    fn test_upgrade_deadlock() {
        let status = Arc::new(ConcurrentStatus::new());
        let t1 = Transaction::new();
        let t2 = Transaction::new();

        status.request_lock(&t1, &Lock::SLock, &page(1)).unwrap();
        status.request_lock(&t2, &Lock::SLock, &page(1)).unwrap();

        let handle = {
            let status = Arc::clone(&status);
            thread::spawn(move || status.request_lock(&t1, &Lock::XLock, &page(1)))
        };

        while status.waiters_count() == 0 {
            thread::sleep(Duration::from_millis(1));
        }

        let err = status
            .request_lock(&t2, &Lock::XLock, &page(1))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LockAbort);
        assert!(err.is_retryable());

        status.release_all(&t2);
        assert!(handle.join().unwrap().is_ok());
    }
}
