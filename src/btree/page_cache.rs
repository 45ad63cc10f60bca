use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};

use log::{debug, warn};

use super::{
    catalog::Catalog,
    page::{
        BTreeHeaderPage, BTreeInternalPage, BTreeLeafPage, BTreePageID, BTreeRootPointerPage,
        PageHandle,
    },
};
use crate::{
    error::SmallError,
    storage::table_file::TableFile,
    transaction::{ConcurrentStatus, LockState, Permission, Transaction, TransactionID},
    tx_log::LogManager,
    types::{ResultPod, SmallResult},
    utils::{HandyMutex, HandyRwLock},
};

/// Pages touched by one mutating operation, keyed by id.
pub type DirtyPages = HashMap<BTreePageID, PageHandle>;

struct CachedPage {
    page: PageHandle,

    /// The transaction holding uncommitted changes on the page, a
    /// page with a dirtier is never evicted.
    dirtier: Option<TransactionID>,

    last_access: u64,
}

struct PageTable {
    pages: HashMap<BTreePageID, CachedPage>,

    // logical clock for the LRU order
    clock: u64,
}

/// A bounded cache of pages, shared by all tables of a database.
///
/// Every page access goes through `get_page`, which acquires the page
/// lock on behalf of the transaction before touching the cache, so
/// the cache is also where strict two phase locking is enforced.
pub struct PageCache {
    capacity: usize,

    table: Mutex<PageTable>,

    catalog: RwLock<Catalog>,

    concurrent_status: ConcurrentStatus,
}

impl PageCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            table: Mutex::new(PageTable {
                pages: HashMap::new(),
                clock: 0,
            }),
            catalog: RwLock::new(Catalog::new()),
            concurrent_status: ConcurrentStatus::new(),
        }
    }

    pub fn add_table(&self, file: Arc<TableFile>) {
        self.catalog.wl().add_table(file);
    }

    pub fn get_table_file(&self, table_id: u32) -> Result<Arc<TableFile>, SmallError> {
        self.catalog.rl().get_table_file(table_id)
    }

    pub fn concurrent_status(&self) -> &ConcurrentStatus {
        &self.concurrent_status
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn resident_count(&self) -> usize {
        self.table.ml().pages.len()
    }

    pub fn is_resident(&self, pid: &BTreePageID) -> bool {
        self.table.ml().pages.contains_key(pid)
    }

    pub fn is_dirty(&self, pid: &BTreePageID) -> bool {
        self.table
            .ml()
            .pages
            .get(pid)
            .map_or(false, |cached| cached.dirtier.is_some())
    }

    /// Retrieve the specified page with the associated permission.
    /// Will acquire a lock and may block if that lock is held by
    /// another transaction.
    ///
    /// On a miss the page is read from its table file, evicting the
    /// least recently used clean page if the cache is full.
    ///
    /// A page fetched with `ReadWrite` is considered dirty from now
    /// on, until the transaction completes.
    pub fn get_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &BTreePageID,
    ) -> Result<PageHandle, SmallError> {
        // the lock is acquired outside of the page table, a blocked
        // request must not stall the whole cache
        self.concurrent_status
            .request_lock(tx, &perm.to_lock(), pid)?;

        let dirtier = match perm {
            Permission::ReadWrite => Some(tx.get_id()),
            Permission::ReadOnly => None,
        };

        let mut table = self.table.ml();
        table.clock += 1;
        let clock = table.clock;

        if let Some(cached) = table.pages.get_mut(pid) {
            cached.last_access = clock;
            if dirtier.is_some() {
                cached.dirtier = dirtier;
            }
            return Ok(cached.page.clone());
        }

        let page = self.load_page(pid)?;
        self.admit(&mut table, pid, page.clone(), dirtier)?;
        Ok(page)
    }

    /// Hand out a blank page for `pid` with an exclusive lock, used
    /// when a page index is (re)allocated.
    ///
    /// The blank page only lives in the cache, the previous content on
    /// disk stays untouched until the transaction commits. Resident
    /// pages of other categories at the same index are dropped.
    pub fn get_fresh_page(&self, tx: &Transaction, pid: &BTreePageID) -> Result<PageHandle, SmallError> {
        self.concurrent_status
            .request_lock(tx, &Permission::ReadWrite.to_lock(), pid)?;

        let file = self.get_table_file(pid.get_table_id())?;
        let page = PageHandle::load(
            pid,
            &vec![0; file.get_page_size()],
            file.get_schema(),
            file.get_key_field(),
        )?;

        let mut table = self.table.ml();
        table.clock += 1;
        table.pages.retain(|resident, _| {
            resident.get_table_id() != pid.get_table_id() || resident.page_index != pid.page_index
        });
        self.admit(&mut table, pid, page.clone(), Some(tx.get_id()))?;
        Ok(page)
    }

    pub fn get_root_ptr_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &BTreePageID,
    ) -> ResultPod<BTreeRootPointerPage> {
        self.get_page(tx, perm, pid)?.into_root_pointer()
    }

    pub fn get_header_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &BTreePageID,
    ) -> ResultPod<BTreeHeaderPage> {
        self.get_page(tx, perm, pid)?.into_header()
    }

    pub fn get_internal_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &BTreePageID,
    ) -> ResultPod<BTreeInternalPage> {
        self.get_page(tx, perm, pid)?.into_internal()
    }

    pub fn get_leaf_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        pid: &BTreePageID,
    ) -> ResultPod<BTreeLeafPage> {
        self.get_page(tx, perm, pid)?.into_leaf()
    }

    fn load_page(&self, pid: &BTreePageID) -> Result<PageHandle, SmallError> {
        let file = self.get_table_file(pid.get_table_id())?;
        let bytes = file.read_page(pid)?;
        PageHandle::load(pid, &bytes, file.get_schema(), file.get_key_field())
    }

    fn admit(
        &self,
        table: &mut PageTable,
        pid: &BTreePageID,
        page: PageHandle,
        dirtier: Option<TransactionID>,
    ) -> SmallResult {
        if table.pages.len() >= self.capacity {
            self.evict_page(table)?;
        }

        table.pages.insert(
            *pid,
            CachedPage {
                page,
                dirtier,
                last_access: table.clock,
            },
        );
        Ok(())
    }

    // Drop the least recently used clean page. Dirty pages hold
    // uncommitted data and are never written back before commit.
    fn evict_page(&self, table: &mut PageTable) -> SmallResult {
        let victim = table
            .pages
            .iter()
            .filter(|(_, cached)| cached.dirtier.is_none())
            .min_by_key(|(_, cached)| cached.last_access)
            .map(|(pid, _)| *pid);

        match victim {
            Some(pid) => {
                table.pages.remove(&pid);
                debug!("page {} evicted", pid);
                Ok(())
            }
            None => {
                let err = SmallError::exhausted(&format!(
                    "all {} cached pages are dirty, no page to evict",
                    table.pages.len()
                ));
                warn!("{}", err);
                Err(err)
            }
        }
    }

    /// Mark the pages reported by a mutating operation as dirtied by
    /// `tx`, admitting the ones that are not resident (any more).
    pub fn mark_dirty(&self, tx: &Transaction, pages: &DirtyPages) -> SmallResult {
        let mut table = self.table.ml();
        for (pid, page) in pages {
            if let Some(cached) = table.pages.get_mut(pid) {
                cached.dirtier = Some(tx.get_id());
                continue;
            }
            self.admit(&mut table, pid, page.clone(), Some(tx.get_id()))?;
        }
        Ok(())
    }

    /// Remove the specific page id from the cache without writing it
    /// back.
    ///
    /// Used by abort to drop uncommitted changes, and by the B+ tree
    /// to make sure freed pages are never read back from the cache.
    pub fn discard_page(&self, pid: &BTreePageID) {
        self.table.ml().pages.remove(pid);
    }

    /// Write the content of a specific page to disk and mark it
    /// clean. Non resident pages are ignored.
    pub fn flush_page(&self, pid: &BTreePageID) -> SmallResult {
        let mut table = self.table.ml();
        self.write_back(&mut table, pid)
    }

    fn write_back(&self, table: &mut PageTable, pid: &BTreePageID) -> SmallResult {
        if let Some(cached) = table.pages.get_mut(pid) {
            let file = self.get_table_file(pid.get_table_id())?;
            file.write_page(pid, &cached.page.get_page_data()?)?;
            cached.dirtier = None;
            debug!("page {} flushed", pid);
        }
        Ok(())
    }

    /// Write all pages `tx` holds with a write lock to disk.
    pub fn flush_pages(&self, tx: &Transaction) -> SmallResult {
        let write_pages = self.concurrent_status.get_write_pages(tx);
        let mut table = self.table.ml();
        for pid in write_pages {
            self.write_back(&mut table, &pid)?;
        }
        Ok(())
    }

    /// Flush all dirty pages to disk.
    ///
    /// NB: Be careful using this routine, it writes uncommitted data
    /// to disk.
    pub fn flush_all_pages(&self) -> SmallResult {
        let mut table = self.table.ml();
        let dirty_pids: Vec<BTreePageID> = table
            .pages
            .iter()
            .filter(|(_, cached)| cached.dirtier.is_some())
            .map(|(pid, _)| *pid)
            .collect();
        for pid in dirty_pids {
            self.write_back(&mut table, &pid)?;
        }
        Ok(())
    }

    fn discard_pages(&self, tx: &Transaction) {
        let write_pages = self.concurrent_status.get_write_pages(tx);
        let mut table = self.table.ml();
        for pid in write_pages {
            table.pages.remove(&pid);
        }
    }

    /// Finish a transaction.
    ///
    /// - commit: write back the pages under its write locks, then log
    ///   the commit.
    /// - abort: log the abort, then drop the pages under its write
    ///   locks.
    ///
    /// Either way all of its locks are released at the end, even if
    /// writing the pages or the log fails.
    pub fn tx_complete(
        &self,
        tx: &Transaction,
        commit: bool,
        log_manager: &mut LogManager,
    ) -> SmallResult {
        let result = if commit {
            self.flush_pages(tx).and_then(|_| log_manager.log_commit(tx))
        } else {
            let result = log_manager.log_abort(tx);
            self.discard_pages(tx);
            result
        };

        self.concurrent_status.release_all(tx);
        result
    }

    pub fn holds_lock(&self, tx: &Transaction, pid: &BTreePageID) -> bool {
        self.concurrent_status.holds_lock(tx, pid)
    }

    pub fn lock_state(&self, tx: &Transaction, pid: &BTreePageID) -> LockState {
        self.concurrent_status.lock_state(tx, pid)
    }

    /// Release the lock on a page before the transaction completes.
    /// Only safe for pages the transaction didn't modify.
    pub fn release_page(&self, tx: &Transaction, pid: &BTreePageID) {
        self.concurrent_status.release_page(tx, pid)
    }

    pub fn release_all(&self, tx: &Transaction) {
        self.concurrent_status.release_all(tx)
    }
}
