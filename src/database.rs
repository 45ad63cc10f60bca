use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, RwLock},
};

use log::{debug, info};

use crate::{
    btree::{page_cache::PageCache, table::BTreeTable},
    config::DatabaseConfig,
    error::{ErrorKind, SmallError},
    storage::{schema::Schema, table_file::TableFile, tuple::Tuple, tuple::WrappedTuple},
    transaction::{Transaction, TransactionID, TransactionStatus},
    tx_log::LogManager,
    types::SmallResult,
    utils::{HandyMutex, HandyRwLock},
};

/// The entry point of the storage engine: owns the tables of one data
/// directory, the page cache they share and the transaction log.
///
/// Independent `Database` instances share nothing.
pub struct Database {
    path: PathBuf,

    config: DatabaseConfig,

    tables: RwLock<HashMap<u32, Arc<BTreeTable>>>,

    page_cache: Arc<PageCache>,

    log_manager: Mutex<LogManager>,

    transaction_status: Mutex<HashMap<TransactionID, TransactionStatus>>,
}

impl Database {
    pub fn new<P: AsRef<Path>>(dir: P, config: DatabaseConfig) -> Result<Arc<Self>, SmallError> {
        let path = dir.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        let log_manager = LogManager::new(path.join(&config.log_file))?;
        let page_cache = Arc::new(PageCache::new(config.cache_capacity));

        info!(
            "database opened at {:?}, page size: {}, cache capacity: {}",
            path, config.page_size, config.cache_capacity
        );

        Ok(Arc::new(Self {
            path,
            config,
            tables: RwLock::new(HashMap::new()),
            page_cache,
            log_manager: Mutex::new(log_manager),
            transaction_status: Mutex::new(HashMap::new()),
        }))
    }

    pub fn get_path(&self) -> &Path {
        &self.path
    }

    pub fn get_config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn page_cache(&self) -> &Arc<PageCache> {
        &self.page_cache
    }

    pub fn log_manager(&self) -> MutexGuard<'_, LogManager> {
        self.log_manager.ml()
    }

    /// Open (or create) the table `name` backed by `<dir>/<name>.table`
    /// and register it in the page cache.
    pub fn create_table(
        &self,
        name: &str,
        schema: &Schema,
        key_field: usize,
    ) -> Result<Arc<BTreeTable>, SmallError> {
        let file_path = self.path.join(format!("{}.table", name));
        let file = Arc::new(TableFile::open(
            &file_path,
            schema,
            key_field,
            self.config.page_size,
        )?);
        self.page_cache.add_table(Arc::clone(&file));

        let table = Arc::new(BTreeTable::new(name, file, Arc::clone(&self.page_cache)));
        self.tables.wl().insert(table.get_id(), Arc::clone(&table));

        debug!("table created: {}", table);
        Ok(table)
    }

    pub fn get_table(&self, table_id: u32) -> Result<Arc<BTreeTable>, SmallError> {
        self.tables.rl().get(&table_id).cloned().ok_or_else(|| {
            SmallError::invalid_argument(&format!("table {} doesn't exist", table_id))
        })
    }

    pub fn tables_count(&self) -> usize {
        self.tables.rl().len()
    }
}

// transaction boundaries
impl Database {
    pub fn begin_transaction(&self) -> Result<Transaction, SmallError> {
        let tx = Transaction::new();
        self.log_manager.ml().log_start(&tx)?;
        self.transaction_status
            .ml()
            .insert(tx.get_id(), TransactionStatus::Active);

        debug!("{} started", tx);
        Ok(tx)
    }

    /// Commit the transaction:
    ///
    /// 1. write the pages it holds under a write lock back to disk
    /// 2. write the "COMMIT" log record
    /// 3. release all of its locks
    pub fn commit(&self, tx: &Transaction) -> SmallResult {
        self.complete(tx, true)
    }

    /// Abort the transaction:
    ///
    /// 1. write the "ABORT" log record
    /// 2. discard the pages it holds under a write lock, the disk
    ///    still holds their last committed version
    /// 3. release all of its locks
    pub fn abort(&self, tx: &Transaction) -> SmallResult {
        self.complete(tx, false)
    }

    fn complete(&self, tx: &Transaction, commit: bool) -> SmallResult {
        match self.get_transaction_status(tx) {
            Some(TransactionStatus::Active) => {}
            status => {
                return Err(SmallError::invalid_argument(&format!(
                    "{} can't be completed, status: {:?}",
                    tx, status
                )))
            }
        }

        let result = self
            .page_cache
            .tx_complete(tx, commit, &mut self.log_manager.ml());

        let status = if commit && result.is_ok() {
            TransactionStatus::Committed
        } else {
            TransactionStatus::Aborted
        };
        self.transaction_status.ml().insert(tx.get_id(), status);

        debug!("{} completed, status: {:?}", tx, status);
        result
    }

    pub fn get_transaction_status(&self, tx: &Transaction) -> Option<TransactionStatus> {
        self.transaction_status.ml().get(&tx.get_id()).copied()
    }
}

// mutating calls, the dirtied pages are handed to the page cache
impl Database {
    pub fn insert_tuple(&self, tx: &Transaction, table_id: u32, tuple: &Tuple) -> SmallResult {
        let table = self.get_table(table_id)?;
        let dirty_pages = table.insert_tuple(tx, tuple).map_err(report_defect)?;
        self.page_cache.mark_dirty(tx, &dirty_pages)
    }

    pub fn delete_tuple(
        &self,
        tx: &Transaction,
        table_id: u32,
        tuple: &WrappedTuple,
    ) -> SmallResult {
        let table = self.get_table(table_id)?;
        let dirty_pages = table.delete_tuple(tx, tuple).map_err(report_defect)?;
        self.page_cache.mark_dirty(tx, &dirty_pages)
    }
}

// A broken tree is a bug, keep the call site for the report.
fn report_defect(e: SmallError) -> SmallError {
    if e.kind() == ErrorKind::StructuralInconsistency {
        e.show_backtrace();
    }
    e
}
