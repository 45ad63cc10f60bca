#![allow(dead_code)]

use std::sync::Arc;

use small_btree::{
    btree::page::BTreePageID,
    storage::small_int_schema,
    utils::{self, HandyRwLock},
    BTreeTable, Cell, Database, DatabaseConfig, Op, Predicate, SmallError, Transaction,
    Permission, Tuple, WrappedTuple,
};
use tempfile::TempDir;

/// With a single Int64 column, a 48 bytes page holds 4 tuples per
/// leaf and 3 entries per internal page.
pub const SMALL_PAGE_SIZE: usize = 48;

pub const LEAF_CAPACITY: usize = 4;

pub const LARGE_CACHE: usize = 20_000;

/// A database living in its own temporary directory, removed on drop.
pub struct TestDatabase {
    pub db: Arc<Database>,

    // keep the directory alive as long as the database
    _dir: TempDir,
}

/// # Conduct the initialization
///
/// - Setting up log configurations.
/// - Create a database in a fresh temporary directory.
pub fn setup(page_size: usize, cache_capacity: usize) -> TestDatabase {
    utils::init_log();

    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig::default()
        .with_page_size(page_size)
        .with_cache_capacity(cache_capacity);
    let db = Database::new(dir.path(), config).unwrap();
    TestDatabase { db, _dir: dir }
}

/// Small pages and a cache large enough for any test, so splits and
/// merges are reached with a handful of tuples.
pub fn setup_small() -> TestDatabase {
    setup(SMALL_PAGE_SIZE, LARGE_CACHE)
}

/// A table of `columns` Int64 columns keyed on the first one.
pub fn new_int_table(db: &Database, name: &str, columns: usize) -> Arc<BTreeTable> {
    db.create_table(name, &small_int_schema(columns, ""), 0)
        .unwrap()
}

pub fn insert_keys<I>(db: &Database, table: &BTreeTable, tx: &Transaction, keys: I)
where
    I: IntoIterator<Item = i64>,
{
    let columns = table.get_schema().fields_count();
    for key in keys {
        db.insert_tuple(tx, table.get_id(), &Tuple::new_int_tuples(key, columns))
            .unwrap();
    }
}

/// Insert the keys in a transaction of their own and commit it.
pub fn insert_committed<I>(db: &Database, table: &BTreeTable, keys: I)
where
    I: IntoIterator<Item = i64>,
{
    let tx = db.begin_transaction().unwrap();
    insert_keys(db, table, &tx, keys);
    db.commit(&tx).unwrap();
}

/// Delete one tuple holding `key`, panic if there is none.
pub fn delete_key(db: &Database, table: &BTreeTable, tx: &Transaction, key: i64) {
    let tuple = find_key(table, tx, key).unwrap_or_else(|| panic!("key {} not found", key));
    db.delete_tuple(tx, table.get_id(), &tuple).unwrap();
}

pub fn find_key(table: &BTreeTable, tx: &Transaction, key: i64) -> Option<WrappedTuple> {
    let predicate = Predicate::new(Op::Equals, Cell::Int64(key));
    table
        .search(tx, &predicate)
        .unwrap()
        .next()
        .map(|t| t.unwrap())
}

pub fn search_key(table: &BTreeTable, tx: &Transaction, key: i64) -> usize {
    let predicate = Predicate::new(Op::Equals, Cell::Int64(key));
    table.search(tx, &predicate).unwrap().count()
}

pub fn key_of(tuple: &WrappedTuple) -> i64 {
    match tuple.get_cell(0) {
        Cell::Int64(v) => v,
        other => panic!("unexpected cell {}", other),
    }
}

/// All keys of the table, in scan order.
pub fn all_keys(table: &BTreeTable, tx: &Transaction) -> Vec<i64> {
    table.iter(tx).map(|t| key_of(&t.unwrap())).collect()
}

/// The keys of each leaf page, from left to right.
pub fn leaf_keys(table: &BTreeTable, tx: &Transaction) -> Vec<Vec<i64>> {
    table
        .collect_leaves(tx)
        .unwrap()
        .iter()
        .map(|leaf| leaf.iter().map(key_of).collect())
        .collect()
}

/// The keys of the root page, which must be an internal page.
pub fn root_keys(table: &BTreeTable, tx: &Transaction) -> Vec<i64> {
    let root_pid = table.get_root_pid(tx).unwrap().unwrap();
    internal_keys(table, tx, &root_pid)
}

pub fn internal_keys(table: &BTreeTable, tx: &Transaction, pid: &BTreePageID) -> Vec<i64> {
    let page_rc = table
        .get_page_cache()
        .get_internal_page(tx, Permission::ReadOnly, pid)
        .unwrap();
    let page = page_rc.rl();
    let keys = page
        .iter()
        .map(|e| match e.get_key() {
            Cell::Int64(v) => v,
            other => panic!("unexpected key {}", other),
        })
        .collect();
    keys
}

/// Run `action` in fresh transactions until it doesn't fail with a
/// retryable error, returns the number of attempts.
pub fn run_with_retry<F>(db: &Database, mut action: F) -> usize
where
    F: FnMut(&Transaction) -> Result<(), SmallError>,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        let tx = db.begin_transaction().unwrap();
        match action(&tx) {
            Ok(()) => {
                db.commit(&tx).unwrap();
                return attempts;
            }
            Err(e) if e.is_retryable() => {
                db.abort(&tx).unwrap();
            }
            Err(e) => panic!("unexpected error: {}", e),
        }
    }
}
