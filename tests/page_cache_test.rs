mod test_utils;

use small_btree::{
    btree::page::{BTreePageID, PageCategory},
    transaction::LockState,
    ErrorKind, Permission, Tuple, TransactionStatus,
};
use test_utils::{
    all_keys, delete_key, insert_committed, insert_keys, new_int_table, setup, setup_small,
};

#[test]
fn test_dirty_pages_are_not_evicted() {
    let t = setup(4096, 2);
    let db = &t.db;
    let table_a = new_int_table(db, "eviction_a", 1);
    let table_b = new_int_table(db, "eviction_b", 1);
    let cache = db.page_cache();

    let tx1 = db.begin_transaction().unwrap();
    let tx2 = db.begin_transaction().unwrap();
    let tx3 = db.begin_transaction().unwrap();

    cache
        .get_root_ptr_page(&tx1, Permission::ReadWrite, &table_a.get_root_ptr_pid())
        .unwrap();
    cache
        .get_root_ptr_page(&tx2, Permission::ReadWrite, &table_b.get_root_ptr_pid())
        .unwrap();
    assert_eq!(cache.resident_count(), 2);
    assert!(cache.is_dirty(&table_a.get_root_ptr_pid()));

    // both resident pages are dirty, there is nothing to evict
    let leaf_pid = BTreePageID::new(PageCategory::Leaf, table_a.get_id(), 1);
    let err = cache
        .get_leaf_page(&tx3, Permission::ReadOnly, &leaf_pid)
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    assert!(err.is_retryable());

    // the commit writes the page back, so it can be evicted
    db.commit(&tx1).unwrap();
    assert!(!cache.is_dirty(&table_a.get_root_ptr_pid()));
    cache
        .get_leaf_page(&tx3, Permission::ReadOnly, &leaf_pid)
        .unwrap();
    assert!(cache.resident_count() <= 2);
    assert!(cache.is_resident(&leaf_pid));
    assert!(!cache.is_resident(&table_a.get_root_ptr_pid()));

    db.commit(&tx2).unwrap();
    db.commit(&tx3).unwrap();
}

#[test]
fn test_cache_full_during_insert() {
    let t = setup(48, 4);
    let db = &t.db;
    let table = new_int_table(db, "cache_full", 1);

    let tx = db.begin_transaction().unwrap();
    let mut failure = None;
    for key in 0..100 {
        if let Err(e) = db.insert_tuple(&tx, table.get_id(), &Tuple::new_int_tuples(key, 1)) {
            failure = Some(e);
            break;
        }
    }
    let err = failure.expect("a small cache should run out of clean pages");
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    db.abort(&tx).unwrap();

    // nothing of the aborted transaction is visible
    let tx = db.begin_transaction().unwrap();
    assert!(all_keys(&table, &tx).is_empty());
    db.commit(&tx).unwrap();
}

#[test]
fn test_abort_discards_changes() {
    let t = setup_small();
    let db = &t.db;
    let table = new_int_table(db, "abort", 1);
    insert_committed(db, &table, 0..10);

    let tx = db.begin_transaction().unwrap();
    insert_keys(db, &table, &tx, 10..30);
    for key in 0..5 {
        delete_key(db, &table, &tx, key);
    }
    assert_eq!(all_keys(&table, &tx), (5..30).collect::<Vec<_>>());
    db.abort(&tx).unwrap();
    assert_eq!(
        db.get_transaction_status(&tx),
        Some(TransactionStatus::Aborted)
    );

    let tx = db.begin_transaction().unwrap();
    assert_eq!(all_keys(&table, &tx), (0..10).collect::<Vec<_>>());
    table.check_integrity(&tx, true).unwrap();
    db.commit(&tx).unwrap();
}

#[test]
fn test_commit_persists_changes() {
    let t = setup_small();
    let db = &t.db;
    let table = new_int_table(db, "commit", 1);

    let tx = db.begin_transaction().unwrap();
    insert_keys(db, &table, &tx, 0..10);
    let root_ptr_pid = table.get_root_ptr_pid();
    assert!(db.page_cache().is_dirty(&root_ptr_pid));
    assert_eq!(db.page_cache().lock_state(&tx, &root_ptr_pid), LockState::Write);

    db.commit(&tx).unwrap();
    assert_eq!(
        db.get_transaction_status(&tx),
        Some(TransactionStatus::Committed)
    );
    assert!(!db.page_cache().is_dirty(&root_ptr_pid));
    assert!(!db.page_cache().holds_lock(&tx, &root_ptr_pid));

    // drop every cached page, the tree is read back from disk
    db.page_cache().discard_page(&root_ptr_pid);
    let tx = db.begin_transaction().unwrap();
    for page_index in 1..=table.pages_count().unwrap() as u32 {
        for category in &[PageCategory::Leaf, PageCategory::Internal] {
            db.page_cache()
                .discard_page(&BTreePageID::new(*category, table.get_id(), page_index));
        }
    }
    assert_eq!(all_keys(&table, &tx), (0..10).collect::<Vec<_>>());
    table.check_integrity(&tx, true).unwrap();
    db.commit(&tx).unwrap();
}

#[test]
fn test_complete_twice() {
    let t = setup_small();
    let db = &t.db;

    let tx = db.begin_transaction().unwrap();
    assert_eq!(db.get_transaction_status(&tx), Some(TransactionStatus::Active));
    db.commit(&tx).unwrap();

    let err = db.commit(&tx).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let err = db.abort(&tx).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(
        db.get_transaction_status(&tx),
        Some(TransactionStatus::Committed)
    );
}

#[test]
fn test_flush_and_release() {
    let t = setup(48, 64);
    let db = &t.db;
    assert_eq!(db.page_cache().capacity(), 64);
    assert_eq!(db.get_config().cache_capacity, 64);

    let table = new_int_table(db, "flush", 1);
    assert_eq!(db.tables_count(), 1);
    let cache = db.page_cache();
    let root_ptr_pid = table.get_root_ptr_pid();

    let tx = db.begin_transaction().unwrap();
    insert_keys(db, &table, &tx, 0..3);
    assert!(cache.is_dirty(&root_ptr_pid));

    // a single page
    cache.flush_page(&root_ptr_pid).unwrap();
    assert!(!cache.is_dirty(&root_ptr_pid));

    let leaf_pid = table.get_root_pid(&tx).unwrap().unwrap();
    assert!(cache.is_dirty(&leaf_pid));
    cache.flush_all_pages().unwrap();
    assert!(!cache.is_dirty(&leaf_pid));
    db.commit(&tx).unwrap();

    // an early release lets a writer in before the reader completes
    let reader = db.begin_transaction().unwrap();
    let writer = db.begin_transaction().unwrap();
    cache
        .get_page(&reader, Permission::ReadOnly, &leaf_pid)
        .unwrap();
    assert_eq!(cache.lock_state(&reader, &leaf_pid), LockState::Read);
    cache.release_page(&reader, &leaf_pid);
    assert!(!cache.holds_lock(&reader, &leaf_pid));

    cache
        .get_page(&writer, Permission::ReadWrite, &leaf_pid)
        .unwrap();
    assert_eq!(cache.lock_state(&writer, &leaf_pid), LockState::Write);
    db.commit(&writer).unwrap();
    db.commit(&reader).unwrap();
}
