mod test_utils;

use small_btree::tx_log::RecordType;
use test_utils::{insert_keys, new_int_table, setup_small};

#[test]
fn test_transaction_records() {
    let t = setup_small();
    let db = &t.db;
    let table = new_int_table(db, "log_records", 1);

    let tx1 = db.begin_transaction().unwrap();
    let tx2 = db.begin_transaction().unwrap();
    insert_keys(db, &table, &tx1, 0..10);
    db.commit(&tx1).unwrap();
    insert_keys(db, &table, &tx2, 10..20);
    db.abort(&tx2).unwrap();

    let mut log_manager = db.log_manager();
    assert_eq!(log_manager.records_count(), 4);
    assert_eq!(
        log_manager.get_records().unwrap(),
        vec![
            (RecordType::Start, tx1.get_id()),
            (RecordType::Start, tx2.get_id()),
            (RecordType::Commit, tx1.get_id()),
            (RecordType::Abort, tx2.get_id()),
        ]
    );
    log_manager.show_log_contents().unwrap();
}

#[test]
fn test_custom_log_file() {
    small_btree::utils::init_log();

    let dir = tempfile::tempdir().unwrap();
    let config = small_btree::DatabaseConfig::default().with_log_file("custom.log");
    let db = small_btree::Database::new(dir.path(), config).unwrap();

    let tx = db.begin_transaction().unwrap();
    db.commit(&tx).unwrap();

    assert!(dir.path().join("custom.log").exists());
    assert_eq!(db.log_manager().records_count(), 2);
}
