mod test_utils;

use rand::prelude::*;
use small_btree::{storage::small_int_schema, Cell, ErrorKind, Tuple};
use test_utils::{
    all_keys, insert_committed, insert_keys, leaf_keys, new_int_table, root_keys, search_key,
    setup, setup_small, LARGE_CACHE, LEAF_CAPACITY,
};

#[test]
fn test_first_insert_creates_root() {
    let t = setup_small();
    let table = new_int_table(&t.db, "first_insert", 1);

    let tx = t.db.begin_transaction().unwrap();
    assert_eq!(table.get_root_pid(&tx).unwrap(), None);
    assert!(table.iter(&tx).next().is_none());

    insert_keys(&t.db, &table, &tx, vec![42]);
    let root_pid = table.get_root_pid(&tx).unwrap().unwrap();
    assert_eq!(root_pid.page_index, 1);
    assert_eq!(all_keys(&table, &tx), vec![42]);
    t.db.commit(&tx).unwrap();

    // the file was created with the root leaf in it
    assert_eq!(table.pages_count().unwrap(), 1);
}

#[test]
fn test_split_leaf_page() {
    let t = setup_small();
    let table = new_int_table(&t.db, "split_leaf", 1);

    insert_committed(&t.db, &table, 1..=LEAF_CAPACITY as i64);

    let tx = t.db.begin_transaction().unwrap();
    assert_eq!(leaf_keys(&table, &tx), vec![vec![1, 2, 3, 4]]);
    t.db.commit(&tx).unwrap();

    // one more tuple than a leaf can hold
    insert_committed(&t.db, &table, vec![5]);

    let tx = t.db.begin_transaction().unwrap();
    assert_eq!(leaf_keys(&table, &tx), vec![vec![1, 2], vec![3, 4, 5]]);
    assert_eq!(root_keys(&table, &tx), vec![3]);
    table.check_integrity(&tx, true).unwrap();
    t.db.commit(&tx).unwrap();

    // root leaf, new internal root and the new leaf
    assert_eq!(table.pages_count().unwrap(), 3);
}

#[test]
fn test_split_internal_page() {
    let t = setup_small();
    let table = new_int_table(&t.db, "split_internal", 1);

    // ascending inserts leave the left halves behind, every leaf split
    // adds one entry to the root until the root itself splits
    insert_committed(&t.db, &table, 0..20);

    let tx = t.db.begin_transaction().unwrap();
    table.check_integrity(&tx, true).unwrap();
    assert_eq!(all_keys(&table, &tx), (0..20).collect::<Vec<_>>());

    let root_pid = table.get_root_pid(&tx).unwrap().unwrap();
    assert_eq!(root_pid.category, small_btree::btree::page::PageCategory::Internal);

    // the root points to internal pages, so the tree has three levels
    table.draw_tree(&tx, -1).unwrap();
    let leaves = leaf_keys(&table, &tx);
    assert!(leaves.len() > 4);
    assert!(leaves.iter().all(|leaf| leaf.len() >= 2));
    t.db.commit(&tx).unwrap();
}

#[test]
fn test_random_inserts_are_sorted() {
    let t = setup_small();
    let table = new_int_table(&t.db, "random_inserts", 1);

    let mut rng = rand::thread_rng();
    let mut keys: Vec<i64> = (0..500).map(|_| rng.gen_range(-1000, 1000)).collect();

    let tx = t.db.begin_transaction().unwrap();
    insert_keys(&t.db, &table, &tx, keys.clone());
    table.check_integrity(&tx, true).unwrap();

    keys.sort();
    assert_eq!(all_keys(&table, &tx), keys);
    assert_eq!(table.tuples_count(&tx).unwrap(), 500);
    t.db.commit(&tx).unwrap();

    // the committed tree reads the same from another transaction
    let tx = t.db.begin_transaction().unwrap();
    assert_eq!(all_keys(&table, &tx), keys);
    t.db.commit(&tx).unwrap();
}

#[test]
fn test_duplicate_keys() {
    let t = setup_small();
    let table = new_int_table(&t.db, "duplicates", 1);

    // more copies of the same key than a leaf holds
    let mut keys = vec![7; 10];
    keys.extend(vec![3, 9, 7, 1]);
    insert_committed(&t.db, &table, keys);

    let tx = t.db.begin_transaction().unwrap();
    table.check_integrity(&tx, true).unwrap();
    assert_eq!(search_key(&table, &tx, 7), 11);
    assert_eq!(search_key(&table, &tx, 3), 1);
    assert_eq!(search_key(&table, &tx, 4), 0);
    assert_eq!(all_keys(&table, &tx).len(), 14);
    t.db.commit(&tx).unwrap();
}

#[test]
fn test_multi_column_tuples() {
    // 24 bytes tuples, 4 of them per leaf
    let t = setup(128, LARGE_CACHE);
    let table = t
        .db
        .create_table("multi_column", &small_int_schema(3, "col"), 1)
        .unwrap();

    let tx = t.db.begin_transaction().unwrap();
    for i in 0..30 {
        let tuple = Tuple::new(vec![Cell::Int64(i), Cell::Int64(100 - i), Cell::Int64(i * 2)]);
        t.db.insert_tuple(&tx, table.get_id(), &tuple).unwrap();
    }
    table.check_integrity(&tx, true).unwrap();

    // keyed on the second column, so the scan order is reversed
    let firsts: Vec<Cell> = table
        .iter(&tx)
        .map(|tuple| tuple.unwrap().get_cell(0))
        .collect();
    let expected: Vec<Cell> = (0..30).rev().map(Cell::Int64).collect();
    assert_eq!(firsts, expected);

    let found = table.find_tuples(&tx, &Cell::Int64(90)).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get_cell(0), Cell::Int64(10));
    t.db.commit(&tx).unwrap();
}

#[test]
fn test_schema_mismatch() {
    let t = setup_small();
    let table = new_int_table(&t.db, "schema_mismatch", 1);

    let tx = t.db.begin_transaction().unwrap();

    let too_wide = Tuple::new_int_tuples(1, 2);
    let err = t.db.insert_tuple(&tx, table.get_id(), &too_wide).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let wrong_type = Tuple::new(vec![Cell::Bool(true)]);
    let err = t.db.insert_tuple(&tx, table.get_id(), &wrong_type).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let err = t
        .db
        .insert_tuple(&tx, table.get_id() ^ 1, &Tuple::new_int_tuples(1, 1))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    // nothing reached the tree
    assert!(all_keys(&table, &tx).is_empty());
    t.db.commit(&tx).unwrap();
}
