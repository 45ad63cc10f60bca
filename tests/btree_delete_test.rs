mod test_utils;

use rand::prelude::*;
use small_btree::{btree::page::PageCategory, ErrorKind};
use test_utils::{
    all_keys, delete_key, find_key, insert_committed, insert_keys, leaf_keys, new_int_table,
    root_keys, search_key, setup_small,
};

#[test]
fn test_delete_without_rebalance() {
    let t = setup_small();
    let table = new_int_table(&t.db, "plain_delete", 1);
    insert_committed(&t.db, &table, 1..=5);

    let tx = t.db.begin_transaction().unwrap();
    // the right leaf holds 3, 4, 5 and stays half full
    delete_key(&t.db, &table, &tx, 5);
    assert_eq!(leaf_keys(&table, &tx), vec![vec![1, 2], vec![3, 4]]);
    assert_eq!(root_keys(&table, &tx), vec![3]);
    table.check_integrity(&tx, true).unwrap();
    t.db.commit(&tx).unwrap();
}

#[test]
fn test_merge_leaf_pages() {
    let t = setup_small();
    let table = new_int_table(&t.db, "merge_leaf", 1);
    insert_committed(&t.db, &table, 1..=5);

    let tx = t.db.begin_transaction().unwrap();
    delete_key(&t.db, &table, &tx, 5);
    delete_key(&t.db, &table, &tx, 3);

    // the right leaf merged into its left sibling and the root
    // collapsed onto the surviving leaf
    assert_eq!(leaf_keys(&table, &tx), vec![vec![1, 2, 4]]);
    let root_pid = table.get_root_pid(&tx).unwrap().unwrap();
    assert_eq!(root_pid.category, PageCategory::Leaf);
    assert_eq!(root_pid.page_index, 1);
    table.check_integrity(&tx, true).unwrap();
    t.db.commit(&tx).unwrap();

    let tx = t.db.begin_transaction().unwrap();
    assert_eq!(all_keys(&table, &tx), vec![1, 2, 4]);
    t.db.commit(&tx).unwrap();
}

#[test]
fn test_redistribute_leaf_pages() {
    let t = setup_small();
    let table = new_int_table(&t.db, "redistribute_leaf", 1);
    insert_committed(&t.db, &table, 0..=5);

    let tx = t.db.begin_transaction().unwrap();
    assert_eq!(leaf_keys(&table, &tx), vec![vec![0, 1], vec![2, 3, 4, 5]]);

    // the leftmost leaf has no left sibling, it borrows from the right
    delete_key(&t.db, &table, &tx, 0);
    assert_eq!(leaf_keys(&table, &tx), vec![vec![1, 2, 3], vec![4, 5]]);
    assert_eq!(root_keys(&table, &tx), vec![4]);
    table.check_integrity(&tx, true).unwrap();
    t.db.commit(&tx).unwrap();
}

#[test]
fn test_delete_all() {
    let t = setup_small();
    let table = new_int_table(&t.db, "delete_all", 1);

    let mut keys: Vec<i64> = (0..200).collect();
    let mut rng = rand::thread_rng();
    keys.shuffle(&mut rng);
    insert_committed(&t.db, &table, keys.clone());

    keys.shuffle(&mut rng);
    let tx = t.db.begin_transaction().unwrap();
    for (i, key) in keys.iter().enumerate() {
        delete_key(&t.db, &table, &tx, *key);
        if i % 10 == 0 {
            table.check_integrity(&tx, true).unwrap();
        }
    }
    assert!(all_keys(&table, &tx).is_empty());
    table.check_integrity(&tx, true).unwrap();

    // an emptied tree collapses onto a single leaf
    let root_pid = table.get_root_pid(&tx).unwrap().unwrap();
    assert_eq!(root_pid.category, PageCategory::Leaf);
    t.db.commit(&tx).unwrap();

    // the tree is still usable afterwards
    insert_committed(&t.db, &table, 0..50);
    let tx = t.db.begin_transaction().unwrap();
    table.check_integrity(&tx, true).unwrap();
    assert_eq!(all_keys(&table, &tx), (0..50).collect::<Vec<_>>());
    t.db.commit(&tx).unwrap();
}

#[test]
fn test_mixed_inserts_and_deletes() {
    let t = setup_small();
    let table = new_int_table(&t.db, "mixed", 1);

    let mut rng = rand::thread_rng();
    let mut expected: Vec<i64> = Vec::new();

    for _ in 0..10 {
        let tx = t.db.begin_transaction().unwrap();

        let inserted: Vec<i64> = (0..40).map(|_| rng.gen_range(0, 100)).collect();
        insert_keys(&t.db, &table, &tx, inserted.clone());
        expected.extend(inserted);

        for _ in 0..25 {
            let index = rng.gen_range(0, expected.len());
            let key = expected.swap_remove(index);
            delete_key(&t.db, &table, &tx, key);
        }

        table.check_integrity(&tx, true).unwrap();
        t.db.commit(&tx).unwrap();
    }

    expected.sort();
    let tx = t.db.begin_transaction().unwrap();
    assert_eq!(all_keys(&table, &tx), expected);
    t.db.commit(&tx).unwrap();
}

#[test]
fn test_delete_duplicates() {
    let t = setup_small();
    let table = new_int_table(&t.db, "delete_duplicates", 1);
    insert_committed(&t.db, &table, vec![2, 2, 2, 2, 2, 2, 1, 3]);

    let tx = t.db.begin_transaction().unwrap();
    for remaining in (0..6).rev() {
        delete_key(&t.db, &table, &tx, 2);
        assert_eq!(search_key(&table, &tx, 2), remaining);
    }
    assert_eq!(all_keys(&table, &tx), vec![1, 3]);
    table.check_integrity(&tx, true).unwrap();
    t.db.commit(&tx).unwrap();
}

#[test]
fn test_delete_stale_tuple() {
    let t = setup_small();
    let table = new_int_table(&t.db, "stale_tuple", 1);
    insert_committed(&t.db, &table, vec![1, 2, 3]);

    let tx = t.db.begin_transaction().unwrap();
    let tuple = find_key(&table, &tx, 2).unwrap();
    t.db.delete_tuple(&tx, table.get_id(), &tuple).unwrap();

    // the slot is empty now
    let err = t.db.delete_tuple(&tx, table.get_id(), &tuple).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    // a tuple read from another table
    let other = new_int_table(&t.db, "stale_tuple_other", 1);
    insert_keys(&t.db, &other, &tx, vec![1]);
    let foreign = find_key(&other, &tx, 1).unwrap();
    let err = t.db.delete_tuple(&tx, table.get_id(), &foreign).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    assert_eq!(all_keys(&table, &tx), vec![1, 3]);
    t.db.commit(&tx).unwrap();
}

#[test]
fn test_reuse_freed_pages() {
    let t = setup_small();
    let table = new_int_table(&t.db, "reuse_pages", 1);
    insert_committed(&t.db, &table, 1..=5);
    assert_eq!(table.pages_count().unwrap(), 3);

    // merge the two leaves, the internal root and the right leaf are
    // freed, the first header page is appended to track them
    let tx = t.db.begin_transaction().unwrap();
    delete_key(&t.db, &table, &tx, 5);
    delete_key(&t.db, &table, &tx, 3);
    t.db.commit(&tx).unwrap();
    assert_eq!(table.pages_count().unwrap(), 4);

    // split again, both pages come from the header instead of growing
    // the file
    insert_committed(&t.db, &table, vec![5, 6]);
    assert_eq!(table.pages_count().unwrap(), 4);

    let tx = t.db.begin_transaction().unwrap();
    assert_eq!(leaf_keys(&table, &tx), vec![vec![1, 2], vec![4, 5, 6]]);
    let root_pid = table.get_root_pid(&tx).unwrap().unwrap();
    assert_eq!(root_pid.category, PageCategory::Internal);
    assert_eq!(root_pid.page_index, 2);
    table.check_integrity(&tx, true).unwrap();
    t.db.commit(&tx).unwrap();
}
