use log::debug;

use super::SearchFor;
use crate::{
    btree::{
        page::{BTreeInternalPage, BTreeLeafPage, BTreePage, BTreePageID, Entry, PageCategory},
        page_cache::DirtyPages,
    },
    error::SmallError,
    storage::tuple::{Cell, Tuple, WrappedTuple},
    transaction::{Permission, Transaction},
    types::{Pod, ResultPod},
    utils::HandyRwLock,
    BTreeTable,
};

// insert-related functions
impl BTreeTable {
    /// Insert a tuple into this BTreeTable, keeping the tuples in
    /// sorted order. May cause pages to split if the page where
    /// tuple belongs is full.
    ///
    /// Returns the pages dirtied by the insertion.
    pub fn insert_tuple(&self, tx: &Transaction, tuple: &Tuple) -> Result<DirtyPages, SmallError> {
        tuple.check_schema(self.get_schema())?;

        let mut dirty_pages = DirtyPages::new();
        let root_pid = self.get_or_create_root_pid(tx, &mut dirty_pages)?;

        // find and lock the left-most leaf page corresponding to the key
        // field, and split the leaf page if there are no more slots
        // available
        let key = tuple.get_cell(self.get_key_field());
        let mut leaf_rc = self.find_leaf_page(
            tx,
            &mut dirty_pages,
            Permission::ReadWrite,
            root_pid,
            &SearchFor::Target(key.clone()),
        )?;

        let is_full = leaf_rc.rl().empty_slots_count() == 0;
        if is_full {
            leaf_rc = self.split_leaf_page(tx, &mut dirty_pages, leaf_rc, &key)?;
        }
        leaf_rc.wl().insert_tuple(tuple)?;

        Ok(dirty_pages)
    }

    /// A brand new table has no root, the empty leaf page created with
    /// the file becomes the root on the first insertion.
    fn get_or_create_root_pid(
        &self,
        tx: &Transaction,
        dirty_pages: &mut DirtyPages,
    ) -> Result<BTreePageID, SmallError> {
        if let Some(root_pid) = self.get_root_pid(tx)? {
            return Ok(root_pid);
        }

        let root_ptr_rc = self.get_root_ptr_page(tx, dirty_pages, Permission::ReadWrite)?;
        let mut root_ptr = root_ptr_rc.wl();

        // another transaction may have created the root while we were
        // waiting for the write lock
        if let Some(root_pid) = root_ptr.get_root_pid() {
            return Ok(root_pid);
        }

        let root_pid = BTreePageID::new(PageCategory::Leaf, self.get_id(), 1);
        root_ptr.set_root_pid(&root_pid);
        debug!("root of table {} initialized: {}", self.name, root_pid);
        Ok(root_pid)
    }

    /// Split a leaf page to make room for new tuples and recursively
    /// split the parent node as needed to accommodate a new entry.
    /// The new entry has a key matching the key field of the first
    /// tuple in the right-hand page (the key is "copied up"), and
    /// child pointers pointing to the two leaf pages resulting from
    /// the split. Update sibling pointers and parent pointers as
    /// needed.
    ///
    /// Return the leaf page into which a new tuple with key field
    /// "key" should be inserted.
    pub fn split_leaf_page(
        &self,
        tx: &Transaction,
        dirty_pages: &mut DirtyPages,
        page_rc: Pod<BTreeLeafPage>,
        key: &Cell,
    ) -> ResultPod<BTreeLeafPage> {
        // Prepare the parent before touching the page: splitting the
        // parent may re-parent this page.
        let parent_pid = page_rc.rl().get_parent_pid();
        let parent_rc = self.get_parent_with_empty_slots(tx, dirty_pages, parent_pid, key)?;
        let parent_pid = parent_rc.rl().get_pid();

        let sibling_rc = self.get_empty_page(tx, dirty_pages, PageCategory::Leaf)?.into_leaf()?;

        let page_pid: BTreePageID;
        let sibling_pid: BTreePageID;
        let separator: Cell;
        let old_right_pid: Option<BTreePageID>;
        {
            let mut page = page_rc.wl();
            let mut sibling = sibling_rc.wl();
            page_pid = page.get_pid();
            sibling_pid = sibling.get_pid();

            // move the upper half of the tuples to the new right sibling
            let move_count = page.tuples_count() / 2;
            let moved: Vec<WrappedTuple> = page.iter().rev().take(move_count).collect();
            for tuple in &moved {
                sibling.insert_tuple(tuple)?;
                page.delete_tuple(tuple.get_slot_number());
            }

            separator = match sibling.get_first_key() {
                Some(key) => key,
                None => {
                    return Err(SmallError::inconsistency(&format!(
                        "split of {} left the right page empty",
                        page_pid
                    )))
                }
            };

            // the new page sits between the page and its former right
            // sibling
            old_right_pid = page.get_right_pid();
            sibling.set_right_pid(old_right_pid);
            sibling.set_left_pid(Some(page_pid));
            page.set_right_pid(Some(sibling_pid));

            page.set_parent_pid(&parent_pid);
            sibling.set_parent_pid(&parent_pid);
        }

        if let Some(old_right_pid) = old_right_pid {
            let old_right_rc =
                self.get_leaf_page(tx, dirty_pages, Permission::ReadWrite, &old_right_pid)?;
            old_right_rc.wl().set_left_pid(Some(sibling_pid));
        }

        parent_rc
            .wl()
            .insert_entry(&Entry::new(separator.clone(), &page_pid, &sibling_pid))?;

        debug!(
            "leaf split, page: {}, new sibling: {}, separator: {}, parent: {}",
            page_pid, sibling_pid, separator, parent_pid
        );

        if key > &separator {
            Ok(sibling_rc)
        } else {
            Ok(page_rc)
        }
    }

    /// Method to encapsulate the process of getting a parent page
    /// ready to accept new entries.
    ///
    /// This may mean creating a page to become the new root of the
    /// tree, splitting the existing parent page if there are no empty
    /// slots, or simply locking and returning the existing parent
    /// page.
    ///
    /// # Arguments
    ///
    /// - `parent_pid`: the id of the parent. May be an internal page
    ///   or the root pointer page.
    /// - `key`: the key of the tuple to be inserted after the split is
    ///   complete. Necessary to know which of the two pages to return.
    fn get_parent_with_empty_slots(
        &self,
        tx: &Transaction,
        dirty_pages: &mut DirtyPages,
        parent_pid: BTreePageID,
        key: &Cell,
    ) -> ResultPod<BTreeInternalPage> {
        match parent_pid.category {
            // create a parent node if necessary, this will be the new
            // root of the tree
            PageCategory::RootPointer => {
                let new_root_rc = self
                    .get_empty_page(tx, dirty_pages, PageCategory::Internal)?
                    .into_internal()?;
                let new_root_pid = new_root_rc.rl().get_pid();
                self.set_root_pid(tx, dirty_pages, &new_root_pid)?;
                debug!("new root of table {}: {}", self.name, new_root_pid);
                Ok(new_root_rc)
            }
            PageCategory::Internal => {
                let parent_rc =
                    self.get_internal_page(tx, dirty_pages, Permission::ReadWrite, &parent_pid)?;
                let empty_slots_count = parent_rc.rl().empty_slots_count();
                if empty_slots_count > 0 {
                    Ok(parent_rc)
                } else {
                    self.split_internal_page(tx, dirty_pages, parent_rc, key)
                }
            }
            _ => Err(SmallError::inconsistency(&format!(
                "{} can't be a parent page",
                parent_pid
            ))),
        }
    }

    /// Split an internal page to make room for new entries and
    /// recursively split its parent page as needed to accommodate a
    /// new entry. The new entry for the parent has a key matching the
    /// middle key in the original internal page being split (this key
    /// is "pushed up" to the parent).
    ///
    /// Return the internal page into which an entry with key field
    /// "key" should be inserted.
    fn split_internal_page(
        &self,
        tx: &Transaction,
        dirty_pages: &mut DirtyPages,
        page_rc: Pod<BTreeInternalPage>,
        key: &Cell,
    ) -> ResultPod<BTreeInternalPage> {
        let parent_pid = page_rc.rl().get_parent_pid();
        let parent_rc = self.get_parent_with_empty_slots(tx, dirty_pages, parent_pid, key)?;
        let parent_pid = parent_rc.rl().get_pid();

        let sibling_rc = self
            .get_empty_page(tx, dirty_pages, PageCategory::Internal)?
            .into_internal()?;

        let page_pid: BTreePageID;
        let sibling_pid: BTreePageID;
        let middle_entry: Entry;
        let mut moved_children: Vec<BTreePageID> = Vec::new();
        {
            let mut page = page_rc.wl();
            let mut sibling = sibling_rc.wl();
            page_pid = page.get_pid();
            sibling_pid = sibling.get_pid();

            let entries: Vec<Entry> = page.iter().collect();
            let move_count = entries.len() / 2;
            let middle_index = match (entries.len() - move_count).checked_sub(1) {
                Some(index) => index,
                None => {
                    return Err(SmallError::inconsistency(&format!(
                        "can't split internal page {} with {} entries",
                        page_pid,
                        entries.len()
                    )))
                }
            };
            middle_entry = entries[middle_index].clone();

            // move the entries above the middle one to the sibling
            for e in &entries[middle_index + 1..] {
                sibling.insert_entry(e)?;
                moved_children.push(e.get_right_child());
            }
            if let Some(first_moved) = entries.get(middle_index + 1) {
                moved_children.push(first_moved.get_left_child());
            }
            for e in entries[middle_index..].iter().rev() {
                page.delete_key_and_right_child(e.get_record_id());
            }

            page.set_parent_pid(&parent_pid);
            sibling.set_parent_pid(&parent_pid);
        }

        for child_pid in &moved_children {
            self.set_parent(tx, dirty_pages, child_pid, &sibling_pid)?;
        }

        let middle_key = middle_entry.get_key();
        parent_rc
            .wl()
            .insert_entry(&Entry::new(middle_key.clone(), &page_pid, &sibling_pid))?;

        debug!(
            "internal split, page: {}, new sibling: {}, pushed up: {}, parent: {}",
            page_pid, sibling_pid, middle_key, parent_pid
        );

        if key > &middle_key {
            Ok(sibling_rc)
        } else {
            Ok(page_rc)
        }
    }
}
