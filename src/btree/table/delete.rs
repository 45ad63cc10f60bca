use std::cmp;

use log::debug;

use crate::{
    btree::{
        page::{BTreeInternalPage, BTreeLeafPage, BTreePage, BTreePageID, Entry, PageCategory},
        page_cache::DirtyPages,
    },
    error::SmallError,
    storage::tuple::WrappedTuple,
    transaction::{Permission, Transaction},
    types::{Pod, SmallResult},
    utils::{ceil_div, HandyRwLock},
    BTreeTable,
};

/// delete-related methods
impl BTreeTable {
    /// Delete a tuple from this BTreeTable.
    ///
    /// May cause pages to merge or redistribute entries/tuples if the
    /// pages become less than half full.
    ///
    /// The tuple is located by the page and slot it was read from, it
    /// must still be there.
    pub fn delete_tuple(
        &self,
        tx: &Transaction,
        tuple: &WrappedTuple,
    ) -> Result<DirtyPages, SmallError> {
        let pid = tuple.get_pid();
        if pid.get_table_id() != self.get_id() || pid.category != PageCategory::Leaf {
            return Err(SmallError::invalid_argument(&format!(
                "tuple {} doesn't belong to table {}",
                tuple, self.name
            )));
        }

        let mut dirty_pages = DirtyPages::new();
        let leaf_rc = self.get_leaf_page(tx, &mut dirty_pages, Permission::ReadWrite, &pid)?;

        // hold the leaf page
        let stable = {
            let mut leaf = leaf_rc.wl();
            match leaf.get_tuple(tuple.get_slot_number()) {
                Some(stored) if &stored == tuple.get_tuple() => {}
                _ => {
                    return Err(SmallError::invalid_argument(&format!(
                        "tuple {} not found at slot {} of {}",
                        tuple,
                        tuple.get_slot_number(),
                        pid
                    )))
                }
            }
            leaf.delete_tuple(tuple.get_slot_number());
            leaf.stable()
        };
        // release the leaf page

        if !stable {
            self.handle_min_occupancy_leaf(tx, &mut dirty_pages, leaf_rc)?;
        }
        Ok(dirty_pages)
    }

    /// Handle the case when a leaf page becomes less than half full
    /// due to deletions.
    ///
    /// If one of its siblings has extra tuples, redistribute those
    /// tuples. Otherwise merge with one of the siblings. Update
    /// pointers as needed.
    fn handle_min_occupancy_leaf(
        &self,
        tx: &Transaction,
        dirty_pages: &mut DirtyPages,
        page_rc: Pod<BTreeLeafPage>,
    ) -> SmallResult {
        let (pid, parent_pid) = {
            let page = page_rc.rl();
            (page.get_pid(), page.get_parent_pid())
        };
        if parent_pid.category == PageCategory::RootPointer {
            return Ok(());
        }

        let parent_rc =
            self.get_internal_page(tx, dirty_pages, Permission::ReadWrite, &parent_pid)?;
        let (left_entry, right_entry) = Self::sibling_entries(&parent_rc, &pid);

        // siblings under the same parent only, the left one first
        if let Some(entry) = left_entry {
            let left_rc = self.get_leaf_page(
                tx,
                dirty_pages,
                Permission::ReadWrite,
                &entry.get_left_child(),
            )?;
            let minimal = left_rc.rl().is_minimal();
            if minimal {
                self.merge_leaf_pages(tx, dirty_pages, left_rc, page_rc, parent_rc, &entry)
            } else {
                Self::redistribute_leaf_pages(left_rc, page_rc, parent_rc, entry)
            }
        } else if let Some(entry) = right_entry {
            let right_rc = self.get_leaf_page(
                tx,
                dirty_pages,
                Permission::ReadWrite,
                &entry.get_right_child(),
            )?;
            let minimal = right_rc.rl().is_minimal();
            if minimal {
                self.merge_leaf_pages(tx, dirty_pages, page_rc, right_rc, parent_rc, &entry)
            } else {
                Self::redistribute_leaf_pages(page_rc, right_rc, parent_rc, entry)
            }
        } else {
            Err(SmallError::inconsistency(&format!(
                "{} has no sibling under its parent {}",
                pid, parent_pid
            )))
        }
    }

    /// The parent entries pointing to `pid` as right child and as left
    /// child respectively.
    fn sibling_entries(
        parent_rc: &Pod<BTreeInternalPage>,
        pid: &BTreePageID,
    ) -> (Option<Entry>, Option<Entry>) {
        let parent = parent_rc.rl();
        (
            parent.get_entry_by_children(None, Some(pid)),
            parent.get_entry_by_children(Some(pid), None),
        )
    }

    /// Move tuples between two adjacent leaf pages so that the page
    /// short of tuples ends up with half of them, then update the
    /// separating key in the parent.
    fn redistribute_leaf_pages(
        left_rc: Pod<BTreeLeafPage>,
        right_rc: Pod<BTreeLeafPage>,
        parent_rc: Pod<BTreeInternalPage>,
        mut entry: Entry,
    ) -> SmallResult {
        {
            let mut left = left_rc.wl();
            let mut right = right_rc.wl();

            let left_count = left.tuples_count();
            let right_count = right.tuples_count();
            let target = ceil_div(left_count + right_count, 2);

            if left_count < right_count {
                let moved: Vec<WrappedTuple> =
                    right.iter().take(target - left_count).collect();
                for tuple in &moved {
                    left.insert_tuple(tuple)?;
                    right.delete_tuple(tuple.get_slot_number());
                }
            } else {
                let moved: Vec<WrappedTuple> =
                    left.iter().rev().take(target - right_count).collect();
                for tuple in &moved {
                    right.insert_tuple(tuple)?;
                    left.delete_tuple(tuple.get_slot_number());
                }
            }

            match right.get_first_key() {
                Some(key) => entry.set_key(key),
                None => {
                    return Err(SmallError::inconsistency(&format!(
                        "leaf page {} is empty after redistribution",
                        right.get_pid()
                    )))
                }
            }

            debug!(
                "leaf pages redistributed, left: {} ({} tuples), right: {} ({} tuples), new separator: {}",
                left.get_pid(),
                left.tuples_count(),
                right.get_pid(),
                right.tuples_count(),
                entry.get_key(),
            );
        }

        parent_rc.wl().update_entry(&entry);
        Ok(())
    }

    /// Merge two leaf pages by moving all tuples from the right page
    /// to the left page. Delete the corresponding key and right child
    /// pointer from the parent, and recursively handle the case when
    /// the parent gets below minimum occupancy. Update sibling
    /// pointers as needed, and make the right page available for
    /// reuse.
    fn merge_leaf_pages(
        &self,
        tx: &Transaction,
        dirty_pages: &mut DirtyPages,
        left_rc: Pod<BTreeLeafPage>,
        right_rc: Pod<BTreeLeafPage>,
        parent_rc: Pod<BTreeInternalPage>,
        entry: &Entry,
    ) -> SmallResult {
        let (left_pid, right_pid, newer_right_pid) = {
            let mut left = left_rc.wl();
            let mut right = right_rc.wl();

            let moved: Vec<WrappedTuple> = right.iter().collect();
            for tuple in &moved {
                left.insert_tuple(tuple)?;
                right.delete_tuple(tuple.get_slot_number());
            }

            let newer_right_pid = right.get_right_pid();
            left.set_right_pid(newer_right_pid);
            (left.get_pid(), right.get_pid(), newer_right_pid)
        };

        if let Some(newer_right_pid) = newer_right_pid {
            let newer_right_rc =
                self.get_leaf_page(tx, dirty_pages, Permission::ReadWrite, &newer_right_pid)?;
            newer_right_rc.wl().set_left_pid(Some(left_pid));
        }

        debug!("leaf page {} merged into {}", right_pid, left_pid);

        self.set_empty_page(tx, dirty_pages, &right_pid)?;
        self.delete_parent_entry(tx, dirty_pages, left_pid, parent_rc, entry)
    }

    /// Method to encapsulate the process of deleting an entry
    /// (specifically the key and right child) from a parent node. If
    /// the parent becomes empty (no keys remaining), that indicates
    /// that it was the root node and should be replaced by its one
    /// remaining child. Otherwise, if it gets below minimum occupancy
    /// for non-root internal nodes, it should steal from one of its
    /// siblings or merge with a sibling.
    fn delete_parent_entry(
        &self,
        tx: &Transaction,
        dirty_pages: &mut DirtyPages,
        left_pid: BTreePageID,
        parent_rc: Pod<BTreeInternalPage>,
        entry: &Entry,
    ) -> SmallResult {
        let (parent_pid, grand_pid, entries_count, stable) = {
            let mut parent = parent_rc.wl();
            parent.delete_key_and_right_child(entry.get_record_id());
            (
                parent.get_pid(),
                parent.get_parent_pid(),
                parent.entries_count(),
                parent.stable(),
            )
        };

        if entries_count == 0 && grand_pid.category == PageCategory::RootPointer {
            // the root is gone, its only child takes its place
            self.set_root_pid(tx, dirty_pages, &left_pid)?;
            self.set_parent(tx, dirty_pages, &left_pid, &grand_pid)?;
            self.set_empty_page(tx, dirty_pages, &parent_pid)?;
            debug!("root {} collapsed, new root: {}", parent_pid, left_pid);
            return Ok(());
        }

        if !stable {
            self.handle_min_occupancy_internal(tx, dirty_pages, parent_rc)?;
        }
        Ok(())
    }

    /// Handle the case when an internal page becomes less than half
    /// full due to deletions.
    ///
    /// If one of its siblings has extra entries, redistribute those
    /// entries. Otherwise merge with one of the siblings. Update
    /// pointers as needed.
    fn handle_min_occupancy_internal(
        &self,
        tx: &Transaction,
        dirty_pages: &mut DirtyPages,
        page_rc: Pod<BTreeInternalPage>,
    ) -> SmallResult {
        let (pid, parent_pid) = {
            let page = page_rc.rl();
            (page.get_pid(), page.get_parent_pid())
        };
        if parent_pid.category == PageCategory::RootPointer {
            return Ok(());
        }

        let parent_rc =
            self.get_internal_page(tx, dirty_pages, Permission::ReadWrite, &parent_pid)?;
        let (left_entry, right_entry) = Self::sibling_entries(&parent_rc, &pid);

        if let Some(entry) = left_entry {
            let left_rc = self.get_internal_page(
                tx,
                dirty_pages,
                Permission::ReadWrite,
                &entry.get_left_child(),
            )?;
            let minimal = left_rc.rl().is_minimal();
            if minimal {
                self.merge_internal_pages(tx, dirty_pages, left_rc, page_rc, parent_rc, &entry)
            } else {
                self.redistribute_internal_pages(tx, dirty_pages, left_rc, page_rc, parent_rc, entry)
            }
        } else if let Some(entry) = right_entry {
            let right_rc = self.get_internal_page(
                tx,
                dirty_pages,
                Permission::ReadWrite,
                &entry.get_right_child(),
            )?;
            let minimal = right_rc.rl().is_minimal();
            if minimal {
                self.merge_internal_pages(tx, dirty_pages, page_rc, right_rc, parent_rc, &entry)
            } else {
                self.redistribute_internal_pages(tx, dirty_pages, page_rc, right_rc, parent_rc, entry)
            }
        } else {
            Err(SmallError::inconsistency(&format!(
                "{} has no sibling under its parent {}",
                pid, parent_pid
            )))
        }
    }

    /// Steal entries from the richer page so that both pages are
    /// about half full.
    ///
    /// Keys can be thought of as rotating through the parent entry,
    /// so the original key in the parent is "pulled down" to the
    /// poorer page, and the nearest key in the richer page is
    /// "pushed up" to the parent. Update parent pointers as needed.
    fn redistribute_internal_pages(
        &self,
        tx: &Transaction,
        dirty_pages: &mut DirtyPages,
        left_rc: Pod<BTreeInternalPage>,
        right_rc: Pod<BTreeInternalPage>,
        parent_rc: Pod<BTreeInternalPage>,
        mut entry: Entry,
    ) -> SmallResult {
        let (new_parent_pid, moved_children) = {
            let mut left = left_rc.wl();
            let mut right = right_rc.wl();

            let left_count = left.entries_count();
            let right_count = right.entries_count();
            let half = (left_count + right_count) / 2;
            let move_count = cmp::max(1, half.saturating_sub(cmp::min(left_count, right_count)));

            let mut key = entry.get_key();
            let mut moved_children = Vec::with_capacity(move_count);

            if left_count < right_count {
                for _ in 0..move_count {
                    let first = Self::expect_entry(right.get_first_entry(), &right)?;
                    let left_last_child = Self::expect_child(left.get_last_child_pid(), &left)?;

                    left.insert_entry(&Entry::new(
                        key,
                        &left_last_child,
                        &first.get_left_child(),
                    ))?;
                    key = first.get_key();
                    right.delete_key_and_left_child(first.get_record_id());
                    moved_children.push(first.get_left_child());
                }
                entry.set_key(key);
                (left.get_pid(), moved_children)
            } else {
                for _ in 0..move_count {
                    let last = Self::expect_entry(left.get_last_entry(), &left)?;
                    let right_first_child =
                        Self::expect_child(right.get_first_child_pid(), &right)?;

                    right.insert_entry(&Entry::new(
                        key,
                        &last.get_right_child(),
                        &right_first_child,
                    ))?;
                    key = last.get_key();
                    left.delete_key_and_right_child(last.get_record_id());
                    moved_children.push(last.get_right_child());
                }
                entry.set_key(key);
                (right.get_pid(), moved_children)
            }
        };

        parent_rc.wl().update_entry(&entry);

        for child_pid in &moved_children {
            self.set_parent(tx, dirty_pages, child_pid, &new_parent_pid)?;
        }

        debug!(
            "internal pages redistributed, {} children moved to {}, new separator: {}",
            moved_children.len(),
            new_parent_pid,
            entry.get_key()
        );
        Ok(())
    }

    /// Merge two internal pages by moving all entries from the right
    /// page to the left page and "pulling down" the corresponding key
    /// from the parent entry.
    ///
    /// Delete the corresponding key and right child pointer from the
    /// parent, and recursively handle the case when the parent gets
    /// below minimum occupancy. Update parent pointers as needed, and
    /// make the right page available for reuse.
    fn merge_internal_pages(
        &self,
        tx: &Transaction,
        dirty_pages: &mut DirtyPages,
        left_rc: Pod<BTreeInternalPage>,
        right_rc: Pod<BTreeInternalPage>,
        parent_rc: Pod<BTreeInternalPage>,
        entry: &Entry,
    ) -> SmallResult {
        let (left_pid, right_pid, moved_children) = {
            let mut left = left_rc.wl();
            let right = right_rc.rl();

            let left_last_child = Self::expect_child(left.get_last_child_pid(), &left)?;
            let right_first_child = Self::expect_child(right.get_first_child_pid(), &right)?;

            // pull down the key from the parent
            left.insert_entry(&Entry::new(
                entry.get_key(),
                &left_last_child,
                &right_first_child,
            ))?;

            let mut moved_children = vec![right_first_child];
            for e in right.iter() {
                left.insert_entry(&e)?;
                moved_children.push(e.get_right_child());
            }

            (left.get_pid(), right.get_pid(), moved_children)
        };

        for child_pid in &moved_children {
            self.set_parent(tx, dirty_pages, child_pid, &left_pid)?;
        }

        debug!("internal page {} merged into {}", right_pid, left_pid);

        self.set_empty_page(tx, dirty_pages, &right_pid)?;
        self.delete_parent_entry(tx, dirty_pages, left_pid, parent_rc, entry)
    }

    fn expect_entry(entry: Option<Entry>, page: &BTreeInternalPage) -> Result<Entry, SmallError> {
        entry.ok_or_else(|| {
            SmallError::inconsistency(&format!("internal page {} has no entry", page.get_pid()))
        })
    }

    fn expect_child(
        child: Option<BTreePageID>,
        page: &BTreeInternalPage,
    ) -> Result<BTreePageID, SmallError> {
        child.ok_or_else(|| {
            SmallError::inconsistency(&format!("internal page {} has no child", page.get_pid()))
        })
    }
}
