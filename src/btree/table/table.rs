use core::fmt;
use std::sync::Arc;

use log::debug;

use crate::{
    btree::{
        page::{
            BTreeHeaderPage, BTreeInternalPage, BTreeLeafPage, BTreePage, BTreePageID,
            BTreeRootPointerPage, Entry, PageCategory, PageHandle,
        },
        page_cache::{DirtyPages, PageCache},
    },
    error::SmallError,
    storage::{
        schema::Schema,
        table_file::TableFile,
        tuple::{Cell, Tuple, WrappedTuple},
    },
    transaction::{Permission, Transaction},
    types::{Pod, ResultPod, SmallResult},
    utils::HandyRwLock,
};

pub enum SearchFor {
    Target(Cell),
    LeftMost,
    RightMost,
}

/// B+ Tree
///
/// All pages are reached through the page cache by id, a page handle
/// is never kept across calls that may fetch the same page again.
pub struct BTreeTable {
    pub name: String,

    file: Arc<TableFile>,

    page_cache: Arc<PageCache>,
}

impl fmt::Display for BTreeTable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<BTreeTable, name: {}, file: {:?}, id: {}>",
            self.name,
            self.file.get_path(),
            self.get_id()
        )
    }
}

// init functions
impl BTreeTable {
    pub fn new(name: &str, file: Arc<TableFile>, page_cache: Arc<PageCache>) -> Self {
        Self {
            name: name.to_string(),
            file,
            page_cache,
        }
    }
}

// normal read-only functions
impl BTreeTable {
    pub fn get_id(&self) -> u32 {
        self.file.get_id()
    }

    pub fn get_schema(&self) -> &Schema {
        self.file.get_schema()
    }

    pub fn get_key_field(&self) -> usize {
        self.file.get_key_field()
    }

    pub fn get_page_size(&self) -> usize {
        self.file.get_page_size()
    }

    pub fn get_page_cache(&self) -> &Arc<PageCache> {
        &self.page_cache
    }

    pub(super) fn get_file(&self) -> &TableFile {
        &self.file
    }

    /// Calculate the number of tuples in the table. Require S_LOCK on
    /// all leaf pages.
    pub fn tuples_count(&self, tx: &Transaction) -> Result<usize, SmallError> {
        let mut count = 0;
        for tuple in self.iter(tx) {
            tuple?;
            count += 1;
        }
        Ok(count)
    }

    /// The count of pages in the table file, the root pointer page is
    /// not included.
    pub fn pages_count(&self) -> Result<usize, SmallError> {
        Ok(self.file.pages_count()? as usize)
    }

    pub fn get_root_ptr_pid(&self) -> BTreePageID {
        BTreePageID::get_root_ptr_page_id(self.get_id())
    }

    /// Get the root page pid, `None` for a tree that never had a
    /// tuple inserted.
    pub fn get_root_pid(&self, tx: &Transaction) -> Result<Option<BTreePageID>, SmallError> {
        let root_ptr_rc = self.page_cache.get_root_ptr_page(
            tx,
            Permission::ReadOnly,
            &self.get_root_ptr_pid(),
        )?;
        let root_pid = root_ptr_rc.rl().get_root_pid();
        Ok(root_pid)
    }

    /// The leftmost leaf page, `None` if the tree has no root yet.
    pub fn get_first_page(
        &self,
        tx: &Transaction,
        perm: Permission,
    ) -> Result<Option<Pod<BTreeLeafPage>>, SmallError> {
        self.find_edge_page(tx, perm, &SearchFor::LeftMost)
    }

    /// The rightmost leaf page, `None` if the tree has no root yet.
    pub fn get_last_page(
        &self,
        tx: &Transaction,
        perm: Permission,
    ) -> Result<Option<Pod<BTreeLeafPage>>, SmallError> {
        self.find_edge_page(tx, perm, &SearchFor::RightMost)
    }

    fn find_edge_page(
        &self,
        tx: &Transaction,
        perm: Permission,
        search: &SearchFor,
    ) -> Result<Option<Pod<BTreeLeafPage>>, SmallError> {
        match self.get_root_pid(tx)? {
            Some(root_pid) => {
                let mut dirty_pages = DirtyPages::new();
                let page_rc = self.find_leaf_page(tx, &mut dirty_pages, perm, root_pid, search)?;
                Ok(Some(page_rc))
            }
            None => Ok(None),
        }
    }
}

/// Page access scoped to one mutating operation.
impl BTreeTable {
    /// Method to encapsulate the process of locking/fetching a page.
    /// First the method checks the local cache ("dirty_pages"), and
    /// if it can't find the requested page there, it fetches it from
    /// the page cache. It also adds pages to the local cache if they
    /// are fetched with read-write permission, since presumably they
    /// will soon be dirtied by this transaction.
    ///
    /// This method is needed to ensure that page updates are not lost
    /// if the same pages are accessed multiple times.
    pub(super) fn get_page(
        &self,
        tx: &Transaction,
        dirty_pages: &mut DirtyPages,
        perm: Permission,
        pid: &BTreePageID,
    ) -> Result<PageHandle, SmallError> {
        if let Some(page) = dirty_pages.get(pid) {
            return Ok(page.clone());
        }

        let page = self.page_cache.get_page(tx, perm, pid)?;
        if perm == Permission::ReadWrite {
            dirty_pages.insert(*pid, page.clone());
        }
        Ok(page)
    }

    pub(super) fn get_root_ptr_page(
        &self,
        tx: &Transaction,
        dirty_pages: &mut DirtyPages,
        perm: Permission,
    ) -> ResultPod<BTreeRootPointerPage> {
        self.get_page(tx, dirty_pages, perm, &self.get_root_ptr_pid())?
            .into_root_pointer()
    }

    pub(super) fn get_header_page(
        &self,
        tx: &Transaction,
        dirty_pages: &mut DirtyPages,
        perm: Permission,
        pid: &BTreePageID,
    ) -> ResultPod<BTreeHeaderPage> {
        self.get_page(tx, dirty_pages, perm, pid)?.into_header()
    }

    pub(super) fn get_internal_page(
        &self,
        tx: &Transaction,
        dirty_pages: &mut DirtyPages,
        perm: Permission,
        pid: &BTreePageID,
    ) -> ResultPod<BTreeInternalPage> {
        self.get_page(tx, dirty_pages, perm, pid)?.into_internal()
    }

    pub(super) fn get_leaf_page(
        &self,
        tx: &Transaction,
        dirty_pages: &mut DirtyPages,
        perm: Permission,
        pid: &BTreePageID,
    ) -> ResultPod<BTreeLeafPage> {
        self.get_page(tx, dirty_pages, perm, pid)?.into_leaf()
    }

    pub(super) fn set_root_pid(
        &self,
        tx: &Transaction,
        dirty_pages: &mut DirtyPages,
        root_pid: &BTreePageID,
    ) -> SmallResult {
        let root_ptr_rc = self.get_root_ptr_page(tx, dirty_pages, Permission::ReadWrite)?;
        root_ptr_rc.wl().set_root_pid(root_pid);
        Ok(())
    }

    pub(super) fn set_parent(
        &self,
        tx: &Transaction,
        dirty_pages: &mut DirtyPages,
        child_pid: &BTreePageID,
        parent_pid: &BTreePageID,
    ) -> SmallResult {
        match child_pid.category {
            PageCategory::Internal => {
                let child_rc =
                    self.get_internal_page(tx, dirty_pages, Permission::ReadWrite, child_pid)?;
                child_rc.wl().set_parent_pid(parent_pid);
            }
            PageCategory::Leaf => {
                let child_rc =
                    self.get_leaf_page(tx, dirty_pages, Permission::ReadWrite, child_pid)?;
                child_rc.wl().set_parent_pid(parent_pid);
            }
            _ => {
                return Err(SmallError::inconsistency(&format!(
                    "{} can't be a child page",
                    child_pid
                )))
            }
        }
        Ok(())
    }

    /// Recursive function which finds and locks the leaf page in the
    /// B+ tree corresponding to the left-most page possibly
    /// containing the key field f. It locks all internal nodes along
    /// the path to the leaf node with READ_ONLY permission, and locks
    /// the leaf node with permission perm.
    pub fn find_leaf_page(
        &self,
        tx: &Transaction,
        dirty_pages: &mut DirtyPages,
        perm: Permission,
        pid: BTreePageID,
        search: &SearchFor,
    ) -> ResultPod<BTreeLeafPage> {
        match pid.category {
            PageCategory::Leaf => self.get_leaf_page(tx, dirty_pages, perm, &pid),
            PageCategory::Internal => {
                let page_rc =
                    self.get_internal_page(tx, dirty_pages, Permission::ReadOnly, &pid)?;

                let child_pid = {
                    let page = page_rc.rl();
                    Self::choose_child(&page, search)?
                };

                self.find_leaf_page(tx, dirty_pages, perm, child_pid, search)
            }
            _ => Err(SmallError::inconsistency(&format!(
                "{} can't appear inside a tree",
                pid
            ))),
        }
    }

    fn choose_child(page: &BTreeInternalPage, search: &SearchFor) -> Result<BTreePageID, SmallError> {
        let mut last_entry: Option<Entry> = None;
        for e in page.iter() {
            match search {
                SearchFor::Target(cell) => {
                    if &e.get_key() >= cell {
                        return Ok(e.get_left_child());
                    }
                }
                SearchFor::LeftMost => return Ok(e.get_left_child()),
                // don't stop here, the rightmost child is the right
                // child of the last entry
                SearchFor::RightMost => {}
            }
            last_entry = Some(e);
        }

        match last_entry {
            Some(e) => Ok(e.get_right_child()),
            None => Err(SmallError::inconsistency(&format!(
                "empty internal page {} found during descent",
                page.get_pid()
            ))),
        }
    }
}

/// debug methods
impl BTreeTable {
    /// Print the BTreeTable structure.
    ///
    /// # Arguments
    ///
    /// - `max_level` - the max level of the print
    ///     - 0: print the root pointer page
    ///     - 1: print the root pointer page and the root page
    ///       (internal or leaf)
    ///     - ...
    ///     - -1: print all pages
    pub fn draw_tree(&self, tx: &Transaction, max_level: i64) -> SmallResult {
        let mut depiction = "".to_string();

        depiction.push_str("\n\n----- PRINT TREE STRUCTURE START -----\n\n");
        depiction.push_str(&format!("root pointer: {}\n", self.get_root_ptr_pid()));

        if max_level != 0 {
            if let Some(root_pid) = self.get_root_pid(tx)? {
                depiction.push_str(&self.draw_subtree(tx, &root_pid, 0, max_level)?);
            }
        }

        depiction.push_str("\n\n----- PRINT TREE STRUCTURE END   -----\n\n");

        debug!("tree_structure, level {}: {}", max_level, depiction);
        Ok(())
    }

    fn draw_subtree(
        &self,
        tx: &Transaction,
        pid: &BTreePageID,
        level: usize,
        max_level: i64,
    ) -> Result<String, SmallError> {
        match pid.category {
            PageCategory::Internal => self.draw_internal_node(tx, pid, level, max_level),
            PageCategory::Leaf => self.draw_leaf_node(tx, pid, level),
            _ => Err(SmallError::inconsistency(&format!(
                "invalid page category: {:?}",
                pid.category
            ))),
        }
    }

    fn draw_leaf_node(
        &self,
        tx: &Transaction,
        pid: &BTreePageID,
        level: usize,
    ) -> Result<String, SmallError> {
        let mut depiction = "".to_string();

        let page_rc = self
            .page_cache
            .get_leaf_page(tx, Permission::ReadOnly, pid)?;
        let page = page_rc.rl();

        let prefix = "│   ".repeat(level);
        depiction.push_str(&format!(
            "{}├── leaf: {} ({}/{} tuples) (left: {:?}, right: {:?})\n",
            prefix,
            page.get_pid(),
            page.tuples_count(),
            page.get_slots_count(),
            page.get_left_pid(),
            page.get_right_pid(),
        ));

        let prefix = "│   ".repeat(level + 1);
        let mut it = page.iter();
        depiction.push_str(&format!(
            "{}├── first tuple: {:?}\n",
            prefix,
            it.next().map(|t| t.to_string())
        ));
        depiction.push_str(&format!(
            "{}└── last tuple:  {:?}\n",
            prefix,
            it.next_back().map(|t| t.to_string())
        ));

        Ok(depiction)
    }

    fn draw_internal_node(
        &self,
        tx: &Transaction,
        pid: &BTreePageID,
        level: usize,
        max_level: i64,
    ) -> Result<String, SmallError> {
        let mut depiction = "".to_string();

        let page_rc = self
            .page_cache
            .get_internal_page(tx, Permission::ReadOnly, pid)?;
        let entries: Vec<Entry> = {
            let page = page_rc.rl();
            depiction.push_str(&format!(
                "{}├── internal: {} ({}/{} entries)\n",
                "│   ".repeat(level),
                pid,
                page.entries_count(),
                page.get_max_entries(),
            ));
            page.iter().collect()
        };

        if max_level != -1 && level as i64 + 1 >= max_level {
            return Ok(depiction);
        }

        let prefix = "│   ".repeat(level + 1);
        for (i, entry) in entries.iter().enumerate() {
            if i == 0 {
                depiction.push_str(&self.draw_subtree(
                    tx,
                    &entry.get_left_child(),
                    level + 1,
                    max_level,
                )?);
            }
            depiction.push_str(&format!("{}├── key: {}\n", prefix, entry.get_key()));
            depiction.push_str(&self.draw_subtree(
                tx,
                &entry.get_right_child(),
                level + 1,
                max_level,
            )?);
        }

        Ok(depiction)
    }

    /// checks the integrity of the tree:
    /// - parent pointers.
    /// - sibling pointers.
    /// - range invariants.
    /// - uniform depth of leaves.
    /// - occupancy invariants. (if enabled)
    ///
    /// require s_lock on all pages.
    ///
    /// Returns the first violation found as a `StructuralInconsistency`.
    pub fn check_integrity(&self, tx: &Transaction, check_occupancy: bool) -> SmallResult {
        let root_pid = match self.get_root_pid(tx)? {
            Some(pid) => pid,
            None => return Ok(()),
        };

        let root_summary = self.check_sub_tree(
            tx,
            &root_pid,
            &self.get_root_ptr_pid(),
            &None,
            &None,
            check_occupancy,
            0,
        )?;

        if root_summary.left_ptr.is_some() || root_summary.right_ptr.is_some() {
            return Err(SmallError::inconsistency(&format!(
                "the outermost leaves have siblings, left: {:?}, right: {:?}",
                root_summary.left_ptr, root_summary.right_ptr,
            )));
        }
        Ok(())
    }

    fn check_sub_tree(
        &self,
        tx: &Transaction,
        pid: &BTreePageID,
        parent_pid: &BTreePageID,
        lower_bound: &Option<Cell>,
        upper_bound: &Option<Cell>,
        check_occupancy: bool,
        depth: usize,
    ) -> Result<SubtreeSummary, SmallError> {
        match pid.category {
            PageCategory::Leaf => {
                let page_rc = self
                    .page_cache
                    .get_leaf_page(tx, Permission::ReadOnly, pid)?;
                let page = page_rc.rl();
                page.check_integrity(parent_pid, lower_bound, upper_bound, check_occupancy, depth)?;

                Ok(SubtreeSummary {
                    left_ptr: page.get_left_pid(),
                    right_ptr: page.get_right_pid(),

                    left_most_pid: page.get_pid(),
                    right_most_pid: page.get_pid(),

                    depth,
                })
            }

            PageCategory::Internal => {
                let page_rc = self
                    .page_cache
                    .get_internal_page(tx, Permission::ReadOnly, pid)?;
                let entries: Vec<Entry> = {
                    let page = page_rc.rl();
                    page.check_integrity(
                        parent_pid,
                        lower_bound,
                        upper_bound,
                        check_occupancy,
                        depth,
                    )?;
                    page.iter().collect()
                };

                let last_entry = match entries.last() {
                    Some(e) => e.clone(),
                    None => {
                        return Err(SmallError::inconsistency(&format!(
                            "internal page {} has no entry",
                            pid
                        )))
                    }
                };

                let mut child_lower_bound = lower_bound.clone();
                let mut summary: Option<SubtreeSummary> = None;

                for entry in &entries {
                    let current_summary = self.check_sub_tree(
                        tx,
                        &entry.get_left_child(),
                        pid,
                        &child_lower_bound,
                        &Some(entry.get_key()),
                        check_occupancy,
                        depth + 1,
                    )?;
                    summary = Some(match summary {
                        Some(s) => s.check_and_merge(&current_summary)?,
                        None => current_summary,
                    });

                    child_lower_bound = Some(entry.get_key());
                }

                let last_right_summary = self.check_sub_tree(
                    tx,
                    &last_entry.get_right_child(),
                    pid,
                    &child_lower_bound,
                    upper_bound,
                    check_occupancy,
                    depth + 1,
                )?;

                match summary {
                    Some(s) => s.check_and_merge(&last_right_summary),
                    None => Ok(last_right_summary),
                }
            }

            // no other page types allowed inside the tree.
            _ => Err(SmallError::inconsistency(&format!(
                "invalid page category {:?} inside the tree",
                pid.category
            ))),
        }
    }

    /// Look up the tuples whose key equals `key`, handy for tests.
    pub fn find_tuples(&self, tx: &Transaction, key: &Cell) -> Result<Vec<Tuple>, SmallError> {
        let predicate = crate::operator::Predicate::new(crate::operator::Op::Equals, key.clone());
        self.search(tx, &predicate)?
            .map(|t| t.map(|t| t.get_tuple().clone()))
            .collect()
    }

    /// All tuples of the leaf pages, from left to right. Handy to
    /// verify the tree shape in tests.
    pub fn collect_leaves(&self, tx: &Transaction) -> Result<Vec<Vec<WrappedTuple>>, SmallError> {
        let mut leaves = Vec::new();
        let mut next = self
            .get_first_page(tx, Permission::ReadOnly)?
            .map(|page_rc| {
                let pid = page_rc.rl().get_pid();
                pid
            });
        while let Some(pid) = next {
            let page_rc = self
                .page_cache
                .get_leaf_page(tx, Permission::ReadOnly, &pid)?;
            let page = page_rc.rl();
            leaves.push(page.iter().collect());
            next = page.get_right_pid();
        }
        Ok(leaves)
    }
}

#[derive(Debug, Clone)]
struct SubtreeSummary {
    /// The distance towards the root.
    depth: usize,

    left_ptr: Option<BTreePageID>,
    left_most_pid: BTreePageID,
    right_ptr: Option<BTreePageID>,
    right_most_pid: BTreePageID,
}

impl SubtreeSummary {
    fn check_and_merge(self, right: &SubtreeSummary) -> Result<SubtreeSummary, SmallError> {
        if self.depth != right.depth {
            return Err(SmallError::inconsistency(&format!(
                "leaves at different depth: {} and {}",
                self.depth, right.depth
            )));
        }

        if self.right_ptr != Some(right.left_most_pid) || right.left_ptr != Some(self.right_most_pid)
        {
            return Err(SmallError::inconsistency(&format!(
                "broken sibling pointers between {} (right: {:?}) and {} (left: {:?})",
                self.right_most_pid, self.right_ptr, right.left_most_pid, right.left_ptr,
            )));
        }

        Ok(SubtreeSummary {
            depth: self.depth,
            left_ptr: self.left_ptr,
            left_most_pid: self.left_most_pid,
            right_ptr: right.right_ptr,
            right_most_pid: right.right_most_pid,
        })
    }
}
