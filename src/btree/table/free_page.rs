use log::debug;

use crate::{
    btree::{
        page::{BTreeHeaderPage, BTreePage, BTreePageID, PageCategory, PageHandle},
        page_cache::DirtyPages,
    },
    error::SmallError,
    transaction::{Permission, Transaction},
    types::SmallResult,
    utils::HandyRwLock,
    BTreeTable,
};

// page allocation and reclamation
impl BTreeTable {
    /// Get the index of a page that can be (re)used, prefer a page
    /// freed by a former deletion, otherwise grow the file.
    ///
    /// The slot found in the header list is marked as used right away.
    pub(super) fn get_empty_page_index(
        &self,
        tx: &Transaction,
        dirty_pages: &mut DirtyPages,
    ) -> Result<u32, SmallError> {
        let root_ptr_rc = self.get_root_ptr_page(tx, dirty_pages, Permission::ReadOnly)?;
        let mut cursor = root_ptr_rc.rl().get_header_pid();

        let mut header_no = 0;
        while let Some(header_pid) = cursor {
            let header_rc =
                self.get_header_page(tx, dirty_pages, Permission::ReadOnly, &header_pid)?;
            let (empty_slot, slots_count, next_pid) = {
                let header = header_rc.rl();
                (
                    header.get_empty_slot(),
                    header.get_slots_count(),
                    header.get_next_pid(),
                )
            };

            if let Some(slot) = empty_slot {
                let header_rc =
                    self.get_header_page(tx, dirty_pages, Permission::ReadWrite, &header_pid)?;
                header_rc.wl().mark_slot_status(slot, true);
                return Ok((header_no * slots_count + slot) as u32);
            }

            header_no += 1;
            cursor = next_pid;
        }

        self.get_file().append_empty_page()
    }

    /// Allocate a blank page of the given category, locked with
    /// exclusive access for the transaction.
    pub(super) fn get_empty_page(
        &self,
        tx: &Transaction,
        dirty_pages: &mut DirtyPages,
        category: PageCategory,
    ) -> Result<PageHandle, SmallError> {
        let page_index = self.get_empty_page_index(tx, dirty_pages)?;
        let pid = BTreePageID::new(category, self.get_id(), page_index);

        // the same index may still be known under its former category
        for former in &[PageCategory::Leaf, PageCategory::Internal, PageCategory::Header] {
            dirty_pages.remove(&BTreePageID::new(*former, self.get_id(), page_index));
        }

        let page = self.get_page_cache().get_fresh_page(tx, &pid)?;
        dirty_pages.insert(pid, page.clone());

        debug!("empty page allocated: {}", pid);
        Ok(page)
    }

    /// Mark a page in this BTreeTable as empty. Find the corresponding
    /// header page (create it if needed), and mark the corresponding
    /// slot in the header page as empty.
    pub(super) fn set_empty_page(
        &self,
        tx: &Transaction,
        dirty_pages: &mut DirtyPages,
        pid: &BTreePageID,
    ) -> SmallResult {
        self.get_page_cache().discard_page(pid);
        dirty_pages.remove(pid);

        let root_ptr_rc = self.get_root_ptr_page(tx, dirty_pages, Permission::ReadOnly)?;
        let head_pid = root_ptr_rc.rl().get_header_pid();
        let mut header_pid = match head_pid {
            Some(pid) => pid,
            None => {
                // if there are no header pages, create the first
                // header page and update the header pointer in the
                // root pointer page
                let header_pid = self.new_header_page(tx, dirty_pages, None)?;
                self.get_root_ptr_page(tx, dirty_pages, Permission::ReadWrite)?
                    .wl()
                    .set_header_pid(&header_pid);
                header_pid
            }
        };

        let slots_count = BTreeHeaderPage::calculate_slots_count(self.get_page_size());
        let page_index = pid.page_index as usize;

        // walk (and extend) the header list up to the header page
        // covering the index
        for _ in 0..page_index / slots_count {
            let header_rc =
                self.get_header_page(tx, dirty_pages, Permission::ReadOnly, &header_pid)?;
            let next_pid = header_rc.rl().get_next_pid();
            header_pid = match next_pid {
                Some(next_pid) => next_pid,
                None => {
                    let next_pid = self.new_header_page(tx, dirty_pages, Some(header_pid))?;
                    self.get_header_page(tx, dirty_pages, Permission::ReadWrite, &header_pid)?
                        .wl()
                        .set_next_pid(Some(next_pid));
                    next_pid
                }
            };
        }

        let header_rc = self.get_header_page(tx, dirty_pages, Permission::ReadWrite, &header_pid)?;
        header_rc
            .wl()
            .mark_slot_status(page_index % slots_count, false);

        debug!("page {} freed, tracked by {}", pid, header_pid);
        Ok(())
    }

    /// A header page with every slot marked as used, appended after
    /// `prev_pid` in the header list.
    fn new_header_page(
        &self,
        tx: &Transaction,
        dirty_pages: &mut DirtyPages,
        prev_pid: Option<BTreePageID>,
    ) -> Result<BTreePageID, SmallError> {
        let header_rc = self
            .get_empty_page(tx, dirty_pages, PageCategory::Header)?
            .into_header()?;
        let mut header = header_rc.wl();
        header.init();
        header.set_prev_pid(prev_pid);
        Ok(header.get_pid())
    }
}
