use super::{BTreePageID, PageCategory, EMPTY_PAGE_ID};

/// The fields shared by leaf and internal pages.
pub struct BTreeBasePage {
    pid: BTreePageID,

    /// 0 means the parent is the root pointer page, otherwise the
    /// parent is an internal page.
    parent_page_index: u32,
}

impl BTreeBasePage {
    pub fn new(pid: &BTreePageID, parent_page_index: u32) -> BTreeBasePage {
        BTreeBasePage {
            pid: *pid,
            parent_page_index,
        }
    }

    pub fn get_pid(&self) -> BTreePageID {
        self.pid
    }

    pub fn get_parent_pid(&self) -> BTreePageID {
        let category = if self.parent_page_index == EMPTY_PAGE_ID {
            PageCategory::RootPointer
        } else {
            PageCategory::Internal
        };
        BTreePageID::new(category, self.pid.get_table_id(), self.parent_page_index)
    }

    pub fn set_parent_pid(&mut self, pid: &BTreePageID) {
        match pid.category {
            PageCategory::RootPointer => self.parent_page_index = EMPTY_PAGE_ID,
            _ => self.parent_page_index = pid.page_index,
        }
    }

    pub(crate) fn get_parent_page_index(&self) -> u32 {
        self.parent_page_index
    }
}
