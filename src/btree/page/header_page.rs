use std::io::Cursor;

use bit_vec::BitVec;

use super::{BTreePage, BTreePageID, PageCategory, EMPTY_PAGE_ID};
use crate::{
    config::INDEX_SIZE,
    error::SmallError,
    io::{read_into, SmallWriter},
};

/// A bitmap of free page slots. Header pages form a doubly linked
/// list, the head is referenced by the root pointer page.
///
/// The n-th header page in the list tracks the page indexes
/// `[n * slots_count, (n + 1) * slots_count)`.
///
/// # Binary Layout
///
/// - 4 bytes: next header page index
/// - 4 bytes: previous header page index
/// - the rest: one bit per slot, 1 for used and 0 for free
pub struct BTreeHeaderPage {
    pid: BTreePageID,

    next_page_index: u32,
    prev_page_index: u32,

    // indicate slots' status: true means used, false means free
    header: BitVec<u32>,

    slot_count: usize,

    page_size: usize,
}

impl BTreeHeaderPage {
    pub fn new(pid: &BTreePageID, bytes: &[u8]) -> Result<Self, SmallError> {
        let page_size = bytes.len();
        let slot_count = Self::calculate_slots_count(page_size);

        let mut reader = Cursor::new(bytes);
        let next_page_index: u32 = read_into(&mut reader)?;
        let prev_page_index: u32 = read_into(&mut reader)?;

        Ok(Self {
            pid: *pid,
            next_page_index,
            prev_page_index,
            header: BitVec::from_bytes(&bytes[2 * INDEX_SIZE..]),
            slot_count,
            page_size,
        })
    }

    pub fn calculate_slots_count(page_size: usize) -> usize {
        (page_size - 2 * INDEX_SIZE) * 8
    }

    /// Mark every slot as used, a new header page must not hand out
    /// pages that were never freed.
    pub fn init(&mut self) {
        self.header.set_all();
    }

    // mark the slot as empty/filled.
    pub fn mark_slot_status(&mut self, slot_index: usize, used: bool) {
        self.header.set(slot_index, used);
    }

    pub fn is_slot_used(&self, slot_index: usize) -> bool {
        self.header[slot_index]
    }

    pub fn get_slots_count(&self) -> usize {
        self.slot_count
    }

    pub fn get_empty_slot(&self) -> Option<usize> {
        (0..self.slot_count).find(|&i| !self.header[i])
    }

    pub fn get_next_pid(&self) -> Option<BTreePageID> {
        self.sibling_pid(self.next_page_index)
    }

    pub fn set_next_pid(&mut self, pid: Option<BTreePageID>) {
        self.next_page_index = pid.map_or(EMPTY_PAGE_ID, |pid| pid.page_index);
    }

    pub fn get_prev_pid(&self) -> Option<BTreePageID> {
        self.sibling_pid(self.prev_page_index)
    }

    pub fn set_prev_pid(&mut self, pid: Option<BTreePageID>) {
        self.prev_page_index = pid.map_or(EMPTY_PAGE_ID, |pid| pid.page_index);
    }

    fn sibling_pid(&self, index: u32) -> Option<BTreePageID> {
        if index == EMPTY_PAGE_ID {
            None
        } else {
            Some(BTreePageID::new(
                PageCategory::Header,
                self.pid.get_table_id(),
                index,
            ))
        }
    }
}

impl BTreePage for BTreeHeaderPage {
    fn get_pid(&self) -> BTreePageID {
        self.pid
    }

    fn get_page_data(&self) -> Result<Vec<u8>, SmallError> {
        let mut writer = SmallWriter::new_reserved(self.page_size);
        writer.write(&self.next_page_index);
        writer.write(&self.prev_page_index);
        writer.write_bytes(&self.header.to_bytes());
        writer.to_padded_bytes(self.page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_slots() {
        let pid = BTreePageID::new(PageCategory::Header, 1, 5);
        let mut page = BTreeHeaderPage::new(&pid, &vec![0; 64]).unwrap();
        assert_eq!(page.get_slots_count(), 56 * 8);
        assert_eq!(page.get_empty_slot(), Some(0));

        page.init();
        assert_eq!(page.get_empty_slot(), None);

        page.mark_slot_status(17, false);
        page.set_next_pid(Some(BTreePageID::new(PageCategory::Header, 1, 9)));

        let page = BTreeHeaderPage::new(&pid, &page.get_page_data().unwrap()).unwrap();
        assert_eq!(page.get_empty_slot(), Some(17));
        assert_eq!(page.get_next_pid().unwrap().page_index, 9);
        assert_eq!(page.get_prev_pid(), None);
    }
}
