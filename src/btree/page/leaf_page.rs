use std::io::Cursor;

use bit_vec::BitVec;

use super::{BTreeBasePage, BTreePage, BTreePageID, PageCategory, EMPTY_PAGE_ID};
use crate::{
    config::INDEX_SIZE,
    error::SmallError,
    io::{read_into, Encodeable, SmallWriter},
    storage::{
        schema::Schema,
        tuple::{Cell, Tuple, WrappedTuple},
    },
    types::SmallResult,
    utils::ceil_div,
};

/// # Binary Layout
///
/// - 4 bytes: parent page index
/// - 4 bytes: left sibling page index
/// - 4 bytes: right sibling page index
/// - `slot_count / 8 + 1` bytes: header, one bit per slot
/// - `slot_count * tuple_size` bytes: tuples
pub struct BTreeLeafPage {
    page: BTreeBasePage,

    pub slot_count: usize,

    // indicate slots' status: true means occupied, false means empty
    header: BitVec<u32>,

    // all tuples (include empty tuples)
    tuples: Vec<Tuple>,

    // use u32 instead of Option<BTreePageID> to reduce memory footprint
    right_sibling_id: u32,
    left_sibling_id: u32,

    key_field: usize,

    page_size: usize,
}

impl std::ops::Deref for BTreeLeafPage {
    type Target = BTreeBasePage;
    fn deref(&self) -> &Self::Target {
        &self.page
    }
}

impl std::ops::DerefMut for BTreeLeafPage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.page
    }
}

impl BTreeLeafPage {
    pub fn new(
        pid: &BTreePageID,
        bytes: &[u8],
        schema: &Schema,
        key_field: usize,
    ) -> Result<Self, SmallError> {
        let page_size = bytes.len();
        let slot_count = Self::calculate_slots_count(page_size, schema.get_size());
        let header_size = Self::calculate_header_size(slot_count);

        let mut reader = Cursor::new(bytes);
        let parent_page_index: u32 = read_into(&mut reader)?;
        let left_sibling_id: u32 = read_into(&mut reader)?;
        let right_sibling_id: u32 = read_into(&mut reader)?;

        let header_start = 3 * INDEX_SIZE;
        let header = BitVec::from_bytes(&bytes[header_start..header_start + header_size]);

        // init tuples
        reader.set_position((header_start + header_size) as u64);
        let mut tuples = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            tuples.push(Tuple::decode_from(&mut reader, schema)?);
        }

        Ok(Self {
            page: BTreeBasePage::new(pid, parent_page_index),
            slot_count,
            header,
            tuples,
            right_sibling_id,
            left_sibling_id,
            key_field,
            page_size,
        })
    }

    /// Retrieve the maximum number of tuples a leaf page can hold.
    pub fn calculate_slots_count(page_size: usize, tuple_size: usize) -> usize {
        let bits_per_tuple_including_header = tuple_size * 8 + 1;
        // extraBits are: left sibling pointer, right sibling pointer, parent
        // pointer
        let extra_bits = 3 * INDEX_SIZE * 8;
        let mut slot_count =
            (page_size * 8).saturating_sub(extra_bits) / bits_per_tuple_including_header;

        // the header is rounded up to whole bytes, so the estimation
        // above may be one slot too optimistic
        while slot_count > 0
            && 3 * INDEX_SIZE + Self::calculate_header_size(slot_count) + slot_count * tuple_size
                > page_size
        {
            slot_count -= 1;
        }
        slot_count
    }

    // Computes the number of bytes in the header of a leaf page
    // with `slot_count` slots.
    pub fn calculate_header_size(slot_count: usize) -> usize {
        slot_count / 8 + 1
    }

    pub fn set_right_pid(&mut self, pid: Option<BTreePageID>) {
        self.right_sibling_id = pid.map_or(EMPTY_PAGE_ID, |pid| pid.page_index);
    }

    pub fn get_right_pid(&self) -> Option<BTreePageID> {
        self.sibling_pid(self.right_sibling_id)
    }

    pub fn set_left_pid(&mut self, pid: Option<BTreePageID>) {
        self.left_sibling_id = pid.map_or(EMPTY_PAGE_ID, |pid| pid.page_index);
    }

    pub fn get_left_pid(&self) -> Option<BTreePageID> {
        self.sibling_pid(self.left_sibling_id)
    }

    fn sibling_pid(&self, index: u32) -> Option<BTreePageID> {
        if index == EMPTY_PAGE_ID {
            None
        } else {
            Some(BTreePageID::new(
                PageCategory::Leaf,
                self.get_pid().table_id,
                index,
            ))
        }
    }

    pub fn get_slots_count(&self) -> usize {
        self.slot_count
    }

    pub fn get_key_field(&self) -> usize {
        self.key_field
    }

    /// The most empty slots a non-root leaf may have, i.e. the page
    /// must stay at least half full.
    pub fn max_empty_slots(&self) -> usize {
        ceil_div(self.slot_count, 2)
    }

    /// Whether the page satisfies the occupancy requirement. The root
    /// page is always stable.
    pub fn stable(&self) -> bool {
        if self.get_parent_pid().category == PageCategory::RootPointer {
            return true;
        }
        self.empty_slots_count() <= self.max_empty_slots()
    }

    /// Whether the page can't give away a tuple without becoming
    /// unstable.
    pub fn is_minimal(&self) -> bool {
        self.empty_slots_count() >= self.max_empty_slots()
    }

    pub fn empty_slots_count(&self) -> usize {
        (0..self.slot_count).filter(|&i| !self.is_slot_used(i)).count()
    }

    /// Returns the number of tuples currently stored on this page
    pub fn tuples_count(&self) -> usize {
        self.slot_count - self.empty_slots_count()
    }

    /// Adds the specified tuple to the page such that all records
    /// remain in sorted order.
    pub fn insert_tuple(&mut self, tuple: &Tuple) -> SmallResult {
        // find the first empty slot
        let first_empty_slot = match (0..self.slot_count).find(|&i| !self.is_slot_used(i)) {
            Some(slot) => slot as i64,
            None => {
                return Err(SmallError::inconsistency(&format!(
                    "no empty slot on leaf page {}",
                    self.get_pid()
                )))
            }
        };

        // Find the last key less than the key being inserted.
        //
        // -1 indicate there is no such key less than tuple.key, so the tuple
        // should be inserted in slot 0 (-1 + 1).
        let key = tuple.get_cell(self.key_field);
        let mut last_less_slot: i64 = -1;
        for i in 0..self.slot_count {
            if self.is_slot_used(i) {
                if self.tuples[i].get_cell(self.key_field) < key {
                    last_less_slot = i as i64;
                } else {
                    break;
                }
            }
        }

        // shift records back or forward to fill empty slot and make room for
        // new record while keeping records in sorted order
        let good_slot: usize;
        if first_empty_slot < last_less_slot {
            for i in first_empty_slot..last_less_slot {
                self.move_tuple((i + 1) as usize, i as usize);
            }
            good_slot = last_less_slot as usize;
        } else {
            for i in (last_less_slot + 1..first_empty_slot).rev() {
                self.move_tuple(i as usize, (i + 1) as usize);
            }
            good_slot = (last_less_slot + 1) as usize;
        }

        // insert new record into the correct spot in sorted order
        self.tuples[good_slot] = tuple.clone();
        self.mark_slot_status(good_slot, true);
        Ok(())
    }

    // Move a tuple from one slot to another slot, destination must be empty
    fn move_tuple(&mut self, from: usize, to: usize) {
        if !self.is_slot_used(from) {
            return;
        }

        self.tuples[to] = self.tuples[from].clone();
        self.mark_slot_status(to, true);
        self.mark_slot_status(from, false);
    }

    pub fn get_tuple(&self, slot_index: usize) -> Option<Tuple> {
        if slot_index < self.slot_count && self.is_slot_used(slot_index) {
            return Some(self.tuples[slot_index].clone());
        }
        None
    }

    pub fn delete_tuple(&mut self, slot_index: usize) {
        self.mark_slot_status(slot_index, false);
    }

    /// Returns true if associated slot on this page is filled.
    pub fn is_slot_used(&self, slot_index: usize) -> bool {
        self.header[slot_index]
    }

    // mark the slot as empty/filled.
    fn mark_slot_status(&mut self, slot_index: usize, used: bool) {
        self.header.set(slot_index, used);
    }

    pub fn get_first_key(&self) -> Option<Cell> {
        self.iter().next().map(|t| t.get_cell(self.key_field))
    }

    pub fn iter(&self) -> BTreeLeafPageIterator<'_> {
        BTreeLeafPageIterator::new(self)
    }

    pub fn check_integrity(
        &self,
        parent_pid: &BTreePageID,
        lower_bound: &Option<Cell>,
        upper_bound: &Option<Cell>,
        check_occupancy: bool,
        depth: usize,
    ) -> SmallResult {
        if self.get_pid().category != PageCategory::Leaf {
            return Err(SmallError::inconsistency(&format!(
                "{} is not a leaf page",
                self.get_pid()
            )));
        }

        if &self.get_parent_pid() != parent_pid {
            return Err(SmallError::inconsistency(&format!(
                "parent of {} is {}, expect {}",
                self.get_pid(),
                self.get_parent_pid(),
                parent_pid,
            )));
        }

        let mut previous = lower_bound.clone();
        for tuple in self.iter() {
            let key = tuple.get_cell(self.key_field);
            if let Some(previous) = &previous {
                if previous > &key {
                    return Err(SmallError::inconsistency(&format!(
                        "tuples of {} out of order: {} > {}",
                        self.get_pid(),
                        previous,
                        key,
                    )));
                }
            }
            previous = Some(key);
        }

        if let (Some(upper_bound), Some(previous)) = (upper_bound, &previous) {
            if previous > upper_bound {
                return Err(SmallError::inconsistency(&format!(
                    "the last tuple of {} exceeds upper bound, last tuple: {}, upper bound: {}",
                    self.get_pid(),
                    previous,
                    upper_bound,
                )));
            }
        }

        if check_occupancy && depth > 0 && self.empty_slots_count() > self.max_empty_slots() {
            return Err(SmallError::inconsistency(&format!(
                "leaf page {} is less than half full: {}/{}",
                self.get_pid(),
                self.tuples_count(),
                self.slot_count,
            )));
        }

        Ok(())
    }
}

impl BTreePage for BTreeLeafPage {
    fn get_pid(&self) -> BTreePageID {
        self.page.get_pid()
    }

    fn get_page_data(&self) -> Result<Vec<u8>, SmallError> {
        let mut writer = SmallWriter::new_reserved(self.page_size);

        writer.write(&self.page.get_parent_page_index());
        writer.write(&self.left_sibling_id);
        writer.write(&self.right_sibling_id);

        let mut header_bytes = self.header.to_bytes();
        header_bytes.resize(Self::calculate_header_size(self.slot_count), 0);
        writer.write_bytes(&header_bytes);

        for tuple in &self.tuples {
            tuple.encode(&mut writer);
        }

        writer.to_padded_bytes(self.page_size)
    }
}

pub struct BTreeLeafPageIterator<'page> {
    page: &'page BTreeLeafPage,
    cursor: i64,
    reverse_cursor: i64,
}

impl<'page> BTreeLeafPageIterator<'page> {
    pub fn new(page: &'page BTreeLeafPage) -> Self {
        Self {
            page,
            cursor: -1,
            reverse_cursor: page.slot_count as i64,
        }
    }
}

impl Iterator for BTreeLeafPageIterator<'_> {
    type Item = WrappedTuple;

    fn next(&mut self) -> Option<Self::Item> {
        let page = self.page;
        loop {
            self.cursor += 1;
            if self.cursor >= self.reverse_cursor {
                return None;
            }

            let cursor = self.cursor as usize;
            if page.is_slot_used(cursor) {
                return Some(WrappedTuple::new(
                    page.tuples[cursor].clone(),
                    cursor,
                    page.get_pid(),
                ));
            }
        }
    }
}

impl DoubleEndedIterator for BTreeLeafPageIterator<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let page = self.page;
        loop {
            self.reverse_cursor -= 1;
            if self.reverse_cursor <= self.cursor {
                return None;
            }

            let cursor = self.reverse_cursor as usize;
            if page.is_slot_used(cursor) {
                return Some(WrappedTuple::new(
                    page.tuples[cursor].clone(),
                    cursor,
                    page.get_pid(),
                ));
            }
        }
    }
}
