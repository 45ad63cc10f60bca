use std::{fmt, io::Cursor};

use bit_vec::BitVec;

use super::{BTreeBasePage, BTreePage, BTreePageID, PageCategory};
use crate::{
    config::INDEX_SIZE,
    error::SmallError,
    io::{read_into, Encodeable, SmallWriter},
    storage::{
        schema::{Schema, Type},
        tuple::Cell,
    },
    types::SmallResult,
    utils::ceil_div,
};

/// # Binary Layout
///
/// - 4 bytes: parent page index
/// - 1 byte: category of the children (all children share one
///   category)
/// - `slot_count / 8 + 1` bytes: header, one bit per slot
/// - `(slot_count - 1) * key_size` bytes: keys of slot 1 and above
///   (slot 0 only holds a child)
/// - `slot_count * 4` bytes: children page indexes
pub struct BTreeInternalPage {
    page: BTreeBasePage,

    pub keys: Vec<Cell>,

    /// note: the left child of the nth `entry` is not always locate in
    /// the n-1 slot, but the nearest left slot which has been marked
    /// as used.
    pub children: Vec<BTreePageID>,

    /// max entries + 1
    slot_count: usize,

    // header bytes
    header: BitVec<u32>,

    children_category: PageCategory,

    key_type: Type,

    page_size: usize,
}

impl std::ops::Deref for BTreeInternalPage {
    type Target = BTreeBasePage;
    fn deref(&self) -> &Self::Target {
        &self.page
    }
}

impl std::ops::DerefMut for BTreeInternalPage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.page
    }
}

impl BTreeInternalPage {
    pub fn new(
        pid: &BTreePageID,
        bytes: &[u8],
        schema: &Schema,
        key_field: usize,
    ) -> Result<Self, SmallError> {
        let page_size = bytes.len();
        let key_type = schema.get_field_type(key_field)?;
        let slot_count = Self::calculate_max_entries(page_size, key_type.size()) + 1;
        let header_size = Self::calculate_header_size(slot_count);

        let mut reader = Cursor::new(bytes);
        let parent_page_index: u32 = read_into(&mut reader)?;

        // a fresh page has no children yet, the category is decided
        // by the first entry inserted
        let children_category = match PageCategory::from_byte(read_into(&mut reader)?)? {
            PageCategory::Internal => PageCategory::Internal,
            _ => PageCategory::Leaf,
        };

        let header_start = INDEX_SIZE + 1;
        let header = BitVec::from_bytes(&bytes[header_start..header_start + header_size]);
        reader.set_position((header_start + header_size) as u64);

        let mut keys = Vec::with_capacity(slot_count);
        keys.push(Self::placeholder_key(key_type));
        for _ in 1..slot_count {
            keys.push(Cell::decode_from(&mut reader, &key_type)?);
        }

        let mut children = Vec::with_capacity(slot_count);
        for _ in 0..slot_count {
            let index: u32 = read_into(&mut reader)?;
            children.push(BTreePageID::new(children_category, pid.get_table_id(), index));
        }

        Ok(Self {
            page: BTreeBasePage::new(pid, parent_page_index),
            keys,
            children,
            slot_count,
            header,
            children_category,
            key_type,
            page_size,
        })
    }

    fn placeholder_key(key_type: Type) -> Cell {
        match key_type {
            Type::Int64 => Cell::Int64(0),
            Type::Bool => Cell::Bool(false),
        }
    }

    fn calculate_header_size(slot_count: usize) -> usize {
        slot_count / 8 + 1
    }

    /// Retrieve the maximum number of entries (keys) an internal page
    /// can hold.
    pub fn calculate_max_entries(page_size: usize, key_size: usize) -> usize {
        let bits_per_entry_including_header = key_size * 8 + INDEX_SIZE * 8 + 1;
        // extraBits are: one parent pointer, 1 byte for child page category,
        // one extra child pointer (node with m entries has m+1 pointers to
        // children)
        let extra_bits = 2 * INDEX_SIZE * 8 + 8;
        let mut entries =
            (page_size * 8).saturating_sub(extra_bits) / bits_per_entry_including_header;

        let layout_size = |m: usize| {
            INDEX_SIZE + 1 + Self::calculate_header_size(m + 1) + m * key_size + (m + 1) * INDEX_SIZE
        };
        while entries > 0 && layout_size(entries) > page_size {
            entries -= 1;
        }
        entries
    }

    pub fn get_max_entries(&self) -> usize {
        self.slot_count - 1
    }

    pub fn empty_slots_count(&self) -> usize {
        // start from 1 because the first key slot is not used
        // since a node with m keys has m+1 pointers
        (1..self.slot_count).filter(|&i| !self.is_slot_used(i)).count()
    }

    pub fn entries_count(&self) -> usize {
        self.slot_count - self.empty_slots_count() - 1
    }

    pub fn max_empty_slots(&self) -> usize {
        ceil_div(self.get_max_entries(), 2)
    }

    /// Whether the page satisfies the occupancy requirement. The root
    /// page is always stable.
    pub fn stable(&self) -> bool {
        if self.get_parent_pid().category == PageCategory::RootPointer {
            return true;
        }
        self.empty_slots_count() <= self.max_empty_slots()
    }

    pub fn is_minimal(&self) -> bool {
        self.empty_slots_count() >= self.max_empty_slots()
    }

    /// Returns true if associated slot on this page is filled.
    pub fn is_slot_used(&self, slot_index: usize) -> bool {
        self.header[slot_index]
    }

    fn mark_slot_status(&mut self, slot_index: usize, used: bool) {
        self.header.set(slot_index, used);
    }

    pub fn get_entry_by_children(
        &self,
        left_pid: Option<&BTreePageID>,
        right_pid: Option<&BTreePageID>,
    ) -> Option<Entry> {
        self.iter().find(|e| {
            left_pid.map_or(true, |left| &e.get_left_child() == left)
                && right_pid.map_or(true, |right| &e.get_right_child() == right)
        })
    }

    pub fn delete_key_and_right_child(&mut self, record_id: usize) {
        self.mark_slot_status(record_id, false);
    }

    pub fn delete_key_and_left_child(&mut self, record_id: usize) {
        for i in (0..record_id).rev() {
            if self.is_slot_used(i) {
                // the right child takes over the position of the left
                // child
                self.children[i] = self.children[record_id];

                self.mark_slot_status(record_id, false);
                return;
            }
        }
    }

    pub fn update_entry(&mut self, entry: &Entry) {
        let record_id = entry.get_record_id();

        // set left child
        for i in (0..record_id).rev() {
            if self.is_slot_used(i) {
                self.children[i] = entry.get_left_child();
                break;
            }
        }

        self.children[record_id] = entry.get_right_child();
        self.keys[record_id] = entry.get_key();
    }

    /// Insert an entry next to the child it shares with an existing
    /// entry (either its left or its right child must already be on
    /// the page, unless the page is empty).
    pub fn insert_entry(&mut self, e: &Entry) -> SmallResult {
        if self.empty_slots_count() == 0 {
            return Err(SmallError::inconsistency(&format!(
                "no empty slots on internal page {}",
                self.get_pid()
            )));
        }

        // if this is the first entry, add it and return
        if self.entries_count() == 0 {
            self.children_category = e.get_left_child().category;
            self.children[0] = e.get_left_child();
            self.children[1] = e.get_right_child();
            self.keys[1] = e.get_key();
            self.mark_slot_status(0, true);
            self.mark_slot_status(1, true);
            return Ok(());
        }

        // find the first empty slot, start from 1
        let mut empty_slot = 0;
        for i in 1..self.slot_count {
            if !self.is_slot_used(i) {
                empty_slot = i;
                break;
            }
        }

        // find the child pointer matching the left or right child in this entry
        let mut slot_just_ahead: Option<usize> = None;
        for i in 0..self.slot_count {
            if !self.is_slot_used(i) {
                continue;
            }

            // circumstances 1: we want to insert a entry just after the current
            // entry
            if self.children[i] == e.get_left_child() {
                slot_just_ahead = Some(i);
                break;
            }

            // circumstances 2: we want to insert a entry just inside the
            // current entry, so the right child of the current
            // entry should be updated to the left child of the new
            // entry
            if self.children[i] == e.get_right_child() {
                slot_just_ahead = Some(i);
                self.children[i] = e.get_left_child();
                break;
            }
        }

        let slot_just_ahead = match slot_just_ahead {
            Some(slot) => slot,
            None => {
                return Err(SmallError::inconsistency(&format!(
                    "no slot found for entry {}, pid: {}, entries count: {}",
                    e,
                    self.get_pid(),
                    self.entries_count()
                )));
            }
        };

        // shift entries back or forward to fill empty slot and make room for
        // new entry while keeping entries in sorted order
        let good_slot: usize;
        if empty_slot < slot_just_ahead {
            for i in empty_slot..slot_just_ahead {
                self.move_entry(i + 1, i);
            }
            good_slot = slot_just_ahead
        } else {
            for i in (slot_just_ahead + 1..empty_slot).rev() {
                self.move_entry(i, i + 1);
            }
            good_slot = slot_just_ahead + 1
        }

        self.keys[good_slot] = e.get_key();
        self.children[good_slot] = e.get_right_child();
        self.mark_slot_status(good_slot, true);
        Ok(())
    }

    fn move_entry(&mut self, from: usize, to: usize) {
        if self.is_slot_used(from) && !self.is_slot_used(to) {
            self.keys[to] = self.keys[from].clone();

            // note that we don't need to update the left child slot, since the
            // left child slot is not the nearest left slot, but the nearest
            // `used` slot, so it should be kept untouched
            self.children[to] = self.children[from];

            self.mark_slot_status(from, false);
            self.mark_slot_status(to, true);
        }
    }

    /// Still valid after the last entry is deleted, the page keeps
    /// its leftmost child until it is merged or freed.
    pub fn get_first_child_pid(&self) -> Option<BTreePageID> {
        (0..self.slot_count)
            .find(|&i| self.is_slot_used(i))
            .map(|i| self.children[i])
    }

    pub fn get_last_child_pid(&self) -> Option<BTreePageID> {
        (0..self.slot_count)
            .rev()
            .find(|&i| self.is_slot_used(i))
            .map(|i| self.children[i])
    }

    pub fn get_first_entry(&self) -> Option<Entry> {
        self.iter().next()
    }

    pub fn get_last_entry(&self) -> Option<Entry> {
        self.iter().next_back()
    }

    pub fn iter(&self) -> BTreeInternalPageIterator<'_> {
        BTreeInternalPageIterator::new(self)
    }

    pub fn check_integrity(
        &self,
        parent_pid: &BTreePageID,
        lower_bound: &Option<Cell>,
        upper_bound: &Option<Cell>,
        check_occupancy: bool,
        depth: usize,
    ) -> SmallResult {
        if self.get_pid().category != PageCategory::Internal {
            return Err(SmallError::inconsistency(&format!(
                "{} is not an internal page",
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
        for e in self.iter() {
            if let Some(previous) = &previous {
                if previous > &e.get_key() {
                    return Err(SmallError::inconsistency(&format!(
                        "entries of {} are not in order, previous: {}, current: {}",
                        self.get_pid(),
                        previous,
                        e,
                    )));
                }
            }
            previous = Some(e.get_key());
        }

        if let (Some(upper_bound), Some(previous)) = (upper_bound, &previous) {
            if previous > upper_bound {
                return Err(SmallError::inconsistency(&format!(
                    "the last entry of {} exceeds upper bound: {} > {}",
                    self.get_pid(),
                    previous,
                    upper_bound,
                )));
            }
        }

        // a split of a page with an even capacity leaves one side an
        // entry short of half full
        if check_occupancy && depth > 0 && self.empty_slots_count() > self.max_empty_slots() + 1 {
            return Err(SmallError::inconsistency(&format!(
                "internal page {} is less than half full, entries count: {}, max entries: {}",
                self.get_pid(),
                self.entries_count(),
                self.get_max_entries(),
            )));
        }

        Ok(())
    }
}

impl BTreePage for BTreeInternalPage {
    fn get_pid(&self) -> BTreePageID {
        self.page.get_pid()
    }

    fn get_page_data(&self) -> Result<Vec<u8>, SmallError> {
        let mut writer = SmallWriter::new_reserved(self.page_size);

        writer.write(&self.page.get_parent_page_index());
        writer.write(&self.children_category.to_byte());

        let mut header_bytes = self.header.to_bytes();
        header_bytes.resize(Self::calculate_header_size(self.slot_count), 0);
        writer.write_bytes(&header_bytes);

        for key in self.keys.iter().skip(1) {
            debug_assert_eq!(key.get_type(), self.key_type);
            key.encode(&mut writer);
        }

        for child in &self.children {
            writer.write(&child.page_index);
        }

        writer.to_padded_bytes(self.page_size)
    }
}

/// All of the entries or tuples in the left child page should be less
/// than or equal to the key, and all of the entries or tuples in the
/// right child page should be greater than or equal to the key.
#[derive(Clone, Debug)]
pub struct Entry {
    key: Cell,
    left: BTreePageID,
    right: BTreePageID,

    // record position in the page
    record_id: usize,
}

impl Entry {
    pub fn new(key: Cell, left: &BTreePageID, right: &BTreePageID) -> Self {
        Self {
            key,
            left: *left,
            right: *right,

            record_id: 0,
        }
    }

    pub fn set_record_id(&mut self, record_id: usize) {
        self.record_id = record_id;
    }

    pub fn get_record_id(&self) -> usize {
        self.record_id
    }

    pub fn get_key(&self) -> Cell {
        self.key.clone()
    }

    pub fn set_key(&mut self, key: Cell) {
        self.key = key;
    }

    pub fn get_left_child(&self) -> BTreePageID {
        self.left
    }

    pub fn get_right_child(&self) -> BTreePageID {
        self.right
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {}, {})", self.key, self.left, self.right)
    }
}

pub struct BTreeInternalPageIterator<'page> {
    page: &'page BTreeInternalPage,

    cursor: usize,
    left_child_position: usize,

    reverse_cursor: usize,
    right_child_position: usize,
}

impl<'page> BTreeInternalPageIterator<'page> {
    pub fn new(page: &'page BTreeInternalPage) -> Self {
        let right_child_position = (0..page.slot_count)
            .rev()
            .find(|&i| page.is_slot_used(i))
            .unwrap_or(0);

        Self {
            page,

            cursor: 0,
            left_child_position: 0,

            reverse_cursor: right_child_position,
            right_child_position,
        }
    }
}

impl Iterator for BTreeInternalPageIterator<'_> {
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.cursor += 1;
            let cursor = self.cursor;

            if cursor >= self.page.slot_count {
                return None;
            }

            if !self.page.is_slot_used(cursor) {
                continue;
            }
            let mut e = Entry::new(
                self.page.keys[cursor].clone(),
                &self.page.children[self.left_child_position],
                &self.page.children[cursor],
            );
            e.set_record_id(cursor);

            // set left child position for next iteration
            self.left_child_position = cursor;

            return Some(e);
        }
    }
}

impl DoubleEndedIterator for BTreeInternalPageIterator<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        while let Some(left_index) = self.reverse_cursor.checked_sub(1) {
            self.reverse_cursor = left_index;
            if !self.page.is_slot_used(left_index) {
                continue;
            }

            let mut e = Entry::new(
                self.page.keys[self.right_child_position].clone(),
                &self.page.children[left_index],
                &self.page.children[self.right_child_position],
            );
            e.set_record_id(self.right_child_position);

            // set right child position for next iteration
            self.right_child_position = left_index;

            return Some(e);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::small_int_schema;

    fn leaf(index: u32) -> BTreePageID {
        BTreePageID::new(PageCategory::Leaf, 1, index)
    }

    fn new_internal(page_size: usize) -> BTreeInternalPage {
        let pid = BTreePageID::new(PageCategory::Internal, 1, 9);
        BTreeInternalPage::new(&pid, &vec![0; page_size], &small_int_schema(1, "c"), 0).unwrap()
    }

    #[test]
    fn test_max_entries() {
        assert_eq!(BTreeInternalPage::calculate_max_entries(48, 8), 3);
        let page = new_internal(48);
        assert_eq!(page.get_max_entries(), 3);
        assert_eq!(page.entries_count(), 0);
        assert_eq!(page.get_first_child_pid(), None);
    }

    #[test]
    fn test_insert_entries() {
        let mut page = new_internal(48);
        page.insert_entry(&Entry::new(Cell::Int64(20), &leaf(1), &leaf(2)))
            .unwrap();
        // right of the existing child 2
        page.insert_entry(&Entry::new(Cell::Int64(30), &leaf(2), &leaf(3)))
            .unwrap();
        // split of child 1
        page.insert_entry(&Entry::new(Cell::Int64(10), &leaf(1), &leaf(4)))
            .unwrap();
        assert!(page
            .insert_entry(&Entry::new(Cell::Int64(40), &leaf(3), &leaf(5)))
            .is_err());

        let entries: Vec<Entry> = page.iter().collect();
        let keys: Vec<Cell> = entries.iter().map(|e| e.get_key()).collect();
        assert_eq!(keys, vec![Cell::Int64(10), Cell::Int64(20), Cell::Int64(30)]);
        let children: Vec<u32> = entries
            .iter()
            .map(|e| e.get_left_child().page_index)
            .chain(std::iter::once(entries[2].get_right_child().page_index))
            .collect();
        assert_eq!(children, vec![1, 4, 2, 3]);

        assert_eq!(page.get_first_child_pid(), Some(leaf(1)));
        assert_eq!(page.get_last_child_pid(), Some(leaf(3)));
    }

    #[test]
    fn test_delete_entries() {
        let mut page = new_internal(48);
        page.insert_entry(&Entry::new(Cell::Int64(10), &leaf(1), &leaf(2)))
            .unwrap();
        page.insert_entry(&Entry::new(Cell::Int64(20), &leaf(2), &leaf(3)))
            .unwrap();

        let e = page.get_entry_by_children(Some(&leaf(1)), None).unwrap();
        page.delete_key_and_left_child(e.get_record_id());
        assert_eq!(page.entries_count(), 1);
        assert_eq!(page.get_first_child_pid(), Some(leaf(2)));

        let e = page.get_first_entry().unwrap();
        page.delete_key_and_right_child(e.get_record_id());
        assert_eq!(page.entries_count(), 0);
    }

    #[test]
    fn test_page_data() {
        let mut page = new_internal(48);
        page.insert_entry(&Entry::new(Cell::Int64(-7), &leaf(3), &leaf(4)))
            .unwrap();
        page.set_parent_pid(&BTreePageID::new(PageCategory::Internal, 1, 2));

        let data = page.get_page_data().unwrap();
        assert_eq!(data.len(), 48);

        let page =
            BTreeInternalPage::new(&page.get_pid(), &data, &small_int_schema(1, "c"), 0).unwrap();
        let e = page.get_first_entry().unwrap();
        assert_eq!(e.get_key(), Cell::Int64(-7));
        assert_eq!(e.get_left_child(), leaf(3));
        assert_eq!(e.get_right_child(), leaf(4));
        assert_eq!(page.get_parent_pid().page_index, 2);
    }
}
