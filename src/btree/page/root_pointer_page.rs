use std::io::Cursor;

use super::{BTreePage, BTreePageID, PageCategory, EMPTY_PAGE_ID};
use crate::{
    config::ROOT_POINTER_PAGE_SIZE,
    error::SmallError,
    io::{read_into, SmallWriter},
};

/// The entry point of a B+ tree file.
///
/// # Binary Layout
///
/// - 4 bytes: root page index (0 if the tree has no root yet)
/// - 1 byte: root page category (leaf/internal)
/// - 4 bytes: first header page index (0 if there is no header page)
pub struct BTreeRootPointerPage {
    pid: BTreePageID,

    root_pid: Option<BTreePageID>,

    header_page_index: u32,
}

impl BTreeRootPointerPage {
    pub fn new(pid: &BTreePageID, bytes: &[u8]) -> Result<Self, SmallError> {
        let mut reader = Cursor::new(bytes);

        let root_page_index: u32 = read_into(&mut reader)?;
        let root_category = PageCategory::from_byte(read_into(&mut reader)?)?;
        let header_page_index: u32 = read_into(&mut reader)?;

        let root_pid = if root_page_index == EMPTY_PAGE_ID {
            None
        } else {
            match root_category {
                PageCategory::Leaf | PageCategory::Internal => Some(BTreePageID::new(
                    root_category,
                    pid.get_table_id(),
                    root_page_index,
                )),
                _ => {
                    return Err(SmallError::inconsistency(&format!(
                        "root page must be a leaf or internal page, got {:?}",
                        root_category
                    )))
                }
            }
        };

        Ok(Self {
            pid: *pid,
            root_pid,
            header_page_index,
        })
    }

    pub fn get_root_pid(&self) -> Option<BTreePageID> {
        self.root_pid
    }

    pub fn set_root_pid(&mut self, pid: &BTreePageID) {
        self.root_pid = Some(*pid);
    }

    /// Get the id of the first header page
    pub fn get_header_pid(&self) -> Option<BTreePageID> {
        if self.header_page_index == EMPTY_PAGE_ID {
            None
        } else {
            Some(BTreePageID::new(
                PageCategory::Header,
                self.pid.get_table_id(),
                self.header_page_index,
            ))
        }
    }

    /// Set the page id of the first header page
    pub fn set_header_pid(&mut self, pid: &BTreePageID) {
        self.header_page_index = pid.page_index;
    }
}

impl BTreePage for BTreeRootPointerPage {
    fn get_pid(&self) -> BTreePageID {
        self.pid
    }

    fn get_page_data(&self) -> Result<Vec<u8>, SmallError> {
        let mut writer = SmallWriter::new_reserved(ROOT_POINTER_PAGE_SIZE);
        match self.root_pid {
            Some(root_pid) => {
                writer.write(&root_pid.page_index);
                writer.write(&root_pid.category.to_byte());
            }
            None => {
                writer.write(&EMPTY_PAGE_ID);
                writer.write(&0u8);
            }
        }
        writer.write(&self.header_page_index);
        writer.to_padded_bytes(ROOT_POINTER_PAGE_SIZE)
    }
}
