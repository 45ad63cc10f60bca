use std::fmt;

use crate::error::SmallError;

pub const EMPTY_PAGE_ID: u32 = 0;

#[derive(PartialEq, Copy, Clone, Eq, Hash, Debug)]
pub enum PageCategory {
    RootPointer,
    Internal,
    Leaf,
    Header,
}

impl PageCategory {
    /// serialize to 1 byte
    pub fn to_byte(&self) -> u8 {
        match self {
            PageCategory::RootPointer => 0,
            PageCategory::Internal => 1,
            PageCategory::Leaf => 2,
            PageCategory::Header => 3,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, SmallError> {
        match byte {
            0 => Ok(PageCategory::RootPointer),
            1 => Ok(PageCategory::Internal),
            2 => Ok(PageCategory::Leaf),
            3 => Ok(PageCategory::Header),
            _ => Err(SmallError::inconsistency(&format!(
                "invalid page category: {}",
                byte
            ))),
        }
    }
}

// PageID identifies a unique page, and contains the
// necessary metadata
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct BTreePageID {
    /// category indicates the category of the page
    pub category: PageCategory,

    /// page_index represents the position of the page in
    /// the table, 0 is the root pointer page, other pages
    /// start from 1
    pub page_index: u32,

    pub table_id: u32,
}

impl fmt::Display for BTreePageID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}_{}", self.category, self.page_index)
    }
}

impl fmt::Debug for BTreePageID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl BTreePageID {
    pub fn new(category: PageCategory, table_id: u32, page_index: u32) -> Self {
        Self {
            category,
            page_index,
            table_id,
        }
    }

    pub fn get_root_ptr_page_id(table_id: u32) -> Self {
        BTreePageID::new(PageCategory::RootPointer, table_id, EMPTY_PAGE_ID)
    }

    pub fn get_table_id(&self) -> u32 {
        self.table_id
    }

    pub fn get_short_repr(&self) -> String {
        format!("{:?}_{}", self.category, self.page_index)
    }
}
