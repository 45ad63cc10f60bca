use std::sync::{Arc, RwLock};

use super::{
    BTreeHeaderPage, BTreeInternalPage, BTreeLeafPage, BTreePage, BTreePageID,
    BTreeRootPointerPage, PageCategory,
};
use crate::{
    error::SmallError,
    storage::schema::Schema,
    types::{Pod, ResultPod},
    utils::HandyRwLock,
};

/// A page of any category, as it lives in the page cache.
#[derive(Clone)]
pub enum PageHandle {
    RootPointer(Pod<BTreeRootPointerPage>),
    Header(Pod<BTreeHeaderPage>),
    Internal(Pod<BTreeInternalPage>),
    Leaf(Pod<BTreeLeafPage>),
}

impl PageHandle {
    /// Instantiate the page addressed by `pid` from its on-disk bytes.
    pub fn load(
        pid: &BTreePageID,
        bytes: &[u8],
        schema: &Schema,
        key_field: usize,
    ) -> Result<Self, SmallError> {
        let handle = match pid.category {
            PageCategory::RootPointer => {
                PageHandle::RootPointer(Arc::new(RwLock::new(BTreeRootPointerPage::new(pid, bytes)?)))
            }
            PageCategory::Header => {
                PageHandle::Header(Arc::new(RwLock::new(BTreeHeaderPage::new(pid, bytes)?)))
            }
            PageCategory::Internal => PageHandle::Internal(Arc::new(RwLock::new(
                BTreeInternalPage::new(pid, bytes, schema, key_field)?,
            ))),
            PageCategory::Leaf => PageHandle::Leaf(Arc::new(RwLock::new(BTreeLeafPage::new(
                pid, bytes, schema, key_field,
            )?))),
        };
        Ok(handle)
    }

    pub fn get_pid(&self) -> BTreePageID {
        match self {
            PageHandle::RootPointer(page) => page.rl().get_pid(),
            PageHandle::Header(page) => page.rl().get_pid(),
            PageHandle::Internal(page) => page.rl().get_pid(),
            PageHandle::Leaf(page) => page.rl().get_pid(),
        }
    }

    pub fn get_page_data(&self) -> Result<Vec<u8>, SmallError> {
        match self {
            PageHandle::RootPointer(page) => page.rl().get_page_data(),
            PageHandle::Header(page) => page.rl().get_page_data(),
            PageHandle::Internal(page) => page.rl().get_page_data(),
            PageHandle::Leaf(page) => page.rl().get_page_data(),
        }
    }

    pub fn into_root_pointer(self) -> ResultPod<BTreeRootPointerPage> {
        match self {
            PageHandle::RootPointer(page) => Ok(page),
            other => Err(other.cast_error(PageCategory::RootPointer)),
        }
    }

    pub fn into_header(self) -> ResultPod<BTreeHeaderPage> {
        match self {
            PageHandle::Header(page) => Ok(page),
            other => Err(other.cast_error(PageCategory::Header)),
        }
    }

    pub fn into_internal(self) -> ResultPod<BTreeInternalPage> {
        match self {
            PageHandle::Internal(page) => Ok(page),
            other => Err(other.cast_error(PageCategory::Internal)),
        }
    }

    pub fn into_leaf(self) -> ResultPod<BTreeLeafPage> {
        match self {
            PageHandle::Leaf(page) => Ok(page),
            other => Err(other.cast_error(PageCategory::Leaf)),
        }
    }

    fn cast_error(&self, expected: PageCategory) -> SmallError {
        SmallError::inconsistency(&format!(
            "invalid page cast, page {} is not a {:?} page",
            self.get_pid(),
            expected
        ))
    }
}
