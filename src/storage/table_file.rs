use std::{
    collections::hash_map::DefaultHasher,
    fs,
    hash::{Hash, Hasher},
    path::{Path, PathBuf},
    sync::Mutex,
};

use log::debug;

use crate::{
    btree::page::{BTreePageID, PageCategory},
    config::ROOT_POINTER_PAGE_SIZE,
    error::SmallError,
    io::SmallFile,
    storage::schema::Schema,
    types::SmallResult,
    utils::HandyMutex,
};

/// The backing file of one B+ tree.
///
/// # Binary Layout
///
/// - `ROOT_POINTER_PAGE_SIZE` bytes: the root pointer page
/// - a sequence of `page_size` pages, page `n` (start from 1) lives at
///   `ROOT_POINTER_PAGE_SIZE + (n - 1) * page_size`
///
/// Pages carry no category tag, the category is part of the id used to
/// address them.
pub struct TableFile {
    table_id: u32,
    path: PathBuf,
    file: Mutex<SmallFile>,
    page_size: usize,
    schema: Schema,
    key_field: usize,
}

impl TableFile {
    /// Open the file at `path`, an empty (or missing) file is
    /// initialized with a root pointer page and one empty leaf page.
    pub fn open<P: AsRef<Path>>(
        path: P,
        schema: &Schema,
        key_field: usize,
        page_size: usize,
    ) -> Result<Self, SmallError> {
        schema.get_field_type(key_field)?;

        let mut file = SmallFile::new(path.as_ref())?;
        let path = fs::canonicalize(path.as_ref())?;
        let table_id = Self::hash_path(&path);

        if file.get_size()? == 0 {
            file.write_at(0, &vec![0; ROOT_POINTER_PAGE_SIZE])?;
            file.write_at(ROOT_POINTER_PAGE_SIZE as u64, &vec![0; page_size])?;
            file.flush()?;
            debug!("table file {:?} initialized, table id: {}", path, table_id);
        }

        Ok(Self {
            table_id,
            path,
            file: Mutex::new(file),
            page_size,
            schema: schema.clone(),
            key_field,
        })
    }

    fn hash_path(path: &Path) -> u32 {
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        hasher.finish() as u32
    }

    pub fn get_id(&self) -> u32 {
        self.table_id
    }

    pub fn get_path(&self) -> &Path {
        &self.path
    }

    pub fn get_page_size(&self) -> usize {
        self.page_size
    }

    pub fn get_schema(&self) -> &Schema {
        &self.schema
    }

    pub fn get_key_field(&self) -> usize {
        self.key_field
    }

    fn page_offset(&self, pid: &BTreePageID) -> Result<u64, SmallError> {
        match pid.category {
            PageCategory::RootPointer => Ok(0),
            _ => {
                if pid.page_index == 0 {
                    return Err(SmallError::inconsistency(&format!(
                        "page index 0 is reserved for the root pointer, got {}",
                        pid
                    )));
                }
                Ok(ROOT_POINTER_PAGE_SIZE as u64
                    + (pid.page_index as u64 - 1) * self.page_size as u64)
            }
        }
    }

    fn page_len(&self, pid: &BTreePageID) -> usize {
        match pid.category {
            PageCategory::RootPointer => ROOT_POINTER_PAGE_SIZE,
            _ => self.page_size,
        }
    }

    pub fn read_page(&self, pid: &BTreePageID) -> Result<Vec<u8>, SmallError> {
        let offset = self.page_offset(pid)?;
        self.file.ml().read_at(offset, self.page_len(pid))
    }

    pub fn write_page(&self, pid: &BTreePageID, bytes: &[u8]) -> SmallResult {
        if bytes.len() != self.page_len(pid) {
            return Err(SmallError::inconsistency(&format!(
                "page {} has {} bytes, expect {}",
                pid,
                bytes.len(),
                self.page_len(pid)
            )));
        }

        let offset = self.page_offset(pid)?;
        let mut file = self.file.ml();
        file.write_at(offset, bytes)?;
        file.flush()
    }

    /// Grow the file by one zeroed page, returns the index of the new
    /// page.
    pub fn append_empty_page(&self) -> Result<u32, SmallError> {
        let mut file = self.file.ml();
        let size = file.get_size()?;
        let index = Self::count_pages(size, self.page_size) + 1;
        let offset = ROOT_POINTER_PAGE_SIZE as u64 + (index as u64 - 1) * self.page_size as u64;
        file.write_at(offset, &vec![0; self.page_size])?;
        file.flush()?;
        Ok(index)
    }

    /// Number of pages in the file, the root pointer page excluded.
    pub fn pages_count(&self) -> Result<u32, SmallError> {
        let size = self.file.ml().get_size()?;
        Ok(Self::count_pages(size, self.page_size))
    }

    fn count_pages(file_size: u64, page_size: usize) -> u32 {
        (file_size.saturating_sub(ROOT_POINTER_PAGE_SIZE as u64) / page_size as u64) as u32
    }
}
