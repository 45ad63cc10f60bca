use std::{collections::HashMap, sync::Arc};

use crate::{error::SmallError, storage::table_file::TableFile};

/// Maps a table id to its backing file, which also knows the schema
/// and the key field needed to decode the pages.
pub struct Catalog {
    map: HashMap<u32, Arc<TableFile>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub fn get_table_file(&self, table_id: u32) -> Result<Arc<TableFile>, SmallError> {
        self.map.get(&table_id).cloned().ok_or_else(|| {
            SmallError::inconsistency(&format!("table {} not found in catalog", table_id))
        })
    }

    pub fn add_table(&mut self, file: Arc<TableFile>) {
        self.map.insert(file.get_id(), file);
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}
