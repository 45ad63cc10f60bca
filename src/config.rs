pub const DEFAULT_PAGE_SIZE: usize = 4096;

pub const DEFAULT_CACHE_CAPACITY: usize = 50;

pub const DEFAULT_LOG_FILE: &str = "small-btree.log";

/// Size of the root pointer page at the head of every table file:
///
/// - 4 bytes: root page index (0 for "no root")
/// - 1 byte: root page category
/// - 4 bytes: first header page index (0 for "no header")
pub const ROOT_POINTER_PAGE_SIZE: usize = 9;

/// Size of a page index stored on disk (parent, children, siblings).
pub const INDEX_SIZE: usize = 4;

/// Knobs of a `Database`. The defaults are meant for real use, tests
/// shrink pages and the cache to reach the interesting code paths
/// with a handful of tuples.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub page_size: usize,
    pub cache_capacity: usize,
    pub log_file: String,
}

impl DatabaseConfig {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_cache_capacity(mut self, cache_capacity: usize) -> Self {
        self.cache_capacity = cache_capacity;
        self
    }

    pub fn with_log_file(mut self, log_file: &str) -> Self {
        self.log_file = log_file.to_string();
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            log_file: DEFAULT_LOG_FILE.to_string(),
        }
    }
}
