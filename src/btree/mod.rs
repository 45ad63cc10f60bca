pub mod catalog;
pub mod page;
pub mod page_cache;
pub mod table;
