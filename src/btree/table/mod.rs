mod delete;
mod free_page;
mod insert;
mod table;
mod table_iter;

pub use table::{BTreeTable, SearchFor};
pub use table_iter::{BTreeTableIterator, BTreeTableSearchIterator};
