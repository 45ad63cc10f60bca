mod base_page;
mod header_page;
mod internal_page;
mod leaf_page;
mod page_handle;
mod page_id;
mod root_pointer_page;

pub use base_page::*;
pub use header_page::*;
pub use internal_page::*;
pub use leaf_page::*;
pub use page_handle::*;
pub use page_id::*;
pub use root_pointer_page::*;

use crate::error::SmallError;

pub trait BTreePage {
    fn get_pid(&self) -> BTreePageID;

    /// The on-disk representation of the page, exactly one page long.
    fn get_page_data(&self) -> Result<Vec<u8>, SmallError>;
}
