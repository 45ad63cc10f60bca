pub mod schema;
pub mod table_file;
pub mod tuple;

pub use schema::{small_int_schema, Field, Schema, Type};
pub use table_file::TableFile;
pub use tuple::{Cell, Tuple, WrappedTuple};
