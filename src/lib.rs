pub mod btree;
pub mod config;
pub mod io;
pub mod storage;
pub mod transaction;
pub mod tx_log;
pub mod types;
pub mod utils;

mod database;
mod error;
mod log;
mod operator;

pub use btree::{
    page_cache::PageCache,
    table::{BTreeTable, BTreeTableIterator, BTreeTableSearchIterator},
};
pub use config::DatabaseConfig;
pub use database::Database;
pub use error::{ErrorKind, SmallError};
pub use operator::{Op, Predicate};
pub use storage::{Cell, Field, Schema, Tuple, Type, WrappedTuple};
pub use transaction::{Permission, Transaction, TransactionStatus};
