mod concurrent_status;
mod tx;
mod wait_for_graph;

pub use concurrent_status::{ConcurrentStatus, Lock, LockState, Permission};
pub use tx::{Transaction, TransactionID, TransactionStatus};
