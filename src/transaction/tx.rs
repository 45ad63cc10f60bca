use core::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

pub type TransactionID = u32;

static TRANSACTION_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    Aborted,
    Committed,
}

/// A handle of a running transaction, created by
/// `Database::begin_transaction`.
///
/// A transaction must only be driven by one thread at a time.
#[derive(Eq, PartialEq, Clone, Copy, Hash, Debug)]
pub struct Transaction {
    // increase monotonically by 1
    id: TransactionID,
}

impl Transaction {
    pub(crate) fn new() -> Self {
        let id = TRANSACTION_ID.fetch_add(1, Ordering::Relaxed);
        Self { id }
    }

    pub fn get_id(&self) -> TransactionID {
        self.id
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "tx_{}", self.id)
    }
}
