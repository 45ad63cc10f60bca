use std::collections::VecDeque;

use super::SearchFor;
use crate::{
    btree::{page::BTreePageID, page_cache::DirtyPages},
    error::SmallError,
    operator::{Op, Predicate},
    storage::tuple::{Cell, WrappedTuple},
    transaction::{Permission, Transaction},
    utils::HandyRwLock,
    BTreeTable,
};

impl BTreeTable {
    /// Scan all tuples in key order, walking the leaf pages through
    /// their sibling pointers. Works from both ends.
    pub fn iter<'t>(&'t self, tx: &Transaction) -> BTreeTableIterator<'t> {
        BTreeTableIterator::new(tx, self)
    }

    /// Scan the tuples whose key matches `predicate`, in key order.
    pub fn search<'t>(
        &'t self,
        tx: &Transaction,
        predicate: &Predicate,
    ) -> Result<BTreeTableSearchIterator<'t>, SmallError> {
        BTreeTableSearchIterator::new(tx, self, predicate)
    }
}

/// The tuples of one leaf page, copied out so that no page guard is
/// held between two calls of `next`.
struct LoadedPage {
    pid: BTreePageID,
    tuples: VecDeque<WrappedTuple>,
    left_pid: Option<BTreePageID>,
    right_pid: Option<BTreePageID>,
}

fn load_page(
    table: &BTreeTable,
    tx: &Transaction,
    pid: &BTreePageID,
) -> Result<LoadedPage, SmallError> {
    let page_rc = table
        .get_page_cache()
        .get_leaf_page(tx, Permission::ReadOnly, pid)?;
    let page = page_rc.rl();
    Ok(LoadedPage {
        pid: *pid,
        tuples: page.iter().collect(),
        left_pid: page.get_left_pid(),
        right_pid: page.get_right_pid(),
    })
}

enum ScanState {
    Unstarted,

    /// `back` is `None` once both ends reached the same page, from
    /// then on both of them consume `front`.
    Scanning {
        front: LoadedPage,
        back: Option<LoadedPage>,
    },

    Finished,
}

pub struct BTreeTableIterator<'t> {
    tx: Transaction,
    table: &'t BTreeTable,
    state: ScanState,
}

impl<'t> BTreeTableIterator<'t> {
    pub fn new(tx: &Transaction, table: &'t BTreeTable) -> Self {
        Self {
            tx: *tx,
            table,
            state: ScanState::Unstarted,
        }
    }

    /// Restart the scan from both ends.
    pub fn rewind(&mut self) {
        self.state = ScanState::Unstarted;
    }

    fn start(&mut self) -> Result<(), SmallError> {
        let first_pid = match self.table.get_first_page(&self.tx, Permission::ReadOnly)? {
            Some(page_rc) => {
                let pid = page_rc.rl().get_pid();
                pid
            }
            None => {
                self.state = ScanState::Finished;
                return Ok(());
            }
        };
        let last_pid = match self.table.get_last_page(&self.tx, Permission::ReadOnly)? {
            Some(page_rc) => {
                let pid = page_rc.rl().get_pid();
                pid
            }
            None => first_pid,
        };

        let front = load_page(self.table, &self.tx, &first_pid)?;
        let back = if last_pid == first_pid {
            None
        } else {
            Some(load_page(self.table, &self.tx, &last_pid)?)
        };
        self.state = ScanState::Scanning { front, back };
        Ok(())
    }

    fn step_front(&mut self) -> Result<Option<WrappedTuple>, SmallError> {
        if let ScanState::Unstarted = self.state {
            self.start()?;
        }

        loop {
            let (front, back) = match &mut self.state {
                ScanState::Scanning { front, back } => (front, back),
                _ => return Ok(None),
            };

            if let Some(tuple) = front.tuples.pop_front() {
                return Ok(Some(tuple));
            }

            let back_pid = match back {
                Some(back) => back.pid,
                None => return Ok(None),
            };
            let right_pid = match front.right_pid {
                Some(pid) => pid,
                None => return Ok(None),
            };

            if right_pid == back_pid {
                // the two ends meet, continue on what the back end left
                // over
                if let Some(back) = back.take() {
                    *front = back;
                }
            } else {
                *front = load_page(self.table, &self.tx, &right_pid)?;
            }
        }
    }

    fn step_back(&mut self) -> Result<Option<WrappedTuple>, SmallError> {
        if let ScanState::Unstarted = self.state {
            self.start()?;
        }

        loop {
            let (front, back) = match &mut self.state {
                ScanState::Scanning { front, back } => (front, back),
                _ => return Ok(None),
            };

            let left_pid = match back {
                Some(back_page) => {
                    if let Some(tuple) = back_page.tuples.pop_back() {
                        return Ok(Some(tuple));
                    }
                    match back_page.left_pid {
                        Some(pid) => pid,
                        None => return Ok(None),
                    }
                }
                None => return Ok(front.tuples.pop_back()),
            };

            if left_pid == front.pid {
                *back = None;
            } else {
                *back = Some(load_page(self.table, &self.tx, &left_pid)?);
            }
        }
    }

    fn settle(
        &mut self,
        step: Result<Option<WrappedTuple>, SmallError>,
    ) -> Option<Result<WrappedTuple, SmallError>> {
        match step {
            Ok(Some(tuple)) => Some(Ok(tuple)),
            Ok(None) => None,
            Err(e) => {
                // the error is reported once, then the scan is over
                self.state = ScanState::Finished;
                Some(Err(e))
            }
        }
    }
}

impl Iterator for BTreeTableIterator<'_> {
    type Item = Result<WrappedTuple, SmallError>;

    fn next(&mut self) -> Option<Self::Item> {
        let step = self.step_front();
        self.settle(step)
    }
}

impl DoubleEndedIterator for BTreeTableIterator<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let step = self.step_back();
        self.settle(step)
    }
}

pub struct BTreeTableSearchIterator<'t> {
    tx: Transaction,
    table: &'t BTreeTable,
    predicate: Predicate,

    current: Option<LoadedPage>,
    started: bool,
    finished: bool,
}

impl<'t> BTreeTableSearchIterator<'t> {
    pub fn new(
        tx: &Transaction,
        table: &'t BTreeTable,
        predicate: &Predicate,
    ) -> Result<Self, SmallError> {
        if predicate.op == Op::Like {
            return Err(SmallError::invalid_argument(&format!(
                "operator {:?} is not supported on table {}",
                predicate.op, table.name
            )));
        }

        let key_type = table.get_schema().get_field_type(table.get_key_field())?;
        if predicate.cell.get_type() != key_type {
            return Err(SmallError::invalid_argument(&format!(
                "predicate \"{}\" doesn't fit key type {:?} of table {}",
                predicate, key_type, table.name
            )));
        }

        Ok(Self {
            tx: *tx,
            table,
            predicate: predicate.clone(),
            current: None,
            started: false,
            finished: false,
        })
    }

    pub fn rewind(&mut self) {
        self.current = None;
        self.started = false;
        self.finished = false;
    }

    fn start(&mut self) -> Result<(), SmallError> {
        self.started = true;

        let root_pid = match self.table.get_root_pid(&self.tx)? {
            Some(pid) => pid,
            None => {
                self.finished = true;
                return Ok(());
            }
        };

        let search = match self.predicate.op {
            Op::Equals | Op::GreaterThan | Op::GreaterThanOrEq => {
                SearchFor::Target(self.predicate.cell.clone())
            }
            _ => SearchFor::LeftMost,
        };

        let mut dirty_pages = DirtyPages::new();
        let start_rc = self.table.find_leaf_page(
            &self.tx,
            &mut dirty_pages,
            Permission::ReadOnly,
            root_pid,
            &search,
        )?;
        let start_pid = start_rc.rl().get_pid();
        self.current = Some(load_page(self.table, &self.tx, &start_pid)?);
        Ok(())
    }

    /// Whether no tuple with a key at least `key` can match.
    fn past_the_end(&self, key: &Cell) -> bool {
        match self.predicate.op {
            Op::Equals | Op::LessThanOrEq => key > &self.predicate.cell,
            Op::LessThan => key >= &self.predicate.cell,
            _ => false,
        }
    }

    fn step(&mut self) -> Result<Option<WrappedTuple>, SmallError> {
        if !self.started {
            self.start()?;
        }

        let key_field = self.table.get_key_field();
        while !self.finished {
            let next_tuple = match &mut self.current {
                Some(page) => page.tuples.pop_front(),
                None => return Ok(None),
            };

            match next_tuple {
                Some(tuple) => {
                    let key = tuple.get_cell(key_field);
                    if self.predicate.matches(&key) {
                        return Ok(Some(tuple));
                    }
                    if self.past_the_end(&key) {
                        self.finished = true;
                    }
                }
                None => {
                    let right_pid = self.current.as_ref().and_then(|page| page.right_pid);
                    match right_pid {
                        Some(pid) => {
                            self.current = Some(load_page(self.table, &self.tx, &pid)?);
                        }
                        None => self.finished = true,
                    }
                }
            }
        }
        Ok(None)
    }
}

impl Iterator for BTreeTableSearchIterator<'_> {
    type Item = Result<WrappedTuple, SmallError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.step() {
            Ok(Some(tuple)) => Some(Ok(tuple)),
            Ok(None) => None,
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
