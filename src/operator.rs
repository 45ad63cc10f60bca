use std::fmt;

use crate::storage::tuple::Cell;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Equals,
    GreaterThan,
    GreaterThanOrEq,
    LessThan,
    LessThanOrEq,
    Like,
    NotEquals,
}

/// A comparison between the key field of a tuple and a constant.
#[derive(Clone, Debug)]
pub struct Predicate {
    pub op: Op,
    pub cell: Cell,
}

impl Predicate {
    pub fn new(op: Op, cell: Cell) -> Self {
        Self { op, cell }
    }

    /// Evaluate `value <op> self.cell`.
    ///
    /// `Like` has no meaning for the fixed-width cells we store, it
    /// never matches.
    pub fn matches(&self, value: &Cell) -> bool {
        match self.op {
            Op::Equals => value == &self.cell,
            Op::GreaterThan => value > &self.cell,
            Op::GreaterThanOrEq => value >= &self.cell,
            Op::LessThan => value < &self.cell,
            Op::LessThanOrEq => value <= &self.cell,
            Op::NotEquals => value != &self.cell,
            Op::Like => false,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "key {:?} {}", self.op, self.cell)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches() {
        let five = Cell::Int64(5);
        assert!(Predicate::new(Op::Equals, five.clone()).matches(&Cell::Int64(5)));
        assert!(Predicate::new(Op::GreaterThan, five.clone()).matches(&Cell::Int64(6)));
        assert!(!Predicate::new(Op::GreaterThan, five.clone()).matches(&Cell::Int64(5)));
        assert!(Predicate::new(Op::LessThanOrEq, five.clone()).matches(&Cell::Int64(5)));
        assert!(Predicate::new(Op::NotEquals, five.clone()).matches(&Cell::Int64(4)));
        assert!(!Predicate::new(Op::Like, five).matches(&Cell::Int64(5)));
    }
}
