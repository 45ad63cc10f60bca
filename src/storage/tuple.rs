use std::{fmt, io::Read, ops::Deref};

use crate::{
    btree::page::BTreePageID,
    error::SmallError,
    io::{read_into, Encodeable, SmallWriter},
    storage::schema::{Schema, Type},
};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Cell {
    Int64(i64),
    Bool(bool),
}

impl Cell {
    pub fn get_type(&self) -> Type {
        match self {
            Cell::Int64(_) => Type::Int64,
            Cell::Bool(_) => Type::Bool,
        }
    }

    pub fn decode_from<R: Read>(reader: &mut R, t: &Type) -> Result<Self, SmallError> {
        match t {
            Type::Int64 => Ok(Cell::Int64(read_into(reader)?)),
            Type::Bool => Ok(Cell::Bool(read_into(reader)?)),
        }
    }
}

impl Encodeable for Cell {
    fn encode(&self, writer: &mut SmallWriter) {
        match self {
            Cell::Int64(v) => v.encode(writer),
            Cell::Bool(v) => v.encode(writer),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Cell::Int64(v) => write!(f, "{}", v),
            Cell::Bool(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    cells: Vec<Cell>,
}

impl Tuple {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    /// A tuple of `width` Int64 cells, all holding `value`.
    pub fn new_int_tuples(value: i64, width: usize) -> Self {
        Self::new(vec![Cell::Int64(value); width])
    }

    pub fn get_cell(&self, i: usize) -> Cell {
        self.cells[i].clone()
    }

    /// Check the tuple has exactly the shape described by `schema`.
    pub fn check_schema(&self, schema: &Schema) -> Result<(), SmallError> {
        if self.cells.len() != schema.fields_count() {
            return Err(SmallError::invalid_argument(&format!(
                "tuple {} has {} cells, schema {} expects {}",
                self,
                self.cells.len(),
                schema,
                schema.fields_count(),
            )));
        }

        for (cell, field) in self.cells.iter().zip(schema.fields.iter()) {
            if cell.get_type() != field.t {
                return Err(SmallError::invalid_argument(&format!(
                    "cell {} doesn't match field {} ({:?})",
                    cell, field.name, field.t,
                )));
            }
        }
        Ok(())
    }

    pub fn decode_from<R: Read>(reader: &mut R, schema: &Schema) -> Result<Self, SmallError> {
        let mut cells = Vec::with_capacity(schema.fields_count());
        for field in &schema.fields {
            cells.push(Cell::decode_from(reader, &field.t)?);
        }
        Ok(Self::new(cells))
    }
}

impl Encodeable for Tuple {
    fn encode(&self, writer: &mut SmallWriter) {
        for cell in &self.cells {
            cell.encode(writer);
        }
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let cells: Vec<String> = self.cells.iter().map(|c| c.to_string()).collect();
        write!(f, "{{{}}}", cells.join(", "))
    }
}

/// A tuple together with the place it was read from, used to find it
/// again on delete.
#[derive(Debug, Clone, PartialEq)]
pub struct WrappedTuple {
    internal: Tuple,
    slot_number: usize,
    pid: BTreePageID,
}

impl Deref for WrappedTuple {
    type Target = Tuple;

    fn deref(&self) -> &Self::Target {
        &self.internal
    }
}

impl WrappedTuple {
    pub fn new(internal: Tuple, slot_number: usize, pid: BTreePageID) -> WrappedTuple {
        WrappedTuple {
            internal,
            slot_number,
            pid,
        }
    }

    pub fn get_slot_number(&self) -> usize {
        self.slot_number
    }

    pub fn get_pid(&self) -> BTreePageID {
        self.pid
    }

    pub fn get_tuple(&self) -> &Tuple {
        &self.internal
    }
}

impl fmt::Display for WrappedTuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}#{}", self.internal, self.pid, self.slot_number)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::storage::schema::{small_int_schema, Field};

    #[test]
    fn test_tuple_codec() {
        let schema = Schema::new(vec![
            Field::new("id", Type::Int64),
            Field::new("flag", Type::Bool),
        ]);
        let tuple = Tuple::new(vec![Cell::Int64(-3), Cell::Bool(true)]);
        let bytes = tuple.to_bytes();
        assert_eq!(bytes.len(), schema.get_size());

        let decoded = Tuple::decode_from(&mut Cursor::new(bytes), &schema).unwrap();
        assert_eq!(decoded, tuple);
    }

    #[test]
    fn test_check_schema() {
        let schema = small_int_schema(2, "c");
        assert!(Tuple::new_int_tuples(1, 2).check_schema(&schema).is_ok());
        assert!(Tuple::new_int_tuples(1, 3).check_schema(&schema).is_err());
        assert!(Tuple::new(vec![Cell::Int64(1), Cell::Bool(false)])
            .check_schema(&schema)
            .is_err());
    }

    #[test]
    fn test_cell_order() {
        assert!(Cell::Int64(-1) < Cell::Int64(0));
        assert!(Cell::Int64(i64::MAX) > Cell::Int64(i64::MIN));
    }
}
