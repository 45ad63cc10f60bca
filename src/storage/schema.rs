use std::fmt;

use crate::error::SmallError;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Type {
    Bool,
    Int64,
}

impl Type {
    /// Get the size of the type in bytes.
    pub fn size(&self) -> usize {
        match self {
            Type::Bool => 1,
            Type::Int64 => 8,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Field {
    pub name: String,
    pub t: Type,
}

impl Field {
    pub fn new(field_name: &str, field_type: Type) -> Field {
        Field {
            name: field_name.to_string(),
            t: field_type,
        }
    }
}

/// Fixed-width row layout shared by every tuple of a table.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// get tuple size in bytes
    pub fn get_size(&self) -> usize {
        self.fields.iter().map(|f| f.t.size()).sum()
    }

    pub fn fields_count(&self) -> usize {
        self.fields.len()
    }

    pub fn get_field_type(&self, index: usize) -> Result<Type, SmallError> {
        self.fields.get(index).map(|f| f.t).ok_or_else(|| {
            SmallError::invalid_argument(&format!(
                "field index {} out of range, schema has {} fields",
                index,
                self.fields.len()
            ))
        })
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|field| format!("{}: {:?}", field.name, field.t))
            .collect();
        write!(f, "({})", fields.join(", "))
    }
}

/// A schema of `width` Int64 columns named `{prefix}{i}`.
pub fn small_int_schema(width: usize, prefix: &str) -> Schema {
    let fields = (0..width)
        .map(|i| Field::new(&format!("{}{}", prefix, i), Type::Int64))
        .collect();
    Schema::new(fields)
}
