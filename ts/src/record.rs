//! The `Record` trait and the secondary-index types `Store` filters on.

use std::collections::HashMap;
use std::fmt;

/// A value a [`Record`] exposes for secondary indexing and filtering.
///
/// Only scalar shapes are supported; anything richer belongs in the record
/// body itself, not the index.
#[derive(Debug, Clone, PartialEq, PartialOrd)]
pub enum IndexValue {
    String(String),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for IndexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexValue::String(s) => write!(f, "{s}"),
            IndexValue::Int(i) => write!(f, "{i}"),
            IndexValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Anything that can be persisted through a [`crate::Store`].
///
/// `kind()` names the record's table/collection (e.g. `"project"`,
/// `"task"`, `"plan"`); `id()` must be stable and unique within that kind.
/// `indexed_fields()` declares what `Filter`s can query without deserializing
/// every record body.
pub trait Record: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> &str;
    fn indexed_fields(&self) -> HashMap<String, IndexValue>;
}

/// Comparison applied by a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
}

/// A single equality/inequality constraint evaluated against a record's
/// indexed fields.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: IndexValue,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: IndexValue) -> Self {
        Self { field: field.into(), op: FilterOp::Eq, value }
    }

    pub fn ne(field: impl Into<String>, value: IndexValue) -> Self {
        Self { field: field.into(), op: FilterOp::Ne, value }
    }

    pub fn matches(&self, fields: &HashMap<String, IndexValue>) -> bool {
        let actual = fields.get(&self.field);
        match self.op {
            FilterOp::Eq => actual == Some(&self.value),
            FilterOp::Ne => actual != Some(&self.value),
        }
    }
}
