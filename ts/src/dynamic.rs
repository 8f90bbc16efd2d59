//! A schema-less [`Record`] for ad-hoc use from the `taskstore` CLI and for
//! prototyping before a caller defines its own typed record.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::record::{IndexValue, Record};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DynamicRecord {
    pub id: String,
    pub kind: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record for DynamicRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        &self.kind
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        self.fields
            .iter()
            .filter_map(|(k, v)| {
                let indexed = match v {
                    Value::String(s) => IndexValue::String(s.clone()),
                    Value::Bool(b) => IndexValue::Bool(*b),
                    Value::Number(n) => IndexValue::Int(n.as_i64()?),
                    _ => return None,
                };
                Some((k.clone(), indexed))
            })
            .collect()
    }
}
