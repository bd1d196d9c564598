//! Element access for query sources.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::shape::Shape;
use crate::value::{Value, ValueType};

/// Anything a query can run over: exposes member values by canonical name.
///
/// Expressions resolve member names against a [`Shape`] at parse time, so
/// `member` is only ever called with names the shape declares. Returning
/// `None` is treated as null.
pub trait Entity {
    fn member(&self, name: &str) -> Option<Value>;
}

/// A dynamically shaped row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Build a record from a JSON object.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::Execution(format!("expected a JSON object, got {}", value)))?;
        let mut record = Record::new();
        for (k, v) in obj {
            record.insert(k.clone(), Value::from_json(v)?);
        }
        Ok(record)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let obj: serde_json::Map<String, serde_json::Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        serde_json::Value::Object(obj)
    }
}

impl Entity for Record {
    fn member(&self, name: &str) -> Option<Value> {
        self.values
            .get(name)
            .or_else(|| {
                self.values
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .cloned()
    }
}

impl<T: Entity + ?Sized> Entity for &T {
    fn member(&self, name: &str) -> Option<Value> {
        (**self).member(name)
    }
}

/// Infer a shape from rows. A member takes the type of its first non-null
/// value; integers and floats mixed in one column widen to float; columns
/// that are null everywhere become strings.
pub fn infer_shape(name: &str, rows: &[Record]) -> Shape {
    let mut types: BTreeMap<&str, ValueType> = BTreeMap::new();
    for row in rows {
        for (k, v) in row.iter() {
            let entry = types.entry(k.as_str()).or_insert(ValueType::Null);
            *entry = entry.unify(v.value_type()).unwrap_or(*entry);
        }
    }
    types.into_iter().fold(Shape::new(name), |shape, (k, ty)| {
        let ty = if ty == ValueType::Null {
            ValueType::String
        } else {
            ty
        };
        shape.with_member(k, ty)
    })
}
