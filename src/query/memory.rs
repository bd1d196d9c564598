//! Evaluates pipelines over rows held in memory.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::Result;
use crate::expr::LambdaExpression;
use crate::record::Entity;
use crate::value::Value;

use super::{Pipeline, QueryProvider, SortDirection};

/// Filters keep input order; sorts are stable.
#[derive(Debug, Clone)]
pub struct MemoryProvider<T> {
    rows: Arc<Vec<T>>,
}

impl<T> MemoryProvider<T> {
    pub fn new(rows: Vec<T>) -> Self {
        Self {
            rows: Arc::new(rows),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<T> QueryProvider<T> for MemoryProvider<T>
where
    T: Entity + Clone + Send + Sync,
{
    fn execute(&self, pipeline: &Pipeline) -> Result<Vec<T>> {
        match pipeline {
            Pipeline::Source => Ok(self.rows.as_ref().clone()),
            Pipeline::Filter { input, predicate } => {
                let rows = self.execute(input)?;
                let mut kept = Vec::with_capacity(rows.len());
                for row in rows {
                    // Null and false both drop the row.
                    if predicate.evaluate(&row)? == Value::Boolean(true) {
                        kept.push(row);
                    }
                }
                Ok(kept)
            }
            Pipeline::SortBy { .. } | Pipeline::ThenBy { .. } => {
                let (input, keys) = sort_chain(pipeline);
                let rows = self.execute(input)?;
                sort_rows(rows, &keys)
            }
        }
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Walk back from a sort node to the `SortBy` that starts its chain.
/// Returns that node's input and the keys, primary first.
fn sort_chain(pipeline: &Pipeline) -> (&Pipeline, Vec<(&LambdaExpression, SortDirection)>) {
    let mut keys = Vec::new();
    let mut node = pipeline;
    loop {
        match node {
            Pipeline::ThenBy {
                input,
                key,
                direction,
            } => {
                keys.push((key, *direction));
                node = &**input;
            }
            Pipeline::SortBy {
                input,
                key,
                direction,
            } => {
                keys.push((key, *direction));
                keys.reverse();
                return (&**input, keys);
            }
            // then_by only composes onto an ordered pipeline.
            other => {
                keys.reverse();
                return (other, keys);
            }
        }
    }
}

fn sort_rows<T: Entity>(
    rows: Vec<T>,
    keys: &[(&LambdaExpression, SortDirection)],
) -> Result<Vec<T>> {
    let mut keyed = rows
        .into_iter()
        .map(|row| {
            let values = keys
                .iter()
                .map(|(key, _)| key.evaluate(&row))
                .collect::<Result<Vec<Value>>>()?;
            Ok((values, row))
        })
        .collect::<Result<Vec<_>>>()?;

    keyed.sort_by(|(a, _), (b, _)| {
        for ((x, y), (_, direction)) in a.iter().zip(b).zip(keys) {
            let ord = match direction {
                SortDirection::Ascending => x.sort_cmp(y),
                SortDirection::Descending => y.sort_cmp(x),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });

    Ok(keyed.into_iter().map(|(_, row)| row).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::DynamicExpression;
    use crate::mapping::MappingConfiguration;
    use crate::query::Query;
    use crate::record::Record;
    use crate::shape::Shape;
    use crate::value::ValueType;

    fn shape() -> Arc<Shape> {
        Shape::new("Item")
            .with_member("Id", ValueType::Integer)
            .with_member("Group", ValueType::String)
            .with_member("Rank", ValueType::Integer)
            .into_shared()
    }

    fn key(text: &str) -> LambdaExpression {
        DynamicExpression::parse_lambda(&MappingConfiguration::new(), &shape(), None, None, text, &[])
            .unwrap()
    }

    fn item(id: i64, group: &str, rank: Option<i64>) -> Record {
        Record::new()
            .with("Id", id)
            .with("Group", group)
            .with("Rank", rank)
    }

    fn ids(rows: &[Record]) -> Vec<i64> {
        rows.iter()
            .filter_map(|r| match r.get("Id") {
                Some(Value::Integer(i)) => Some(*i),
                _ => None,
            })
            .collect()
    }

    fn items() -> Query<Record> {
        Query::from_vec(
            shape(),
            vec![
                item(1, "b", Some(2)),
                item(2, "a", None),
                item(3, "b", Some(1)),
                item(4, "a", Some(2)),
            ],
        )
    }

    #[test]
    fn test_sort_is_stable() {
        let rows = items()
            .sort_by(key("Group"), SortDirection::Ascending)
            .unwrap()
            .execute()
            .unwrap();
        assert_eq!(ids(&rows), vec![2, 4, 1, 3]);
    }

    #[test]
    fn test_nulls_sort_first_ascending() {
        let rows = items()
            .sort_by(key("Rank"), SortDirection::Ascending)
            .unwrap()
            .execute()
            .unwrap();
        assert_eq!(ids(&rows), vec![2, 3, 1, 4]);
    }

    #[test]
    fn test_later_sort_by_takes_priority() {
        let rows = items()
            .sort_by(key("Rank"), SortDirection::Descending)
            .unwrap()
            .sort_by(key("Group"), SortDirection::Ascending)
            .unwrap()
            .execute()
            .unwrap();
        // Group first, then the earlier Rank desc order inside each group.
        assert_eq!(ids(&rows), vec![4, 2, 1, 3]);
    }

    #[test]
    fn test_filter_after_sort_keeps_order() {
        let predicate = DynamicExpression::parse_lambda(
            &MappingConfiguration::new(),
            &shape(),
            None,
            Some(ValueType::Boolean),
            "Rank >= 1",
            &[],
        )
        .unwrap();
        let rows = items()
            .sort_by(key("Id"), SortDirection::Descending)
            .unwrap()
            .filter(predicate)
            .unwrap()
            .execute()
            .unwrap();
        // Row 2 has a null rank and is dropped.
        assert_eq!(ids(&rows), vec![4, 3, 1]);
    }

    #[test]
    fn test_evaluation_error_propagates() {
        let predicate = DynamicExpression::parse_lambda(
            &MappingConfiguration::new(),
            &shape(),
            None,
            Some(ValueType::Boolean),
            "Id / 0 > 1",
            &[],
        )
        .unwrap();
        let err = items().filter(predicate).unwrap().execute().unwrap_err();
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn test_provider_len() {
        let provider = MemoryProvider::new(vec![item(1, "a", None)]);
        assert_eq!(provider.len(), 1);
        assert!(!provider.is_empty());
        assert_eq!(QueryProvider::<Record>::name(&provider), "memory");
    }
}
