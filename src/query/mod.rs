/// Composable queries over typed rows.
///
/// A [`Query`] is an element shape, an immutable [`Pipeline`] and the
/// [`QueryProvider`] that runs it. Composition never mutates: `filter`,
/// `sort_by` and `then_by` return new queries sharing the input pipeline.
///
/// ```text
/// Source ─> Filter ─> SortBy ─> ThenBy ─> ...
///                                  │
///              MemoryProvider (evaluate)  |  sql::to_sql (render)
/// ```
pub mod dynamic;
pub mod memory;
pub mod sql;

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::expr::LambdaExpression;
use crate::record::Entity;
use crate::shape::Shape;
use crate::value::ValueType;

pub use dynamic::{
    clear_default_configuration, default_configuration, order_by_query, select_query,
    set_default_configuration, where_query, DynamicQueryable,
};
pub use memory::MemoryProvider;
pub use sql::to_sql;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn from_ascending(ascending: bool) -> Self {
        if ascending {
            SortDirection::Ascending
        } else {
            SortDirection::Descending
        }
    }
}

/// One node of a query pipeline. Each node owns its input through an `Arc`,
/// so derived queries share their common prefix.
#[derive(Debug, Clone, PartialEq)]
pub enum Pipeline {
    Source,
    Filter {
        input: Arc<Pipeline>,
        predicate: LambdaExpression,
    },
    /// Primary sort; replaces the priority of any earlier sort.
    SortBy {
        input: Arc<Pipeline>,
        key: LambdaExpression,
        direction: SortDirection,
    },
    /// Tie-break for the sort chain that `input` ends in.
    ThenBy {
        input: Arc<Pipeline>,
        key: LambdaExpression,
        direction: SortDirection,
    },
}

impl Pipeline {
    pub fn is_ordered(&self) -> bool {
        matches!(self, Pipeline::SortBy { .. } | Pipeline::ThenBy { .. })
    }

    /// Number of nodes, `Source` included.
    pub fn depth(&self) -> usize {
        match self {
            Pipeline::Source => 1,
            Pipeline::Filter { input, .. }
            | Pipeline::SortBy { input, .. }
            | Pipeline::ThenBy { input, .. } => input.depth() + 1,
        }
    }
}

/// Runs a pipeline against some data source.
pub trait QueryProvider<T>: Send + Sync {
    fn execute(&self, pipeline: &Pipeline) -> Result<Vec<T>>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "custom"
    }
}

pub struct Query<T> {
    shape: Arc<Shape>,
    pipeline: Arc<Pipeline>,
    provider: Arc<dyn QueryProvider<T>>,
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            shape: Arc::clone(&self.shape),
            pipeline: Arc::clone(&self.pipeline),
            provider: Arc::clone(&self.provider),
        }
    }
}

impl<T> fmt::Debug for Query<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("shape", &self.shape.name())
            .field("provider", &self.provider.name())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

impl<T> Query<T>
where
    T: Entity + Clone + Send + Sync + 'static,
{
    /// In-memory query over `rows`.
    pub fn from_vec(shape: Arc<Shape>, rows: Vec<T>) -> Self {
        Self::with_provider(shape, Arc::new(MemoryProvider::new(rows)))
    }
}

impl<T> Query<T> {
    pub fn with_provider(shape: Arc<Shape>, provider: Arc<dyn QueryProvider<T>>) -> Self {
        Self {
            shape,
            pipeline: Arc::new(Pipeline::Source),
            provider,
        }
    }

    /// Element shape.
    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    fn derive(&self, node: Pipeline) -> Self {
        Self {
            shape: Arc::clone(&self.shape),
            pipeline: Arc::new(node),
            provider: Arc::clone(&self.provider),
        }
    }

    /// Keep rows for which `predicate` is true.
    pub fn filter(&self, predicate: LambdaExpression) -> Result<Self> {
        self.check_selector(&predicate)?;
        if predicate.result_type() != ValueType::Boolean {
            return Err(Error::Execution(format!(
                "filter predicate must be bool, found {}",
                predicate.result_type()
            )));
        }
        debug!(shape = self.shape.name(), "filter");
        Ok(self.derive(Pipeline::Filter {
            input: Arc::clone(&self.pipeline),
            predicate,
        }))
    }

    /// Sort by `key`. Earlier sorts become tie-breakers.
    pub fn sort_by(&self, key: LambdaExpression, direction: SortDirection) -> Result<Self> {
        self.check_selector(&key)?;
        debug!(shape = self.shape.name(), ?direction, "sort_by");
        Ok(self.derive(Pipeline::SortBy {
            input: Arc::clone(&self.pipeline),
            key,
            direction,
        }))
    }

    /// Add a tie-break to the current sort. Fails unless the pipeline ends
    /// in `sort_by` or `then_by`.
    pub fn then_by(&self, key: LambdaExpression, direction: SortDirection) -> Result<Self> {
        if !self.pipeline.is_ordered() {
            return Err(Error::Execution(
                "then_by requires an ordered query; call sort_by first".into(),
            ));
        }
        self.check_selector(&key)?;
        debug!(shape = self.shape.name(), ?direction, "then_by");
        Ok(self.derive(Pipeline::ThenBy {
            input: Arc::clone(&self.pipeline),
            key,
            direction,
        }))
    }

    pub fn execute(&self) -> Result<Vec<T>> {
        debug!(
            shape = self.shape.name(),
            provider = self.provider.name(),
            depth = self.pipeline.depth(),
            "executing query"
        );
        self.provider.execute(&self.pipeline)
    }

    fn check_selector(&self, lambda: &LambdaExpression) -> Result<()> {
        match lambda.parameters() {
            [p] if Arc::ptr_eq(&p.shape, &self.shape) || *p.shape == *self.shape => Ok(()),
            [p] if p.shape.name() == self.shape.name() => Err(Error::Execution(format!(
                "lambda over a different shape named '{}' cannot be applied to this query",
                p.shape.name()
            ))),
            [p] => Err(Error::Execution(format!(
                "lambda over '{}' cannot be applied to a query over '{}'",
                p.shape.name(),
                self.shape.name()
            ))),
            params => Err(Error::Execution(format!(
                "query lambdas take one parameter, found {}",
                params.len()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{DynamicExpression, Parameter};
    use crate::mapping::MappingConfiguration;
    use crate::record::Record;
    use crate::value::Value;

    fn shape() -> Arc<Shape> {
        Shape::new("Person")
            .with_member("Name", ValueType::String)
            .with_member("Age", ValueType::Integer)
            .into_shared()
    }

    fn lambda(text: &str, result_type: Option<ValueType>) -> LambdaExpression {
        DynamicExpression::parse_lambda(
            &MappingConfiguration::new(),
            &shape(),
            None,
            result_type,
            text,
            &[],
        )
        .unwrap()
    }

    fn people() -> Query<Record> {
        Query::from_vec(
            shape(),
            vec![
                Record::new().with("Name", "B").with("Age", 30),
                Record::new().with("Name", "A").with("Age", 30),
                Record::new().with("Name", "C").with("Age", 20),
            ],
        )
    }

    fn names(rows: &[Record]) -> Vec<String> {
        rows.iter()
            .map(|r| r.get("Name").and_then(Value::as_str).unwrap_or("").to_string())
            .collect()
    }

    #[test]
    fn test_composition_does_not_mutate_input() {
        let query = people();
        let filtered = query.filter(lambda("Age > 25", Some(ValueType::Boolean))).unwrap();
        assert_eq!(*query.pipeline().as_ref(), Pipeline::Source);
        assert_eq!(filtered.pipeline().depth(), 2);
        assert_eq!(query.execute().unwrap().len(), 3);
        assert_eq!(filtered.execute().unwrap().len(), 2);
    }

    #[test]
    fn test_filter_requires_boolean() {
        let err = people().filter(lambda("Age + 1", None)).unwrap_err();
        assert!(matches!(err, Error::Execution(_)));
    }

    #[test]
    fn test_then_by_requires_ordering() {
        let err = people()
            .then_by(lambda("Name", None), SortDirection::Ascending)
            .unwrap_err();
        assert!(err.to_string().contains("sort_by"));
    }

    #[test]
    fn test_sort_then_by() {
        let rows = people()
            .sort_by(lambda("Age", None), SortDirection::Descending)
            .unwrap()
            .then_by(lambda("Name", None), SortDirection::Ascending)
            .unwrap()
            .execute()
            .unwrap();
        assert_eq!(names(&rows), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_lambda_over_other_shape_is_rejected() {
        let other = Shape::new("Other")
            .with_member("Age", ValueType::Integer)
            .into_shared();
        let foreign = DynamicExpression::parse_lambda(
            &MappingConfiguration::new(),
            &other,
            None,
            Some(ValueType::Boolean),
            "Age > 1",
            &[],
        )
        .unwrap();
        assert!(people().filter(foreign).is_err());
    }

    #[test]
    fn test_lambda_over_same_named_shape_with_other_members_is_rejected() {
        let impostor = Shape::new("Person")
            .with_member("Name", ValueType::String)
            .with_member("Email", ValueType::String)
            .into_shared();
        let foreign = DynamicExpression::parse_lambda(
            &MappingConfiguration::new(),
            &impostor,
            None,
            Some(ValueType::Boolean),
            "Email = 'a@b.c'",
            &[],
        )
        .unwrap();
        let err = people().filter(foreign).unwrap_err();
        assert!(err.to_string().contains("different shape named 'Person'"));
    }

    #[test]
    fn test_two_parameter_lambda_is_rejected() {
        let pair = DynamicExpression::parse_lambda_with_parameters(
            &MappingConfiguration::new(),
            vec![Parameter::new("a", shape()), Parameter::new("b", shape())],
            None,
            Some(ValueType::Boolean),
            "a.Age > b.Age",
            &[],
        )
        .unwrap();
        assert!(people().filter(pair).is_err());
    }

    #[test]
    fn test_sort_direction_from_ascending() {
        assert_eq!(SortDirection::from_ascending(true), SortDirection::Ascending);
        assert_eq!(SortDirection::from_ascending(false), SortDirection::Descending);
    }
}
