//! String-based `where`, `order by` and `select` over [`Query`] values.
//!
//! Each entry point resolves a mapping configuration in three tiers: the
//! explicit argument, then the process-wide default set with
//! [`set_default_configuration`], then the global ambient configuration from
//! [`MappingConfiguration::initialize_global`]. With none available the call
//! fails with [`Error::MissingConfiguration`].

use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::expr::DynamicExpression;
use crate::mapping::MappingConfiguration;
use crate::record::{Entity, Record};
use crate::shape::{DynamicProperty, Shape};
use crate::value::{Value, ValueType};

use super::{Query, SortDirection};

static DEFAULT: RwLock<Option<Arc<MappingConfiguration>>> = RwLock::new(None);

/// Set the configuration used when a call does not pass one.
///
/// The slot is process-wide. Set it once during startup, before queries run
/// on other threads. Reads and writes are individually atomic, but which of
/// several racing writers wins, and which configuration a concurrently
/// running call observes, is unspecified.
pub fn set_default_configuration(config: Arc<MappingConfiguration>) {
    *DEFAULT.write().unwrap_or_else(|e| e.into_inner()) = Some(config);
    debug!("default mapping configuration set");
}

/// The configuration installed by [`set_default_configuration`], if any.
pub fn default_configuration() -> Option<Arc<MappingConfiguration>> {
    DEFAULT.read().unwrap_or_else(|e| e.into_inner()).clone()
}

/// Empty the default slot. Subject to the same startup-only rule as
/// [`set_default_configuration`].
pub fn clear_default_configuration() {
    *DEFAULT.write().unwrap_or_else(|e| e.into_inner()) = None;
}

fn resolve_configuration(
    explicit: Option<&Arc<MappingConfiguration>>,
) -> Result<Arc<MappingConfiguration>> {
    if let Some(config) = explicit {
        return Ok(Arc::clone(config));
    }
    if let Some(config) = default_configuration() {
        return Ok(config);
    }
    if let Some(config) = MappingConfiguration::global() {
        warn!("no default mapping configuration set; using the global configuration");
        return Ok(config);
    }
    Err(Error::MissingConfiguration)
}

/// Filter `source` with a boolean expression. With a `destination`, bare
/// member names refer to that shape and are translated through the
/// configuration; the element type of the result is unchanged.
pub fn where_query<T>(
    source: Option<&Query<T>>,
    config: Option<&Arc<MappingConfiguration>>,
    destination: Option<&Shape>,
    predicate: Option<&str>,
    values: &[Value],
) -> Result<Query<T>> {
    let source = source.ok_or(Error::InvalidArgument("source"))?;
    let predicate = predicate.ok_or(Error::InvalidArgument("predicate"))?;
    let config = resolve_configuration(config)?;

    debug!(
        shape = source.shape().name(),
        destination = destination.map(Shape::name),
        predicate,
        "where"
    );
    let lambda = DynamicExpression::parse_lambda(
        &config,
        source.shape(),
        destination,
        Some(ValueType::Boolean),
        predicate,
        values,
    )?;
    source.filter(lambda)
}

/// Sort `source` by `key [asc|desc], ...`. The first key is primary.
pub fn order_by_query<T>(
    source: Option<&Query<T>>,
    config: Option<&Arc<MappingConfiguration>>,
    destination: Option<&Shape>,
    ordering: Option<&str>,
    values: &[Value],
) -> Result<Query<T>> {
    let source = source.ok_or(Error::InvalidArgument("source"))?;
    let ordering = ordering.ok_or(Error::InvalidArgument("ordering"))?;
    let config = resolve_configuration(config)?;

    debug!(
        shape = source.shape().name(),
        destination = destination.map(Shape::name),
        ordering,
        "order by"
    );
    let clauses =
        DynamicExpression::parse_ordering(&config, source.shape(), destination, ordering, values)?;

    let mut query = source.clone();
    for (i, clause) in clauses.into_iter().enumerate() {
        let direction = SortDirection::from_ascending(clause.ascending);
        query = if i == 0 {
            query.sort_by(clause.selector, direction)?
        } else {
            query.then_by(clause.selector, direction)?
        };
    }
    Ok(query)
}

/// Project `source` into records of a dynamic shape built from the
/// projection items. Runs the source query.
pub fn select_query<T>(
    source: Option<&Query<T>>,
    config: Option<&Arc<MappingConfiguration>>,
    destination: Option<&Shape>,
    projection: Option<&str>,
    values: &[Value],
) -> Result<Query<Record>>
where
    T: Entity,
{
    let source = source.ok_or(Error::InvalidArgument("source"))?;
    let projection = projection.ok_or(Error::InvalidArgument("projection"))?;
    let config = resolve_configuration(config)?;

    debug!(
        shape = source.shape().name(),
        destination = destination.map(Shape::name),
        projection,
        "select"
    );
    let items = DynamicExpression::parse_projection(
        &config,
        source.shape(),
        destination,
        projection,
        values,
    )?;

    let properties = items
        .iter()
        .map(|item| DynamicProperty::new(item.name.clone(), output_type(item.selector.result_type())))
        .collect::<Result<Vec<_>>>()?;
    let shape = DynamicExpression::create_class(properties)?;

    let mut rows = Vec::new();
    for element in source.execute()? {
        let mut record = Record::new();
        for item in &items {
            record.insert(item.name.clone(), item.selector.evaluate(&element)?);
        }
        rows.push(record);
    }
    Ok(Query::from_vec(shape, rows))
}

// A bare `null` item has no type of its own.
fn output_type(ty: ValueType) -> ValueType {
    match ty {
        ValueType::Null => ValueType::String,
        other => other,
    }
}

/// Dynamic operators on [`Query`].
///
/// `*_dynamic` resolve members against the element shape, `*_projected`
/// against a destination shape, and `*_with` take an explicit configuration.
pub trait DynamicQueryable<T>: Sized {
    fn where_dynamic(&self, predicate: &str, values: &[Value]) -> Result<Query<T>>;

    fn where_projected(
        &self,
        destination: &Shape,
        predicate: &str,
        values: &[Value],
    ) -> Result<Query<T>>;

    fn where_with(
        &self,
        config: &Arc<MappingConfiguration>,
        destination: Option<&Shape>,
        predicate: &str,
        values: &[Value],
    ) -> Result<Query<T>>;

    fn order_by_dynamic(&self, ordering: &str, values: &[Value]) -> Result<Query<T>>;

    fn order_by_projected(
        &self,
        destination: &Shape,
        ordering: &str,
        values: &[Value],
    ) -> Result<Query<T>>;

    fn order_by_with(
        &self,
        config: &Arc<MappingConfiguration>,
        destination: Option<&Shape>,
        ordering: &str,
        values: &[Value],
    ) -> Result<Query<T>>;

    fn select_dynamic(&self, projection: &str, values: &[Value]) -> Result<Query<Record>>;

    fn select_projected(
        &self,
        destination: &Shape,
        projection: &str,
        values: &[Value],
    ) -> Result<Query<Record>>;

    fn select_with(
        &self,
        config: &Arc<MappingConfiguration>,
        destination: Option<&Shape>,
        projection: &str,
        values: &[Value],
    ) -> Result<Query<Record>>;
}

impl<T: Entity> DynamicQueryable<T> for Query<T> {
    fn where_dynamic(&self, predicate: &str, values: &[Value]) -> Result<Query<T>> {
        where_query(Some(self), None, None, Some(predicate), values)
    }

    fn where_projected(
        &self,
        destination: &Shape,
        predicate: &str,
        values: &[Value],
    ) -> Result<Query<T>> {
        where_query(Some(self), None, Some(destination), Some(predicate), values)
    }

    fn where_with(
        &self,
        config: &Arc<MappingConfiguration>,
        destination: Option<&Shape>,
        predicate: &str,
        values: &[Value],
    ) -> Result<Query<T>> {
        where_query(Some(self), Some(config), destination, Some(predicate), values)
    }

    fn order_by_dynamic(&self, ordering: &str, values: &[Value]) -> Result<Query<T>> {
        order_by_query(Some(self), None, None, Some(ordering), values)
    }

    fn order_by_projected(
        &self,
        destination: &Shape,
        ordering: &str,
        values: &[Value],
    ) -> Result<Query<T>> {
        order_by_query(Some(self), None, Some(destination), Some(ordering), values)
    }

    fn order_by_with(
        &self,
        config: &Arc<MappingConfiguration>,
        destination: Option<&Shape>,
        ordering: &str,
        values: &[Value],
    ) -> Result<Query<T>> {
        order_by_query(Some(self), Some(config), destination, Some(ordering), values)
    }

    fn select_dynamic(&self, projection: &str, values: &[Value]) -> Result<Query<Record>> {
        select_query(Some(self), None, None, Some(projection), values)
    }

    fn select_projected(
        &self,
        destination: &Shape,
        projection: &str,
        values: &[Value],
    ) -> Result<Query<Record>> {
        select_query(Some(self), None, Some(destination), Some(projection), values)
    }

    fn select_with(
        &self,
        config: &Arc<MappingConfiguration>,
        destination: Option<&Shape>,
        projection: &str,
        values: &[Value],
    ) -> Result<Query<Record>> {
        select_query(Some(self), Some(config), destination, Some(projection), values)
    }
}
