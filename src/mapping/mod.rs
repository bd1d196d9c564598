//! Mapping configuration: how members of a destination shape are produced
//! from a source shape.
//!
//! Expressions written against a destination shape are resolved back to the
//! source through a [`TypeMap`]: each destination member either maps from a
//! named source member, from a source-side expression, or (when unmapped) by
//! convention from the source member of the same name.
//!
//! The module also owns the global ambient configuration, the last fallback
//! tier consulted by the query layer.

pub mod config;

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::error::{Error, Result};
use crate::shape::Shape;

pub use config::{default_config_path, load_configuration, load_default_configuration};

/// Where a destination member takes its value from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberSource {
    /// A member of the source shape.
    Member(String),
    /// An expression over the source shape, e.g. `FirstName + ' ' + LastName`.
    Expression(String),
}

impl MemberSource {
    pub fn member(name: impl Into<String>) -> Self {
        MemberSource::Member(name.into())
    }

    pub fn expression(text: impl Into<String>) -> Self {
        MemberSource::Expression(text.into())
    }
}

/// Explicit mapping for one destination member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberMap {
    pub destination: String,
    pub source: MemberSource,
}

/// Mapping between a source shape and a destination shape, by shape name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMap {
    source: String,
    destination: String,
    members: Vec<MemberMap>,
}

impl TypeMap {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            members: Vec::new(),
        }
    }

    /// Map a destination member from a source member.
    pub fn map_member(self, destination: impl Into<String>, source: impl Into<String>) -> Self {
        self.for_member(destination, MemberSource::member(source))
    }

    /// Map a destination member from a source-side expression.
    pub fn map_expression(self, destination: impl Into<String>, text: impl Into<String>) -> Self {
        self.for_member(destination, MemberSource::expression(text))
    }

    pub fn for_member(mut self, destination: impl Into<String>, source: MemberSource) -> Self {
        let destination = destination.into();
        self.members
            .retain(|m| !m.destination.eq_ignore_ascii_case(&destination));
        self.members.push(MemberMap {
            destination,
            source,
        });
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn members(&self) -> &[MemberMap] {
        &self.members
    }

    /// Explicit source for a destination member, matched ignoring case.
    pub fn member_source(&self, destination: &str) -> Option<&MemberSource> {
        self.members
            .iter()
            .find(|m| m.destination.eq_ignore_ascii_case(destination))
            .map(|m| &m.source)
    }
}

/// A set of type maps plus an optional catalog of named shapes.
#[derive(Debug, Clone, Default)]
pub struct MappingConfiguration {
    shapes: BTreeMap<String, Arc<Shape>>,
    maps: Vec<TypeMap>,
}

static GLOBAL: RwLock<Option<Arc<MappingConfiguration>>> = RwLock::new(None);

impl MappingConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_shape(mut self, shape: Shape) -> Self {
        self.add_shape(shape);
        self
    }

    pub fn with_map(mut self, map: TypeMap) -> Self {
        self.add_map(map);
        self
    }

    pub fn add_shape(&mut self, shape: Shape) {
        self.shapes
            .insert(shape.name().to_string(), Arc::new(shape));
    }

    /// Add a type map, replacing any existing map for the same pair.
    pub fn add_map(&mut self, map: TypeMap) {
        self.maps
            .retain(|m| !(m.source == map.source && m.destination == map.destination));
        self.maps.push(map);
    }

    pub fn shape(&self, name: &str) -> Option<&Arc<Shape>> {
        self.shapes.get(name)
    }

    pub fn shapes(&self) -> impl Iterator<Item = &Arc<Shape>> {
        self.shapes.values()
    }

    pub fn maps(&self) -> &[TypeMap] {
        &self.maps
    }

    /// Type map for a pair of shape names (case-sensitive).
    pub fn find_type_map(&self, source: &str, destination: &str) -> Option<&TypeMap> {
        self.maps
            .iter()
            .find(|m| m.source == source && m.destination == destination)
    }

    /// Check that every member of every destination shape in the catalog
    /// resolves against its source shape.
    pub fn assert_valid(&self) -> Result<()> {
        let mut problems = Vec::new();
        for map in &self.maps {
            let (source, destination) = match (self.shape(&map.source), self.shape(&map.destination))
            {
                (Some(s), Some(d)) => (s, d),
                _ => continue,
            };
            for member in destination.members() {
                if let Err(e) =
                    crate::expr::parser::resolve_destination_member(self, source, destination, &member.name)
                {
                    problems.push(e.message);
                }
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(problems.join("; ")))
        }
    }

    /// Install `config` as the global ambient configuration.
    pub fn initialize_global(config: MappingConfiguration) -> Arc<MappingConfiguration> {
        let config = Arc::new(config);
        *GLOBAL.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&config));
        debug!(maps = config.maps.len(), "initialized global mapping configuration");
        config
    }

    /// The global ambient configuration, if one was initialized.
    pub fn global() -> Option<Arc<MappingConfiguration>> {
        GLOBAL.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn reset_global() {
        *GLOBAL.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::global_lock;
    use crate::value::ValueType;

    fn person() -> Shape {
        Shape::new("Person")
            .with_member("FirstName", ValueType::String)
            .with_member("LastName", ValueType::String)
            .with_member("Age", ValueType::Integer)
    }

    #[test]
    fn test_type_map_member_source_ignores_case() {
        let map = TypeMap::new("Person", "PersonView").map_member("Years", "Age");
        assert_eq!(
            map.member_source("years"),
            Some(&MemberSource::Member("Age".into()))
        );
        assert_eq!(map.member_source("Other"), None);
    }

    #[test]
    fn test_for_member_replaces_previous_mapping() {
        let map = TypeMap::new("A", "B")
            .map_member("X", "Y")
            .map_expression("x", "Y + 1");
        assert_eq!(map.members().len(), 1);
        assert_eq!(
            map.member_source("X"),
            Some(&MemberSource::Expression("Y + 1".into()))
        );
    }

    #[test]
    fn test_find_type_map() {
        let config = MappingConfiguration::new()
            .with_map(TypeMap::new("Person", "PersonView"))
            .with_map(TypeMap::new("Order", "OrderView"));
        assert!(config.find_type_map("Person", "PersonView").is_some());
        assert!(config.find_type_map("PersonView", "Person").is_none());
    }

    #[test]
    fn test_add_map_replaces_same_pair() {
        let config = MappingConfiguration::new()
            .with_map(TypeMap::new("A", "B").map_member("X", "Y"))
            .with_map(TypeMap::new("A", "B"));
        assert_eq!(config.maps().len(), 1);
        assert!(config.maps()[0].members().is_empty());
    }

    #[test]
    fn test_assert_valid_accepts_resolvable_maps() {
        let view = Shape::new("PersonView")
            .with_member("FullName", ValueType::String)
            .with_member("Years", ValueType::Integer)
            .with_member("Age", ValueType::Integer);
        let config = MappingConfiguration::new()
            .with_shape(person())
            .with_shape(view)
            .with_map(
                TypeMap::new("Person", "PersonView")
                    .map_expression("FullName", "FirstName + ' ' + LastName")
                    .map_member("Years", "Age"),
            );
        assert!(config.assert_valid().is_ok());
    }

    #[test]
    fn test_assert_valid_reports_unmapped_members() {
        let view = Shape::new("PersonView")
            .with_member("Email", ValueType::String)
            .with_member("Years", ValueType::Integer);
        let config = MappingConfiguration::new()
            .with_shape(person())
            .with_shape(view)
            .with_map(TypeMap::new("Person", "PersonView").map_member("Years", "Agee"));
        let err = config.assert_valid().unwrap_err().to_string();
        assert!(err.contains("Email"));
        assert!(err.contains("Agee"));
    }

    #[test]
    fn test_global_slot() {
        let _guard = global_lock();
        MappingConfiguration::reset_global();
        assert!(MappingConfiguration::global().is_none());
        let installed = MappingConfiguration::initialize_global(
            MappingConfiguration::new().with_shape(person()),
        );
        let read = MappingConfiguration::global().unwrap();
        assert!(Arc::ptr_eq(&installed, &read));
        MappingConfiguration::reset_global();
        assert!(MappingConfiguration::global().is_none());
    }
}
