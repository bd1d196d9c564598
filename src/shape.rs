//! Record shapes and the dynamic shape builder.
//!
//! A [`Shape`] plays the role of a record type: a name plus an ordered list of
//! typed members. Shapes for ad-hoc projections are produced by the
//! [`ClassFactory`] from a list of [`DynamicProperty`] descriptors.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::debug;

use crate::error::{Error, Result};
use crate::value::ValueType;

/// A named, typed member of a shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Member {
    pub name: String,
    pub ty: ValueType,
}

/// A record type: name plus members in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    name: String,
    members: Vec<Member>,
}

impl Shape {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// Builder-style member addition. A later member with the same name
    /// (ignoring case) replaces the earlier one.
    pub fn with_member(mut self, name: impl Into<String>, ty: ValueType) -> Self {
        let name = name.into();
        self.members.retain(|m| !m.name.eq_ignore_ascii_case(&name));
        self.members.push(Member { name, ty });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Case-insensitive member lookup.
    pub fn member(&self, name: &str) -> Option<&Member> {
        self.members
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.member(name).is_some()
    }

    pub fn into_shared(self) -> Arc<Shape> {
        Arc::new(self)
    }
}

/// Describes one field of a shape built at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DynamicProperty {
    name: String,
    ty: ValueType,
}

impl DynamicProperty {
    pub fn new(name: impl Into<String>, ty: ValueType) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::InvalidArgument("name"));
        }
        Ok(Self { name, ty })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> ValueType {
        self.ty
    }
}

/// Builds shapes from property lists, returning the same `Arc<Shape>` for
/// equal lists.
///
/// Keys are the property sequence as given: order and name casing both
/// matter. Lookup and creation share one lock, so racing first requests for
/// the same key observe a single shape.
#[derive(Debug, Default)]
pub struct ClassFactory {
    classes: Mutex<HashMap<Vec<DynamicProperty>, Arc<Shape>>>,
}

impl ClassFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide factory.
    pub fn instance() -> &'static ClassFactory {
        static INSTANCE: OnceLock<ClassFactory> = OnceLock::new();
        INSTANCE.get_or_init(ClassFactory::new)
    }

    pub fn get_dynamic_class<I>(&self, properties: I) -> Result<Arc<Shape>>
    where
        I: IntoIterator<Item = DynamicProperty>,
    {
        let key: Vec<DynamicProperty> = properties.into_iter().collect();
        for (i, p) in key.iter().enumerate() {
            if key[..i].iter().any(|q| q.name.eq_ignore_ascii_case(&p.name)) {
                return Err(Error::InvalidArgument("properties"));
            }
        }

        let mut classes = self
            .classes
            .lock()
            .map_err(|_| Error::Execution("class factory lock poisoned".into()))?;
        if let Some(shape) = classes.get(&key) {
            return Ok(Arc::clone(shape));
        }

        let name = format!("DynamicClass{}", classes.len() + 1);
        let shape = key
            .iter()
            .fold(Shape::new(name), |s, p| s.with_member(p.name.clone(), p.ty))
            .into_shared();
        debug!(shape = shape.name(), members = key.len(), "created dynamic class");
        classes.insert(key, Arc::clone(&shape));
        Ok(shape)
    }

    /// Number of distinct shapes created so far.
    pub fn len(&self) -> usize {
        self.classes.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn props(list: &[(&str, ValueType)]) -> Vec<DynamicProperty> {
        list.iter()
            .map(|(n, t)| DynamicProperty::new(*n, *t).unwrap())
            .collect()
    }

    #[test]
    fn test_property_requires_name() {
        assert!(matches!(
            DynamicProperty::new("", ValueType::Integer),
            Err(Error::InvalidArgument("name"))
        ));
        assert!(DynamicProperty::new("   ", ValueType::Integer).is_err());
        let p = DynamicProperty::new("Age", ValueType::Integer).unwrap();
        assert_eq!(p.name(), "Age");
        assert_eq!(p.ty(), ValueType::Integer);
    }

    #[test]
    fn test_shape_member_lookup_ignores_case() {
        let shape = Shape::new("Person")
            .with_member("Name", ValueType::String)
            .with_member("Age", ValueType::Integer);
        assert_eq!(shape.member("age").unwrap().name, "Age");
        assert!(shape.has_member("NAME"));
        assert!(!shape.has_member("Email"));
    }

    #[test]
    fn test_with_member_replaces_same_name() {
        let shape = Shape::new("T")
            .with_member("a", ValueType::Integer)
            .with_member("A", ValueType::String);
        assert_eq!(shape.members().len(), 1);
        assert_eq!(shape.members()[0].ty, ValueType::String);
    }

    #[test]
    fn test_equal_properties_return_same_shape() {
        let factory = ClassFactory::new();
        let a = factory
            .get_dynamic_class(props(&[("Name", ValueType::String), ("Age", ValueType::Integer)]))
            .unwrap();
        let b = factory
            .get_dynamic_class(props(&[("Name", ValueType::String), ("Age", ValueType::Integer)]))
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(factory.len(), 1);
        assert_eq!(a.name(), "DynamicClass1");
        assert_eq!(a.members().len(), 2);
    }

    #[test]
    fn test_key_is_order_and_case_sensitive() {
        let factory = ClassFactory::new();
        let a = factory
            .get_dynamic_class(props(&[("Name", ValueType::String), ("Age", ValueType::Integer)]))
            .unwrap();
        let b = factory
            .get_dynamic_class(props(&[("Age", ValueType::Integer), ("Name", ValueType::String)]))
            .unwrap();
        let c = factory
            .get_dynamic_class(props(&[("name", ValueType::String), ("Age", ValueType::Integer)]))
            .unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(factory.len(), 3);
    }

    #[test]
    fn test_duplicate_property_names_rejected() {
        let factory = ClassFactory::new();
        let result =
            factory.get_dynamic_class(props(&[("Age", ValueType::Integer), ("age", ValueType::Float)]));
        assert!(matches!(result, Err(Error::InvalidArgument("properties"))));
        assert!(factory.is_empty());
    }

    #[test]
    fn test_concurrent_first_creation_yields_one_shape() {
        let factory = Arc::new(ClassFactory::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let factory = Arc::clone(&factory);
                thread::spawn(move || {
                    factory
                        .get_dynamic_class(props(&[("X", ValueType::Float), ("Y", ValueType::Float)]))
                        .unwrap()
                })
            })
            .collect();
        let shapes: Vec<Arc<Shape>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(shapes.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(factory.len(), 1);
    }
}
