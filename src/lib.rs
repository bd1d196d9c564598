pub mod error;
pub mod expr;
pub mod mapping;
pub mod query;
pub mod record;
pub mod shape;
pub mod value;

pub use error::{Error, ParseError, Result};
pub use expr::{DynamicExpression, LambdaExpression, OrderingClause, ProjectionItem};
pub use mapping::{MappingConfiguration, MemberSource, TypeMap};
pub use query::{
    clear_default_configuration, default_configuration, set_default_configuration,
    DynamicQueryable, Query, QueryProvider, SortDirection,
};
pub use record::{Entity, Record};
pub use shape::{ClassFactory, DynamicProperty, Shape};
pub use value::{Value, ValueType};
