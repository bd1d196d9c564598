/// String expressions compiled into typed, evaluable lambdas.
///
/// ```text
/// text ──tokenizer──> tokens ──parser──> TypedExpr ──eval──> Value
///                                 │
///                    mapping::TypeMap (destination members)
/// ```
///
/// [`DynamicExpression`] is the public entry point; the parser and tree
/// types are exposed for callers that build lambdas by hand.
pub mod dynamic;
pub mod eval;
pub mod parser;
pub mod tokenizer;
pub mod types;

pub use dynamic::DynamicExpression;
pub use parser::ExpressionParser;
pub use types::*;
