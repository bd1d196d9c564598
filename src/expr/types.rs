//! Typed expression tree produced by the parser.
//!
//! Every node carries its [`ValueType`], so type errors surface while
//! parsing rather than while a query runs.

use std::sync::Arc;

use crate::error::Result;
use crate::record::Entity;
use crate::shape::Shape;
use crate::value::{Value, ValueType};

/// A lambda parameter. An empty name marks the implicit `it` parameter whose
/// members may be referenced without qualification.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub shape: Arc<Shape>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, shape: Arc<Shape>) -> Self {
        Self {
            name: name.into(),
            shape,
        }
    }

    pub fn implicit(shape: Arc<Shape>) -> Self {
        Self::new("", shape)
    }

    pub fn is_implicit(&self) -> bool {
        self.name.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Logical
    Or,
    And,
    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    // String
    Concat,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }
}

/// String members callable from expression text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Length,
    ToUpper,
    ToLower,
    Trim,
    StartsWith,
    EndsWith,
    Contains,
}

impl Method {
    /// Case-insensitive lookup; returns the method and its argument count.
    pub fn lookup(name: &str) -> Option<(Method, usize)> {
        let m = match name.to_ascii_lowercase().as_str() {
            "length" => (Method::Length, 0),
            "toupper" => (Method::ToUpper, 0),
            "tolower" => (Method::ToLower, 0),
            "trim" => (Method::Trim, 0),
            "startswith" => (Method::StartsWith, 1),
            "endswith" => (Method::EndsWith, 1),
            "contains" => (Method::Contains, 1),
            _ => return None,
        };
        Some(m)
    }

    /// `Length` is a property; the rest are invoked with parentheses.
    pub fn is_property(self) -> bool {
        self == Method::Length
    }

    pub fn result_type(self) -> ValueType {
        match self {
            Method::Length => ValueType::Integer,
            Method::ToUpper | Method::ToLower | Method::Trim => ValueType::String,
            Method::StartsWith | Method::EndsWith | Method::Contains => ValueType::Boolean,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Constant(Value),
    /// Member of the parameter at index `parameter`, by canonical name.
    Member {
        parameter: usize,
        name: String,
    },
    Unary {
        op: UnaryOp,
        operand: Box<TypedExpr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<TypedExpr>,
        right: Box<TypedExpr>,
    },
    /// `iif(test, a, b)` or `test ? a : b`.
    Conditional {
        test: Box<TypedExpr>,
        if_true: Box<TypedExpr>,
        if_false: Box<TypedExpr>,
    },
    Call {
        method: Method,
        target: Box<TypedExpr>,
        args: Vec<TypedExpr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedExpr {
    pub kind: ExprKind,
    pub ty: ValueType,
}

impl TypedExpr {
    pub fn new(kind: ExprKind, ty: ValueType) -> Self {
        Self { kind, ty }
    }

    pub fn constant(value: Value) -> Self {
        let ty = value.value_type();
        Self::new(ExprKind::Constant(value), ty)
    }

    /// Canonical member name when this node is a bare member reference.
    pub fn member_name(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Member { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Re-point every member reference at parameter `index`.
    pub(crate) fn rebind(self, index: usize) -> Self {
        let ty = self.ty;
        let kind = match self.kind {
            ExprKind::Member { name, .. } => ExprKind::Member {
                parameter: index,
                name,
            },
            ExprKind::Unary { op, operand } => ExprKind::Unary {
                op,
                operand: Box::new(operand.rebind(index)),
            },
            ExprKind::Binary { op, left, right } => ExprKind::Binary {
                op,
                left: Box::new(left.rebind(index)),
                right: Box::new(right.rebind(index)),
            },
            ExprKind::Conditional {
                test,
                if_true,
                if_false,
            } => ExprKind::Conditional {
                test: Box::new(test.rebind(index)),
                if_true: Box::new(if_true.rebind(index)),
                if_false: Box::new(if_false.rebind(index)),
            },
            ExprKind::Call {
                method,
                target,
                args,
            } => ExprKind::Call {
                method,
                target: Box::new(target.rebind(index)),
                args: args.into_iter().map(|a| a.rebind(index)).collect(),
            },
            constant @ ExprKind::Constant(_) => constant,
        };
        Self { kind, ty }
    }
}

/// A typed expression tree bound to its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaExpression {
    parameters: Vec<Parameter>,
    body: TypedExpr,
}

impl LambdaExpression {
    pub fn new(parameters: Vec<Parameter>, body: TypedExpr) -> Self {
        Self { parameters, body }
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn body(&self) -> &TypedExpr {
        &self.body
    }

    pub fn result_type(&self) -> ValueType {
        self.body.ty
    }

    /// Evaluate with one argument per parameter.
    pub fn invoke(&self, args: &[&dyn Entity]) -> Result<Value> {
        if args.len() != self.parameters.len() {
            return Err(crate::error::Error::Execution(format!(
                "lambda expects {} argument(s), got {}",
                self.parameters.len(),
                args.len()
            )));
        }
        self.body.evaluate(args)
    }

    /// Evaluate a single-parameter lambda against one element.
    pub fn evaluate(&self, element: &dyn Entity) -> Result<Value> {
        self.invoke(&[element])
    }
}

/// One sort key parsed from ordering text.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderingClause {
    pub selector: LambdaExpression,
    pub ascending: bool,
}

/// One output member parsed from projection text.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionItem {
    pub name: String,
    pub selector: LambdaExpression,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_lookup_is_case_insensitive() {
        assert_eq!(Method::lookup("StartsWith"), Some((Method::StartsWith, 1)));
        assert_eq!(Method::lookup("toupper"), Some((Method::ToUpper, 0)));
        assert_eq!(Method::lookup("Substring"), None);
        assert!(Method::Length.is_property());
        assert_eq!(Method::Contains.result_type(), ValueType::Boolean);
    }

    #[test]
    fn test_rebind_updates_nested_members() {
        let expr = TypedExpr::new(
            ExprKind::Binary {
                op: BinaryOp::Add,
                left: Box::new(TypedExpr::new(
                    ExprKind::Member {
                        parameter: 0,
                        name: "A".into(),
                    },
                    ValueType::Integer,
                )),
                right: Box::new(TypedExpr::constant(Value::Integer(1))),
            },
            ValueType::Integer,
        );
        let rebound = expr.rebind(2);
        match rebound.kind {
            ExprKind::Binary { left, .. } => {
                assert_eq!(
                    left.kind,
                    ExprKind::Member {
                        parameter: 2,
                        name: "A".into()
                    }
                );
            }
            _ => panic!("Expected binary expression"),
        }
    }

    #[test]
    fn test_implicit_parameter() {
        let shape = Arc::new(Shape::new("T"));
        assert!(Parameter::implicit(Arc::clone(&shape)).is_implicit());
        assert!(!Parameter::new("p", shape).is_implicit());
    }
}
