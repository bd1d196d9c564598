/// Pipeline → PostgreSQL compiler.
///
/// Renders a query as `SELECT * FROM table [WHERE ...] [ORDER BY ...]`,
/// inlining constants, then re-parses the text with `sqlparser` so a
/// malformed rendering is reported instead of handed to a database.
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser as SqlParser;
use tracing::debug;

use crate::error::{Error, Result};
use crate::expr::{BinaryOp, ExprKind, Method, TypedExpr, UnaryOp};
use crate::value::Value;

use super::{Pipeline, Query, SortDirection};

/// Render `query` as SQL against `table`.
pub fn to_sql<T>(query: &Query<T>, table: &str) -> Result<String> {
    let sql = compile_pipeline(query.pipeline(), table);
    SqlParser::parse_sql(&PostgreSqlDialect {}, &sql)
        .map_err(|e| Error::Execution(format!("rendered SQL does not parse: {}", e)))?;
    debug!(%sql, "rendered query");
    Ok(sql)
}

fn compile_pipeline(pipeline: &Pipeline, table: &str) -> String {
    let mut filters = Vec::new();
    // One entry per sort chain, newest chain first.
    let mut chains: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();

    let mut node = pipeline;
    loop {
        match node {
            Pipeline::Source => break,
            Pipeline::Filter { input, predicate } => {
                filters.push(compile_expr(predicate.body()));
                node = &**input;
            }
            Pipeline::ThenBy {
                input,
                key,
                direction,
            } => {
                current.push(compile_order(key.body(), *direction));
                node = &**input;
            }
            Pipeline::SortBy {
                input,
                key,
                direction,
            } => {
                current.push(compile_order(key.body(), *direction));
                current.reverse();
                chains.push(std::mem::take(&mut current));
                node = &**input;
            }
        }
    }
    filters.reverse();

    let mut parts = vec![format!("SELECT * FROM {}", quote_ident(table))];
    if !filters.is_empty() {
        parts.push(format!("WHERE {}", filters.join(" AND ")));
    }
    let order: Vec<String> = chains.into_iter().flatten().collect();
    if !order.is_empty() {
        parts.push(format!("ORDER BY {}", order.join(", ")));
    }
    parts.join(" ")
}

fn compile_order(expr: &TypedExpr, direction: SortDirection) -> String {
    match direction {
        SortDirection::Ascending => format!("{} ASC NULLS FIRST", compile_expr(expr)),
        SortDirection::Descending => format!("{} DESC NULLS LAST", compile_expr(expr)),
    }
}

fn compile_expr(expr: &TypedExpr) -> String {
    match &expr.kind {
        ExprKind::Constant(v) => compile_value(v),
        ExprKind::Member { name, .. } => quote_ident(name),
        ExprKind::Unary { op, operand } => match op {
            UnaryOp::Negate => format!("(-{})", compile_expr(operand)),
            UnaryOp::Not => format!("(NOT {})", compile_expr(operand)),
        },
        ExprKind::Binary { op, left, right } => compile_binary(*op, left, right),
        ExprKind::Conditional {
            test,
            if_true,
            if_false,
        } => format!(
            "CASE WHEN {} THEN {} ELSE {} END",
            compile_expr(test),
            compile_expr(if_true),
            compile_expr(if_false)
        ),
        ExprKind::Call {
            method,
            target,
            args,
        } => compile_call(*method, target, args),
    }
}

fn compile_binary(op: BinaryOp, left: &TypedExpr, right: &TypedExpr) -> String {
    let is_null = |e: &TypedExpr| matches!(e.kind, ExprKind::Constant(Value::Null));
    let is_constant = |e: &TypedExpr| matches!(e.kind, ExprKind::Constant(_));
    let nullable = !(is_constant(left) && is_constant(right));

    // In memory two nulls are equal and a comparison with null is false,
    // so nullable operands cannot use the bare SQL operators.
    match op {
        BinaryOp::Eq | BinaryOp::NotEq if is_null(left) || is_null(right) => {
            let operand = if is_null(left) { right } else { left };
            let test = if op == BinaryOp::Eq {
                "IS NULL"
            } else {
                "IS NOT NULL"
            };
            return format!("({} {})", compile_expr(operand), test);
        }
        BinaryOp::Eq | BinaryOp::NotEq if nullable => {
            let test = if op == BinaryOp::Eq {
                "IS NOT DISTINCT FROM"
            } else {
                "IS DISTINCT FROM"
            };
            return format!("({} {} {})", compile_expr(left), test, compile_expr(right));
        }
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq if nullable => {
            let comparison = compile_binary_operator(op, left, right);
            return format!("COALESCE({}, FALSE)", comparison);
        }
        BinaryOp::Concat => {
            return format!("CONCAT({}, {})", compile_expr(left), compile_expr(right));
        }
        _ => {}
    }

    compile_binary_operator(op, left, right)
}

fn compile_binary_operator(op: BinaryOp, left: &TypedExpr, right: &TypedExpr) -> String {
    let symbol = match op {
        BinaryOp::Or => "OR",
        BinaryOp::And => "AND",
        BinaryOp::Eq => "=",
        BinaryOp::NotEq => "<>",
        BinaryOp::Lt => "<",
        BinaryOp::LtEq => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::GtEq => ">=",
        BinaryOp::Add => "+",
        BinaryOp::Subtract => "-",
        BinaryOp::Multiply => "*",
        BinaryOp::Divide => "/",
        BinaryOp::Modulo => "%",
        BinaryOp::Concat => "||",
    };
    format!("({} {} {})", compile_expr(left), symbol, compile_expr(right))
}

fn compile_call(method: Method, target: &TypedExpr, args: &[TypedExpr]) -> String {
    let target = compile_expr(target);
    let arg = args.first().map(compile_expr).unwrap_or_default();
    match method {
        Method::Length => format!("LENGTH({})", target),
        Method::ToUpper => format!("UPPER({})", target),
        Method::ToLower => format!("LOWER({})", target),
        Method::Trim => format!("TRIM({})", target),
        Method::StartsWith => format!("STARTS_WITH({}, {})", target, arg),
        Method::EndsWith => format!("(RIGHT({0}, LENGTH({1})) = {1})", target, arg),
        Method::Contains => format!("(STRPOS({}, {}) > 0)", target, arg),
    }
}

fn compile_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Boolean(true) => "TRUE".to_string(),
        Value::Boolean(false) => "FALSE".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) if f.is_finite() => {
            let text = f.to_string();
            if text.contains(['.', 'e', 'E']) {
                text
            } else {
                format!("{}.0", text)
            }
        }
        Value::Float(f) => format!("'{}'::float8", f),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
