//! Recursive-descent parser producing typed expression trees.
//!
//! Bare identifiers resolve to members of the implicit `it` parameter. When
//! a destination shape is supplied, they resolve against that shape instead
//! and are translated back to source members through the mapping
//! configuration.

use std::sync::Arc;

use crate::error::ParseError;
use crate::mapping::{MappingConfiguration, MemberSource};
use crate::shape::Shape;
use crate::value::{Value, ValueType};

use super::tokenizer::{tokenize, Token, TokenKind};
use super::types::*;

type ParseResult<T> = std::result::Result<T, ParseError>;

/// Deepest expression tree the parser will build. Evaluation and SQL
/// rendering recurse over the tree, so the bound applies to operator chains
/// as well as to parentheses.
const MAX_DEPTH: usize = 128;

/// How bare member names of `it` are looked up.
enum Resolver<'a> {
    /// Directly on the parameter's own shape.
    Direct,
    /// On a destination shape, translated through the configuration.
    Projected {
        config: &'a MappingConfiguration,
        destination: &'a Shape,
    },
}

pub struct ExpressionParser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    parameters: &'a [Parameter],
    it: Option<usize>,
    values: &'a [Value],
    resolver: Resolver<'a>,
    depth: usize,
}

impl<'a> ExpressionParser<'a> {
    /// Create a parser over `text`. `destination` only takes effect when it
    /// differs from the implicit parameter's shape and a configuration is
    /// supplied.
    pub fn new(
        parameters: &'a [Parameter],
        text: &str,
        values: &'a [Value],
        config: Option<&'a MappingConfiguration>,
        destination: Option<&'a Shape>,
    ) -> ParseResult<Self> {
        let tokens = tokenize(text)?;
        let it = parameters.iter().position(Parameter::is_implicit);

        let resolver = match (config, destination, it) {
            (Some(config), Some(destination), Some(i))
                if parameters[i].shape.name() != destination.name() =>
            {
                Resolver::Projected {
                    config,
                    destination,
                }
            }
            _ => Resolver::Direct,
        };

        Ok(Self {
            tokens,
            pos: 0,
            parameters,
            it,
            values,
            resolver,
            depth: 0,
        })
    }

    /// Parse a single expression, optionally requiring its type.
    pub fn parse(&mut self, result_type: Option<ValueType>) -> ParseResult<TypedExpr> {
        let start = self.token().pos;
        let mut expr = self.parse_expression()?;
        if let Some(expected) = result_type {
            if !expr.ty.is_assignable_to(expected) {
                return Err(ParseError::new(
                    start,
                    format!("Expression of type '{}' expected", expected),
                ));
            }
            if expr.ty == ValueType::Null {
                expr.ty = expected;
            } else if expr.ty == ValueType::Integer && expected == ValueType::Float {
                // Widen: int + 0.0 evaluates as float and still propagates null.
                expr = binary(
                    BinaryOp::Add,
                    expr,
                    TypedExpr::constant(Value::Float(0.0)),
                    ValueType::Float,
                );
            }
        }
        self.expect_end()?;
        Ok(expr)
    }

    /// Parse `key [asc|desc], ...`.
    pub fn parse_ordering(&mut self) -> ParseResult<Vec<(TypedExpr, bool)>> {
        let mut orderings = Vec::new();
        loop {
            let expr = self.parse_expression()?;
            let mut ascending = true;
            if self.token().is_keyword("asc") || self.token().is_keyword("ascending") {
                self.next();
            } else if self.token().is_keyword("desc") || self.token().is_keyword("descending") {
                self.next();
                ascending = false;
            }
            orderings.push((expr, ascending));
            if self.token().kind != TokenKind::Comma {
                break;
            }
            self.next();
        }
        self.expect_end()?;
        Ok(orderings)
    }

    /// Parse `new(expr [as Name], ...)` or the same list without `new(...)`.
    pub fn parse_projection(&mut self) -> ParseResult<Vec<(String, TypedExpr)>> {
        let wrapped = self.token().is_keyword("new")
            && self.tokens.get(self.pos + 1).map(|t| &t.kind) == Some(&TokenKind::LParen);
        if wrapped {
            self.next();
            self.next();
        }

        let mut items: Vec<(String, TypedExpr)> = Vec::new();
        loop {
            let start_index = self.pos;
            let start = self.token().pos;
            let expr = self.parse_expression()?;

            let name = if self.token().is_keyword("as") {
                self.next();
                self.expect_identifier()?.0
            } else {
                self.implied_name(start_index, &expr).ok_or_else(|| {
                    ParseError::new(start, "Expression is missing an 'as' clause")
                })?
            };

            if items.iter().any(|(n, _)| n.eq_ignore_ascii_case(&name)) {
                return Err(ParseError::new(
                    start,
                    format!("Duplicate property name '{}'", name),
                ));
            }
            items.push((name, expr));

            if self.token().kind != TokenKind::Comma {
                break;
            }
            self.next();
        }

        if wrapped {
            self.expect(TokenKind::RParen, "')' or ',' expected")?;
        }
        self.expect_end()?;
        Ok(items)
    }

    /// Name for a projection item written as a single identifier.
    fn implied_name(&self, start_index: usize, expr: &TypedExpr) -> Option<String> {
        if self.pos != start_index + 1 {
            return None;
        }
        let ident = self.tokens[start_index].identifier()?;
        match &self.resolver {
            Resolver::Projected { destination, .. } => {
                destination.member(ident).map(|m| m.name.clone())
            }
            Resolver::Direct => expr.member_name().map(str::to_string),
        }
    }

    // -----------------------------------------------------------------------
    // Grammar
    // -----------------------------------------------------------------------

    fn parse_expression(&mut self) -> ParseResult<TypedExpr> {
        self.nested(Self::parse_conditional)
    }

    // test ? a : b
    fn parse_conditional(&mut self) -> ParseResult<TypedExpr> {
        let pos = self.token().pos;
        let expr = self.parse_logical_or()?;
        if self.token().kind == TokenKind::Question {
            self.next();
            let if_true = self.parse_expression()?;
            self.expect(TokenKind::Colon, "':' expected")?;
            let if_false = self.parse_expression()?;
            return conditional(pos, expr, if_true, if_false);
        }
        Ok(expr)
    }

    // ||, or
    fn parse_logical_or(&mut self) -> ParseResult<TypedExpr> {
        let depth = self.depth;
        let mut left = self.parse_logical_and()?;
        while self.token().kind == TokenKind::DoubleBar || self.token().is_keyword("or") {
            let pos = self.token().pos;
            self.descend()?;
            self.next();
            let right = self.parse_logical_and()?;
            left = logical(pos, BinaryOp::Or, "||", left, right)?;
        }
        self.depth = depth;
        Ok(left)
    }

    // &&, and
    fn parse_logical_and(&mut self) -> ParseResult<TypedExpr> {
        let depth = self.depth;
        let mut left = self.parse_comparison()?;
        while self.token().kind == TokenKind::DoubleAmp || self.token().is_keyword("and") {
            let pos = self.token().pos;
            self.descend()?;
            self.next();
            let right = self.parse_comparison()?;
            left = logical(pos, BinaryOp::And, "&&", left, right)?;
        }
        self.depth = depth;
        Ok(left)
    }

    // = == != <> < <= > >=
    fn parse_comparison(&mut self) -> ParseResult<TypedExpr> {
        let depth = self.depth;
        let mut left = self.parse_additive()?;
        loop {
            let (op, symbol) = match self.token().kind {
                TokenKind::Equal | TokenKind::DoubleEqual => (BinaryOp::Eq, "="),
                TokenKind::ExclamationEqual | TokenKind::LessGreater => (BinaryOp::NotEq, "!="),
                TokenKind::LessThan => (BinaryOp::Lt, "<"),
                TokenKind::LessEqual => (BinaryOp::LtEq, "<="),
                TokenKind::GreaterThan => (BinaryOp::Gt, ">"),
                TokenKind::GreaterEqual => (BinaryOp::GtEq, ">="),
                _ => break,
            };
            let pos = self.token().pos;
            self.descend()?;
            self.next();
            let right = self.parse_additive()?;

            let unified = left.ty.unify(right.ty);
            let valid = match (op, unified) {
                (BinaryOp::Eq | BinaryOp::NotEq, Some(_)) => true,
                (_, Some(t)) => t.is_numeric() || t == ValueType::String || t == ValueType::Null,
                (_, None) => false,
            };
            if !valid {
                return Err(incompatible(pos, symbol, &left, &right));
            }
            left = binary(op, left, right, ValueType::Boolean);
        }
        self.depth = depth;
        Ok(left)
    }

    // + - &
    fn parse_additive(&mut self) -> ParseResult<TypedExpr> {
        let depth = self.depth;
        let mut left = self.parse_multiplicative()?;
        loop {
            let kind = self.token().kind.clone();
            let pos = self.token().pos;
            match kind {
                TokenKind::Plus | TokenKind::Minus | TokenKind::Amp => {}
                _ => break,
            }
            self.descend()?;
            self.next();
            let right = self.parse_multiplicative()?;
            left = match kind {
                TokenKind::Amp => binary(BinaryOp::Concat, left, right, ValueType::String),
                TokenKind::Plus
                    if left.ty == ValueType::String || right.ty == ValueType::String =>
                {
                    binary(BinaryOp::Concat, left, right, ValueType::String)
                }
                TokenKind::Plus => arithmetic(pos, BinaryOp::Add, "+", left, right)?,
                _ => arithmetic(pos, BinaryOp::Subtract, "-", left, right)?,
            };
        }
        self.depth = depth;
        Ok(left)
    }

    // * / % mod
    fn parse_multiplicative(&mut self) -> ParseResult<TypedExpr> {
        let depth = self.depth;
        let mut left = self.parse_unary()?;
        loop {
            let (op, symbol) = match self.token().kind {
                TokenKind::Star => (BinaryOp::Multiply, "*"),
                TokenKind::Slash => (BinaryOp::Divide, "/"),
                TokenKind::Percent => (BinaryOp::Modulo, "%"),
                _ if self.token().is_keyword("mod") => (BinaryOp::Modulo, "mod"),
                _ => break,
            };
            let pos = self.token().pos;
            self.descend()?;
            self.next();
            let right = self.parse_unary()?;
            left = arithmetic(pos, op, symbol, left, right)?;
        }
        self.depth = depth;
        Ok(left)
    }

    // - ! not
    fn parse_unary(&mut self) -> ParseResult<TypedExpr> {
        let pos = self.token().pos;
        if self.token().kind == TokenKind::Minus {
            self.next();
            if let TokenKind::IntegerLiteral(text) | TokenKind::RealLiteral(text) =
                self.token().kind.clone()
            {
                let literal_pos = self.token().pos;
                self.next();
                let literal = number_literal(literal_pos, &format!("-{}", text))?;
                return self.parse_postfix(literal);
            }
            let operand = self.nested(Self::parse_unary)?;
            if !operand.ty.is_numeric() && operand.ty != ValueType::Null {
                return Err(ParseError::new(
                    pos,
                    format!("Operator '-' incompatible with operand type '{}'", operand.ty),
                ));
            }
            let ty = operand.ty;
            return Ok(TypedExpr::new(
                ExprKind::Unary {
                    op: UnaryOp::Negate,
                    operand: Box::new(operand),
                },
                ty,
            ));
        }
        if self.token().kind == TokenKind::Exclamation || self.token().is_keyword("not") {
            self.next();
            let operand = self.nested(Self::parse_unary)?;
            if !operand.ty.is_assignable_to(ValueType::Boolean) {
                return Err(ParseError::new(
                    pos,
                    format!("Operator '!' incompatible with operand type '{}'", operand.ty),
                ));
            }
            return Ok(TypedExpr::new(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                ValueType::Boolean,
            ));
        }
        let primary = self.parse_primary()?;
        self.parse_postfix(primary)
    }

    fn parse_primary(&mut self) -> ParseResult<TypedExpr> {
        let token = self.token().clone();
        match token.kind {
            TokenKind::IntegerLiteral(text) | TokenKind::RealLiteral(text) => {
                self.next();
                number_literal(token.pos, &text)
            }
            TokenKind::StringLiteral(s) => {
                self.next();
                Ok(TypedExpr::constant(Value::String(s)))
            }
            TokenKind::Placeholder(index) => {
                self.next();
                let value = self.values.get(index).cloned().ok_or_else(|| {
                    ParseError::new(
                        token.pos,
                        format!("Placeholder '@{}' has no corresponding value", index),
                    )
                })?;
                Ok(TypedExpr::constant(value))
            }
            TokenKind::LParen => {
                self.next();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')' or operator expected")?;
                Ok(expr)
            }
            TokenKind::Identifier(name) => self.parse_identifier(&name, token.pos),
            _ => Err(ParseError::new(token.pos, "Expression expected")),
        }
    }

    fn parse_identifier(&mut self, name: &str, pos: usize) -> ParseResult<TypedExpr> {
        let lower = name.to_ascii_lowercase();
        match lower.as_str() {
            "true" => {
                self.next();
                return Ok(TypedExpr::constant(Value::Boolean(true)));
            }
            "false" => {
                self.next();
                return Ok(TypedExpr::constant(Value::Boolean(false)));
            }
            "null" => {
                self.next();
                return Ok(TypedExpr::constant(Value::Null));
            }
            "it" => {
                let it = self
                    .it
                    .ok_or_else(|| ParseError::new(pos, "No 'it' is in scope"))?;
                self.next();
                self.expect(TokenKind::Dot, "Member access expected after 'it'")?;
                let (member, member_pos) = self.expect_identifier()?;
                return self.resolve_member(it, &member, member_pos);
            }
            "iif" => {
                self.next();
                self.expect(TokenKind::LParen, "'(' expected")?;
                let test = self.parse_expression()?;
                self.expect(TokenKind::Comma, "',' expected")?;
                let if_true = self.parse_expression()?;
                self.expect(TokenKind::Comma, "',' expected")?;
                let if_false = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')' or ',' expected")?;
                return conditional(pos, test, if_true, if_false);
            }
            _ => {}
        }

        if let Some(index) = self
            .parameters
            .iter()
            .position(|p| !p.is_implicit() && p.name.eq_ignore_ascii_case(name))
        {
            self.next();
            self.expect(
                TokenKind::Dot,
                &format!("Member access expected after '{}'", name),
            )?;
            let (member, member_pos) = self.expect_identifier()?;
            return self.resolve_member(index, &member, member_pos);
        }

        match self.it {
            Some(it) => {
                self.next();
                self.resolve_member(it, name, pos)
            }
            None => Err(ParseError::new(
                pos,
                format!("Unknown identifier '{}'", name),
            )),
        }
    }

    // .Length, .ToUpper(), .StartsWith(x), ...
    fn parse_postfix(&mut self, mut expr: TypedExpr) -> ParseResult<TypedExpr> {
        let depth = self.depth;
        while self.token().kind == TokenKind::Dot {
            self.descend()?;
            self.next();
            let (name, pos) = self.expect_identifier()?;
            let (method, arity) = match Method::lookup(&name) {
                Some(m) if expr.ty == ValueType::String || expr.ty == ValueType::Null => m,
                _ => {
                    return Err(ParseError::new(
                        pos,
                        format!(
                            "No applicable method or property '{}' exists in type '{}'",
                            name, expr.ty
                        ),
                    ))
                }
            };

            let mut args = Vec::new();
            if !method.is_property() {
                self.expect(TokenKind::LParen, "'(' expected")?;
                if self.token().kind != TokenKind::RParen {
                    loop {
                        let arg_pos = self.token().pos;
                        let arg = self.parse_expression()?;
                        if !arg.ty.is_assignable_to(ValueType::String) {
                            return Err(ParseError::new(
                                arg_pos,
                                format!("Argument of '{}' must be of type 'string'", name),
                            ));
                        }
                        args.push(arg);
                        if self.token().kind != TokenKind::Comma {
                            break;
                        }
                        self.next();
                    }
                }
                self.expect(TokenKind::RParen, "')' or ',' expected")?;
            }
            if args.len() != arity {
                return Err(ParseError::new(
                    pos,
                    format!("Method '{}' expects {} argument(s)", name, arity),
                ));
            }

            expr = TypedExpr::new(
                ExprKind::Call {
                    method,
                    target: Box::new(expr),
                    args,
                },
                method.result_type(),
            );
        }
        self.depth = depth;
        Ok(expr)
    }

    fn resolve_member(&self, parameter: usize, name: &str, pos: usize) -> ParseResult<TypedExpr> {
        let shape = &self.parameters[parameter].shape;
        let is_it = Some(parameter) == self.it;
        match &self.resolver {
            Resolver::Projected {
                config,
                destination,
            } if is_it => resolve_destination_member(config, shape, destination, name)
                .map(|e| e.rebind(parameter))
                .map_err(|e| ParseError::new(pos, e.message)),
            _ => direct_member(shape, parameter, name).ok_or_else(|| {
                ParseError::new(
                    pos,
                    format!(
                        "No property or field '{}' exists in type '{}'",
                        name,
                        shape.name()
                    ),
                )
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Nesting
    // -----------------------------------------------------------------------

    fn descend(&mut self) -> ParseResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ParseError::new(
                self.token().pos,
                "Expression is too deeply nested",
            ));
        }
        Ok(())
    }

    /// Run `parse` one level deeper, restoring the depth afterwards.
    fn nested<T>(&mut self, parse: fn(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        let depth = self.depth;
        self.descend()?;
        let result = parse(self);
        self.depth = depth;
        result
    }

    // -----------------------------------------------------------------------
    // Token helpers
    // -----------------------------------------------------------------------

    fn token(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn next(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> ParseResult<()> {
        if self.token().kind == kind {
            self.next();
            Ok(())
        } else {
            Err(ParseError::new(self.token().pos, message))
        }
    }

    fn expect_identifier(&mut self) -> ParseResult<(String, usize)> {
        let token = self.token().clone();
        match token.kind {
            TokenKind::Identifier(name) => {
                self.next();
                Ok((name, token.pos))
            }
            _ => Err(ParseError::new(token.pos, "Identifier expected")),
        }
    }

    fn expect_end(&self) -> ParseResult<()> {
        if self.token().kind == TokenKind::End {
            Ok(())
        } else {
            Err(ParseError::new(self.token().pos, "Syntax error"))
        }
    }
}

/// Resolve a destination member to an expression over the source shape,
/// bound to parameter 0.
pub(crate) fn resolve_destination_member(
    config: &MappingConfiguration,
    source: &Arc<Shape>,
    destination: &Shape,
    name: &str,
) -> ParseResult<TypedExpr> {
    let member = destination.member(name).ok_or_else(|| {
        ParseError::new(
            0,
            format!(
                "No property or field '{}' exists in type '{}'",
                name,
                destination.name()
            ),
        )
    })?;

    if source.name() == destination.name() {
        return direct_member(source, 0, &member.name).ok_or_else(|| {
            ParseError::new(
                0,
                format!(
                    "No property or field '{}' exists in type '{}'",
                    name,
                    source.name()
                ),
            )
        });
    }

    let map = config
        .find_type_map(source.name(), destination.name())
        .ok_or_else(|| {
            ParseError::new(
                0,
                format!(
                    "Missing map from '{}' to '{}'",
                    source.name(),
                    destination.name()
                ),
            )
        })?;

    match map.member_source(&member.name) {
        Some(MemberSource::Member(from)) => direct_member(source, 0, from).ok_or_else(|| {
            ParseError::new(
                0,
                format!(
                    "'{}.{}' maps from '{}', which does not exist in type '{}'",
                    destination.name(),
                    member.name,
                    from,
                    source.name()
                ),
            )
        }),
        Some(MemberSource::Expression(text)) => {
            let parameters = [Parameter::implicit(Arc::clone(source))];
            ExpressionParser::new(&parameters, text, &[], None, None)
                .and_then(|mut p| p.parse(None))
                .map_err(|e| {
                    ParseError::new(
                        0,
                        format!(
                            "Invalid mapping for '{}.{}': {}",
                            destination.name(),
                            member.name,
                            e
                        ),
                    )
                })
        }
        None => direct_member(source, 0, &member.name).ok_or_else(|| {
            ParseError::new(
                0,
                format!(
                    "'{}.{}' is not mapped from type '{}'",
                    destination.name(),
                    member.name,
                    source.name()
                ),
            )
        }),
    }
}

fn direct_member(shape: &Shape, parameter: usize, name: &str) -> Option<TypedExpr> {
    shape.member(name).map(|m| {
        TypedExpr::new(
            ExprKind::Member {
                parameter,
                name: m.name.clone(),
            },
            m.ty,
        )
    })
}

fn number_literal(pos: usize, text: &str) -> ParseResult<TypedExpr> {
    let is_real = text.contains(['.', 'e', 'E']);
    if is_real {
        text.parse::<f64>()
            .map(|f| TypedExpr::constant(Value::Float(f)))
            .map_err(|_| ParseError::new(pos, format!("Invalid real literal '{}'", text)))
    } else {
        text.parse::<i64>()
            .map(|i| TypedExpr::constant(Value::Integer(i)))
            .map_err(|_| ParseError::new(pos, format!("Invalid integer literal '{}'", text)))
    }
}

fn binary(op: BinaryOp, left: TypedExpr, right: TypedExpr, ty: ValueType) -> TypedExpr {
    TypedExpr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        ty,
    )
}

fn incompatible(pos: usize, symbol: &str, left: &TypedExpr, right: &TypedExpr) -> ParseError {
    ParseError::new(
        pos,
        format!(
            "Operator '{}' incompatible with operand types '{}' and '{}'",
            symbol, left.ty, right.ty
        ),
    )
}

fn logical(
    pos: usize,
    op: BinaryOp,
    symbol: &str,
    left: TypedExpr,
    right: TypedExpr,
) -> ParseResult<TypedExpr> {
    if !left.ty.is_assignable_to(ValueType::Boolean) || !right.ty.is_assignable_to(ValueType::Boolean)
    {
        return Err(incompatible(pos, symbol, &left, &right));
    }
    Ok(binary(op, left, right, ValueType::Boolean))
}

fn arithmetic(
    pos: usize,
    op: BinaryOp,
    symbol: &str,
    left: TypedExpr,
    right: TypedExpr,
) -> ParseResult<TypedExpr> {
    match left.ty.unify(right.ty) {
        Some(ty) if ty.is_numeric() || ty == ValueType::Null => Ok(binary(op, left, right, ty)),
        _ => Err(incompatible(pos, symbol, &left, &right)),
    }
}

fn conditional(
    pos: usize,
    test: TypedExpr,
    if_true: TypedExpr,
    if_false: TypedExpr,
) -> ParseResult<TypedExpr> {
    if !test.ty.is_assignable_to(ValueType::Boolean) {
        return Err(ParseError::new(pos, "Expression of type 'bool' expected"));
    }
    let ty = if_true.ty.unify(if_false.ty).ok_or_else(|| {
        ParseError::new(
            pos,
            format!(
                "Conditional branches of types '{}' and '{}' are incompatible",
                if_true.ty, if_false.ty
            ),
        )
    })?;
    Ok(TypedExpr::new(
        ExprKind::Conditional {
            test: Box::new(test),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        },
        ty,
    ))
}
