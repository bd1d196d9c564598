//! Entry points for turning expression text into lambdas.

use std::sync::Arc;

use crate::error::{ParseError, Result};
use crate::mapping::MappingConfiguration;
use crate::shape::{ClassFactory, DynamicProperty, Shape};
use crate::value::{Value, ValueType};

use super::parser::ExpressionParser;
use super::types::{LambdaExpression, OrderingClause, Parameter, ProjectionItem};

/// Facade over the expression parser.
///
/// `destination`, when given and different from the parameter shape, makes
/// bare member names resolve against that shape through `config`.
pub struct DynamicExpression;

impl DynamicExpression {
    /// Parse `text` as a lambda over a single implicit `it` parameter.
    pub fn parse_lambda(
        config: &MappingConfiguration,
        it_type: &Arc<Shape>,
        destination: Option<&Shape>,
        result_type: Option<ValueType>,
        text: &str,
        values: &[Value],
    ) -> std::result::Result<LambdaExpression, ParseError> {
        let parameters = vec![Parameter::implicit(Arc::clone(it_type))];
        Self::parse_lambda_with_parameters(
            config,
            parameters,
            destination,
            result_type,
            text,
            values,
        )
    }

    /// Parse `text` as a lambda over an explicit parameter list. Named
    /// parameters are referenced as `name.Member`; an unnamed one is `it`.
    pub fn parse_lambda_with_parameters(
        config: &MappingConfiguration,
        parameters: Vec<Parameter>,
        destination: Option<&Shape>,
        result_type: Option<ValueType>,
        text: &str,
        values: &[Value],
    ) -> std::result::Result<LambdaExpression, ParseError> {
        let body = ExpressionParser::new(&parameters, text, values, Some(config), destination)?
            .parse(result_type)?;
        Ok(LambdaExpression::new(parameters, body))
    }

    /// Parse `key [asc|desc], ...` into ordering clauses, primary key first.
    pub fn parse_ordering(
        config: &MappingConfiguration,
        it_type: &Arc<Shape>,
        destination: Option<&Shape>,
        text: &str,
        values: &[Value],
    ) -> std::result::Result<Vec<OrderingClause>, ParseError> {
        let parameters = vec![Parameter::implicit(Arc::clone(it_type))];
        let keys = ExpressionParser::new(&parameters, text, values, Some(config), destination)?
            .parse_ordering()?;
        Ok(keys
            .into_iter()
            .map(|(body, ascending)| OrderingClause {
                selector: LambdaExpression::new(parameters.clone(), body),
                ascending,
            })
            .collect())
    }

    /// Parse `new(expr as Name, ...)` into named projection items.
    pub fn parse_projection(
        config: &MappingConfiguration,
        it_type: &Arc<Shape>,
        destination: Option<&Shape>,
        text: &str,
        values: &[Value],
    ) -> std::result::Result<Vec<ProjectionItem>, ParseError> {
        let parameters = vec![Parameter::implicit(Arc::clone(it_type))];
        let items = ExpressionParser::new(&parameters, text, values, Some(config), destination)?
            .parse_projection()?;
        Ok(items
            .into_iter()
            .map(|(name, body)| ProjectionItem {
                name,
                selector: LambdaExpression::new(parameters.clone(), body),
            })
            .collect())
    }

    /// Shape for the given properties, shared by all equal property lists.
    pub fn create_class<I>(properties: I) -> Result<Arc<Shape>>
    where
        I: IntoIterator<Item = DynamicProperty>,
    {
        ClassFactory::instance().get_dynamic_class(properties)
    }
}
