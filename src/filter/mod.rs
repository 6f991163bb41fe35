//! Filter query language
//!
//! A small subset of the Cloud Logging query language, used to select log
//! records by their fields.
//!
//! # Syntax
//!
//! ```text
//! jsonPayload.foo                         Field exists
//! severity = ERROR                        Case-insensitive equality (also !=)
//! jsonPayload.message : timeout           Substring match
//! jsonPayload.path =~ "^/api/v[0-9]+"     Regular expression match (also !~)
//! a = 1 b = 2                             Adjacent terms combine with AND
//! a = 1 AND (b = 2 OR NOT c = 3)          Explicit AND, OR, NOT (or a leading -)
//! labels."logging.googleapis.com/x" = y   Quoted segments may contain dots
//! ```
//!
//! `OR` binds tighter than `AND`, so `a OR b c` means `(a OR b) AND c`.

pub mod ast;
pub mod error;
pub mod escape;
pub mod lexer;
pub mod parser;
pub mod token;

pub use ast::{Comparison, Expression, Member, Operator, Restriction, Value};
pub use error::FilterError;
pub use escape::lua_quote;

use ast::{append_conjunct, append_disjunct};
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A parsed, simplified filter expression.
///
/// Equality is structural: `foo=bar` and `foo = bar` are the same filter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Filter {
    expression: Expression,
}

impl Filter {
    pub fn parse(text: &str) -> Result<Filter, FilterError> {
        let expression = parser::parse(text)?;
        log::debug!("parsed filter {text:?} as `{expression}`");
        Ok(Filter { expression })
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    pub fn into_expression(self) -> Expression {
        self.expression
    }

    /// Combines filters with AND. `None` when there is nothing to combine.
    pub fn all_of<I>(filters: I) -> Option<Filter>
    where
        I: IntoIterator<Item = Filter>,
    {
        compose(filters, append_conjunct, Expression::Conjunction)
    }

    /// Combines filters with OR. `None` when there is nothing to combine.
    pub fn any_of<I>(filters: I) -> Option<Filter>
    where
        I: IntoIterator<Item = Filter>,
    {
        compose(filters, append_disjunct, Expression::Disjunction)
    }
}

fn compose<I>(
    filters: I,
    append: fn(&mut Vec<Expression>, Expression),
    build: fn(Vec<Expression>) -> Expression,
) -> Option<Filter>
where
    I: IntoIterator<Item = Filter>,
{
    let mut items = Vec::new();
    for filter in filters {
        append(&mut items, filter.expression);
    }
    if items.is_empty() {
        return None;
    }
    Some(Filter {
        expression: build(items).simplify(),
    })
}

impl FromStr for Filter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Filter::parse(s)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Canonical text of a filter; parsing it again yields the same rendering.
pub fn render(filter: &Filter) -> String {
    filter.to_string()
}

impl Member {
    /// Parses text that names a single field, e.g. `labels."logging.googleapis.com/foo"`.
    pub fn parse(text: &str) -> Result<Member, FilterError> {
        match parser::parse(text)? {
            Expression::Restriction(restriction) if restriction.is_existence_check() => {
                Ok(restriction.member)
            }
            _ => Err(FilterError::NotAField(text.to_string())),
        }
    }
}
