//! Segment queries and operator semantics
//!
//! A [`Query`] is the configured `{argument, operator, filter}` triple.
//! Before evaluation it is compiled into a [`CompiledQuery`], which coerces
//! the filter once and pre-builds regexes and selectors.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use tm_core::{format_number, parse_number, FieldValue};
use tracing::{debug, trace};

use crate::selector::SelectorList;

/// Comparison operator of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    NotStartsWith,
    EndsWith,
    NotEndsWith,
    MatchesRegex,
    NotMatchesRegex,
    Greater,
    GreaterOrEquals,
    Less,
    LessOrEquals,
    MatchesSelector,
    NotMatchesSelector,
}

/// A single field/operator/filter condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Built-in event field or variable name
    pub argument: String,
    pub operator: Operator,
    /// Raw filter; scalars in the config are read as their string form
    #[serde(default, deserialize_with = "deserialize_filter")]
    pub filter: String,
}

impl Query {
    pub fn new(argument: impl Into<String>, operator: Operator, filter: impl Into<String>) -> Self {
        Self {
            argument: argument.into(),
            operator,
            filter: filter.into(),
        }
    }

    pub fn compile(&self) -> CompiledQuery {
        CompiledQuery::new(self.clone())
    }
}

fn deserialize_filter<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawFilter {
        Text(String),
        Integer(i64),
        Float(f64),
        Bool(bool),
    }

    Ok(match Option::<RawFilter>::deserialize(deserializer)? {
        Some(RawFilter::Text(s)) => s,
        Some(RawFilter::Integer(i)) => i.to_string(),
        Some(RawFilter::Float(f)) => format_number(f),
        Some(RawFilter::Bool(b)) => b.to_string(),
        None => "null".to_string(),
    })
}

/// Filter after type coercion
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Undefined,
    Null,
    Number(f64),
    Text(String),
}

/// Coerce a filter string: `"undefined"`, `"null"`, numeric strings, else text
pub fn coerce_filter(filter: &str) -> Filter {
    match filter {
        "undefined" => Filter::Undefined,
        "null" => Filter::Null,
        _ => match parse_number(filter) {
            Some(n) => Filter::Number(n),
            None => Filter::Text(filter.to_string()),
        },
    }
}

/// Strict equality between a value and a coerced filter
///
/// Values are not converted: the text `"5"` does not equal the number 5.
fn strictly_equal(value: &FieldValue, filter: &Filter) -> bool {
    match (value, filter) {
        (FieldValue::Undefined, Filter::Undefined) => true,
        (FieldValue::Null, Filter::Null) => true,
        (FieldValue::Number(n), Filter::Number(f)) => n == f,
        (FieldValue::Text(s), Filter::Text(f)) => s == f,
        _ => false,
    }
}

#[derive(Debug, Clone, Copy)]
enum TextTest {
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Greater,
    GreaterOrEquals,
    Less,
    LessOrEquals,
}

#[derive(Debug, Clone)]
enum Matcher {
    Equals(Filter),
    NotEquals(Filter),
    Text {
        test: TextTest,
        negate: bool,
        filter: String,
    },
    Regex {
        regex: Option<Regex>,
        negate: bool,
    },
    Order {
        bound: Bound,
        limit: Option<f64>,
    },
    Selector {
        selector: Option<SelectorList>,
        negate: bool,
    },
}

/// A query ready for evaluation
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    query: Query,
    matcher: Matcher,
}

impl CompiledQuery {
    pub fn new(query: Query) -> Self {
        let filter = query.filter.as_str();
        let text = |test, negate| Matcher::Text {
            test,
            negate,
            filter: filter.to_string(),
        };

        let matcher = match query.operator {
            Operator::Equals => Matcher::Equals(coerce_filter(filter)),
            Operator::NotEquals => Matcher::NotEquals(coerce_filter(filter)),
            Operator::Contains => text(TextTest::Contains, false),
            Operator::NotContains => text(TextTest::Contains, true),
            Operator::StartsWith => text(TextTest::StartsWith, false),
            Operator::NotStartsWith => text(TextTest::StartsWith, true),
            Operator::EndsWith => text(TextTest::EndsWith, false),
            Operator::NotEndsWith => text(TextTest::EndsWith, true),
            Operator::MatchesRegex | Operator::NotMatchesRegex => Matcher::Regex {
                regex: compile_regex(&query.argument, filter),
                negate: query.operator == Operator::NotMatchesRegex,
            },
            Operator::Greater => order(Bound::Greater, filter),
            Operator::GreaterOrEquals => order(Bound::GreaterOrEquals, filter),
            Operator::Less => order(Bound::Less, filter),
            Operator::LessOrEquals => order(Bound::LessOrEquals, filter),
            Operator::MatchesSelector | Operator::NotMatchesSelector => Matcher::Selector {
                selector: compile_selector(&query.argument, filter),
                negate: query.operator == Operator::NotMatchesSelector,
            },
        };

        Self { query, matcher }
    }

    /// Field or variable this query reads
    pub fn argument(&self) -> &str {
        &self.query.argument
    }

    /// Apply the operator to a resolved value
    pub fn matches(&self, value: &FieldValue) -> bool {
        let result = match &self.matcher {
            Matcher::Equals(filter) => strictly_equal(value, filter),
            Matcher::NotEquals(filter) => !strictly_equal(value, filter),
            Matcher::Text {
                test,
                negate,
                filter,
            } => {
                if filter.is_empty() {
                    false
                } else {
                    let haystack = value.string_form();
                    let found = match test {
                        TextTest::Contains => haystack.contains(filter.as_str()),
                        TextTest::StartsWith => haystack.starts_with(filter.as_str()),
                        TextTest::EndsWith => haystack.ends_with(filter.as_str()),
                    };
                    found != *negate
                }
            }
            Matcher::Regex { regex, negate } => match regex {
                Some(regex) => regex.is_match(&value.string_form()) != *negate,
                None => false,
            },
            Matcher::Order { bound, limit } => match (value_for_order(value), limit) {
                (Some(v), Some(limit)) => match bound {
                    Bound::Greater => v > *limit,
                    Bound::GreaterOrEquals => v >= *limit,
                    Bound::Less => v < *limit,
                    Bound::LessOrEquals => v <= *limit,
                },
                _ => false,
            },
            Matcher::Selector { selector, negate } => match (selector, value.as_element()) {
                (Some(selector), Some(element)) => selector.matches(element) != *negate,
                _ => false,
            },
        };

        trace!(
            argument = %self.query.argument,
            operator = ?self.query.operator,
            filter = %self.query.filter,
            ?value,
            result,
            "Evaluated query"
        );
        result
    }
}

fn order(bound: Bound, filter: &str) -> Matcher {
    let limit = match coerce_filter(filter) {
        Filter::Number(n) => Some(n),
        _ => None,
    };
    Matcher::Order { bound, limit }
}

/// Only numbers and strings take part in ordering comparisons
fn value_for_order(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Number(_) | FieldValue::Text(_) => value.as_number(),
        _ => None,
    }
}

fn compile_regex(argument: &str, pattern: &str) -> Option<Regex> {
    if pattern.is_empty() {
        return None;
    }
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            debug!(argument, pattern, error = %e, "Invalid regex in query");
            None
        }
    }
}

fn compile_selector(argument: &str, selector: &str) -> Option<SelectorList> {
    match SelectorList::parse(selector) {
        Ok(list) => Some(list),
        Err(e) => {
            debug!(argument, selector, error = %e, "Invalid selector in query");
            None
        }
    }
}
