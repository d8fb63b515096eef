//! Placeholder scanner using nom.
//!
//! Compiled statements name their parameters (`?status1`); MySQL binds
//! positionally. The scanner splits statement text into literal runs and
//! named placeholders, leaving quoted strings and backtick identifiers alone.
//!
//! ```text
//! UPDATE `t` AS TB SET TB.`a`=?a1 WHERE TB.`b` IN ?b2 AND TB.`c` = 'x?y'
//!                             ───              ───                  ─────
//!                             │                │                    └── literal, untouched
//!                             │                └── list, expanded to (?, ?, ?)
//!                             └── scalar, becomes ?
//! ```

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_while1},
    character::complete::{anychar, char},
    combinator::{map, recognize},
    multi::{many0, many0_count},
    sequence::{pair, preceded, tuple},
    IResult,
};

use crate::ast::Value;
use crate::error::{RdbError, RdbResult};
use crate::params::ParameterSet;

/// A piece of statement text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Sql(&'a str),
    /// Placeholder name without the `?`.
    Placeholder(&'a str),
}

/// Split statement text into literal runs and named placeholders.
pub fn scan(input: &str) -> RdbResult<Vec<Segment<'_>>> {
    match many0(parse_segment)(input) {
        Ok(("", segments)) => Ok(segments),
        Ok((remaining, _)) => Err(RdbError::Execution(format!(
            "unterminated literal at byte {} of statement",
            input.len() - remaining.len()
        ))),
        Err(e) => Err(RdbError::Execution(format!("statement scan failed: {:?}", e))),
    }
}

/// Placeholder names in order of appearance (repeats included).
pub fn placeholders(input: &str) -> RdbResult<Vec<&str>> {
    Ok(scan(input)?
        .into_iter()
        .filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name),
            Segment::Sql(_) => None,
        })
        .collect())
}

/// Rewrite named placeholders to positional `?` and collect values in bind order.
///
/// List values expand to `(?, ?, …)`; an empty list becomes `(NULL)` so
/// `IN`/`NOT IN` stay valid.
pub fn to_positional(sql: &str, parameters: &ParameterSet) -> RdbResult<(String, Vec<Value>)> {
    let mut text = String::with_capacity(sql.len());
    let mut values = Vec::new();
    for segment in scan(sql)? {
        match segment {
            Segment::Sql(s) => text.push_str(s),
            Segment::Placeholder(name) => {
                let value = parameters
                    .value(name)
                    .ok_or_else(|| RdbError::UnknownParameter(name.to_string()))?;
                match value {
                    Value::List(items) if items.is_empty() => text.push_str("(NULL)"),
                    Value::List(items) => {
                        let marks = vec!["?"; items.len()].join(", ");
                        text.push('(');
                        text.push_str(&marks);
                        text.push(')');
                        values.extend(items.iter().cloned());
                    }
                    other => {
                        text.push('?');
                        values.push(other.clone());
                    }
                }
            }
        }
    }
    Ok((text, values))
}

fn parse_segment(input: &str) -> IResult<&str, Segment<'_>> {
    alt((
        map(parse_placeholder, Segment::Placeholder),
        map(
            alt((
                parse_single_quoted,
                parse_double_quoted,
                parse_backtick,
                is_not("'\"`?"),
                recognize(char('?')),
            )),
            Segment::Sql,
        ),
    ))(input)
}

fn parse_placeholder(input: &str) -> IResult<&str, &str> {
    preceded(
        char('?'),
        take_while1(|c: char| c.is_alphanumeric() || c == '_'),
    )(input)
}

/// `'...'` with `''` and backslash escapes.
fn parse_single_quoted(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        char('\''),
        many0_count(alt((
            tag("''"),
            recognize(pair(char('\\'), anychar)),
            is_not("'\\"),
        ))),
        char('\''),
    )))(input)
}

fn parse_double_quoted(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        char('"'),
        many0_count(alt((
            tag("\"\""),
            recognize(pair(char('\\'), anychar)),
            is_not("\"\\"),
        ))),
        char('"'),
    )))(input)
}

fn parse_backtick(input: &str) -> IResult<&str, &str> {
    recognize(tuple((
        char('`'),
        many0_count(alt((tag("``"), is_not("`")))),
        char('`'),
    )))(input)
}
