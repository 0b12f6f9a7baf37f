//! Condition Parser
//!
//! Parses condition strings into the `Condition` AST.
//!
//! # Supported Syntax
//!
//! ```text
//! condition := conjunct ( OR conjunct )*
//! conjunct  := term ( AND term )*
//! term      := '(' condition ')' | leaf
//! leaf      := dimension '=' number [ ':' role ]
//! ```
//!
//! # Examples
//!
//! ```text
//! thread = 3
//! behavior = 12 : called
//! field = 4 : value OR variable = 9
//! thread = 3 AND (depth = 2 OR depth = 3) AND object = 42 : target
//! ```
//!
//! Keywords are case-insensitive. Dimension and role names are checked after
//! the syntax, so that unknown names get their own error.

use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::{map, map_res, opt},
    multi::separated_list1,
    sequence::{delimited, preceded, tuple},
    IResult,
};

use crate::index::Dimension;
use crate::query::ast::{Condition, Leaf};
use crate::query::error::{QueryError, QueryResult};
use crate::storage::Role;

/// Syntax tree before names are resolved
#[derive(Debug)]
enum Raw<'a> {
    Leaf {
        dimension: &'a str,
        value: u64,
        role: Option<&'a str>,
    },
    And(Vec<Raw<'a>>),
    Or(Vec<Raw<'a>>),
}

/// Parse a condition string into a Condition AST
pub fn parse_condition(input: &str) -> QueryResult<Condition> {
    let input = input.trim();

    match parse_or(input) {
        Ok((remaining, raw)) => {
            if remaining.trim().is_empty() {
                resolve(raw)
            } else {
                Err(QueryError::Parse(format!(
                    "Unexpected input after condition: '{}'",
                    remaining.trim()
                )))
            }
        }
        Err(e) => Err(QueryError::Parse(format!("Parse error: {:?}", e))),
    }
}

/// Parse OR-separated conjuncts
fn parse_or(input: &str) -> IResult<&str, Raw<'_>> {
    map(
        separated_list1(delimited(multispace0, tag_no_case("OR"), multispace0), parse_and),
        |mut ops| {
            if ops.len() == 1 {
                ops.remove(0)
            } else {
                Raw::Or(ops)
            }
        },
    )(input)
}

/// Parse AND-separated terms
fn parse_and(input: &str) -> IResult<&str, Raw<'_>> {
    map(
        separated_list1(delimited(multispace0, tag_no_case("AND"), multispace0), parse_term),
        |mut ops| {
            if ops.len() == 1 {
                ops.remove(0)
            } else {
                Raw::And(ops)
            }
        },
    )(input)
}

/// Parse a parenthesized condition or a leaf
fn parse_term(input: &str) -> IResult<&str, Raw<'_>> {
    alt((
        delimited(
            tuple((char('('), multispace0)),
            parse_or,
            tuple((multispace0, char(')'))),
        ),
        parse_leaf,
    ))(input)
}

/// Parse a leaf like "object = 42 : target"
fn parse_leaf(input: &str) -> IResult<&str, Raw<'_>> {
    let (input, dimension) = parse_identifier(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = char('=')(input)?;
    let (input, _) = multispace0(input)?;
    let (input, value) = parse_number(input)?;
    let (input, role) = opt(preceded(
        tuple((multispace0, char(':'), multispace0)),
        parse_identifier,
    ))(input)?;

    Ok((input, Raw::Leaf { dimension, value, role }))
}

/// Parse identifier (alphanumeric + underscore)
fn parse_identifier(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_')(input)
}

/// Parse an unsigned integer value
fn parse_number(input: &str) -> IResult<&str, u64> {
    map_res(digit1, |s: &str| s.parse::<u64>())(input)
}

fn resolve(raw: Raw<'_>) -> QueryResult<Condition> {
    match raw {
        Raw::Leaf { dimension, value, role } => {
            let dimension: Dimension = dimension
                .parse()
                .map_err(|_| QueryError::UnknownDimension(dimension.to_string()))?;
            let role = role.map(|r| resolve_role(dimension, r)).transpose()?;
            Ok(Condition::Leaf(Leaf { dimension, value, role }))
        }
        Raw::And(ops) => Ok(Condition::And(
            ops.into_iter().map(resolve).collect::<QueryResult<_>>()?,
        )),
        Raw::Or(ops) => Ok(Condition::Or(
            ops.into_iter().map(resolve).collect::<QueryResult<_>>()?,
        )),
    }
}

fn resolve_role(dimension: Dimension, name: &str) -> QueryResult<Role> {
    let lower = name.to_ascii_lowercase();

    if dimension == Dimension::Behavior {
        return Role::behavior_from_name(&lower)
            .ok_or_else(|| QueryError::InvalidRole(format!("'{}' is not a behavior role", name)));
    }

    if !dimension.is_role_tagged() {
        return Err(QueryError::InvalidRole(format!(
            "dimension '{}' does not carry roles",
            dimension
        )));
    }
    if lower != "any" && Role::behavior_from_name(&lower).is_some() {
        return Err(QueryError::InvalidRole(format!(
            "'{}' is a behavior role, not valid for '{}'",
            name, dimension
        )));
    }
    lower.parse::<Role>().map_err(QueryError::InvalidRole)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single_leaf() {
        let cond = parse_condition("thread = 3").unwrap();
        assert_eq!(cond, Condition::leaf(Dimension::Thread, 3));
    }

    #[test]
    fn test_parse_leaf_without_spaces() {
        let cond = parse_condition("depth=7").unwrap();
        assert_eq!(cond, Condition::leaf(Dimension::Depth, 7));
    }

    #[test]
    fn test_parse_role() {
        let cond = parse_condition("object = 42 : target").unwrap();
        assert_eq!(cond, Condition::leaf_with_role(Dimension::Object, 42, Role::TARGET));

        let cond = parse_condition("field = 1 : arg2").unwrap();
        assert_eq!(cond, Condition::leaf_with_role(Dimension::Field, 1, Role(2)));
    }

    #[test]
    fn test_parse_behavior_roles() {
        let cond = parse_condition("behavior = 12 : called").unwrap();
        assert_eq!(
            cond,
            Condition::leaf_with_role(Dimension::Behavior, 12, Role::BEHAVIOR_CALLED)
        );
        let cond = parse_condition("behavior = 12 : ANY").unwrap();
        assert_eq!(cond, Condition::leaf_with_role(Dimension::Behavior, 12, Role::BEHAVIOR_ANY));
    }

    #[test]
    fn test_display_parses_back() {
        let cond = Condition::and(vec![
            Condition::leaf_with_role(Dimension::Behavior, 12, Role::BEHAVIOR_CALLED),
            Condition::or(vec![
                Condition::leaf_with_role(Dimension::Behavior, 4, Role::BEHAVIOR_ANY_ENTER),
                Condition::leaf_with_role(Dimension::Object, 9, Role(3)),
            ]),
            Condition::leaf(Dimension::Thread, 1),
        ]);
        assert_eq!(parse_condition(&cond.to_string()).unwrap(), cond);
    }

    #[test]
    fn test_parse_precedence() {
        let cond = parse_condition("thread = 1 OR thread = 2 AND depth = 3").unwrap();
        assert_eq!(
            cond,
            Condition::or(vec![
                Condition::leaf(Dimension::Thread, 1),
                Condition::and(vec![
                    Condition::leaf(Dimension::Thread, 2),
                    Condition::leaf(Dimension::Depth, 3),
                ]),
            ])
        );
    }

    #[test]
    fn test_parse_nested() {
        let cond =
            parse_condition("thread = 3 AND (depth = 2 or depth = 3) and object = 42 : target").unwrap();
        assert_eq!(
            cond,
            Condition::and(vec![
                Condition::leaf(Dimension::Thread, 3),
                Condition::or(vec![
                    Condition::leaf(Dimension::Depth, 2),
                    Condition::leaf(Dimension::Depth, 3),
                ]),
                Condition::leaf_with_role(Dimension::Object, 42, Role::TARGET),
            ])
        );
    }

    #[test]
    fn test_unknown_dimension() {
        assert!(matches!(
            parse_condition("colour = 3"),
            Err(QueryError::UnknownDimension(_))
        ));
    }

    #[test]
    fn test_invalid_roles() {
        assert!(matches!(
            parse_condition("thread = 3 : target"),
            Err(QueryError::InvalidRole(_))
        ));
        assert!(matches!(
            parse_condition("behavior = 3 : target"),
            Err(QueryError::InvalidRole(_))
        ));
        assert!(matches!(
            parse_condition("object = 3 : called"),
            Err(QueryError::InvalidRole(_))
        ));
        assert!(matches!(
            parse_condition("object = 3 : sideways"),
            Err(QueryError::InvalidRole(_))
        ));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_condition(""), Err(QueryError::Parse(_))));
        assert!(matches!(parse_condition("thread ="), Err(QueryError::Parse(_))));
        assert!(matches!(parse_condition("thread = 3 AND"), Err(QueryError::Parse(_))));
        assert!(matches!(parse_condition("(thread = 3"), Err(QueryError::Parse(_))));
    }
}
