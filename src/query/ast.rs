//! Condition Abstract Syntax Tree
//!
//! A condition selects events by the values they carry along the indexed
//! dimensions. Leaves compare one dimension to one value, optionally
//! restricted to a role; `And`/`Or` combine them.
//!
//! # Example Conditions
//!
//! ```text
//! thread = 3
//! behavior = 12 : called
//! thread = 3 AND (depth = 2 OR depth = 3) AND object = 42 : target
//! ```

use crate::index::Dimension;
use crate::storage::Role;
use std::fmt;

/// A parsed condition ready for execution
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// One dimension equal to one value
    Leaf(Leaf),
    /// Events matching every operand
    And(Vec<Condition>),
    /// Events matching any operand
    Or(Vec<Condition>),
}

/// A single `dimension = value [: role]` comparison
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Leaf {
    pub dimension: Dimension,
    pub value: u64,
    pub role: Option<Role>,
}

impl Condition {
    pub fn leaf(dimension: Dimension, value: u64) -> Self {
        Condition::Leaf(Leaf {
            dimension,
            value,
            role: None,
        })
    }

    pub fn leaf_with_role(dimension: Dimension, value: u64, role: Role) -> Self {
        Condition::Leaf(Leaf {
            dimension,
            value,
            role: Some(role),
        })
    }

    pub fn and(operands: Vec<Condition>) -> Self {
        Condition::And(operands)
    }

    pub fn or(operands: Vec<Condition>) -> Self {
        Condition::Or(operands)
    }

    /// Number of leaves, i.e. of postings lists a query will open
    pub fn leaf_count(&self) -> usize {
        match self {
            Condition::Leaf(_) => 1,
            Condition::And(ops) | Condition::Or(ops) => ops.iter().map(Condition::leaf_count).sum(),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |f: &mut fmt::Formatter<'_>, ops: &[Condition], sep: &str| -> fmt::Result {
            write!(f, "(")?;
            for (i, op) in ops.iter().enumerate() {
                if i > 0 {
                    write!(f, " {} ", sep)?;
                }
                write!(f, "{}", op)?;
            }
            write!(f, ")")
        };

        match self {
            Condition::Leaf(leaf) => write!(f, "{}", leaf),
            Condition::And(ops) => join(f, ops, "AND"),
            Condition::Or(ops) => join(f, ops, "OR"),
        }
    }
}

impl fmt::Display for Leaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.dimension, self.value)?;
        match self.role {
            Some(role) if self.dimension == Dimension::Behavior => match role.behavior_name() {
                Some(name) => write!(f, " : {}", name)?,
                None => write!(f, " : {}", role)?,
            },
            Some(role) => write!(f, " : {}", role)?,
            None => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let cond = Condition::and(vec![
            Condition::leaf(Dimension::Thread, 3),
            Condition::or(vec![
                Condition::leaf(Dimension::Depth, 2),
                Condition::leaf(Dimension::Depth, 3),
            ]),
            Condition::leaf_with_role(Dimension::Object, 42, Role::TARGET),
        ]);
        assert_eq!(
            cond.to_string(),
            "(thread = 3 AND (depth = 2 OR depth = 3) AND object = 42 : target)"
        );
        assert_eq!(cond.leaf_count(), 4);
    }

    #[test]
    fn test_display_behavior_roles() {
        let called = Condition::leaf_with_role(Dimension::Behavior, 12, Role::BEHAVIOR_CALLED);
        assert_eq!(called.to_string(), "behavior = 12 : called");

        let any = Condition::leaf_with_role(Dimension::Behavior, 3, Role::BEHAVIOR_ANY);
        assert_eq!(any.to_string(), "behavior = 3 : any");

        let arg = Condition::leaf_with_role(Dimension::Object, 5, Role(2));
        assert_eq!(arg.to_string(), "object = 5 : arg2");
    }
}
