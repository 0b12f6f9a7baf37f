//! Core data types for the event index
//!
//! This module defines the fundamental types used throughout the storage layer:
//! - `EventId` / `Timestamp`: the dense primary key and its wall-clock time
//! - `Role`: the small tag describing how a value is referenced by an event
//! - `Tuple`: what an ordered tuple store holds (`PlainTuple`, `RoleTuple`, `Stamp`)
//! - `TieBreak`: timestamp lookup policy

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::str::FromStr;

/// Dense, strictly increasing event identifier
pub type EventId = u64;

/// Trace timestamp, non-decreasing in ingestion order
pub type Timestamp = u64;

/// Semantic position of a referenced value inside an event
///
/// Object roles are negative, except argument positions which count from 1.
/// Behavior roles live in their own range (0..=5) and are only stored in the
/// behavior dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Role(pub i8);

impl Role {
    pub const TARGET: Role = Role(-1);
    pub const VALUE: Role = Role(-2);
    pub const RESULT: Role = Role(-3);
    pub const EXCEPTION: Role = Role(-4);
    /// Matches any argument position
    pub const ANY_ARG: Role = Role(-5);
    /// Matches any role
    pub const ANY: Role = Role(-6);

    /// Any behavior role
    pub const BEHAVIOR_ANY: Role = Role(0);
    /// Either `BEHAVIOR_CALLED` or `BEHAVIOR_EXECUTED`
    pub const BEHAVIOR_ANY_ENTER: Role = Role(1);
    pub const BEHAVIOR_CALLED: Role = Role(2);
    pub const BEHAVIOR_EXECUTED: Role = Role(3);
    pub const BEHAVIOR_EXIT: Role = Role(4);
    pub const BEHAVIOR_OPERATION: Role = Role(5);

    /// Condition-language names of the behavior roles
    pub const BEHAVIOR_NAMES: [(&'static str, Role); 6] = [
        ("any", Role::BEHAVIOR_ANY),
        ("enter", Role::BEHAVIOR_ANY_ENTER),
        ("called", Role::BEHAVIOR_CALLED),
        ("executed", Role::BEHAVIOR_EXECUTED),
        ("exit", Role::BEHAVIOR_EXIT),
        ("operation", Role::BEHAVIOR_OPERATION),
    ];

    /// Role for the argument at `position` (counted from 1)
    pub fn argument(position: u8) -> Option<Role> {
        if position == 0 || position > i8::MAX as u8 {
            None
        } else {
            Some(Role(position as i8))
        }
    }

    pub fn is_argument(self) -> bool {
        self.0 > 0
    }

    pub fn is_wildcard(self) -> bool {
        self == Role::ANY || self == Role::ANY_ARG
    }

    /// Whether two object roles may describe the same reference
    pub fn compatible(self, other: Role) -> bool {
        if self == other || self == Role::ANY || other == Role::ANY {
            return true;
        }
        (self == Role::ANY_ARG && other.is_argument())
            || (other == Role::ANY_ARG && self.is_argument())
    }

    /// Name of this role read as a behavior role
    pub fn behavior_name(self) -> Option<&'static str> {
        Role::BEHAVIOR_NAMES
            .iter()
            .find(|(_, role)| *role == self)
            .map(|(name, _)| *name)
    }

    /// Behavior role called `name`, case-insensitive
    pub fn behavior_from_name(name: &str) -> Option<Role> {
        Role::BEHAVIOR_NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, role)| *role)
    }

    /// Concrete behavior roles accepted by a behavior role filter
    pub fn behavior_expansion(self) -> Vec<Role> {
        match self {
            Role::BEHAVIOR_ANY => vec![
                Role::BEHAVIOR_CALLED,
                Role::BEHAVIOR_EXECUTED,
                Role::BEHAVIOR_EXIT,
                Role::BEHAVIOR_OPERATION,
            ],
            Role::BEHAVIOR_ANY_ENTER => vec![Role::BEHAVIOR_CALLED, Role::BEHAVIOR_EXECUTED],
            other => vec![other],
        }
    }

    /// Concrete object roles accepted by an object role filter, `None` meaning all
    pub fn object_expansion(self) -> Option<Vec<Role>> {
        match self {
            Role::ANY => None,
            Role::ANY_ARG => Some((1..=i8::MAX).map(Role).collect()),
            other => Some(vec![other]),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Role::TARGET => write!(f, "target"),
            Role::VALUE => write!(f, "value"),
            Role::RESULT => write!(f, "result"),
            Role::EXCEPTION => write!(f, "exception"),
            Role::ANY_ARG => write!(f, "anyarg"),
            Role::ANY => write!(f, "any"),
            Role(n) => write!(f, "arg{}", n),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "target" => Ok(Role::TARGET),
            "value" => Ok(Role::VALUE),
            "result" => Ok(Role::RESULT),
            "exception" => Ok(Role::EXCEPTION),
            "anyarg" => Ok(Role::ANY_ARG),
            "any" => Ok(Role::ANY),
            "enter" => Ok(Role::BEHAVIOR_ANY_ENTER),
            "called" => Ok(Role::BEHAVIOR_CALLED),
            "executed" => Ok(Role::BEHAVIOR_EXECUTED),
            "exit" => Ok(Role::BEHAVIOR_EXIT),
            "operation" => Ok(Role::BEHAVIOR_OPERATION),
            other => other
                .strip_prefix("arg")
                .and_then(|n| n.parse::<u8>().ok())
                .and_then(Role::argument)
                .ok_or_else(|| format!("Unknown role: {}", s)),
        }
    }
}

/// A record stored in an ordered tuple store
///
/// Tuples are ordered by `key()`. Stores reject keys that go backwards, and
/// equal keys unless `DUPLICATE_KEYS` is set.
pub trait Tuple: Copy + Debug + PartialEq + Send + Sync + 'static {
    /// Whether consecutive tuples may share a key
    const DUPLICATE_KEYS: bool;

    /// Whether tuples carry a role byte
    const ROLE_TAGGED: bool;

    fn key(&self) -> u64;

    fn role(&self) -> Option<Role> {
        None
    }

    fn from_parts(key: u64, role: Option<Role>) -> Self;
}

/// An event id with no further information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlainTuple {
    pub event_id: EventId,
}

impl PlainTuple {
    pub fn new(event_id: EventId) -> Self {
        Self { event_id }
    }
}

impl Tuple for PlainTuple {
    const DUPLICATE_KEYS: bool = false;
    const ROLE_TAGGED: bool = false;

    fn key(&self) -> u64 {
        self.event_id
    }

    fn from_parts(key: u64, _role: Option<Role>) -> Self {
        Self { event_id: key }
    }
}

/// An event id tagged with the role the indexed value plays in that event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoleTuple {
    pub event_id: EventId,
    pub role: Role,
}

impl RoleTuple {
    pub fn new(event_id: EventId, role: Role) -> Self {
        Self { event_id, role }
    }
}

impl Tuple for RoleTuple {
    const DUPLICATE_KEYS: bool = true;
    const ROLE_TAGGED: bool = true;

    fn key(&self) -> u64 {
        self.event_id
    }

    fn role(&self) -> Option<Role> {
        Some(self.role)
    }

    fn from_parts(key: u64, role: Option<Role>) -> Self {
        Self {
            event_id: key,
            role: role.unwrap_or(Role::ANY),
        }
    }
}

impl From<PlainTuple> for RoleTuple {
    fn from(tuple: PlainTuple) -> Self {
        RoleTuple::new(tuple.event_id, Role::ANY)
    }
}

/// A timestamp entry of the timestamp sequence; its position is the event id
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Stamp {
    pub timestamp: Timestamp,
}

impl Tuple for Stamp {
    const DUPLICATE_KEYS: bool = true;
    const ROLE_TAGGED: bool = false;

    fn key(&self) -> u64 {
        self.timestamp
    }

    fn from_parts(key: u64, _role: Option<Role>) -> Self {
        Self { timestamp: key }
    }
}

/// Policy for resolving a timestamp to an event id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    /// First event whose timestamp is >= the requested one
    AtOrAfter,
    /// Last event whose timestamp is <= the requested one
    AtOrBefore,
}
