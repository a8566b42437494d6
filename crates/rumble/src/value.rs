//! Dynamically typed values crossing the guest entry-point boundary.
//!
//! Entry points receive and return [`Value`]s. The `as_*` accessors are the
//! checked conversions every guest-facing operation goes through; a wrong
//! kind becomes a [`GuestError::TypeMismatch`] naming the operation.

use std::{fmt, sync::Arc};

use crate::{
    action::Action,
    error::GuestError,
    geom::{Coords, Direction},
    model::{GameObject, Team, TurnState},
};

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Coords(Coords),
    Direction(Direction),
    Team(Team),
    Obj(GameObject),
    Action(Action),
    State(Arc<TurnState>),
    List(Vec<Value>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    Str,
    Coords,
    Direction,
    Team,
    Obj,
    Action,
    State,
    List,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "string",
            Self::Coords => "Coords",
            Self::Direction => "Direction",
            Self::Team => "Team",
            Self::Obj => "Obj",
            Self::Action => "Action",
            Self::State => "State",
            Self::List => "list",
        };
        f.write_str(name)
    }
}

pub(crate) static NULL: Value = Value::Null;

impl Value {
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int(_) => ValueKind::Int,
            Self::Float(_) => ValueKind::Float,
            Self::Str(_) => ValueKind::Str,
            Self::Coords(_) => ValueKind::Coords,
            Self::Direction(_) => ValueKind::Direction,
            Self::Team(_) => ValueKind::Team,
            Self::Obj(_) => ValueKind::Obj,
            Self::Action(_) => ValueKind::Action,
            Self::State(_) => ValueKind::State,
            Self::List(_) => ValueKind::List,
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    fn mismatch(&self, context: &'static str, expected: &'static str) -> GuestError {
        GuestError::type_mismatch(context, expected, self.kind())
    }

    /// # Errors
    /// Returns [`GuestError::TypeMismatch`] for any other kind.
    pub fn as_int(&self, context: &'static str) -> Result<i64, GuestError> {
        match self {
            Self::Int(n) => Ok(*n),
            other => Err(other.mismatch(context, "int")),
        }
    }

    /// # Errors
    /// Returns [`GuestError::TypeMismatch`] for any other kind.
    pub fn as_str(&self, context: &'static str) -> Result<&str, GuestError> {
        match self {
            Self::Str(s) => Ok(s),
            other => Err(other.mismatch(context, "string")),
        }
    }

    /// # Errors
    /// Returns [`GuestError::TypeMismatch`] for any other kind.
    pub fn as_coords(&self, context: &'static str) -> Result<Coords, GuestError> {
        match self {
            Self::Coords(coords) => Ok(*coords),
            other => Err(other.mismatch(context, "Coords")),
        }
    }

    /// # Errors
    /// Returns [`GuestError::TypeMismatch`] for any other kind.
    pub fn as_direction(&self, context: &'static str) -> Result<Direction, GuestError> {
        match self {
            Self::Direction(direction) => Ok(*direction),
            other => Err(other.mismatch(context, "Direction")),
        }
    }

    /// # Errors
    /// Returns [`GuestError::TypeMismatch`] for any other kind.
    pub fn as_team(&self, context: &'static str) -> Result<Team, GuestError> {
        match self {
            Self::Team(team) => Ok(*team),
            other => Err(other.mismatch(context, "Team")),
        }
    }

    /// # Errors
    /// Returns [`GuestError::TypeMismatch`] for any other kind.
    pub fn as_obj(&self, context: &'static str) -> Result<&GameObject, GuestError> {
        match self {
            Self::Obj(obj) => Ok(obj),
            other => Err(other.mismatch(context, "Obj")),
        }
    }

    /// # Errors
    /// Returns [`GuestError::TypeMismatch`] for any other kind.
    pub fn as_state(&self, context: &'static str) -> Result<&TurnState, GuestError> {
        match self {
            Self::State(state) => Ok(state),
            other => Err(other.mismatch(context, "State")),
        }
    }
}

/// String coercion used by logs and debug tables.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => f.write_str(s),
            Self::Coords(c) => write!(f, "{c}"),
            Self::Direction(d) => write!(f, "{d}"),
            Self::Team(t) => write!(f, "{t}"),
            Self::Obj(o) => write!(f, "{o}"),
            Self::Action(a) => write!(f, "{a}"),
            Self::State(s) => write!(f, "<State turn={} team={}>", s.turn(), s.our_team()),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i64 => Int,
    f64 => Float,
    String => Str,
    Coords => Coords,
    Direction => Direction,
    Team => Team,
    GameObject => Obj,
    Action => Action,
    Arc<TurnState> => State,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_owned())
    }
}

impl From<TurnState> for Value {
    fn from(state: TurnState) -> Self {
        Self::State(Arc::new(state))
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}
