use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{error::GuestError, geom::Direction, value::Value};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    Move,
    Attack,
    Heal,
}

/// What a unit does this turn. Guests only obtain one through the
/// constructors below.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Action {
    #[serde(rename = "type")]
    kind: ActionType,
    direction: Direction,
}

impl Action {
    #[must_use]
    pub const fn move_to(direction: Direction) -> Self {
        Self {
            kind: ActionType::Move,
            direction,
        }
    }

    #[must_use]
    pub const fn attack(direction: Direction) -> Self {
        Self {
            kind: ActionType::Attack,
            direction,
        }
    }

    #[must_use]
    pub const fn heal(direction: Direction) -> Self {
        Self {
            kind: ActionType::Heal,
            direction,
        }
    }

    /// # Errors
    /// Returns [`GuestError::TypeMismatch`] unless `direction` is a `Direction`.
    pub fn try_move_to(direction: &Value) -> Result<Self, GuestError> {
        Ok(Self::move_to(direction.as_direction("move")?))
    }

    /// # Errors
    /// Returns [`GuestError::TypeMismatch`] unless `direction` is a `Direction`.
    pub fn try_attack(direction: &Value) -> Result<Self, GuestError> {
        Ok(Self::attack(direction.as_direction("attack")?))
    }

    /// # Errors
    /// Returns [`GuestError::TypeMismatch`] unless `direction` is a `Direction`.
    pub fn try_heal(direction: &Value) -> Result<Self, GuestError> {
        Ok(Self::heal(direction.as_direction("heal")?))
    }

    #[must_use]
    pub const fn kind(&self) -> ActionType {
        self.kind
    }

    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{:?} {}>", self.kind, self.direction)
    }
}
