//! Grid geometry: coordinates and the four cardinal directions.
//!
//! The y axis grows downward, so `North` is `(0, -1)`. Every table below is
//! derived from the variant ordinal, which keeps `to_vector`, `opposite` and
//! the rotations consistent with [`Coords::direction_to`].
//!
//! The operators wrap on `i64` overflow. Distances and `direction_to` are
//! exact over the whole `i64` range.

use std::{
    fmt,
    ops::{Add, Mul, Sub},
};

use serde::{Deserialize, Serialize};

use crate::{error::GuestError, value::Value};

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(from = "(i64, i64)", into = "(i64, i64)")]
pub struct Coords {
    pub x: i64,
    pub y: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    East,
    South,
    West,
}

impl Direction {
    /// Clockwise order starting at `North`.
    pub const ALL: [Self; 4] = [Self::North, Self::East, Self::South, Self::West];

    const VECTORS: [Coords; 4] = [
        Coords::new(0, -1),
        Coords::new(1, 0),
        Coords::new(0, 1),
        Coords::new(-1, 0),
    ];

    const fn turned(self, quarter_turns: usize) -> Self {
        Self::ALL[(self as usize + quarter_turns) % 4]
    }

    #[must_use]
    pub const fn to_vector(self) -> Coords {
        Self::VECTORS[self as usize]
    }

    #[must_use]
    pub const fn opposite(self) -> Self {
        self.turned(2)
    }

    #[must_use]
    pub const fn rotate_cw(self) -> Self {
        self.turned(1)
    }

    #[must_use]
    pub const fn rotate_ccw(self) -> Self {
        self.turned(3)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::North => "North",
            Self::East => "East",
            Self::South => "South",
            Self::West => "West",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Coords {
    #[must_use]
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn distance_to(self, other: Self) -> f64 {
        (self.x.abs_diff(other.x) as f64).hypot(self.y.abs_diff(other.y) as f64)
    }

    /// Saturates at `u64::MAX`.
    #[must_use]
    pub const fn walking_distance_to(self, other: Self) -> u64 {
        self.x
            .abs_diff(other.x)
            .saturating_add(self.y.abs_diff(other.y))
    }

    /// Classifies `self - other` into one of four inclusive 45° sectors.
    ///
    /// Sectors are tested in the order West, South, North, East, so a
    /// difference that lies exactly on a diagonal resolves to the earlier
    /// direction. The tests compare the integer components directly instead
    /// of going through `atan2`, which gives the same answer without float
    /// rounding on the boundaries. A zero difference is `West`.
    #[must_use]
    pub const fn direction_to(self, other: Self) -> Direction {
        let ax = self.x.abs_diff(other.x);
        let ay = self.y.abs_diff(other.y);
        if self.x >= other.x && ay <= ax {
            Direction::West
        } else if self.y < other.y && ax <= ay {
            Direction::South
        } else if self.y > other.y && ax <= ay {
            Direction::North
        } else {
            Direction::East
        }
    }

    /// The four neighbours, in `Direction::ALL` order.
    #[must_use]
    pub fn coords_around(self) -> [Self; 4] {
        Direction::ALL.map(|direction| self + direction)
    }

    /// `self + rhs` where `rhs` is a `Coords` or a `Direction`.
    ///
    /// # Errors
    /// Returns [`GuestError::TypeMismatch`] for any other operand kind.
    pub fn try_add(self, rhs: &Value) -> Result<Self, GuestError> {
        Ok(self + offset_operand(rhs, "Coords.add")?)
    }

    /// `self - rhs` where `rhs` is a `Coords` or a `Direction`.
    ///
    /// # Errors
    /// Returns [`GuestError::TypeMismatch`] for any other operand kind.
    pub fn try_sub(self, rhs: &Value) -> Result<Self, GuestError> {
        Ok(self - offset_operand(rhs, "Coords.sub")?)
    }

    /// # Errors
    /// Returns [`GuestError::TypeMismatch`] unless `n` is an integer.
    pub fn try_mul(self, n: &Value) -> Result<Self, GuestError> {
        Ok(self * n.as_int("Coords.mul")?)
    }

    /// # Errors
    /// Returns [`GuestError::TypeMismatch`] unless `other` is a `Coords`.
    pub fn try_distance_to(self, other: &Value) -> Result<f64, GuestError> {
        Ok(self.distance_to(other.as_coords("Coords.distance_to")?))
    }

    /// # Errors
    /// Returns [`GuestError::TypeMismatch`] unless `other` is a `Coords`.
    pub fn try_walking_distance_to(self, other: &Value) -> Result<u64, GuestError> {
        Ok(self.walking_distance_to(other.as_coords("Coords.walking_distance_to")?))
    }

    /// # Errors
    /// Returns [`GuestError::TypeMismatch`] unless `other` is a `Coords`.
    pub fn try_direction_to(self, other: &Value) -> Result<Direction, GuestError> {
        Ok(self.direction_to(other.as_coords("Coords.direction_to")?))
    }
}

fn offset_operand(value: &Value, context: &'static str) -> Result<Coords, GuestError> {
    match value {
        Value::Coords(coords) => Ok(*coords),
        Value::Direction(direction) => Ok(direction.to_vector()),
        other => Err(GuestError::type_mismatch(
            context,
            "Coords or Direction",
            other.kind(),
        )),
    }
}

impl fmt::Display for Coords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl From<(i64, i64)> for Coords {
    fn from((x, y): (i64, i64)) -> Self {
        Self { x, y }
    }
}

impl From<Coords> for (i64, i64) {
    fn from(coords: Coords) -> Self {
        (coords.x, coords.y)
    }
}

impl Add for Coords {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x.wrapping_add(rhs.x), self.y.wrapping_add(rhs.y))
    }
}

impl Add<Direction> for Coords {
    type Output = Self;

    fn add(self, rhs: Direction) -> Self {
        self + rhs.to_vector()
    }
}

impl Sub for Coords {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x.wrapping_sub(rhs.x), self.y.wrapping_sub(rhs.y))
    }
}

impl Sub<Direction> for Coords {
    type Output = Self;

    fn sub(self, rhs: Direction) -> Self {
        self - rhs.to_vector()
    }
}

impl Mul<i64> for Coords {
    type Output = Self;

    fn mul(self, n: i64) -> Self {
        Self::new(self.x.wrapping_mul(n), self.y.wrapping_mul(n))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::value::ValueKind;

    #[test]
    fn direction_tables_are_consistent() {
        for d in Direction::ALL {
            assert_eq!(d.opposite().opposite(), d);
            assert_eq!(d.rotate_cw().rotate_ccw(), d);
            assert_eq!(d.rotate_ccw().rotate_cw(), d);
            assert_eq!(d.rotate_cw().rotate_cw().rotate_cw().rotate_cw(), d);
            assert_eq!(d.rotate_ccw().rotate_ccw().rotate_ccw().rotate_ccw(), d);
            assert_eq!(d.to_vector() + d.opposite().to_vector(), Coords::default());
        }
    }

    #[test]
    fn north_points_up() {
        // Pinned convention: y grows downward.
        assert_eq!(Direction::North.to_vector(), Coords::new(0, -1));
        assert_eq!(Direction::South.to_vector(), Coords::new(0, 1));
        assert_eq!(Direction::East.to_vector(), Coords::new(1, 0));
        assert_eq!(Direction::West.to_vector(), Coords::new(-1, 0));
        assert_eq!(Direction::North.rotate_cw(), Direction::East);
    }

    #[test]
    fn direction_to_inverts_vectors() {
        let origin = Coords::new(5, 5);
        for d in Direction::ALL {
            assert_eq!(origin.direction_to(origin + d), d);
            assert_eq!(origin.direction_to(origin + d.to_vector() * 3), d);
        }
    }

    #[test]
    fn direction_to_diagonals_resolve_to_earlier_sector() {
        let origin = Coords::new(0, 0);
        // diff = origin - other
        assert_eq!(origin.direction_to(Coords::new(-1, -1)), Direction::West);
        assert_eq!(origin.direction_to(Coords::new(-1, 1)), Direction::West);
        assert_eq!(origin.direction_to(Coords::new(1, 1)), Direction::South);
        assert_eq!(origin.direction_to(Coords::new(1, -1)), Direction::North);
        assert_eq!(origin.direction_to(origin), Direction::West);
    }

    #[test]
    fn distances() {
        let a = Coords::new(1, 1);
        let b = Coords::new(4, 5);
        assert!((a.distance_to(b) - 5.0).abs() < f64::EPSILON);
        assert_eq!(a.walking_distance_to(b), 7);
        assert_eq!(b.walking_distance_to(a), 7);
    }

    #[test]
    fn extreme_coordinates_do_not_overflow() {
        let low = Coords::new(i64::MIN, i64::MIN);
        let high = Coords::new(i64::MAX, i64::MAX);
        assert_eq!(low.walking_distance_to(high), u64::MAX);
        let wide = Coords::new(i64::MIN, 0).walking_distance_to(Coords::new(i64::MAX, 0));
        assert_eq!(wide, u64::MAX);
        assert!(low.distance_to(high).is_finite());
        assert_eq!(low.direction_to(Coords::new(i64::MAX, i64::MIN)), Direction::East);
        assert_eq!(high.direction_to(low), Direction::West);
        let top = Coords::new(0, i64::MIN);
        assert_eq!(top.direction_to(Coords::new(0, i64::MAX)), Direction::South);
        assert_eq!(high + Direction::East, Coords::new(i64::MIN, i64::MAX));
        assert_eq!(low - Direction::South, Coords::new(i64::MIN, i64::MAX));
        assert_eq!(high * 2, Coords::new(-2, -2));
    }

    #[test]
    fn arithmetic_accepts_directions() {
        let c = Coords::new(2, 2);
        assert_eq!(c + Direction::North, Coords::new(2, 1));
        assert_eq!(c - Direction::North, Coords::new(2, 3));
        assert_eq!(c * 3, Coords::new(6, 6));
        assert_eq!(
            c.coords_around(),
            [
                Coords::new(2, 1),
                Coords::new(3, 2),
                Coords::new(2, 3),
                Coords::new(1, 2)
            ]
        );
    }

    #[test]
    fn dynamic_operands_are_type_checked() {
        let c = Coords::new(0, 0);
        assert_eq!(
            c.try_add(&Value::Direction(Direction::East)).unwrap(),
            Coords::new(1, 0)
        );
        assert_eq!(
            c.try_sub(&Value::Coords(Coords::new(1, 1))).unwrap(),
            Coords::new(-1, -1)
        );

        let err = c
            .try_distance_to(&Value::Direction(Direction::East))
            .unwrap_err();
        assert!(matches!(
            err,
            GuestError::TypeMismatch {
                found: ValueKind::Direction,
                ..
            }
        ));
        assert!(c.try_add(&Value::Int(1)).is_err());
        assert!(c.try_mul(&Value::Str("2".into())).is_err());
        assert!(c.try_direction_to(&Value::Null).is_err());
        assert!(c.try_walking_distance_to(&Value::Team(crate::Team::Red)).is_err());
    }

    #[test]
    fn coords_serialize_as_pair() {
        let json = serde_json::to_string(&Coords::new(3, -4)).unwrap();
        assert_eq!(json, "[3,-4]");
        let back: Coords = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Coords::new(3, -4));
    }

    proptest! {
        #[test]
        fn direction_to_matches_atan2_off_boundary(
            x in -500i64..500, y in -500i64..500,
            ox in -500i64..500, oy in -500i64..500,
        ) {
            let p = Coords::new(x, y);
            let q = Coords::new(ox, oy);
            let dx = x - ox;
            let dy = y - oy;
            // Off the diagonals the float classification is unambiguous.
            prop_assume!(dx.abs() != dy.abs());
            #[allow(clippy::cast_precision_loss)]
            let angle = (dy as f64).atan2(dx as f64);
            let quarter = std::f64::consts::FRAC_PI_4;
            let expected = if angle.abs() <= quarter {
                Direction::West
            } else if (angle + std::f64::consts::FRAC_PI_2).abs() <= quarter {
                Direction::South
            } else if (angle - std::f64::consts::FRAC_PI_2).abs() <= quarter {
                Direction::North
            } else {
                Direction::East
            };
            prop_assert_eq!(p.direction_to(q), expected);
        }

        #[test]
        fn walking_distance_is_symmetric(
            x in -1000i64..1000, y in -1000i64..1000,
            ox in -1000i64..1000, oy in -1000i64..1000,
        ) {
            let p = Coords::new(x, y);
            let q = Coords::new(ox, oy);
            prop_assert_eq!(p.walking_distance_to(q), q.walking_distance_to(p));
            prop_assert!(p.distance_to(q) <= p.walking_distance_to(q) as f64 + 1e-9);
        }
    }
}
