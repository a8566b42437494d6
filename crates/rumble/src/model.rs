//! The immutable per-turn world view handed to guest code.

use std::{borrow::Borrow, collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{error::GuestError, geom::Coords, value::Value};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct Id(String);

impl Id {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Id {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Id {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for Id {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Team {
    Red,
    Blue,
}

impl Team {
    pub const ALL: [Self; 2] = [Self::Red, Self::Blue];

    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Red => Self::Blue,
            Self::Blue => Self::Red,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Red => "Red",
            Self::Blue => "Blue",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Team {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjKind {
    Unit,
    Terrain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjDetails {
    Unit { team: Team, health: u32 },
    Terrain,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("unit {id} is missing its {field}")]
    MissingUnitField { id: Id, field: &'static str },

    #[error("terrain {id} must not carry a {field}")]
    UnexpectedTerrainField { id: Id, field: &'static str },

    #[error("object keyed as {key} has id {id}")]
    ObjectIdMismatch { key: Id, id: Id },

    #[error("{team} roster lists {id}, which is not a known object")]
    UnknownRosterId { team: Team, id: Id },

    #[error("{team} roster lists {id}, which is not a unit of that team")]
    RosterMismatch { team: Team, id: Id },

    #[error("grid cell {coords} refers to unknown object {id}")]
    UnknownGridId { coords: Coords, id: Id },
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(try_from = "WireObject", into = "WireObject")]
pub struct GameObject {
    id: Id,
    coords: Coords,
    details: ObjDetails,
}

impl GameObject {
    pub fn unit(id: impl Into<Id>, coords: Coords, team: Team, health: u32) -> Self {
        Self {
            id: id.into(),
            coords,
            details: ObjDetails::Unit { team, health },
        }
    }

    pub fn terrain(id: impl Into<Id>, coords: Coords) -> Self {
        Self {
            id: id.into(),
            coords,
            details: ObjDetails::Terrain,
        }
    }

    #[must_use]
    pub const fn id(&self) -> &Id {
        &self.id
    }

    #[must_use]
    pub const fn coords(&self) -> Coords {
        self.coords
    }

    #[must_use]
    pub const fn details(&self) -> ObjDetails {
        self.details
    }

    #[must_use]
    pub const fn kind(&self) -> ObjKind {
        match self.details {
            ObjDetails::Unit { .. } => ObjKind::Unit,
            ObjDetails::Terrain => ObjKind::Terrain,
        }
    }

    #[must_use]
    pub const fn team(&self) -> Option<Team> {
        match self.details {
            ObjDetails::Unit { team, .. } => Some(team),
            ObjDetails::Terrain => None,
        }
    }

    #[must_use]
    pub const fn health(&self) -> Option<u32> {
        match self.details {
            ObjDetails::Unit { health, .. } => Some(health),
            ObjDetails::Terrain => None,
        }
    }
}

impl fmt::Display for GameObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.details {
            ObjDetails::Unit { team, health } => write!(
                f,
                "<Unit {} {} team={team} health={health}>",
                self.id, self.coords
            ),
            ObjDetails::Terrain => write!(f, "<Terrain {} {}>", self.id, self.coords),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct WireObject {
    id: Id,
    coords: Coords,
    obj_type: ObjKind,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    team: Option<Team>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    health: Option<u32>,
}

impl TryFrom<WireObject> for GameObject {
    type Error = StateError;

    fn try_from(wire: WireObject) -> Result<Self, StateError> {
        let details = match wire.obj_type {
            ObjKind::Unit => ObjDetails::Unit {
                team: wire.team.ok_or_else(|| StateError::MissingUnitField {
                    id: wire.id.clone(),
                    field: "team",
                })?,
                health: wire.health.ok_or_else(|| StateError::MissingUnitField {
                    id: wire.id.clone(),
                    field: "health",
                })?,
            },
            ObjKind::Terrain => {
                let field = match (wire.team, wire.health) {
                    (Some(_), _) => Some("team"),
                    (None, Some(_)) => Some("health"),
                    (None, None) => None,
                };
                if let Some(field) = field {
                    return Err(StateError::UnexpectedTerrainField { id: wire.id, field });
                }
                ObjDetails::Terrain
            }
        };
        Ok(Self {
            id: wire.id,
            coords: wire.coords,
            details,
        })
    }
}

impl From<GameObject> for WireObject {
    fn from(obj: GameObject) -> Self {
        let (subtype, team, health) = match obj.details {
            ObjDetails::Unit { team, health } => ("Soldier", Some(team), Some(health)),
            ObjDetails::Terrain => ("Wall", None, None),
        };
        Self {
            obj_type: obj.kind(),
            id: obj.id,
            coords: obj.coords,
            subtype: Some(subtype.to_owned()),
            team,
            health,
        }
    }
}

/// One turn's view of the world.
///
/// Decoding checks that every rostered id names a unit of that team, so the
/// queries below never observe a dangling roster entry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "WireState", into = "WireState")]
pub struct TurnState {
    turn: u64,
    our_team: Team,
    rosters: [Vec<Id>; 2],
    objs: HashMap<Id, GameObject>,
    grid: Vec<Vec<Option<Id>>>,
}

#[derive(Serialize, Deserialize)]
struct WireState {
    turn: u64,
    team: Team,
    #[serde(default)]
    teams: HashMap<Team, Vec<Id>>,
    #[serde(default)]
    objs: HashMap<Id, GameObject>,
    #[serde(default)]
    grid: Vec<Vec<Option<Id>>>,
}

impl TryFrom<WireState> for TurnState {
    type Error = StateError;

    fn try_from(mut wire: WireState) -> Result<Self, StateError> {
        for (key, obj) in &wire.objs {
            if key != obj.id() {
                return Err(StateError::ObjectIdMismatch {
                    key: key.clone(),
                    id: obj.id().clone(),
                });
            }
        }

        let rosters = Team::ALL.map(|team| wire.teams.remove(&team).unwrap_or_default());
        for team in Team::ALL {
            for id in &rosters[team.index()] {
                let obj = wire.objs.get(id).ok_or_else(|| StateError::UnknownRosterId {
                    team,
                    id: id.clone(),
                })?;
                if obj.team() != Some(team) {
                    return Err(StateError::RosterMismatch {
                        team,
                        id: id.clone(),
                    });
                }
            }
        }

        for (y, row) in wire.grid.iter().enumerate() {
            for (x, cell) in row.iter().enumerate() {
                if let Some(id) = cell
                    && !wire.objs.contains_key(id)
                {
                    return Err(StateError::UnknownGridId {
                        coords: grid_coords(x, y),
                        id: id.clone(),
                    });
                }
            }
        }

        Ok(Self {
            turn: wire.turn,
            our_team: wire.team,
            rosters,
            objs: wire.objs,
            grid: wire.grid,
        })
    }
}

impl From<TurnState> for WireState {
    fn from(state: TurnState) -> Self {
        let [red, blue] = state.rosters;
        Self {
            turn: state.turn,
            team: state.our_team,
            teams: HashMap::from([(Team::Red, red), (Team::Blue, blue)]),
            objs: state.objs,
            grid: state.grid,
        }
    }
}

#[allow(clippy::cast_possible_wrap)]
const fn grid_coords(x: usize, y: usize) -> Coords {
    Coords::new(x as i64, y as i64)
}

impl TurnState {
    #[must_use]
    pub fn builder(our_team: Team) -> TurnStateBuilder {
        TurnStateBuilder::new(our_team)
    }

    #[must_use]
    pub const fn turn(&self) -> u64 {
        self.turn
    }

    #[must_use]
    pub const fn our_team(&self) -> Team {
        self.our_team
    }

    #[must_use]
    pub const fn other_team(&self) -> Team {
        self.our_team.opposite()
    }

    /// The team's roster, in the order the orchestrator supplied it.
    #[must_use]
    pub fn ids_by_team(&self, team: Team) -> &[Id] {
        &self.rosters[team.index()]
    }

    pub fn objs_by_team(&self, team: Team) -> impl Iterator<Item = &GameObject> {
        self.ids_by_team(team).iter().filter_map(|id| self.objs.get(id))
    }

    #[must_use]
    pub fn obj_by_id(&self, id: &str) -> Option<&GameObject> {
        self.objs.get(id)
    }

    /// Grid lookup; anything outside the grid is an empty cell.
    #[must_use]
    pub fn id_by_coords(&self, coords: Coords) -> Option<&Id> {
        let x = usize::try_from(coords.x).ok()?;
        let y = usize::try_from(coords.y).ok()?;
        self.grid.get(y)?.get(x)?.as_ref()
    }

    #[must_use]
    pub fn obj_by_coords(&self, coords: Coords) -> Option<&GameObject> {
        self.id_by_coords(coords).and_then(|id| self.obj_by_id(id.as_str()))
    }

    /// # Errors
    /// Returns [`GuestError::TypeMismatch`] unless `team` is a `Team`.
    pub fn try_ids_by_team(&self, team: &Value) -> Result<&[Id], GuestError> {
        Ok(self.ids_by_team(team.as_team("State.ids_by_team")?))
    }

    /// # Errors
    /// Returns [`GuestError::TypeMismatch`] unless `team` is a `Team`.
    pub fn try_objs_by_team(&self, team: &Value) -> Result<Vec<&GameObject>, GuestError> {
        Ok(self
            .objs_by_team(team.as_team("State.objs_by_team")?)
            .collect())
    }

    /// # Errors
    /// Returns [`GuestError::TypeMismatch`] unless `id` is a string.
    pub fn try_obj_by_id(&self, id: &Value) -> Result<Option<&GameObject>, GuestError> {
        Ok(self.obj_by_id(id.as_str("State.obj_by_id")?))
    }

    /// # Errors
    /// Returns [`GuestError::TypeMismatch`] unless `coords` is a `Coords`.
    pub fn try_id_by_coords(&self, coords: &Value) -> Result<Option<&Id>, GuestError> {
        Ok(self.id_by_coords(coords.as_coords("State.id_by_coords")?))
    }

    /// # Errors
    /// Returns [`GuestError::TypeMismatch`] unless `coords` is a `Coords`.
    pub fn try_obj_by_coords(&self, coords: &Value) -> Result<Option<&GameObject>, GuestError> {
        Ok(self.obj_by_coords(coords.as_coords("State.obj_by_coords")?))
    }
}

/// Assembles a consistent [`TurnState`]: rosters and the grid are filled in
/// from the objects as they are added.
#[derive(Debug, Clone)]
pub struct TurnStateBuilder {
    turn: u64,
    our_team: Team,
    grid_size: usize,
    objs: Vec<GameObject>,
}

impl TurnStateBuilder {
    const DEFAULT_GRID_SIZE: usize = 19;

    #[must_use]
    pub const fn new(our_team: Team) -> Self {
        Self {
            turn: 1,
            our_team,
            grid_size: Self::DEFAULT_GRID_SIZE,
            objs: Vec::new(),
        }
    }

    #[must_use]
    pub const fn turn(mut self, turn: u64) -> Self {
        self.turn = turn;
        self
    }

    #[must_use]
    pub const fn grid_size(mut self, size: usize) -> Self {
        self.grid_size = size;
        self
    }

    #[must_use]
    pub fn unit(mut self, id: impl Into<Id>, coords: Coords, team: Team, health: u32) -> Self {
        self.objs.push(GameObject::unit(id, coords, team, health));
        self
    }

    #[must_use]
    pub fn terrain(mut self, id: impl Into<Id>, coords: Coords) -> Self {
        self.objs.push(GameObject::terrain(id, coords));
        self
    }

    /// Objects placed off the grid stay addressable by id but are absent
    /// from coordinate lookups.
    #[must_use]
    pub fn build(self) -> TurnState {
        let mut rosters: [Vec<Id>; 2] = Default::default();
        let mut grid = vec![vec![None; self.grid_size]; self.grid_size];
        let mut objs = HashMap::with_capacity(self.objs.len());
        for obj in self.objs {
            if let Some(team) = obj.team() {
                rosters[team.index()].push(obj.id().clone());
            }
            let cell = usize::try_from(obj.coords().y)
                .ok()
                .zip(usize::try_from(obj.coords().x).ok())
                .and_then(|(y, x)| grid.get_mut(y)?.get_mut(x));
            if let Some(cell) = cell {
                *cell = Some(obj.id().clone());
            }
            objs.insert(obj.id().clone(), obj);
        }
        TurnState {
            turn: self.turn,
            our_team: self.our_team,
            rosters,
            objs,
            grid,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    fn sample() -> TurnState {
        TurnState::builder(Team::Red)
            .turn(3)
            .grid_size(5)
            .unit("u1", Coords::new(1, 1), Team::Red, 5)
            .unit("u2", Coords::new(3, 1), Team::Red, 4)
            .unit("e1", Coords::new(2, 3), Team::Blue, 5)
            .terrain("w1", Coords::new(0, 4))
            .build()
    }

    #[test]
    fn queries() {
        let state = sample();
        assert_eq!(state.turn(), 3);
        assert_eq!(state.our_team(), Team::Red);
        assert_eq!(state.other_team(), Team::Blue);
        assert_eq!(state.ids_by_team(Team::Red), [Id::from("u1"), Id::from("u2")]);
        assert_eq!(state.objs_by_team(Team::Blue).count(), 1);
        assert_eq!(
            state.obj_by_id("e1").map(GameObject::coords),
            Some(Coords::new(2, 3))
        );
        assert!(state.obj_by_id("nope").is_none());
        assert_eq!(
            state.obj_by_coords(Coords::new(0, 4)).map(GameObject::kind),
            Some(ObjKind::Terrain)
        );
    }

    #[test]
    fn out_of_bounds_lookups_are_empty() {
        let state = sample();
        assert!(state.obj_by_coords(Coords::new(-1, 0)).is_none());
        assert!(state.obj_by_coords(Coords::new(0, -1)).is_none());
        assert!(state.obj_by_coords(Coords::new(5, 0)).is_none());
        assert!(state.obj_by_coords(Coords::new(0, 500)).is_none());
        assert!(state.obj_by_coords(Coords::new(2, 2)).is_none());
    }

    #[test]
    fn empty_roster() {
        let state = TurnState::builder(Team::Blue).build();
        assert!(state.ids_by_team(Team::Blue).is_empty());
        assert!(state.ids_by_team(Team::Red).is_empty());
    }

    #[test]
    fn wire_grid_is_indexed_by_row() {
        let json = r#"{
            "turn": 1, "team": "Red",
            "teams": {"Red": ["a"], "Blue": []},
            "objs": {"a": {"id": "a", "coords": [2, 0], "obj_type": "Unit",
                           "type": "Soldier", "team": "Red", "health": 5}},
            "grid": [[null, null, "a"], [null, null, null]]
        }"#;
        let state: TurnState = serde_json::from_str(json).unwrap();
        assert_eq!(
            state.id_by_coords(Coords::new(2, 0)).map(Id::as_str),
            Some("a")
        );
        assert!(state.id_by_coords(Coords::new(0, 2)).is_none());
    }

    #[test]
    fn wire_roundtrip_preserves_state() {
        let state = sample();
        let json = serde_json::to_string(&state).unwrap();
        let back: TurnState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
        assert!(json.contains(r#""type":"Soldier""#));
    }

    #[test]
    fn roster_must_name_units_of_that_team() {
        let json = r#"{
            "turn": 1, "team": "Red",
            "teams": {"Red": ["e1"]},
            "objs": {"e1": {"id": "e1", "coords": [0, 0], "obj_type": "Unit",
                            "team": "Blue", "health": 5}}
        }"#;
        let err = serde_json::from_str::<TurnState>(json).unwrap_err();
        assert!(err.to_string().contains("not a unit of that team"), "{err}");

        let json = r#"{"turn": 1, "team": "Red", "teams": {"Red": ["ghost"]}, "objs": {}}"#;
        let err = serde_json::from_str::<TurnState>(json).unwrap_err();
        assert!(err.to_string().contains("not a known object"), "{err}");
    }

    #[test]
    fn unit_fields_follow_kind() {
        let missing = r#"{"id": "u", "coords": [0, 0], "obj_type": "Unit", "team": "Red"}"#;
        let err = serde_json::from_str::<GameObject>(missing).unwrap_err();
        assert!(err.to_string().contains("missing its health"), "{err}");

        let extra = r#"{"id": "w", "coords": [0, 0], "obj_type": "Terrain", "team": "Red"}"#;
        let err = serde_json::from_str::<GameObject>(extra).unwrap_err();
        assert!(err.to_string().contains("must not carry a team"), "{err}");
    }

    #[test]
    fn dynamic_queries_reject_wrong_kinds() {
        let state = sample();
        assert_eq!(
            state
                .try_ids_by_team(&Value::Team(Team::Red))
                .unwrap()
                .len(),
            2
        );
        let err = state
            .try_obj_by_coords(&Value::Direction(crate::Direction::North))
            .unwrap_err();
        assert!(matches!(
            err,
            GuestError::TypeMismatch {
                found: ValueKind::Direction,
                ..
            }
        ));
        assert!(state.try_obj_by_id(&Value::Int(1)).is_err());
        assert!(state.try_objs_by_team(&Value::Str("Red".into())).is_err());
        assert!(
            state
                .try_id_by_coords(&Value::Coords(Coords::new(1, 1)))
                .unwrap()
                .is_some()
        );
    }
}
