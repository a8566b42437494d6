//! Demo robot, built as a wasm reactor (`__rr_*` exports) and as a
//! line-protocol binary.
//!
//! The init payload picks the behavior: empty or `hunt` chases the nearest
//! enemy, `patrol` walks units back and forth along their row and `fragile`
//! hunts like the default but panics for any unit whose id starts with
//! `boom`.

use std::collections::HashMap;

use rumble::{
    Action, CallContext, Direction, EntryPoint, GameObject, GuestError, GuestModule, Id,
    TurnState,
    driver::{INIT_ENTRY, TURN_ENTRY},
};

rumble::export_robot!(robot);

/// Column where patrolling units turn back west.
const PATROL_EAST_EDGE: i64 = 17;

/// # Errors
/// An unknown mode fails init.
pub fn robot(payload: &[u8]) -> Result<GuestModule, GuestError> {
    let mode = std::str::from_utf8(payload)
        .map_err(|_| GuestError::runtime("init payload is not UTF-8"))?
        .trim();
    match mode {
        "" | "hunt" => Ok(hunter()),
        "patrol" => Ok(patroller()),
        "fragile" => Ok(fragile()),
        other => Err(GuestError::runtime(format!("unknown mode `{other}`"))),
    }
}

fn hunter() -> GuestModule {
    GuestModule::new()
        .define(
            INIT_ENTRY,
            EntryPoint::init(|cx, state| {
                cx.log(format_args!("hunting for team {}", state.our_team()));
                Ok(())
            }),
        )
        .define(TURN_ENTRY, EntryPoint::turn_with_debug(hunt))
}

fn hunt(
    cx: &mut CallContext<'_>,
    state: &TurnState,
    unit: &GameObject,
) -> Result<Option<Action>, GuestError> {
    let here = unit.coords();
    let Some(target) = state
        .objs_by_team(state.other_team())
        .min_by_key(|enemy| (here.walking_distance_to(enemy.coords()), enemy.id().clone()))
    else {
        return Ok(None);
    };

    let debug = cx.debug()?;
    debug.set("target", target.id());
    debug.locate_obj(target);

    let toward = here.direction_to(target.coords());
    if here.walking_distance_to(target.coords()) == 1 {
        return Ok(Some(Action::attack(toward)));
    }

    // Sidestep whatever blocks the direct path.
    let step = [toward, toward.rotate_cw(), toward.rotate_ccw()]
        .into_iter()
        .find(|&d| state.obj_by_coords(here + d).is_none());
    Ok(step.map(Action::move_to))
}

fn fragile() -> GuestModule {
    GuestModule::new().define(
        TURN_ENTRY,
        EntryPoint::turn_with_debug(|cx, state, unit| {
            assert!(
                !unit.id().as_str().starts_with("boom"),
                "{} blew up",
                unit.id()
            );
            hunt(cx, state, unit)
        }),
    )
}

fn patroller() -> GuestModule {
    let mut headings: HashMap<Id, Direction> = HashMap::new();
    GuestModule::new().define(
        TURN_ENTRY,
        EntryPoint::turn(move |_cx, _state, unit| {
            let x = unit.coords().x;
            let heading = headings.entry(unit.id().clone()).or_insert(Direction::East);
            if x >= PATROL_EAST_EDGE {
                *heading = Direction::West;
            } else if x <= 0 {
                *heading = Direction::East;
            }
            println!("{} at x={x}", unit.id());
            Ok(Some(Action::move_to(*heading)))
        }),
    )
}

#[cfg(test)]
mod tests {
    use rumble::{Coords, Driver, ProgramError, Team};

    use super::*;

    fn driver(payload: &[u8]) -> Driver {
        let mut driver = Driver::new();
        driver.init(robot(payload).unwrap()).unwrap();
        driver
    }

    #[test]
    fn attacks_an_adjacent_enemy() {
        let state = TurnState::builder(Team::Red)
            .unit("r1", Coords::new(5, 5), Team::Red, 5)
            .unit("b1", Coords::new(6, 5), Team::Blue, 5)
            .build();
        let out = driver(b"").run_turn(state).unwrap();
        assert_eq!(
            out.robot_actions[&Id::from("r1")],
            Ok(Some(Action::attack(Direction::East)))
        );
        assert_eq!(out.debug_tables[&Id::from("r1")]["target"], "b1");
        assert_eq!(out.debug_inspections, [Id::from("b1")]);
        assert_eq!(out.logs, ["hunting for team Red"]);
    }

    #[test]
    fn walks_around_a_wall() {
        let state = TurnState::builder(Team::Red)
            .unit("r1", Coords::new(5, 5), Team::Red, 5)
            .terrain("w1", Coords::new(5, 4))
            .unit("b1", Coords::new(5, 1), Team::Blue, 5)
            .build();
        let out = driver(b"hunt").run_turn(state).unwrap();
        assert_eq!(
            out.robot_actions[&Id::from("r1")],
            Ok(Some(Action::move_to(Direction::East)))
        );
    }

    #[test]
    fn no_enemies_means_no_action() {
        let state = TurnState::builder(Team::Blue)
            .unit("b1", Coords::new(2, 2), Team::Blue, 5)
            .build();
        let out = driver(b"").run_turn(state).unwrap();
        assert_eq!(out.robot_actions[&Id::from("b1")], Ok(None));
        assert!(out.debug_tables.is_empty());
    }

    #[test]
    fn patrol_turns_at_the_edges() {
        let mut driver = driver(b"patrol");
        let at = |x| {
            TurnState::builder(Team::Red)
                .unit("r1", Coords::new(x, 3), Team::Red, 5)
                .build()
        };
        let heading = |out: rumble::TurnOutput| out.robot_actions[&Id::from("r1")].clone();

        assert_eq!(
            heading(driver.run_turn(at(10)).unwrap()),
            Ok(Some(Action::move_to(Direction::East)))
        );
        assert_eq!(
            heading(driver.run_turn(at(PATROL_EAST_EDGE)).unwrap()),
            Ok(Some(Action::move_to(Direction::West)))
        );
        assert_eq!(
            heading(driver.run_turn(at(9)).unwrap()),
            Ok(Some(Action::move_to(Direction::West)))
        );
        assert_eq!(
            heading(driver.run_turn(at(0)).unwrap()),
            Ok(Some(Action::move_to(Direction::East)))
        );
    }

    #[test]
    fn fragile_unit_panics_alone() {
        let state = TurnState::builder(Team::Red)
            .unit("r1", Coords::new(5, 5), Team::Red, 5)
            .unit("boom1", Coords::new(1, 1), Team::Red, 5)
            .unit("b1", Coords::new(6, 5), Team::Blue, 5)
            .build();
        let out = driver(b"fragile").run_turn(state).unwrap();
        assert_eq!(
            out.robot_actions[&Id::from("r1")],
            Ok(Some(Action::attack(Direction::East)))
        );
        let err = out.robot_actions[&Id::from("boom1")].clone().unwrap_err();
        assert!(err.summary.contains("boom1 blew up"), "{err:?}");
    }

    #[test]
    fn unknown_mode_fails_init() {
        let mut driver = Driver::new();
        let init = rumble::abi::load(robot, b"sprint", &mut driver);
        let Err(ProgramError::InitError(envelope)) = init else {
            panic!("expected InitError, got {init:?}");
        };
        assert!(envelope.summary.contains("sprint"), "{}", envelope.summary);
    }
}
