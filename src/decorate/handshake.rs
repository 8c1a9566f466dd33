//! Scheduler/handshake decoration
//!
//! Process-independent rules applied to every operation: optional wait
//! dwell on operation entry, and the cross-robot handshake pair attached
//! to the end of the previous operation in multi-robot cells.

use crate::event::{Event, EventTable, HandshakeKind, Slot};
use crate::model::{Cell, Handshake, RobotProgram};
use tracing::warn;

/// Bitmask identifying this handshake's dependent robots by their motion
/// group: groups 1..=5 map to bits 1,2,4,8,16. Unrecognized group
/// strings contribute 0 — the drop is logged but not fatal.
pub fn scheduler_number(cell: &Cell, handshake: &Handshake) -> u32 {
    let mut mask = 0u32;
    for name in &handshake.dependents {
        let group = cell
            .robot_by_name(name)
            .and_then(|r| r.mash_group())
            .and_then(|s| s.parse::<u32>().ok());
        match group {
            Some(g @ 1..=5) => mask += 1 << (g - 1),
            _ => warn!(
                robot = name.as_str(),
                handshake = handshake.id,
                "dependent robot has no usable MashGrpNumber, dropped from scheduler mask"
            ),
        }
    }
    mask
}

/// Apply the scheduling rules to one operation.
pub fn decorate_scheduling(
    table: &mut EventTable,
    cell: &Cell,
    program: &RobotProgram,
    op_index: usize,
) {
    let op = &program.operations[op_index];

    if op.wait_time > 0.0 {
        if let Some(first) = op.first_point() {
            table.attach(
                first.id,
                Slot::Before,
                Event::Delay {
                    seconds: op.wait_time,
                },
            );
        }
    }

    let handshake = match &op.handshake {
        Some(h) => h,
        None => return,
    };
    if !cell.is_multi_robot() {
        return;
    }
    // The pair lands on the END of the previous operation so the robot
    // reports in before committing to this operation's approach. Disabled
    // and empty operations never reach the output, so the anchor walks
    // back to the nearest one that will.
    let prev = program.operations[..op_index]
        .iter()
        .rev()
        .find(|o| o.enabled && !o.points.is_empty());
    let anchor = match prev.and_then(|p| p.last_point()) {
        Some(p) => p.id,
        None => {
            warn!(
                operation = op.name.as_str(),
                handshake = handshake.id,
                "no emitted operation precedes the handshake, pair dropped"
            );
            return;
        }
    };
    let kind = if handshake.dependents.first().map(|s| s.as_str())
        == Some(program.robot.name.as_str())
    {
        HandshakeKind::InPos
    } else {
        HandshakeKind::PrSync
    };
    table.attach(
        anchor,
        Slot::After,
        Event::SchedulerSync {
            mask: scheduler_number(cell, handshake),
        },
    );
    table.attach(
        anchor,
        Slot::After,
        Event::Handshake {
            kind,
            id: handshake.id,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Operation, Point, Robot, KEY_MASH_GRP_NUMBER,
    };

    fn robot_program(robot_name: &str, group: &str) -> RobotProgram {
        let mut robot = Robot {
            name: robot_name.to_string(),
            ..Robot::default()
        };
        robot
            .custom_values
            .insert(KEY_MASH_GRP_NUMBER.to_string(), group.to_string());
        RobotProgram {
            name: format!("{}_PRG", robot_name),
            robot,
            operations: vec![Operation {
                points: vec![Point::default()],
                ..Operation::default()
            }],
            ..RobotProgram::default()
        }
    }

    fn two_robot_cell() -> Cell {
        Cell {
            programs: vec![robot_program("R1", "1"), robot_program("R2", "3")],
            ..Cell::default()
        }
    }

    fn handshake(dependents: &[&str]) -> Handshake {
        Handshake {
            id: 7,
            dependents: dependents.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_scheduler_number_groups_one_and_three() {
        let cell = two_robot_cell();
        assert_eq!(scheduler_number(&cell, &handshake(&["R1", "R2"])), 5);
    }

    #[test]
    fn test_scheduler_number_drops_unrecognized_group() {
        let mut cell = two_robot_cell();
        cell.programs[1]
            .robot
            .custom_values
            .insert(KEY_MASH_GRP_NUMBER.to_string(), "6".to_string());
        assert_eq!(scheduler_number(&cell, &handshake(&["R1", "R2"])), 1);
        assert_eq!(scheduler_number(&cell, &handshake(&["R2"])), 0);
    }

    #[test]
    fn test_handshake_pair_lands_on_previous_operation_end() {
        let mut cell = two_robot_cell();
        // Give R1 a second operation carrying the handshake
        let mut op = Operation {
            points: vec![Point {
                id: 10,
                ..Point::default()
            }],
            ..Operation::default()
        };
        op.handshake = Some(handshake(&["R1", "R2"]));
        cell.programs[0].operations[0].points[0].id = 5;
        cell.programs[0].operations.push(op);

        let program = cell.programs[0].clone();
        let mut table = EventTable::new(&program);
        decorate_scheduling(&mut table, &cell, &program, 1);

        let after = table.events(5, Slot::After);
        assert_eq!(after.len(), 2);
        assert_eq!(after[0], Event::SchedulerSync { mask: 5 });
        assert_eq!(
            after[1],
            Event::Handshake {
                kind: HandshakeKind::InPos,
                id: 7
            }
        );
        // Nothing on the handshake operation itself
        assert!(table.events(10, Slot::After).is_empty());
    }

    #[test]
    fn test_handshake_anchor_skips_disabled_predecessor() {
        let mut cell = two_robot_cell();
        cell.programs[0].operations[0].points[0].id = 5;
        cell.programs[0].operations.push(Operation {
            enabled: false,
            points: vec![Point {
                id: 8,
                ..Point::default()
            }],
            ..Operation::default()
        });
        let mut op = Operation {
            points: vec![Point {
                id: 10,
                ..Point::default()
            }],
            ..Operation::default()
        };
        op.handshake = Some(handshake(&["R1", "R2"]));
        cell.programs[0].operations.push(op);

        let program = cell.programs[0].clone();
        let mut table = EventTable::new(&program);
        decorate_scheduling(&mut table, &cell, &program, 2);

        // The disabled operation never reaches the output; the pair must
        // land on the last emitted operation before it.
        assert!(table.events(8, Slot::After).is_empty());
        let after = table.events(5, Slot::After);
        assert_eq!(after.len(), 2);
        assert_eq!(after[0], Event::SchedulerSync { mask: 5 });
    }

    #[test]
    fn test_handshake_kind_pr_sync_when_not_first_dependent() {
        let mut cell = two_robot_cell();
        let mut op = Operation {
            points: vec![Point {
                id: 10,
                ..Point::default()
            }],
            ..Operation::default()
        };
        op.handshake = Some(handshake(&["R2", "R1"]));
        cell.programs[0].operations[0].points[0].id = 5;
        cell.programs[0].operations.push(op);

        let program = cell.programs[0].clone();
        let mut table = EventTable::new(&program);
        decorate_scheduling(&mut table, &cell, &program, 1);
        assert!(matches!(
            table.events(5, Slot::After)[1],
            Event::Handshake {
                kind: HandshakeKind::PrSync,
                ..
            }
        ));
    }

    #[test]
    fn test_no_handshake_in_single_robot_cell() {
        let mut cell = Cell {
            programs: vec![robot_program("R1", "1")],
            ..Cell::default()
        };
        let mut op = Operation {
            points: vec![Point {
                id: 10,
                ..Point::default()
            }],
            ..Operation::default()
        };
        op.handshake = Some(handshake(&["R1"]));
        cell.programs[0].operations.push(op);

        let program = cell.programs[0].clone();
        let mut table = EventTable::new(&program);
        decorate_scheduling(&mut table, &cell, &program, 1);
        assert!(table
            .events(program.operations[0].points[0].id, Slot::After)
            .is_empty());
    }

    #[test]
    fn test_wait_time_becomes_leading_delay() {
        let cell = two_robot_cell();
        let mut program = cell.programs[0].clone();
        program.operations[0].wait_time = 2.5;
        program.operations[0].points[0].id = 1;
        let mut table = EventTable::new(&program);
        decorate_scheduling(&mut table, &cell, &program, 0);
        assert_eq!(
            table.events(1, Slot::Before),
            &[Event::Delay { seconds: 2.5 }]
        );
    }
}
