//! Pick-and-place rules
//!
//! Two-state gripper dispatch: approaching the pick opens the gripper
//! before the first point and closes it after the last; approaching the
//! place only opens it after the last point.

use super::{OpCx, ProcessRules};
use crate::event::{Event, EventTable, GripperAction, Slot};
use crate::model::PickPlaceRole;

pub struct PickPlaceRules;

impl ProcessRules for PickPlaceRules {
    fn edit_operation(&self, table: &mut EventTable, cx: &OpCx) {
        let op = cx.op();
        let role = match op.pick_place {
            Some(role) => role,
            None => return,
        };
        let first = match op.first_point() {
            Some(p) => p.id,
            None => return,
        };
        let last = match op.last_point() {
            Some(p) => p.id,
            None => return,
        };
        match role {
            PickPlaceRole::ToPick => {
                table.attach(first, Slot::Before, Event::Gripper {
                    action: GripperAction::Open,
                });
                table.attach(last, Slot::After, Event::Gripper {
                    action: GripperAction::Close,
                });
            }
            PickPlaceRole::ToPlace => {
                table.attach(last, Slot::After, Event::Gripper {
                    action: GripperAction::Open,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorate::decorate;
    use crate::model::{ApplicationType, Cell, Operation, Point, RobotProgram};

    fn pick_place_cell(role: PickPlaceRole) -> Cell {
        let op = Operation {
            application: ApplicationType::PickPlace,
            pick_place: Some(role),
            points: vec![
                Point {
                    id: 1,
                    ..Point::default()
                },
                Point {
                    id: 2,
                    ..Point::default()
                },
            ],
            ..Operation::default()
        };
        Cell {
            programs: vec![RobotProgram {
                operations: vec![op],
                ..RobotProgram::default()
            }],
            ..Cell::default()
        }
    }

    #[test]
    fn test_to_pick_brackets_the_operation() {
        let cell = pick_place_cell(PickPlaceRole::ToPick);
        let table = decorate(&cell, &cell.programs[0]).unwrap();
        assert!(table.events(1, Slot::Before).contains(&Event::Gripper {
            action: GripperAction::Open
        }));
        assert!(table.events(2, Slot::After).contains(&Event::Gripper {
            action: GripperAction::Close
        }));
    }

    #[test]
    fn test_to_place_only_opens_at_the_end() {
        let cell = pick_place_cell(PickPlaceRole::ToPlace);
        let table = decorate(&cell, &cell.programs[0]).unwrap();
        assert!(table
            .events(1, Slot::Before)
            .iter()
            .all(|e| !matches!(e, Event::Gripper { .. })));
        assert_eq!(
            table
                .events(2, Slot::After)
                .iter()
                .filter(|e| matches!(e, Event::Gripper { .. }))
                .count(),
            1
        );
    }
}
