//! Condition evaluators
//!
//! Pure, stateless predicates over the operation/point structure. The
//! decoration pipeline consults these; the serializer re-evaluates the
//! precision conditions independently when it picks termination tokens.

use crate::model::{
    ActivationPoint, ApplicationType, DeactivationPoint, MotionType, Operation,
    PrecisionOverride, RobotProgram,
};

/// Path direction change at a point, measured between the incoming and
/// outgoing in-process segments. `>=` on the threshold is deliberate and
/// mirrored by the serializer.
pub fn is_sharp_turn(op: &Operation, index: usize, threshold_deg: f64) -> bool {
    let point = &op.points[index];
    if !point.in_process {
        return false;
    }
    let prev = match op.prev_in_process(index) {
        Some(p) => p,
        None => return false,
    };
    let next = match op.next_in_process(index) {
        Some(p) => p,
        None => return false,
    };
    let incoming = point.position.sub(prev.position);
    let outgoing = next.position.sub(point.position);
    incoming.angle_deg(outgoing) >= threshold_deg
}

/// Whether the move into this point is shorter than the threshold. `<=`
/// on the threshold is deliberate, asymmetric with `is_sharp_turn`.
pub fn is_small_move(op: &Operation, index: usize, threshold_mm: f64) -> bool {
    let point = &op.points[index];
    if !point.in_process {
        return false;
    }
    let prev = match op.prev_in_process(index) {
        Some(p) => p,
        None => return false,
    };
    point.position.distance(prev.position) <= threshold_mm
}

/// The precision override in effect for a linear move, if any. Priority
/// is plunge > sharp turn > small move, first match wins; both the
/// decoration pass (delay insertion) and the serializer (termination and
/// acceleration tokens) resolve through this one predicate.
pub fn precision_override(op: &Operation, index: usize) -> Option<&PrecisionOverride> {
    let point = &op.points[index];
    if point.motion_type != MotionType::Linear {
        return None;
    }
    let precision = &op.settings.precision;
    if precision.plunge.enabled && point.plunge {
        return Some(&precision.plunge);
    }
    if precision.sharp_turn.enabled && is_sharp_turn(op, index, precision.sharp_turn_angle) {
        return Some(&precision.sharp_turn);
    }
    if precision.small_move.enabled && is_small_move(op, index, precision.small_move_distance) {
        return Some(&precision.small_move);
    }
    None
}

/// The first home operation of the program
pub fn is_first_home(program: &RobotProgram, index: usize) -> bool {
    program.operations[index].application == ApplicationType::Home
        && !program.operations[..index]
            .iter()
            .any(|op| op.application == ApplicationType::Home)
}

/// The last macro operation before the first task operation: the "macro
/// exit" immediately preceding true program start.
pub fn is_macro_exit(program: &RobotProgram, index: usize) -> bool {
    if program.operations[index].application != ApplicationType::Macro {
        return false;
    }
    let first_task = match program.first_task_index() {
        Some(i) => i,
        None => return false,
    };
    index < first_task
        && !program.operations[index + 1..first_task]
            .iter()
            .any(|op| op.application == ApplicationType::Macro)
}

/// Tool-change clauses that stand on their own, independent of the
/// macro-exit clause: the first home with no macro ahead of it, or a tool
/// number differing from the tool currently mounted. `mounted` is the
/// tool the pipeline has mounted so far while walking the program.
pub fn is_tool_change_independently_needed(
    program: &RobotProgram,
    index: usize,
    mounted: Option<u32>,
) -> bool {
    let first_home_clause = is_first_home(program, index)
        && !program.operations[..index]
            .iter()
            .any(|op| op.application == ApplicationType::Macro);
    if first_home_clause {
        return true;
    }
    if is_first_home(program, index) {
        // First-home case with a macro before it never triggers on the
        // tool-difference clause.
        return false;
    }
    let op = &program.operations[index];
    matches!(op.tool_number, Some(tool) if mounted != Some(tool))
}

pub fn is_tool_change_needed(program: &RobotProgram, index: usize, mounted: Option<u32>) -> bool {
    is_tool_change_independently_needed(program, index, mounted) || is_macro_exit(program, index)
}

/// Macro call fires on the macro-exit operation when no tool change is
/// independently needed there. The decoration pipeline keeps the two
/// events mutually exclusive unless a process variant opts out.
pub fn is_macro_call_needed(program: &RobotProgram, index: usize, mounted: Option<u32>) -> bool {
    is_macro_exit(program, index) && !is_tool_change_independently_needed(program, index, mounted)
}

/// Pick the process-activation point within an operation
pub fn activation_index(op: &Operation, which: ActivationPoint) -> Option<usize> {
    match which {
        ActivationPoint::FirstPoint => (!op.points.is_empty()).then_some(0),
        ActivationPoint::FirstNonJointMove => op
            .points
            .iter()
            .position(|p| p.motion_type != MotionType::Joint),
        ActivationPoint::FirstPlunge => op.points.iter().position(|p| p.plunge),
        ActivationPoint::FirstPointOfContact => {
            op.points.iter().position(|p| p.first_point_of_contact)
        }
        ActivationPoint::FirstMoveInProcess => op.points.iter().position(|p| p.in_process),
    }
}

/// Pick the process-deactivation point within an operation
pub fn deactivation_index(op: &Operation, which: DeactivationPoint) -> Option<usize> {
    match which {
        DeactivationPoint::LastPoint => op.points.len().checked_sub(1),
        DeactivationPoint::LastNonJointMove => op
            .points
            .iter()
            .rposition(|p| p.motion_type != MotionType::Joint),
        DeactivationPoint::LastPlunge => op.points.iter().rposition(|p| p.plunge),
        DeactivationPoint::LastPointOfContact => {
            op.points.iter().rposition(|p| p.last_point_of_contact)
        }
        DeactivationPoint::LastMoveInProcess => op.points.iter().rposition(|p| p.in_process),
    }
}

/// Point-local activation test for the EveryPath process condition: true
/// on the point where the selected condition first becomes true along the
/// path.
pub fn point_activates(op: &Operation, index: usize, which: ActivationPoint) -> bool {
    let point = &op.points[index];
    let prev = index.checked_sub(1).map(|i| &op.points[i]);
    match which {
        ActivationPoint::FirstPoint => index == 0,
        ActivationPoint::FirstNonJointMove => {
            point.motion_type != MotionType::Joint
                && prev.map_or(true, |p| p.motion_type == MotionType::Joint)
        }
        ActivationPoint::FirstPlunge => point.plunge && prev.map_or(true, |p| !p.plunge),
        ActivationPoint::FirstPointOfContact => point.first_point_of_contact,
        ActivationPoint::FirstMoveInProcess => {
            point.in_process && prev.map_or(true, |p| !p.in_process)
        }
    }
}

/// Point-local deactivation test for the EveryPath process condition,
/// symmetric with `point_activates`. Both tests may fire on one point.
pub fn point_deactivates(op: &Operation, index: usize, which: DeactivationPoint) -> bool {
    let point = &op.points[index];
    let next = op.points.get(index + 1);
    match which {
        DeactivationPoint::LastPoint => index + 1 == op.points.len(),
        DeactivationPoint::LastNonJointMove => {
            point.motion_type != MotionType::Joint
                && next.map_or(true, |p| p.motion_type == MotionType::Joint)
        }
        DeactivationPoint::LastPlunge => point.plunge && next.map_or(true, |p| !p.plunge),
        DeactivationPoint::LastPointOfContact => point.last_point_of_contact,
        DeactivationPoint::LastMoveInProcess => {
            point.in_process && next.map_or(true, |p| !p.in_process)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Operation, Point, Vec3};

    fn path_op(coords: &[(f64, f64, f64)]) -> Operation {
        let mut op = Operation::default();
        for (i, &(x, y, z)) in coords.iter().enumerate() {
            op.points.push(Point {
                id: i as u32 + 1,
                position: Vec3::new(x, y, z),
                motion_type: MotionType::Linear,
                in_process: true,
                ..Point::default()
            });
        }
        op
    }

    #[test]
    fn test_sharp_turn_at_corner() {
        // Right-angle corner at the middle point
        let op = path_op(&[(0.0, 0.0, 0.0), (10.0, 0.0, 0.0), (10.0, 10.0, 0.0)]);
        assert!(is_sharp_turn(&op, 1, 45.0));
        assert!(is_sharp_turn(&op, 1, 90.0)); // inclusive threshold
        assert!(!is_sharp_turn(&op, 1, 90.1));
    }

    #[test]
    fn test_sharp_turn_rejects_terminal_points() {
        let op = path_op(&[(0.0, 0.0, 0.0), (10.0, 0.0, 0.0), (10.0, 10.0, 0.0)]);
        assert!(!is_sharp_turn(&op, 0, 1.0));
        assert!(!is_sharp_turn(&op, 2, 1.0));
    }

    #[test]
    fn test_sharp_turn_requires_in_process() {
        let mut op = path_op(&[(0.0, 0.0, 0.0), (10.0, 0.0, 0.0), (10.0, 10.0, 0.0)]);
        op.points[1].in_process = false;
        assert!(!is_sharp_turn(&op, 1, 45.0));
    }

    #[test]
    fn test_small_move_inclusive_threshold() {
        let op = path_op(&[(0.0, 0.0, 0.0), (1.0, 0.0, 0.0)]);
        assert!(is_small_move(&op, 1, 1.0)); // exactly at threshold
        assert!(!is_small_move(&op, 1, 0.99));
        assert!(!is_small_move(&op, 0, 10.0)); // no previous in-process point
    }

    fn program(apps: &[ApplicationType]) -> RobotProgram {
        let mut program = RobotProgram::default();
        for &app in apps {
            program.operations.push(Operation {
                application: app,
                points: vec![Point::default()],
                ..Operation::default()
            });
        }
        program
    }

    #[test]
    fn test_first_home_needs_tool_change() {
        let program = program(&[ApplicationType::Home, ApplicationType::Cutting]);
        assert!(is_tool_change_needed(&program, 0, None));
        assert!(is_tool_change_independently_needed(&program, 0, None));
    }

    #[test]
    fn test_first_home_after_macro_does_not() {
        let program = program(&[
            ApplicationType::Macro,
            ApplicationType::Home,
            ApplicationType::Cutting,
        ]);
        assert!(!is_tool_change_independently_needed(&program, 1, None));
    }

    #[test]
    fn test_macro_exit_detection() {
        let program = program(&[
            ApplicationType::Macro,
            ApplicationType::Macro,
            ApplicationType::Cutting,
        ]);
        assert!(!is_macro_exit(&program, 0));
        assert!(is_macro_exit(&program, 1));
        // Macro exit without independent tool need takes the macro call
        assert!(is_macro_call_needed(&program, 1, None));
        assert!(!is_macro_call_needed(&program, 0, None));
    }

    #[test]
    fn test_macro_call_and_tool_change_exclusive() {
        let mut program = program(&[ApplicationType::Macro, ApplicationType::Cutting]);
        program.operations[0].tool_number = Some(3);
        // The macro exit carries a tool no one has mounted yet, so a tool
        // change is independently needed and the macro call yields.
        assert!(is_tool_change_independently_needed(&program, 0, None));
        assert!(!is_macro_call_needed(&program, 0, None));
        // With tool 3 already mounted the macro call wins again
        assert!(is_macro_call_needed(&program, 0, Some(3)));
    }

    #[test]
    fn test_tool_difference_clause() {
        let mut program = program(&[ApplicationType::Cutting, ApplicationType::Cutting]);
        program.operations[0].tool_number = Some(1);
        program.operations[1].tool_number = Some(2);
        assert!(is_tool_change_needed(&program, 1, Some(1)));
        program.operations[1].tool_number = Some(1);
        assert!(!is_tool_change_needed(&program, 1, Some(1)));
    }

    #[test]
    fn test_activation_index_selection() {
        let mut op = path_op(&[(0.0, 0.0, 0.0), (1.0, 0.0, 0.0), (2.0, 0.0, 0.0)]);
        op.points[0].motion_type = MotionType::Joint;
        op.points[0].in_process = false;
        op.points[1].plunge = true;
        op.points[1].first_point_of_contact = true;
        assert_eq!(activation_index(&op, ActivationPoint::FirstPoint), Some(0));
        assert_eq!(
            activation_index(&op, ActivationPoint::FirstNonJointMove),
            Some(1)
        );
        assert_eq!(activation_index(&op, ActivationPoint::FirstPlunge), Some(1));
        assert_eq!(
            activation_index(&op, ActivationPoint::FirstMoveInProcess),
            Some(1)
        );
        assert_eq!(
            deactivation_index(&op, DeactivationPoint::LastPoint),
            Some(2)
        );
        assert_eq!(
            deactivation_index(&op, DeactivationPoint::LastPointOfContact),
            None
        );
    }

    #[test]
    fn test_precision_override_first_match_wins() {
        // A plunge point that is also a sharp corner and a tiny move
        let mut op = path_op(&[(0.0, 0.0, 0.0), (0.5, 0.0, 0.0), (0.5, 10.0, 0.0)]);
        op.points[1].plunge = true;
        op.settings.precision.plunge.enabled = true;
        op.settings.precision.plunge.delay = 0.1;
        op.settings.precision.sharp_turn.enabled = true;
        op.settings.precision.sharp_turn.delay = 0.2;
        op.settings.precision.small_move.enabled = true;
        op.settings.precision.small_move.delay = 0.3;
        let matched = precision_override(&op, 1).expect("should match");
        assert_eq!(matched.delay, 0.1);

        // Disable plunge handling: the sharp turn takes over
        op.settings.precision.plunge.enabled = false;
        assert_eq!(precision_override(&op, 1).unwrap().delay, 0.2);

        // Joint moves never match
        op.points[1].motion_type = MotionType::Joint;
        assert!(precision_override(&op, 1).is_none());
    }

    #[test]
    fn test_point_local_tests_fire_on_edges() {
        let mut op = path_op(&[(0.0, 0.0, 0.0), (1.0, 0.0, 0.0), (2.0, 0.0, 0.0)]);
        op.points[0].in_process = false;
        assert!(!point_activates(&op, 0, ActivationPoint::FirstMoveInProcess));
        assert!(point_activates(&op, 1, ActivationPoint::FirstMoveInProcess));
        assert!(!point_activates(&op, 2, ActivationPoint::FirstMoveInProcess));
        assert!(point_deactivates(&op, 2, DeactivationPoint::LastMoveInProcess));
        assert!(!point_deactivates(&op, 1, DeactivationPoint::LastMoveInProcess));
    }
}
