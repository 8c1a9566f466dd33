//! Serialization engine
//!
//! Second generation pass: reads the decorated event table alongside the
//! motion points and renders Fanuc `.LS` text. All running state (current
//! file, line and point counters) lives on an explicit writer that is
//! created per robot program and reset at file boundaries.

pub mod frames;
pub mod groups;
pub mod lsfile;
pub mod scheduler;

use crate::decorate::{self, conditions};
use crate::error::PostError;
use crate::event::{Event, EventTable, Slot};
use crate::model::{
    ApplicationType, Cell, MotionSpace, MotionType, Operation, Point, RobotProgram, Termination,
};
use self::frames::FrameState;
use self::groups::GroupMap;
use self::lsfile::{file_name, sub_file_name, LsFile};
use std::collections::HashSet;

/// One finished `.LS` file, ready for the directory sink
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFile {
    /// Program name, extension not included
    pub name: String,
    pub content: String,
}

/// Whole-cell generation run
pub struct PostRun<'a> {
    cell: &'a Cell,
}

impl<'a> PostRun<'a> {
    pub fn new(cell: &'a Cell) -> Self {
        Self { cell }
    }

    /// Generate every output file for the cell. The scheduler decision is
    /// made once, up front; each robot program then serializes
    /// independently, and a failing program cancels only itself.
    pub fn run(&self) -> Vec<OutputFile> {
        let mut outputs = Vec::new();

        if scheduler::scheduler_wanted(self.cell) {
            if let Some(file) = scheduler::generate(self.cell) {
                outputs.push(OutputFile {
                    name: file.name.clone(),
                    content: file.render(),
                });
            }
        }

        for program in self.cell.active_programs() {
            match self.robot_program_run(program) {
                Ok(files) => outputs.extend(files),
                Err(err) => {
                    tracing::error!(program = %program.name, error = %err, "generation cancelled");
                }
            }
        }
        outputs
    }

    fn robot_program_run(&self, program: &RobotProgram) -> Result<Vec<OutputFile>, PostError> {
        validate_program(program)?;

        let table = decorate::decorate(self.cell, program)?;
        if table.redirect_used() {
            tracing::warn!(
                program = %program.name,
                "events on arc middle points were moved to their end points"
            );
        }

        let mut writer = ProgramWriter::new(self.cell, program, &table);
        for op in &program.operations {
            if !op.enabled || op.points.is_empty() {
                continue;
            }
            writer.emit_operation(op)?;
        }
        Ok(writer.finish())
    }
}

/// Hard per-program checks that cancel generation before any output
fn validate_program(program: &RobotProgram) -> Result<(), PostError> {
    for (index, op) in program.operations.iter().enumerate() {
        if op.handshake.is_none() {
            continue;
        }
        if let Some(prev) = program.prev_operation(index) {
            if prev.application == ApplicationType::Home && !prev.enabled {
                return Err(PostError::HandshakeAfterDisabledHome {
                    home: prev.name.clone(),
                    operation: op.name.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Serializes one robot program into one or more linked files.
struct ProgramWriter<'a> {
    program: &'a RobotProgram,
    table: &'a EventTable,
    groups: GroupMap,
    frame_state: FrameState,
    file: LsFile,
    done: Vec<LsFile>,
    names: HashSet<String>,
    /// Next /POS point number, reset when the file rolls
    point_number: u32,
    timestamp: String,
}

impl<'a> ProgramWriter<'a> {
    fn new(cell: &'a Cell, program: &'a RobotProgram, table: &'a EventTable) -> Self {
        let groups = GroupMap::build(program);
        let timestamp = cell.timestamp.clone().unwrap_or_default();
        let base = file_name(&program.name);
        let file = LsFile::new(
            &base,
            &program.comment,
            &timestamp,
            &groups.default_group_mask(),
        );
        let mut names = HashSet::new();
        names.insert(base);
        Self {
            program,
            table,
            groups,
            frame_state: FrameState::new(),
            file,
            done: Vec::new(),
            names,
            point_number: 1,
            timestamp,
        }
    }

    fn emit_operation(&mut self, op: &'a Operation) -> Result<(), PostError> {
        if !op.name.is_empty() {
            self.file.add_line(&format!("! {}", op.name));
        }
        self.frame_state
            .emit(&mut self.file, self.program, op, false);

        let mut index = 0;
        while index < op.points.len() {
            let point = &op.points[index];
            self.roll_file_if_needed();

            if point.arc_middle {
                let end = op.points.get(index + 1).ok_or(PostError::UnsupportedMotion {
                    point: point.id,
                    motion_type: point.motion_type,
                    motion_space: point.motion_space,
                })?;
                self.emit_events(op, Slot::Before, point.id);
                self.emit_events(op, Slot::Before, end.id);
                self.emit_circular(op, index, point, end)?;
                self.emit_events(op, Slot::After, end.id);
                index += 2;
            } else {
                self.emit_events(op, Slot::Before, point.id);
                self.emit_move(op, index, point)?;
                self.emit_events(op, Slot::After, point.id);
                index += 1;
            }
        }
        Ok(())
    }

    /// Render before/after events as numbered instructions. A tool change
    /// forces the frame selection to be re-emitted right after it.
    fn emit_events(&mut self, op: &'a Operation, slot: Slot, point: u32) {
        for event in self.table.events(point, slot) {
            for line in event.render_lines() {
                self.file.add_line(&line);
            }
            if matches!(event, Event::ToolChange { .. }) {
                self.frame_state.emit(&mut self.file, self.program, op, true);
            }
        }
    }

    /// Inline events rendered as move-line suffix tokens. Events without
    /// an inline form are dropped with a warning.
    fn inline_tokens(&self, point: u32) -> String {
        let mut out = String::new();
        for event in self.table.events(point, Slot::Inline) {
            match event.render_inline() {
                Some(token) => {
                    out.push(' ');
                    out.push_str(&token);
                }
                None => {
                    tracing::warn!(point, ?event, "event has no inline form, dropped");
                }
            }
        }
        out
    }

    fn emit_move(&mut self, op: &'a Operation, index: usize, point: &Point) -> Result<(), PostError> {
        let letter = motion_letter(point)?;
        let number = self.point_number;
        self.point_number += 1;

        let speed = match letter {
            'J' => format!("{:.0}%", op.settings.joint_speed),
            _ => format!("{:.0}mm/sec", point.feedrate),
        };
        let line = format!(
            "{} P[{}] {} {}{}{}",
            letter,
            number,
            speed,
            motion_tokens(op, index),
            suffix_tokens(self.program, op, index, point),
            self.inline_tokens(point.id),
        );
        self.file.add_line(&line);
        let block = self.position_block(op, number, point);
        self.file.add_position(block);
        Ok(())
    }

    /// Arc pairs are one instruction: middle point on the numbered line,
    /// end point with speed and termination on the continuation. Emitting
    /// them together keeps file splits away from the middle of an arc.
    fn emit_circular(
        &mut self,
        op: &'a Operation,
        middle_index: usize,
        middle: &Point,
        end: &Point,
    ) -> Result<(), PostError> {
        if motion_letter(middle)? != 'C' || motion_letter(end)? != 'C' {
            return Err(PostError::UnsupportedMotion {
                point: middle.id,
                motion_type: middle.motion_type,
                motion_space: middle.motion_space,
            });
        }
        let middle_number = self.point_number;
        let end_number = self.point_number + 1;
        self.point_number += 2;

        let first = format!("C P[{}]", middle_number);
        let second = format!(
            "P[{}] {:.0}mm/sec {}{}{}",
            end_number,
            end.feedrate,
            motion_tokens(op, middle_index + 1),
            suffix_tokens(self.program, op, middle_index + 1, end),
            self.inline_tokens(end.id),
        );
        self.file.add_circular(&first, &second);

        let middle_block = self.position_block(op, middle_number, middle);
        self.file.add_position(middle_block);
        let end_block = self.position_block(op, end_number, end);
        self.file.add_position(end_block);
        Ok(())
    }

    /// Roll to a linked sub-file once the configured instruction budget is
    /// spent. Called only at safe split points, never inside an arc pair.
    fn roll_file_if_needed(&mut self) {
        let max = match self.program.max_lines_per_file {
            Some(max) => max,
            None => return,
        };
        if self.file.line_count() < max {
            return;
        }
        let base = file_name(&self.program.name);
        let sub = sub_file_name(&base, &self.names);
        self.names.insert(sub.clone());
        self.file.add_line(&format!("CALL {}", sub));

        let next = LsFile::new(
            &sub,
            &self.program.comment,
            &self.timestamp,
            &self.groups.default_group_mask(),
        );
        let parent = std::mem::replace(&mut self.file, next);
        self.done.push(parent);
        self.point_number = 1;
    }

    fn position_block(&self, op: &'a Operation, number: u32, point: &Point) -> Vec<String> {
        let mut lines = Vec::new();
        lines.push(format!("P[{}]{{", number));
        lines.push(format!("   GP{}:", self.groups.primary().number));

        let mut fields = vec![
            format!("UF : {}", op.user_frame.number),
            format!("UT : {}", op.tool_frame.number),
        ];
        if point.motion_space == MotionSpace::Cartesian {
            fields.push(format!("CONFIG : '{}'", config_string(point)));
            fields.push(format!("X = {:9.3} mm", point.position.x));
            fields.push(format!("Y = {:9.3} mm", point.position.y));
            fields.push(format!("Z = {:9.3} mm", point.position.z));
            fields.push(format!("W = {:9.3} deg", point.orientation.w));
            fields.push(format!("P = {:9.3} deg", point.orientation.p));
            fields.push(format!("R = {:9.3} deg", point.orientation.r));
        } else {
            for joint in &self.groups.primary().joints {
                let value = point.joints.get(&joint.id).copied().unwrap_or(0.0);
                let unit = if joint.linear { "mm" } else { "deg" };
                fields.push(format!("J{} = {:9.3} {}", joint.axis, value, unit));
            }
        }
        lines.extend(field_lines(&fields));

        for group in self.groups.external_groups() {
            lines.push(format!("   GP{}:", group.number));
            let mut fields = vec![
                format!("UF : {}", op.user_frame.number),
                format!("UT : {}", op.tool_frame.number),
            ];
            for joint in &group.joints {
                let value = point.joints.get(&joint.id).copied().unwrap_or(0.0);
                let unit = if joint.linear { "mm" } else { "deg" };
                fields.push(format!("J{} = {:9.3} {}", joint.axis, value, unit));
            }
            lines.extend(field_lines(&fields));
        }
        lines.push("};".to_string());
        lines
    }

    fn finish(mut self) -> Vec<OutputFile> {
        self.done.push(self.file);
        self.done
            .iter()
            .map(|file| OutputFile {
                name: file.name.clone(),
                content: file.render(),
            })
            .collect()
    }
}

/// Comma-join position fields, three per line, four-space indent.
fn field_lines(fields: &[String]) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, chunk) in fields.chunks(3).enumerate() {
        let last = (i + 1) * 3 >= fields.len();
        let tail = if last { "" } else { "," };
        lines.push(format!("    {}{}", chunk.join(", "), tail));
    }
    lines
}

fn motion_letter(point: &Point) -> Result<char, PostError> {
    match (point.motion_space, point.motion_type) {
        (_, MotionType::Joint) => Ok('J'),
        (MotionSpace::Cartesian, MotionType::Linear) => Ok('L'),
        (MotionSpace::Cartesian, MotionType::Circular) => Ok('C'),
        // The kinematics layer never produces these; refuse to guess.
        (MotionSpace::Joint, _) => Err(PostError::UnsupportedMotion {
            point: point.id,
            motion_type: point.motion_type,
            motion_space: point.motion_space,
        }),
    }
}

/// Termination and acceleration tokens, precision overrides first. The
/// same plunge > sharp turn > small move priority as the decoration pass,
/// applied here to the move line instead of the dwell.
fn motion_tokens(op: &Operation, index: usize) -> String {
    let (termination, acceleration) = resolved_precision(op, index);
    let mut out = match termination {
        Termination::Fine => "FINE".to_string(),
        Termination::Cnt(n) => format!("CNT{}", n),
    };
    if let Some(acc) = acceleration {
        out.push_str(&format!(" ACC{}", acc));
    }
    out
}

fn resolved_precision(op: &Operation, index: usize) -> (Termination, Option<u8>) {
    match conditions::precision_override(op, index) {
        Some(o) => (o.termination, o.acceleration.or(op.settings.acceleration)),
        None => (op.settings.termination, op.settings.acceleration),
    }
}

/// Independently gated per-line suffix tokens
fn suffix_tokens(program: &RobotProgram, op: &Operation, index: usize, point: &Point) -> String {
    let mut out = String::new();
    let (termination, _) = resolved_precision(op, index);
    let continuous = matches!(termination, Termination::Cnt(_));
    if op.settings.use_pth && continuous {
        out.push_str(" PTH");
    }
    if op.settings.minor_rotation
        && point.motion_type == MotionType::Joint
        && point.motion_space == MotionSpace::Cartesian
    {
        out.push_str(" MROT");
    }
    if op.settings.coordinated
        && matches!(point.motion_type, MotionType::Linear | MotionType::Circular)
    {
        out.push_str(" COORD");
    }
    if program.robot.rtcp && point.motion_type != MotionType::Joint {
        out.push_str(" RTCP");
    }
    out
}

/// Fanuc CONFIG string: three flag letters plus the turn counts of
/// joints 1, 4 and 6.
fn config_string(point: &Point) -> String {
    let flip = if point.config.flip { 'F' } else { 'N' };
    let up = if point.config.up { 'U' } else { 'D' };
    let front = if point.config.front { 'T' } else { 'B' };
    let turn = |id: u32| {
        let j = point.joints.get(&id).copied().unwrap_or(0.0);
        turn_count(j)
    };
    format!("{} {} {}, {}, {}, {}", flip, up, front, turn(1), turn(4), turn(6))
}

/// Signed full-turn count of a raw joint angle in degrees
fn turn_count(angle: f64) -> i32 {
    let count = ((angle.abs() + 180.0) / 360.0).floor() as i32;
    if angle < 0.0 {
        -count
    } else {
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Cell, JointDef, Operation, Orientation, Point, RobotProgram, Vec3};

    fn cartesian_point(id: u32, x: f64, ty: MotionType) -> Point {
        Point {
            id,
            position: Vec3::new(x, 0.0, 0.0),
            orientation: Orientation {
                w: 180.0,
                p: 0.0,
                r: 0.0,
            },
            motion_type: ty,
            motion_space: MotionSpace::Cartesian,
            feedrate: 1000.0,
            in_process: true,
            ..Point::default()
        }
    }

    fn robot_joints() -> Vec<JointDef> {
        (1..=6)
            .map(|id| JointDef {
                id,
                group: 1,
                external: false,
                linear: false,
            })
            .collect()
    }

    fn one_op_cell(points: Vec<Point>) -> Cell {
        let op = Operation {
            name: "Path 1".to_string(),
            application: ApplicationType::Cutting,
            tool_number: Some(1),
            points,
            ..Operation::default()
        };
        Cell {
            programs: vec![RobotProgram {
                name: "R1 main".to_string(),
                joints: robot_joints(),
                operations: vec![op],
                ..RobotProgram::default()
            }],
            ..Cell::default()
        }
    }

    fn run_single(cell: &Cell) -> Vec<OutputFile> {
        PostRun::new(cell).run()
    }

    #[test]
    fn test_turn_count() {
        assert_eq!(turn_count(0.0), 0);
        assert_eq!(turn_count(179.0), 0);
        assert_eq!(turn_count(180.0), 1);
        assert_eq!(turn_count(370.0), 1);
        assert_eq!(turn_count(-370.0), -1);
        assert_eq!(turn_count(-90.0), 0);
    }

    #[test]
    fn test_round_trip_every_operation() {
        let cell = one_op_cell(vec![
            cartesian_point(1, 0.0, MotionType::Linear),
            cartesian_point(2, 10.0, MotionType::Linear),
        ]);
        let files = run_single(&cell);
        assert_eq!(files.len(), 1);
        let text = &files[0].content;
        assert_eq!(files[0].name, "R1_MAIN");

        let tool = text.find("CALL TOOL_CHANGE(1)").unwrap();
        let on = text.find("CALL CUTTER_ON").unwrap();
        let first = text.find("L P[1] 1000mm/sec CNT100 ;").unwrap();
        let last = text.find("L P[2] 1000mm/sec CNT100 ;").unwrap();
        let off = text.find("CALL CUTTER_OFF").unwrap();
        assert!(tool < on && on < first && first < last && last < off);
    }

    #[test]
    fn test_position_block_layout() {
        let cell = one_op_cell(vec![cartesian_point(1, 12.5, MotionType::Linear)]);
        let files = run_single(&cell);
        let text = &files[0].content;
        assert!(text.contains("P[1]{"));
        assert!(text.contains("   GP1:"));
        assert!(text.contains("CONFIG : 'N D B, 0, 0, 0'"));
        assert!(text.contains("X =    12.500 mm"));
        assert!(text.contains("W =   180.000 deg"));
        assert!(text.contains("};"));
    }

    #[test]
    fn test_joint_space_position_block_emits_joint_values_only() {
        let mut point = Point {
            id: 1,
            motion_type: MotionType::Joint,
            motion_space: MotionSpace::Joint,
            ..Point::default()
        };
        for id in 1..=6 {
            point.joints.insert(id, id as f64 * 10.0);
        }
        let cell = one_op_cell(vec![point]);
        let files = run_single(&cell);
        let text = &files[0].content;
        assert!(text.contains("J P[1] 100% CNT100 ;"));
        assert!(text.contains("J1 =    10.000 deg"));
        assert!(text.contains("J6 =    60.000 deg"));
        assert!(!text.contains("CONFIG"));
        assert!(!text.contains("X ="));
    }

    #[test]
    fn test_circular_pair_layout() {
        let mut middle = cartesian_point(2, 5.0, MotionType::Circular);
        middle.arc_middle = true;
        let cell = one_op_cell(vec![
            cartesian_point(1, 0.0, MotionType::Linear),
            middle,
            cartesian_point(3, 10.0, MotionType::Circular),
        ]);
        let files = run_single(&cell);
        let text = &files[0].content;
        assert!(text.contains("C P[2]\n       P[3] 1000mm/sec CNT100 ;"));
        assert!(text.contains("P[2]{"));
        assert!(text.contains("P[3]{"));
    }

    #[test]
    fn test_multi_file_split_resets_counters() {
        let points: Vec<Point> = (1..=15)
            .map(|id| cartesian_point(id, id as f64, MotionType::Linear))
            .collect();
        let mut cell = one_op_cell(points);
        cell.programs[0].max_lines_per_file = Some(10);
        cell.programs[0].frames.user_mode = crate::model::FrameOutputMode::Disabled;
        cell.programs[0].frames.tool_mode = crate::model::FrameOutputMode::Disabled;
        let files = run_single(&cell);
        assert_eq!(files.len(), 2);

        let parent = &files[0].content;
        let child = &files[1].content;
        assert_eq!(files[1].name, "R1_MAIN_1");
        assert!(parent.contains("CALL R1_MAIN_1 ;"));
        // Child numbering restarts: first instruction is line 1, first
        // position is P[1].
        assert!(child.contains("   1:  L P[1] 1000mm/sec CNT100 ;"));
    }

    #[test]
    fn test_split_never_lands_mid_arc() {
        // The instruction budget runs out exactly when the arc pair comes
        // up: the pair must land whole in the sub-file.
        let mut points: Vec<Point> = (1..=10)
            .map(|id| cartesian_point(id, id as f64, MotionType::Linear))
            .collect();
        let mut middle = cartesian_point(11, 11.0, MotionType::Circular);
        middle.arc_middle = true;
        points.push(middle);
        points.push(cartesian_point(12, 12.0, MotionType::Circular));
        let mut cell = one_op_cell(points);
        // 3 preamble lines (comment, tool change, process on) + 10 moves
        cell.programs[0].max_lines_per_file = Some(13);
        cell.programs[0].frames.user_mode = crate::model::FrameOutputMode::Disabled;
        cell.programs[0].frames.tool_mode = crate::model::FrameOutputMode::Disabled;
        let files = run_single(&cell);
        assert_eq!(files.len(), 2);
        assert!(!files[0].content.contains("C P["));
        assert!(files[1].content.contains("C P[1]\n       P[2] 1000mm/sec CNT100 ;"));
    }

    #[test]
    fn test_handshake_after_disabled_home_cancels_program() {
        let mut cell = one_op_cell(vec![cartesian_point(1, 0.0, MotionType::Linear)]);
        {
            let ops = &mut cell.programs[0].operations;
            ops.insert(
                0,
                Operation {
                    name: "Home".to_string(),
                    application: ApplicationType::Home,
                    enabled: false,
                    points: vec![Point {
                        id: 100,
                        ..Point::default()
                    }],
                    ..Operation::default()
                },
            );
            ops[1].handshake = Some(crate::model::Handshake {
                id: 1,
                dependents: vec!["R1".to_string()],
            });
        }
        let files = run_single(&cell);
        assert!(files.is_empty());
    }

    #[test]
    fn test_joint_space_linear_motion_aborts() {
        let point = Point {
            id: 1,
            motion_type: MotionType::Linear,
            motion_space: MotionSpace::Joint,
            ..Point::default()
        };
        let cell = one_op_cell(vec![point]);
        assert!(run_single(&cell).is_empty());
    }

    #[test]
    fn test_suffix_token_gates() {
        let mut cell = one_op_cell(vec![cartesian_point(1, 0.0, MotionType::Linear)]);
        {
            let settings = &mut cell.programs[0].operations[0].settings;
            settings.use_pth = true;
            settings.coordinated = true;
        }
        cell.programs[0].robot.rtcp = true;
        let files = run_single(&cell);
        assert!(files[0]
            .content
            .contains("L P[1] 1000mm/sec CNT100 PTH COORD RTCP ;"));
    }

    #[test]
    fn test_precision_override_changes_termination() {
        let mut cell = one_op_cell(vec![
            cartesian_point(1, 0.0, MotionType::Linear),
            cartesian_point(2, 10.0, MotionType::Linear),
        ]);
        {
            let op = &mut cell.programs[0].operations[0];
            op.points[1].plunge = true;
            op.settings.precision.plunge.enabled = true;
            op.settings.precision.plunge.termination = Termination::Fine;
            op.settings.precision.plunge.acceleration = Some(50);
        }
        let files = run_single(&cell);
        assert!(files[0].content.contains("L P[2] 1000mm/sec FINE ACC50 ;"));
    }

    #[test]
    fn test_inline_offset_on_move_line() {
        let mut cell = one_op_cell(vec![
            cartesian_point(1, 0.0, MotionType::Linear),
            cartesian_point(2, 100.0, MotionType::Linear),
        ]);
        {
            let op = &mut cell.programs[0].operations[0];
            // Touch-offset decoration only runs for plasma operations.
            op.application = ApplicationType::Plasma;
            op.settings.touch = Some(crate::model::TouchSettings::default());
            op.touch_groups.push(crate::model::TouchGroup {
                name: "G1".to_string(),
                touches: vec![crate::model::Touch {
                    point: Vec3::new(0.0, 0.0, 0.0),
                }],
            });
        }
        let files = run_single(&cell);
        assert!(files[0]
            .content
            .contains("L P[1] 1000mm/sec CNT100 Offset,PR[12] ;"));
    }

    #[test]
    fn test_operation_comment_line() {
        let cell = one_op_cell(vec![cartesian_point(1, 0.0, MotionType::Linear)]);
        let files = run_single(&cell);
        assert!(files[0].content.contains(":  ! Path 1 ;"));
    }
}
