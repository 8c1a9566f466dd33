//! Multi-robot scheduler program
//!
//! One extra `.LS` file that sequences the per-robot programs through
//! TASK DONE flags. Each schedule group resets every flag, then starts
//! every program, then waits on every flag. Collapsing that into
//! per-robot reset/run/wait triples would deadlock the controller, so
//! the three-loop shape is a hard requirement, and each group ends with
//! one fixed buffer wait to paper over a known controller race.

use super::lsfile::{file_name, LsFile};
use crate::model::{Cell, RobotProgram, SchedulerMode};

/// Whether this cell gets a scheduler file at all
pub fn scheduler_wanted(cell: &Cell) -> bool {
    match cell.scheduler.mode {
        SchedulerMode::Always => true,
        SchedulerMode::WhenNeeded => cell.is_multi_robot(),
        SchedulerMode::Disabled => false,
    }
}

/// DEFAULT_GROUP mask for the scheduler program: every motion group a
/// scheduled robot occupies is marked, the rest stay inert.
fn default_group_mask(cell: &Cell) -> String {
    let mut slots = ["*"; 5];
    for program in cell.active_programs() {
        let group = program
            .robot
            .mash_group()
            .and_then(|s| s.parse::<usize>().ok());
        if let Some(g @ 1..=5) = group {
            slots[g - 1] = "1";
        }
    }
    slots.join(",")
}

/// Generate the scheduler program. Fails closed: if any active robot is
/// missing its scheduler identifiers the whole scheduler is skipped with
/// a warning, and the per-robot programs still generate.
pub fn generate(cell: &Cell) -> Option<LsFile> {
    for program in cell.active_programs() {
        if program.robot.robot_number().is_none() || program.robot.mash_group().is_none() {
            tracing::warn!(
                robot = %program.robot.name,
                "robot is missing RobotNumber/MashGrpNumber, skipping scheduler generation"
            );
            return None;
        }
    }

    let settings = &cell.scheduler;
    let timestamp = cell.timestamp.clone().unwrap_or_default();
    let mut file = LsFile::new(
        &file_name(&settings.program_name),
        "Robot scheduler",
        &timestamp,
        &default_group_mask(cell),
    );

    let groups = schedule_groups(cell);
    for group in groups {
        let members: Vec<&RobotProgram> = group
            .iter()
            .filter_map(|name| cell.program_by_name(name))
            .filter(|p| p.is_active())
            .collect();
        if members.is_empty() {
            continue;
        }
        for program in &members {
            file.add_line(&format!("F[{}]=(OFF)", flag_of(settings.flag_base, program)));
        }
        for program in &members {
            file.add_line(&format!("RUN {}", file_name(&program.name)));
        }
        for program in &members {
            file.add_line(&format!(
                "WAIT (F[{}]=ON)",
                flag_of(settings.flag_base, program)
            ));
        }
        file.add_line(&format!("WAIT {:.2}(sec)", settings.buffer_seconds));
    }
    Some(file)
}

/// The externally supplied schedule, or every active program as one
/// group in cell order when none was supplied.
fn schedule_groups(cell: &Cell) -> Vec<Vec<String>> {
    if cell.scheduler.schedule.is_empty() {
        vec![cell
            .active_programs()
            .map(|p| p.name.clone())
            .collect()]
    } else {
        cell.scheduler.schedule.clone()
    }
}

fn flag_of(flag_base: u32, program: &RobotProgram) -> u32 {
    // generate() already verified the identifier exists
    flag_base + program.robot.robot_number().unwrap_or(0)
}
