//! Decoration engine
//!
//! First of the two generation passes: walks every operation and point of
//! a robot program and attaches events to the side table. The base rules
//! (tool change, macro call, process on/off, precision dwells, scheduling)
//! always run first; process-specific rules append after them through a
//! strategy lookup on the operation's application type. That ordering is
//! a contract, not a convention — the variants rely on the foundational
//! events being in place.

pub mod conditions;
pub mod handshake;
pub mod touch;

mod cutting;
mod pickplace;
mod plasma;
mod welding;

use crate::error::PostError;
use crate::event::{Event, EventTable, Slot};
use crate::model::{
    ApplicationType, Cell, Operation, ProcessCondition, RobotProgram, ToolChangePlacement,
};
use self::touch::TouchIndexer;

/// Everything a rule needs to look at while decorating one operation
pub struct OpCx<'a> {
    pub cell: &'a Cell,
    pub program: &'a RobotProgram,
    pub op_index: usize,
    pub touch_indexer: Option<&'a TouchIndexer>,
}

impl<'a> OpCx<'a> {
    pub fn op(&self) -> &'a Operation {
        &self.program.operations[self.op_index]
    }
}

/// Process-specific decoration rules. Implementations append to what the
/// base rules already attached; they never replace them.
pub trait ProcessRules {
    /// Whether the macro-call event yields to a tool change on the same
    /// operation. Welding opts out and fires both. This is a property of
    /// the program's process, so the pipeline reads it from the rules of
    /// the first task operation, not from the macro operation itself.
    fn macro_call_exclusive(&self) -> bool {
        true
    }

    fn edit_operation(&self, _table: &mut EventTable, _cx: &OpCx) {}

    fn edit_point(&self, _table: &mut EventTable, _cx: &OpCx, _point_index: usize) {}
}

/// Rules that add nothing beyond the base behavior (home, macro and
/// generic task operations)
struct DefaultRules;

impl ProcessRules for DefaultRules {}

fn rules_for(application: ApplicationType) -> &'static dyn ProcessRules {
    match application {
        ApplicationType::Cutting | ApplicationType::Additive => &cutting::CuttingRules,
        ApplicationType::Plasma => &plasma::PlasmaRules,
        ApplicationType::Welding => &welding::WeldingRules,
        ApplicationType::PickPlace => &pickplace::PickPlaceRules,
        ApplicationType::Task | ApplicationType::Macro | ApplicationType::Home => &DefaultRules,
    }
}

/// An operation the decoration pass is willing to touch
fn is_input_valid(op: &Operation) -> bool {
    op.enabled && !op.points.is_empty()
}

/// Run the decoration pass over one robot program.
pub fn decorate(cell: &Cell, program: &RobotProgram) -> Result<EventTable, PostError> {
    let mut table = EventTable::new(program);

    let touch_settings = program
        .operations
        .iter()
        .find_map(|op| op.settings.touch);
    let touch_indexer = match touch_settings {
        Some(settings) => Some(TouchIndexer::build(program, &settings)?),
        None => None,
    };

    // Tool mounted so far while walking the program, fed back into the
    // tool-change evaluator.
    let mut mounted: Option<u32> = None;

    let program_application = program
        .first_task_index()
        .map(|i| program.operations[i].application)
        .unwrap_or(ApplicationType::Task);
    let macro_exclusive = rules_for(program_application).macro_call_exclusive();

    for (op_index, op) in program.operations.iter().enumerate() {
        if !is_input_valid(op) {
            continue;
        }
        let rules = rules_for(op.application);
        let cx = OpCx {
            cell,
            program,
            op_index,
            touch_indexer: touch_indexer.as_ref(),
        };

        base_edit_operation(&mut table, &cx, macro_exclusive, &mut mounted);
        rules.edit_operation(&mut table, &cx);

        for point_index in 0..op.points.len() {
            base_edit_point(&mut table, &cx, point_index);
            rules.edit_point(&mut table, &cx, point_index);
        }
    }
    Ok(table)
}

fn base_edit_operation(
    table: &mut EventTable,
    cx: &OpCx,
    macro_exclusive: bool,
    mounted: &mut Option<u32>,
) {
    attach_tool_events(table, cx, macro_exclusive, mounted);
    attach_process_events(table, cx);
    handshake::decorate_scheduling(table, cx.cell, cx.program, cx.op_index);
}

fn attach_tool_events(
    table: &mut EventTable,
    cx: &OpCx,
    macro_exclusive: bool,
    mounted: &mut Option<u32>,
) {
    let program = cx.program;
    let op_index = cx.op_index;
    let op = cx.op();
    let first = match op.first_point() {
        Some(p) => p.id,
        None => return,
    };

    // A home or macro operation mounts the tool of the upcoming work
    let tool = op.tool_number.or_else(|| {
        program.operations[op_index..]
            .iter()
            .find_map(|o| o.tool_number)
    });

    let macro_event = || Event::MacroCall {
        name: op
            .macro_name
            .clone()
            .unwrap_or_else(|| op.name.clone()),
    };

    let mut macro_called = false;
    if macro_exclusive {
        if conditions::is_macro_call_needed(program, op_index, *mounted) {
            table.attach(first, Slot::Before, macro_event());
            macro_called = true;
        } else if conditions::is_tool_change_needed(program, op_index, *mounted) {
            let slot = tool_change_slot(program, op_index);
            table.attach(first, slot, Event::ToolChange {
                tool: tool.unwrap_or(0),
            });
            *mounted = tool;
        }
    } else {
        if conditions::is_macro_exit(program, op_index) {
            table.attach(first, Slot::Before, macro_event());
            macro_called = true;
        }
        if conditions::is_tool_change_needed(program, op_index, *mounted) {
            let slot = tool_change_slot(program, op_index);
            table.attach(first, slot, Event::ToolChange {
                tool: tool.unwrap_or(0),
            });
            *mounted = tool;
        }
    }
    // The macro program takes care of its own tooling
    if macro_called {
        *mounted = tool.or(*mounted);
    }
}

/// After-the-point placement applies to the very first operation only,
/// and only under the AfterHome configuration.
fn tool_change_slot(program: &RobotProgram, op_index: usize) -> Slot {
    if op_index == 0 && program.tool_change_placement == ToolChangePlacement::AfterHome {
        Slot::After
    } else {
        Slot::Before
    }
}

fn attach_process_events(table: &mut EventTable, cx: &OpCx) {
    let program = cx.program;
    let op_index = cx.op_index;
    let op = cx.op();
    if !op.application.is_task() {
        return;
    }

    let (activate, deactivate) = match op.settings.process_condition {
        ProcessCondition::EveryProgram => (
            program.first_task_index() == Some(op_index),
            program.last_task_index() == Some(op_index),
        ),
        ProcessCondition::EveryOperation => (true, true),
        ProcessCondition::EveryToolChange => {
            let prev_tool = program
                .prev_task_operation(op_index)
                .and_then(|o| o.tool_number);
            let next_tool = program
                .next_task_operation(op_index)
                .and_then(|o| o.tool_number);
            (prev_tool != op.tool_number, next_tool != op.tool_number)
        }
        // Handled point by point in base_edit_point
        ProcessCondition::EveryPath => (false, false),
    };

    if activate {
        let index = conditions::activation_index(op, op.settings.activation).unwrap_or(0);
        table.attach(
            op.points[index].id,
            Slot::Before,
            Event::ProcessOn {
                process: op.application,
            },
        );
    }
    if deactivate {
        let index = conditions::deactivation_index(op, op.settings.deactivation)
            .unwrap_or(op.points.len() - 1);
        table.attach(
            op.points[index].id,
            Slot::After,
            Event::ProcessOff {
                process: op.application,
            },
        );
    }
}

fn base_edit_point(table: &mut EventTable, cx: &OpCx, point_index: usize) {
    let op = cx.op();
    let point = &op.points[point_index];

    if op.application.is_task()
        && op.settings.process_condition == ProcessCondition::EveryPath
    {
        // Activation and deactivation are independent tests; both may
        // fire on the same point.
        if conditions::point_activates(op, point_index, op.settings.activation) {
            table.attach(
                point.id,
                Slot::Before,
                Event::ProcessOn {
                    process: op.application,
                },
            );
        }
        if conditions::point_deactivates(op, point_index, op.settings.deactivation) {
            table.attach(
                point.id,
                Slot::After,
                Event::ProcessOff {
                    process: op.application,
                },
            );
        }
    }

    if op.application.is_task() {
        if let Some(matched) = conditions::precision_override(op, point_index) {
            if matched.delay > 0.0 {
                table.attach(
                    point.id,
                    Slot::After,
                    Event::Delay {
                        seconds: matched.delay,
                    },
                );
            }
        }
    }
}
