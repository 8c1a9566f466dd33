//! Events and the per-point event table
//!
//! Decoration attaches typed events to points; serialization renders them
//! into `/MN` instruction bodies. Events never mutate the motion graph:
//! they live in a side table keyed by point id, with three temporal slots
//! per point (before / inline / after). An event is append-only once
//! attached.

use crate::model::{ApplicationType, PointId, RobotProgram};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Before,
    Inline,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GripperAction {
    Open,
    Close,
}

/// Which wait primitive the handshake uses on this robot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeKind {
    /// This robot is the handshake's first dependent
    InPos,
    PrSync,
}

/// A discrete instruction attached to one point, in one slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ToolChange { tool: u32 },
    MacroCall { name: String },
    ProcessOn { process: ApplicationType },
    ProcessOff { process: ApplicationType },
    Delay { seconds: f64 },
    Comment { text: String },
    Command { text: String },
    Gripper { action: GripperAction },
    SchedulerSync { mask: u32 },
    Handshake { kind: HandshakeKind, id: u32 },
    SearchStart { schedule: u32, register: u32 },
    SearchEnd,
    WeldStart { schedule: u32 },
    WeldEnd { schedule: u32 },
    WeaveStart { schedule: u32 },
    WeaveEnd,
    SeamTrackStart { schedule: u32 },
    SeamTrackEnd,
    AvcOn,
    AvcOff,
    /// Inline position-register offset on the move line
    PointOffset { register: u32 },
    /// Whole-register copy, `PR[dest]=PR[src]`
    RegisterCopy { dest: u32, src: u32 },
    /// One axis of a weighted two-register blend into `dest`
    RegisterBlend {
        dest: u32,
        /// Fanuc PR element index: 1 = X, 2 = Y, 3 = Z
        axis: u8,
        a: u32,
        weight_a: f64,
        b: u32,
        weight_b: f64,
    },
}

impl Event {
    /// Render to standalone `/MN` instruction bodies (before/after slots).
    pub fn render_lines(&self) -> Vec<String> {
        match self {
            Event::ToolChange { tool } => vec![format!("CALL TOOL_CHANGE({})", tool)],
            Event::MacroCall { name } => vec![format!("CALL {}", name)],
            Event::ProcessOn { process } => vec![process_command(*process, true)],
            Event::ProcessOff { process } => vec![process_command(*process, false)],
            Event::Delay { seconds } => vec![format!("WAIT {:.2}(sec)", seconds)],
            Event::Comment { text } => vec![format!("! {}", text)],
            Event::Command { text } => vec![text.clone()],
            Event::Gripper { action } => match action {
                GripperAction::Open => vec!["CALL OPEN_GRIPPER".to_string()],
                GripperAction::Close => vec!["CALL CLOSE_GRIPPER".to_string()],
            },
            Event::SchedulerSync { mask } => vec![format!("CALL SYNC_SCHED({})", mask)],
            Event::Handshake { kind, id } => match kind {
                HandshakeKind::InPos => vec![format!("CALL INPOS({})", id)],
                HandshakeKind::PrSync => vec![format!("CALL PR_SYNC({})", id)],
            },
            Event::SearchStart { schedule, register } => vec![
                format!("Search Start[{}] PR[{}]", schedule, register),
            ],
            Event::SearchEnd => vec!["Search End".to_string()],
            Event::WeldStart { schedule } => vec![format!("Arc Start[{}]", schedule)],
            Event::WeldEnd { schedule } => vec![format!("Arc End[{}]", schedule)],
            Event::WeaveStart { schedule } => vec![format!("Weave Sine[{}]", schedule)],
            Event::WeaveEnd => vec!["Weave End".to_string()],
            Event::SeamTrackStart { schedule } => vec![format!("Track Start[{}]", schedule)],
            Event::SeamTrackEnd => vec!["Track End".to_string()],
            Event::AvcOn => vec!["CALL AVC_ON".to_string()],
            Event::AvcOff => vec!["CALL AVC_OFF".to_string()],
            Event::PointOffset { register } => vec![format!("PR[{}]", register)],
            Event::RegisterCopy { dest, src } => vec![format!("PR[{}]=PR[{}]", dest, src)],
            Event::RegisterBlend {
                dest,
                axis,
                a,
                weight_a,
                b,
                weight_b,
            } => vec![format!(
                "PR[{d},{ax}]=PR[{a},{ax}]*{wa:.4}+PR[{b},{ax}]*{wb:.4}",
                d = dest,
                ax = axis,
                a = a,
                wa = weight_a,
                b = b,
                wb = weight_b,
            )],
        }
    }

    /// Render as a token appended to the move line (inline slot). Events
    /// with no inline form return `None` and are dropped with a warning
    /// by the serializer.
    pub fn render_inline(&self) -> Option<String> {
        match self {
            Event::PointOffset { register } => Some(format!("Offset,PR[{}]", register)),
            Event::Command { text } => Some(text.clone()),
            _ => None,
        }
    }
}

fn process_command(process: ApplicationType, on: bool) -> String {
    let name = match (process, on) {
        (ApplicationType::Cutting, true) => "CUTTER_ON",
        (ApplicationType::Cutting, false) => "CUTTER_OFF",
        (ApplicationType::Plasma, true) => "PLASMA_START",
        (ApplicationType::Plasma, false) => "PLASMA_STOP",
        (ApplicationType::Welding, true) => "WELD_ON",
        (ApplicationType::Welding, false) => "WELD_OFF",
        (ApplicationType::Additive, true) => "DEPOSIT_ON",
        (ApplicationType::Additive, false) => "DEPOSIT_OFF",
        (_, true) => "PROCESS_ON",
        (_, false) => "PROCESS_OFF",
    };
    format!("CALL {}", name)
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct EventSlots {
    pub before: Vec<Event>,
    pub inline: Vec<Event>,
    pub after: Vec<Event>,
}

/// Side table of events by point and slot.
///
/// Arc middle points may not carry inline/after events directly; attaching
/// one redirects it to the arc's end point, and the table remembers that a
/// redirection happened so the serializer can warn once per program.
#[derive(Debug, Default)]
pub struct EventTable {
    slots: HashMap<PointId, EventSlots>,
    /// Arc middle point id -> its end point id
    arc_redirects: HashMap<PointId, PointId>,
    redirect_used: bool,
}

impl EventTable {
    /// Build the table for one robot program, wiring up arc-middle
    /// redirection from the point order.
    pub fn new(program: &RobotProgram) -> Self {
        let mut arc_redirects = HashMap::new();
        for op in &program.operations {
            for pair in op.points.windows(2) {
                if pair[0].arc_middle {
                    arc_redirects.insert(pair[0].id, pair[1].id);
                }
            }
        }
        Self {
            slots: HashMap::new(),
            arc_redirects,
            redirect_used: false,
        }
    }

    /// Attach an event to a point's slot. Events are append-only.
    pub fn attach(&mut self, point: PointId, slot: Slot, event: Event) {
        let target = match slot {
            Slot::Before => point,
            Slot::Inline | Slot::After => match self.arc_redirects.get(&point) {
                Some(&end) => {
                    self.redirect_used = true;
                    end
                }
                None => point,
            },
        };
        let entry = self.slots.entry(target).or_default();
        match slot {
            Slot::Before => entry.before.push(event),
            Slot::Inline => entry.inline.push(event),
            Slot::After => entry.after.push(event),
        }
    }

    pub fn events(&self, point: PointId, slot: Slot) -> &[Event] {
        static EMPTY: Vec<Event> = Vec::new();
        let entry = match self.slots.get(&point) {
            Some(e) => e,
            None => return &EMPTY,
        };
        match slot {
            Slot::Before => &entry.before,
            Slot::Inline => &entry.inline,
            Slot::After => &entry.after,
        }
    }

    /// Whether any arc-middle event had to be moved to its end point
    pub fn redirect_used(&self) -> bool {
        self.redirect_used
    }
}
