//! User and tool frame output
//!
//! Frames are written on operation entry when the frame number changed
//! since the previous operation, and forced again right after a tool
//! change. Under an RTCP tool configuration the controller's user and
//! tool register labels swap meaning, so the emitted labels swap too.

use super::lsfile::LsFile;
use crate::model::{Frame, FrameOutputMode, FrameSettings, Operation, RobotProgram};

/// Frame numbers already selected in the running program
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct FrameState {
    user: Option<u32>,
    tool: Option<u32>,
}

impl FrameState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit whatever frame selections this operation needs. `forced`
    /// re-outputs both frames regardless of the tracked numbers, which
    /// is what a tool change requires.
    pub fn emit(
        &mut self,
        file: &mut LsFile,
        program: &RobotProgram,
        op: &Operation,
        forced: bool,
    ) {
        let settings = &program.frames;
        let (user_label, tool_label) = if program.robot.rtcp {
            ("UTOOL", "UFRAME")
        } else {
            ("UFRAME", "UTOOL")
        };

        if forced || self.user != Some(op.user_frame.number) {
            emit_frame(file, settings, settings.user_mode, user_label, &op.user_frame);
            self.user = Some(op.user_frame.number);
        }
        if forced || self.tool != Some(op.tool_frame.number) {
            emit_frame(file, settings, settings.tool_mode, tool_label, &op.tool_frame);
            self.tool = Some(op.tool_frame.number);
        }
    }
}

fn emit_frame(
    file: &mut LsFile,
    settings: &FrameSettings,
    mode: FrameOutputMode,
    label: &str,
    frame: &Frame,
) {
    if mode == FrameOutputMode::Disabled {
        return;
    }
    if settings.comment_block {
        for (axis, value) in ["X", "Y", "Z", "W", "P", "R"].iter().zip(frame.xyzwpr) {
            file.add_line(&format!("! {} {}: {:.3}", label, axis, value));
        }
    }
    match mode {
        FrameOutputMode::Disabled => {}
        // Frame 0 has no register array entry; the _NUM selection alone
        // is valid and always emitted.
        FrameOutputMode::ByRegister => {
            file.add_line(&format!("{}_NUM={}", label, frame.number));
        }
        FrameOutputMode::ByValue => {
            if frame.number == 0 {
                file.add_line(&format!("{}_NUM=0", label));
                return;
            }
            let pr = settings.frame_register;
            for (element, value) in frame.xyzwpr.iter().enumerate() {
                file.add_line(&format!("PR[{},{}]={:.3}", pr, element + 1, value));
            }
            file.add_line(&format!("{}[{}]=PR[{}]", label, frame.number, pr));
            file.add_line(&format!("{}_NUM={}", label, frame.number));
        }
    }
}
