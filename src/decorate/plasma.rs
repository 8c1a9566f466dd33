//! Plasma cutting rules
//!
//! On top of the cutting-family base behavior: touch-offset decoration,
//! IHS point-kind dispatch, AVC on/off edge detection, and the keyword
//! templates that expand plasma settings into controller commands.

use super::{touch, OpCx, ProcessRules};
use crate::event::{Event, EventTable, Slot};
use crate::model::{IhsPoint, PlasmaSettings};

pub struct PlasmaRules;

/// Keywords usable inside plasma command templates as `{Keyword}`. Each
/// keyword owns its extraction and formatting; nothing is resolved by
/// reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlasmaKeyword {
    Current,
    Voltage,
    PierceHeight,
    PierceDelay,
    TransferHeight,
    CutHeight,
}

impl PlasmaKeyword {
    pub fn from_keyword(name: &str) -> Option<Self> {
        match name {
            "Current" => Some(Self::Current),
            "Voltage" => Some(Self::Voltage),
            "PierceHeight" => Some(Self::PierceHeight),
            "PierceDelay" => Some(Self::PierceDelay),
            "TransferHeight" => Some(Self::TransferHeight),
            "CutHeight" => Some(Self::CutHeight),
            _ => None,
        }
    }

    pub fn format(self, settings: &PlasmaSettings) -> String {
        match self {
            Self::Current => format!("{:.1}", settings.current),
            Self::Voltage => format!("{:.1}", settings.voltage),
            Self::PierceHeight => format!("{:.2}", settings.pierce_height),
            Self::PierceDelay => format!("{:.2}", settings.pierce_delay),
            Self::TransferHeight => format!("{:.2}", settings.transfer_height),
            Self::CutHeight => format!("{:.2}", settings.cut_height),
        }
    }
}

/// Expand every `{Keyword}` occurrence in a command template. Unknown
/// keywords are left in place so they show up verbatim in the output,
/// which is easier to diagnose than silent deletion.
pub fn expand_template(template: &str, settings: &PlasmaSettings) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        match rest[open..].find('}') {
            Some(close) => {
                let name = &rest[open + 1..open + close];
                match PlasmaKeyword::from_keyword(name) {
                    Some(keyword) => out.push_str(&keyword.format(settings)),
                    None => out.push_str(&rest[open..open + close + 1]),
                }
                rest = &rest[open + close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

impl ProcessRules for PlasmaRules {
    fn edit_operation(&self, table: &mut EventTable, cx: &OpCx) {
        let op = cx.op();
        if let (Some(settings), Some(indexer)) = (op.settings.touch, cx.touch_indexer) {
            touch::decorate_touch_offsets(table, op, cx.op_index, indexer, &settings);
        }
    }

    fn edit_point(&self, table: &mut EventTable, cx: &OpCx, point_index: usize) {
        let op = cx.op();
        let point = &op.points[point_index];
        let plasma = op.settings.plasma.clone().unwrap_or_default();

        match point.ihs {
            Some(IhsPoint::Origin) => table.attach(point.id, Slot::Before, Event::Comment {
                text: "IHS ORIGIN".to_string(),
            }),
            Some(IhsPoint::Target) => table.attach(point.id, Slot::Before, Event::Comment {
                text: "IHS TARGET".to_string(),
            }),
            Some(IhsPoint::Transfer) => table.attach(point.id, Slot::Before, Event::Command {
                text: format!("CALL SET_HEIGHT({:.2})", plasma.transfer_height),
            }),
            Some(IhsPoint::Pierce) => {
                for template in &plasma.pierce_commands {
                    table.attach(point.id, Slot::Before, Event::Command {
                        text: expand_template(template, &plasma),
                    });
                }
                if plasma.pierce_delay > 0.0 {
                    table.attach(point.id, Slot::After, Event::Delay {
                        seconds: plasma.pierce_delay,
                    });
                }
            }
            Some(IhsPoint::InCut) => table.attach(point.id, Slot::Before, Event::Command {
                text: format!("CALL SET_HEIGHT({:.2})", plasma.cut_height),
            }),
            None => {}
        }

        // Arc voltage control fires on value edges between consecutive
        // points, not on levels.
        if let Some(prev) = point_index.checked_sub(1).map(|i| &op.points[i]) {
            if point.avc_enabled != prev.avc_enabled {
                let event = if point.avc_enabled {
                    Event::AvcOn
                } else {
                    Event::AvcOff
                };
                table.attach(point.id, Slot::Before, event);
            }
        }
    }
}
