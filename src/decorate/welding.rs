//! Welding rules
//!
//! Touch sensing brackets the operation entry, arc/weave/seam-tracking
//! events ride on the point-of-contact flags, and — unlike the cutting
//! family — a macro call on the macro-exit operation fires even when a
//! tool change is needed there as well.

use super::{OpCx, ProcessRules};
use crate::event::{Event, EventTable, Slot};
use crate::model::WeldSettings;

pub struct WeldingRules;

impl ProcessRules for WeldingRules {
    fn macro_call_exclusive(&self) -> bool {
        false
    }

    fn edit_operation(&self, table: &mut EventTable, cx: &OpCx) {
        let op = cx.op();
        if op.touch_groups.is_empty() {
            return;
        }
        let (settings, indexer) = match (op.settings.touch, cx.touch_indexer) {
            (Some(s), Some(ix)) => (s, ix),
            _ => return,
        };
        let first = match op.first_point() {
            Some(p) => p.id,
            None => return,
        };
        // One sensing bracket per touch group, measured into the group's
        // position register before the path starts.
        for group_index in 0..op.touch_groups.len() {
            if let Some(register) = indexer.register(cx.op_index, group_index) {
                table.attach(first, Slot::Before, Event::SearchStart {
                    schedule: settings.search_schedule,
                    register,
                });
                table.attach(first, Slot::Before, Event::SearchEnd);
            }
        }
    }

    fn edit_point(&self, table: &mut EventTable, cx: &OpCx, point_index: usize) {
        let op = cx.op();
        let weld = op.settings.weld.unwrap_or_else(WeldSettings::default);
        let point = &op.points[point_index];

        if point.first_point_of_contact {
            table.attach(point.id, Slot::Before, Event::WeldStart {
                schedule: weld.weld_schedule,
            });
            if weld.weave {
                table.attach(point.id, Slot::Before, Event::WeaveStart {
                    schedule: weld.weave_schedule,
                });
            }
            if weld.seam_tracking {
                table.attach(point.id, Slot::Before, Event::SeamTrackStart {
                    schedule: weld.seam_schedule,
                });
            }
        }
        if point.last_point_of_contact {
            if weld.seam_tracking {
                table.attach(point.id, Slot::After, Event::SeamTrackEnd);
            }
            if weld.weave {
                table.attach(point.id, Slot::After, Event::WeaveEnd);
            }
            table.attach(point.id, Slot::After, Event::WeldEnd {
                schedule: weld.weld_schedule,
            });
        }
    }
}
