//! Touch-group register indexing and offset decoration
//!
//! Operations with probing data offset their points through position
//! registers measured by the touch-sensing macros. Each touch group owns
//! one register, assigned by its ordinal position across the whole robot
//! program (operation order, then in-operation group order) — stable and
//! deterministic across runs.

use crate::error::PostError;
use crate::event::{Event, EventTable, Slot};
use crate::model::{
    InterpolationMode, Operation, RobotProgram, TouchOffsetMode, TouchSettings, Vec3,
};
use std::collections::HashMap;

/// Register assignment for every touch group of a robot program
#[derive(Debug)]
pub struct TouchIndexer {
    registers: HashMap<(usize, usize), u32>,
}

impl TouchIndexer {
    /// Walk the program once and hand out registers in order. Fails the
    /// program when the configured window cannot hold every group.
    pub fn build(program: &RobotProgram, settings: &TouchSettings) -> Result<Self, PostError> {
        let mut registers = HashMap::new();
        let mut ordinal = 0u32;
        for (op_index, op) in program.operations.iter().enumerate() {
            for group_index in 0..op.touch_groups.len() {
                registers.insert(
                    (op_index, group_index),
                    settings.start_register + ordinal,
                );
                ordinal += 1;
            }
        }
        if ordinal > settings.register_count {
            return Err(PostError::RegisterWindowExhausted {
                needed: ordinal,
                available: settings.register_count,
            });
        }
        Ok(Self { registers })
    }

    pub fn register(&self, op_index: usize, group_index: usize) -> Option<u32> {
        self.registers.get(&(op_index, group_index)).copied()
    }
}

/// Blend weight of the closer group at normalized position `x` along the
/// segment between the two group centers. Clamped so the weight stays in
/// [0,1] past the segment ends.
pub fn blend_weight(mode: InterpolationMode, x: f64) -> f64 {
    let x = x.clamp(0.0, 1.0);
    match mode {
        InterpolationMode::Linear => 1.0 - x,
        // reflected smoothstep cubic
        InterpolationMode::SmoothStep => 1.0 - 3.0 * x * x + 2.0 * x * x * x,
    }
}

/// Normalized projection of `point` onto the segment `a -> b`
pub fn interpolation_ratio(point: Vec3, a: Vec3, b: Vec3) -> f64 {
    let ab = b.sub(a);
    let len2 = ab.dot(ab);
    if len2 <= f64::EPSILON {
        return 0.0;
    }
    (point.sub(a).dot(ab) / len2).clamp(0.0, 1.0)
}

/// Two closest touch groups to a point, closest first, as
/// (group index, register, mean position)
fn closest_groups<'a>(
    op: &'a Operation,
    op_index: usize,
    indexer: &TouchIndexer,
    position: Vec3,
) -> Vec<(usize, u32, Vec3)> {
    let mut ranked: Vec<(usize, u32, Vec3, f64)> = op
        .touch_groups
        .iter()
        .enumerate()
        .filter_map(|(i, group)| {
            let mean = group.mean_position();
            indexer
                .register(op_index, i)
                .map(|reg| (i, reg, mean, position.distance(mean)))
        })
        .collect();
    ranked.sort_by(|a, b| a.3.total_cmp(&b.3));
    ranked
        .into_iter()
        .take(2)
        .map(|(i, reg, mean, _)| (i, reg, mean))
        .collect()
}

/// Decorate every point of the operation with its touch offset, following
/// the configured strategy.
pub fn decorate_touch_offsets(
    table: &mut EventTable,
    op: &Operation,
    op_index: usize,
    indexer: &TouchIndexer,
    settings: &TouchSettings,
) {
    if op.touch_groups.is_empty() {
        return;
    }
    let mut last_closest: Option<usize> = None;
    for (index, point) in op.points.iter().enumerate() {
        if point.arc_middle {
            // The C-pair's offset rides on the arc end point.
            continue;
        }
        let ranked = closest_groups(op, op_index, indexer, point.position);
        if ranked.is_empty() {
            continue;
        }

        // Arc end points emit their register arithmetic one point early,
        // at the arc start, and shift the scratch register by 2 so they
        // cannot clobber the offset the arc is still moving under.
        let is_arc_end = index > 0 && op.points[index - 1].arc_middle;
        let (anchor, scratch) = if is_arc_end {
            let start = index.checked_sub(2).map(|i| op.points[i].id);
            (start.unwrap_or(point.id), settings.scratch_register + 2)
        } else {
            (point.id, settings.scratch_register)
        };

        match settings.mode {
            TouchOffsetMode::Sequential => {
                let (_, register, _) = ranked[0];
                table.attach(point.id, Slot::Inline, Event::PointOffset { register });
            }
            TouchOffsetMode::Interpolated => {
                if ranked.len() == 1 {
                    let (group_index, register, _) = ranked[0];
                    // Only refresh the scratch register when the closest
                    // group actually changed since the previous point.
                    if last_closest != Some(group_index) {
                        table.attach(
                            anchor,
                            Slot::Before,
                            Event::RegisterCopy {
                                dest: scratch,
                                src: register,
                            },
                        );
                    }
                    last_closest = Some(group_index);
                    table.attach(
                        point.id,
                        Slot::Inline,
                        Event::PointOffset { register: scratch },
                    );
                } else {
                    let (group_a, reg_a, mean_a) = ranked[0];
                    let (_, reg_b, mean_b) = ranked[1];
                    let x = interpolation_ratio(point.position, mean_a, mean_b);
                    let weight_a = blend_weight(settings.interpolation, x);
                    let weight_b = 1.0 - weight_a;
                    for axis in 1..=3u8 {
                        table.attach(
                            anchor,
                            Slot::Before,
                            Event::RegisterBlend {
                                dest: scratch,
                                axis,
                                a: reg_a,
                                weight_a,
                                b: reg_b,
                                weight_b,
                            },
                        );
                    }
                    last_closest = Some(group_a);
                    table.attach(
                        point.id,
                        Slot::Inline,
                        Event::PointOffset { register: scratch },
                    );
                }
            }
        }
    }
}
