//! Fanuc motion-group mapping
//!
//! Robotmaster reports joints as a flat id list; Fanuc wants them bucketed
//! into motion groups (GP1, GP2, ...) with per-group axis numbering. The
//! map is built once per robot program before serialization and read-only
//! afterwards.

use crate::model::{JointDef, RobotProgram};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FanucJoint {
    /// Robotmaster joint id, the key into `Point::joints`
    pub id: u32,
    /// Axis number within the group, 1-based
    pub axis: u32,
    pub external: bool,
    pub linear: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FanucGroup {
    /// Motion group number, 1-based
    pub number: u32,
    pub joints: Vec<FanucJoint>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupMap {
    pub groups: Vec<FanucGroup>,
}

impl GroupMap {
    /// Bucket the program's joints by motion group, renumbering axes
    /// 1..n within each group in joint-list order. Groups come out
    /// sorted by group number.
    pub fn build(program: &RobotProgram) -> Self {
        let mut groups: Vec<FanucGroup> = Vec::new();
        for def in &program.joints {
            let index = match groups.iter().position(|g| g.number == def.group) {
                Some(i) => i,
                None => {
                    groups.push(FanucGroup {
                        number: def.group,
                        joints: Vec::new(),
                    });
                    groups.len() - 1
                }
            };
            let group = &mut groups[index];
            group.joints.push(FanucJoint {
                id: def.id,
                axis: group.joints.len() as u32 + 1,
                external: def.external,
                linear: def.linear,
            });
        }
        groups.sort_by_key(|g| g.number);
        // A program with no joint list still owns motion group 1
        if groups.is_empty() {
            groups.push(FanucGroup {
                number: 1,
                joints: Vec::new(),
            });
        }
        Self { groups }
    }

    /// The `DEFAULT_GROUP` attribute value: `1` for each present group,
    /// `*` for each absent one, five slots.
    pub fn default_group_mask(&self) -> String {
        (1..=5u32)
            .map(|n| {
                if self.groups.iter().any(|g| g.number == n) {
                    "1"
                } else {
                    "*"
                }
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Non-primary groups, emitted as extra `GP` blocks in `/POS`
    pub fn external_groups(&self) -> impl Iterator<Item = &FanucGroup> {
        self.groups.iter().filter(|g| g.number != 1)
    }

    pub fn primary(&self) -> &FanucGroup {
        self.groups
            .iter()
            .find(|g| g.number == 1)
            .unwrap_or(&self.groups[0])
    }
}
