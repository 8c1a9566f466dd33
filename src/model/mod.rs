//! Cell data model
//!
//! The in-memory description of one robot cell as the CAM engine hands it
//! over: robot programs, operations, motion points, probing data and the
//! menu settings that drive code generation. Cells are loaded from JSON
//! documents, so everything here derives `Deserialize` with lenient
//! defaults.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// Custom-value key for the robot's scheduler flag/program number
pub const KEY_ROBOT_NUMBER: &str = "RobotNumber";
/// Custom-value key for the robot's Fanuc motion-group number string
pub const KEY_MASH_GRP_NUMBER: &str = "MashGrpNumber";

/// Unique per-program point identifier
pub type PointId = u32;

/// 3D vector / position in mm
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn sub(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn add(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn scale(self, k: f64) -> Vec3 {
        Vec3::new(self.x * k, self.y * k, self.z * k)
    }

    pub fn dot(self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn distance(self, other: Vec3) -> f64 {
        self.sub(other).norm()
    }

    /// Angle between two direction vectors in degrees. Zero-length
    /// directions count as no turn at all.
    pub fn angle_deg(self, other: Vec3) -> f64 {
        let denom = self.norm() * other.norm();
        if denom <= f64::EPSILON {
            return 0.0;
        }
        let cos = (self.dot(other) / denom).clamp(-1.0, 1.0);
        cos.acos().to_degrees()
    }
}

/// WPR Euler orientation in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct Orientation {
    pub w: f64,
    pub p: f64,
    pub r: f64,
}

/// Robot configuration flags for the Fanuc CONFIG string
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub flip: bool,
    pub up: bool,
    pub front: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum MotionType {
    Joint,
    Linear,
    Circular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum MotionSpace {
    Joint,
    Cartesian,
}

/// Plasma IHS (initial height sense) point classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum IhsPoint {
    Origin,
    Target,
    Transfer,
    Pierce,
    InCut,
}

/// One waypoint of an operation's path.
///
/// Arc points come in middle+end pairs: the point flagged `arc_middle` is
/// always immediately followed by its arc end point in the same operation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Point {
    pub id: PointId,
    pub position: Vec3,
    pub orientation: Orientation,
    pub config: RobotConfig,
    /// Raw joint values keyed by joint id (deg for rotary, mm for linear)
    pub joints: BTreeMap<u32, f64>,
    pub motion_type: MotionType,
    pub motion_space: MotionSpace,
    /// Linear/circular feedrate in mm/sec
    pub feedrate: f64,
    pub in_process: bool,
    pub plunge: bool,
    pub first_point_of_contact: bool,
    pub last_point_of_contact: bool,
    pub arc_middle: bool,
    pub avc_enabled: bool,
    pub ihs: Option<IhsPoint>,
}

impl Default for Point {
    fn default() -> Self {
        Self {
            id: 0,
            position: Vec3::default(),
            orientation: Orientation::default(),
            config: RobotConfig::default(),
            joints: BTreeMap::new(),
            motion_type: MotionType::Joint,
            motion_space: MotionSpace::Joint,
            feedrate: 0.0,
            in_process: false,
            plunge: false,
            first_point_of_contact: false,
            last_point_of_contact: false,
            arc_middle: false,
            avc_enabled: false,
            ihs: None,
        }
    }
}

/// What kind of work an operation performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ApplicationType {
    Cutting,
    Plasma,
    Welding,
    Additive,
    PickPlace,
    /// Generic process-less task operation
    Task,
    /// Macro program call operation
    Macro,
    /// Home / repositioning operation
    Home,
}

impl ApplicationType {
    /// Task operations are the ones that do actual process work, as
    /// opposed to home moves and macro calls.
    pub fn is_task(self) -> bool {
        !matches!(self, ApplicationType::Macro | ApplicationType::Home)
    }
}

/// When to switch the process on/off across the program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ProcessCondition {
    EveryProgram,
    EveryOperation,
    EveryToolChange,
    EveryPath,
}

/// Which point of the operation receives the process-on event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ActivationPoint {
    FirstPoint,
    FirstNonJointMove,
    FirstPlunge,
    FirstPointOfContact,
    FirstMoveInProcess,
}

/// Which point of the operation receives the process-off event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum DeactivationPoint {
    LastPoint,
    LastNonJointMove,
    LastPlunge,
    LastPointOfContact,
    LastMoveInProcess,
}

/// Positioning path termination for a move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Termination {
    Fine,
    /// Continuous termination, 0-100
    Cnt(u8),
}

/// One precision-motion override (plunge / sharp turn / small move)
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PrecisionOverride {
    pub enabled: bool,
    pub termination: Termination,
    pub acceleration: Option<u8>,
    /// Dwell inserted after the move when positive, in seconds
    pub delay: f64,
}

impl Default for PrecisionOverride {
    fn default() -> Self {
        Self {
            enabled: false,
            termination: Termination::Fine,
            acceleration: None,
            delay: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct PrecisionSettings {
    pub plunge: PrecisionOverride,
    pub sharp_turn: PrecisionOverride,
    /// Path direction change threshold, degrees
    pub sharp_turn_angle: f64,
    pub small_move: PrecisionOverride,
    /// Move length threshold, mm
    pub small_move_distance: f64,
}

impl Default for PrecisionSettings {
    fn default() -> Self {
        Self {
            plunge: PrecisionOverride::default(),
            sharp_turn: PrecisionOverride::default(),
            sharp_turn_angle: 45.0,
            small_move: PrecisionOverride::default(),
            small_move_distance: 1.0,
        }
    }
}

/// Touch-offset output strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TouchOffsetMode {
    Sequential,
    Interpolated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum InterpolationMode {
    Linear,
    SmoothStep,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TouchSettings {
    pub mode: TouchOffsetMode,
    pub interpolation: InterpolationMode,
    /// First position register available to touch groups
    pub start_register: u32,
    /// Number of registers in the window, scratch registers included
    pub register_count: u32,
    /// Shared scratch register for interpolated offsets
    pub scratch_register: u32,
    /// Fanuc search schedule used by the sensing macros
    pub search_schedule: u32,
}

impl Default for TouchSettings {
    fn default() -> Self {
        Self {
            mode: TouchOffsetMode::Sequential,
            interpolation: InterpolationMode::Linear,
            start_register: 12,
            register_count: 20,
            scratch_register: 9,
            search_schedule: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct WeldSettings {
    pub weld_schedule: u32,
    pub weave: bool,
    pub weave_schedule: u32,
    pub seam_tracking: bool,
    pub seam_schedule: u32,
}

impl Default for WeldSettings {
    fn default() -> Self {
        Self {
            weld_schedule: 1,
            weave: false,
            weave_schedule: 1,
            seam_tracking: false,
            seam_schedule: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlasmaSettings {
    pub current: f64,
    pub voltage: f64,
    pub pierce_height: f64,
    pub pierce_delay: f64,
    pub transfer_height: f64,
    pub cut_height: f64,
    /// Command templates expanded through the keyword table, one /MN
    /// instruction each (see `decorate::plasma`)
    pub pierce_commands: Vec<String>,
}

impl Default for PlasmaSettings {
    fn default() -> Self {
        Self {
            current: 0.0,
            voltage: 0.0,
            pierce_height: 0.0,
            pierce_delay: 0.0,
            transfer_height: 0.0,
            cut_height: 0.0,
            pierce_commands: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PickPlaceRole {
    ToPick,
    ToPlace,
}

/// Per-operation menu settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OperationSettings {
    pub process_condition: ProcessCondition,
    pub activation: ActivationPoint,
    pub deactivation: DeactivationPoint,
    /// Joint move speed, percent
    pub joint_speed: f64,
    pub termination: Termination,
    pub acceleration: Option<u8>,
    /// Append PTH on continuous-termination moves
    pub use_pth: bool,
    /// Append COORD on linear/circular moves (coordinated motion)
    pub coordinated: bool,
    /// Append MROT on joint moves in Cartesian space
    pub minor_rotation: bool,
    pub precision: PrecisionSettings,
    pub touch: Option<TouchSettings>,
    pub weld: Option<WeldSettings>,
    pub plasma: Option<PlasmaSettings>,
}

impl Default for OperationSettings {
    fn default() -> Self {
        Self {
            process_condition: ProcessCondition::EveryOperation,
            activation: ActivationPoint::FirstPoint,
            deactivation: DeactivationPoint::LastPoint,
            joint_speed: 100.0,
            termination: Termination::Cnt(100),
            acceleration: None,
            use_pth: false,
            coordinated: false,
            minor_rotation: false,
            precision: PrecisionSettings::default(),
            touch: None,
            weld: None,
            plasma: None,
        }
    }
}

/// A single probing touch
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Touch {
    pub point: Vec3,
}

/// A named cluster of probing touches. The group's ordinal position
/// across the robot program determines its position-register index.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TouchGroup {
    pub name: String,
    pub touches: Vec<Touch>,
}

impl TouchGroup {
    /// Mean touch position of the group
    pub fn mean_position(&self) -> Vec3 {
        if self.touches.is_empty() {
            return Vec3::default();
        }
        let sum = self
            .touches
            .iter()
            .fold(Vec3::default(), |acc, t| acc.add(t.point));
        sum.scale(1.0 / self.touches.len() as f64)
    }
}

/// Cross-robot synchronization descriptor
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Handshake {
    pub id: u32,
    /// Robot names, order matters: the first dependent waits in-position
    pub dependents: Vec<String>,
}

/// A user or tool frame: number plus its XYZWPR definition
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Frame {
    pub number: u32,
    pub xyzwpr: [f64; 6],
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            number: 1,
            xyzwpr: [0.0; 6],
        }
    }
}

/// One CAM-computed unit of robot work
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Operation {
    pub id: u32,
    pub name: String,
    pub application: ApplicationType,
    pub enabled: bool,
    pub tool_number: Option<u32>,
    /// Macro program to call for Macro operations
    pub macro_name: Option<String>,
    pub user_frame: Frame,
    pub tool_frame: Frame,
    /// Dwell before the operation's first point, seconds
    pub wait_time: f64,
    pub handshake: Option<Handshake>,
    pub pick_place: Option<PickPlaceRole>,
    pub settings: OperationSettings,
    pub points: Vec<Point>,
    pub touch_groups: Vec<TouchGroup>,
}

impl Default for Operation {
    fn default() -> Self {
        Self {
            id: 0,
            name: String::new(),
            application: ApplicationType::Task,
            enabled: true,
            tool_number: None,
            macro_name: None,
            user_frame: Frame::default(),
            tool_frame: Frame::default(),
            wait_time: 0.0,
            handshake: None,
            pick_place: None,
            settings: OperationSettings::default(),
            points: Vec::new(),
            touch_groups: Vec::new(),
        }
    }
}

impl Operation {
    pub fn first_point(&self) -> Option<&Point> {
        self.points.first()
    }

    pub fn last_point(&self) -> Option<&Point> {
        self.points.last()
    }

    /// Previous point that is part of the process, if any
    pub fn prev_in_process(&self, index: usize) -> Option<&Point> {
        self.points[..index].iter().rev().find(|p| p.in_process)
    }

    /// Next point that is part of the process, if any
    pub fn next_in_process(&self, index: usize) -> Option<&Point> {
        self.points[index + 1..].iter().find(|p| p.in_process)
    }
}

/// Joint definition as the kinematics layer reports it
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct JointDef {
    pub id: u32,
    /// Fanuc motion group this joint belongs to
    pub group: u32,
    pub external: bool,
    /// Linear axes output mm instead of deg
    pub linear: bool,
}

impl Default for JointDef {
    fn default() -> Self {
        Self {
            id: 0,
            group: 1,
            external: false,
            linear: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Robot {
    pub name: String,
    /// Remote TCP tool configuration
    pub rtcp: bool,
    /// Host-supplied configuration bag, string keyed and string valued
    pub custom_values: HashMap<String, String>,
}

impl Default for Robot {
    fn default() -> Self {
        Self {
            name: String::new(),
            rtcp: false,
            custom_values: HashMap::new(),
        }
    }
}

impl Robot {
    pub fn robot_number(&self) -> Option<u32> {
        self.custom_values
            .get(KEY_ROBOT_NUMBER)
            .and_then(|v| v.parse().ok())
    }

    pub fn mash_group(&self) -> Option<&str> {
        self.custom_values.get(KEY_MASH_GRP_NUMBER).map(|s| s.as_str())
    }
}

/// When the tool-change event lands relative to the first point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ToolChangePlacement {
    BeforePoint,
    /// After the first point, first operation only
    AfterHome,
}

/// How frame numbers/values reach the program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum FrameOutputMode {
    Disabled,
    ByRegister,
    ByValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    pub user_mode: FrameOutputMode,
    pub tool_mode: FrameOutputMode,
    /// Emit the 6-line X/Y/Z/W/P/R comment block as well
    pub comment_block: bool,
    /// Scratch position register used by ByValue output
    pub frame_register: u32,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            user_mode: FrameOutputMode::ByRegister,
            tool_mode: FrameOutputMode::ByRegister,
            comment_block: false,
            frame_register: 99,
        }
    }
}

/// Ordered sequence of operations for one physical robot
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RobotProgram {
    pub name: String,
    pub comment: String,
    pub robot: Robot,
    pub joints: Vec<JointDef>,
    pub operations: Vec<Operation>,
    /// Split output into linked sub-files past this many move lines
    pub max_lines_per_file: Option<u32>,
    pub tool_change_placement: ToolChangePlacement,
    pub frames: FrameSettings,
}

impl Default for RobotProgram {
    fn default() -> Self {
        Self {
            name: String::new(),
            comment: String::new(),
            robot: Robot::default(),
            joints: Vec::new(),
            operations: Vec::new(),
            max_lines_per_file: None,
            tool_change_placement: ToolChangePlacement::BeforePoint,
            frames: FrameSettings::default(),
        }
    }
}

impl RobotProgram {
    /// A program is active when it has at least one enabled operation
    /// with points.
    pub fn is_active(&self) -> bool {
        self.operations
            .iter()
            .any(|op| op.enabled && !op.points.is_empty())
    }

    pub fn prev_operation(&self, index: usize) -> Option<&Operation> {
        index.checked_sub(1).map(|i| &self.operations[i])
    }

    pub fn next_operation(&self, index: usize) -> Option<&Operation> {
        self.operations.get(index + 1)
    }

    /// Index of the first task operation, if any
    pub fn first_task_index(&self) -> Option<usize> {
        self.operations
            .iter()
            .position(|op| op.application.is_task())
    }

    /// Index of the last task operation, if any
    pub fn last_task_index(&self) -> Option<usize> {
        self.operations
            .iter()
            .rposition(|op| op.application.is_task())
    }

    /// Previous task operation before `index`, walking backwards
    pub fn prev_task_operation(&self, index: usize) -> Option<&Operation> {
        self.operations[..index]
            .iter()
            .rev()
            .find(|op| op.application.is_task())
    }

    /// Next task operation after `index`
    pub fn next_task_operation(&self, index: usize) -> Option<&Operation> {
        self.operations[index + 1..]
            .iter()
            .find(|op| op.application.is_task())
    }

}

/// Whether the multi-robot scheduler program gets generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SchedulerMode {
    Disabled,
    WhenNeeded,
    Always,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub mode: SchedulerMode,
    pub program_name: String,
    /// Trailing dwell per schedule group, seconds
    pub buffer_seconds: f64,
    /// TASK DONE flag for robot n lives at flag_base + n
    pub flag_base: u32,
    /// Schedule groups of robot-program names, externally ordered.
    /// When empty, all programs form a single group in cell order.
    pub schedule: Vec<Vec<String>>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            mode: SchedulerMode::WhenNeeded,
            program_name: "SCHEDULER".to_string(),
            buffer_seconds: 1.0,
            flag_base: 10,
            schedule: Vec::new(),
        }
    }
}

/// One robot cell: every robot program plus cell-wide settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Cell {
    pub programs: Vec<RobotProgram>,
    pub scheduler: SchedulerSettings,
    /// Timestamp stamped into /ATTR blocks, `DD-MM-YY HH:MM:SS`
    pub timestamp: Option<String>,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            programs: Vec::new(),
            scheduler: SchedulerSettings::default(),
            timestamp: None,
        }
    }
}

impl Cell {
    pub fn active_programs(&self) -> impl Iterator<Item = &RobotProgram> {
        self.programs.iter().filter(|p| p.is_active())
    }

    /// More than one active robot in the cell
    pub fn is_multi_robot(&self) -> bool {
        self.active_programs().count() > 1
    }

    pub fn robot_by_name(&self, name: &str) -> Option<&Robot> {
        self.programs
            .iter()
            .find(|p| p.robot.name == name)
            .map(|p| &p.robot)
    }

    pub fn program_by_name(&self, name: &str) -> Option<&RobotProgram> {
        self.programs.iter().find(|p| p.name == name)
    }
}
