//! Arm routing
//!
//! Decides which controller(s) must receive a script by looking at which servo
//! groups its keyframes touch.

use crate::script::MotionScript;

/// One physical arm, each driven by its own controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arm {
    Left,
    Right,
}

impl Arm {
    /// Dispatch order: LEFT is always written before RIGHT
    pub const ALL: [Arm; 2] = [Arm::Left, Arm::Right];

    /// Stable index for per-arm arrays
    pub fn index(self) -> usize {
        match self {
            Arm::Left => 0,
            Arm::Right => 1,
        }
    }
}

impl std::fmt::Display for Arm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arm::Left => write!(f, "LEFT"),
            Arm::Right => write!(f, "RIGHT"),
        }
    }
}

/// Servo groups understood by the arm firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServoGroup {
    LeftHand,
    RightHand,
    LeftWrist,
    RightWrist,
    LeftElbow,
    RightElbow,
    LeftShoulder,
    RightShoulder,
}

impl ServoGroup {
    /// Look up a group by its wire name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "L" => Some(Self::LeftHand),
            "R" => Some(Self::RightHand),
            "LW" => Some(Self::LeftWrist),
            "RW" => Some(Self::RightWrist),
            "LE" => Some(Self::LeftElbow),
            "RE" => Some(Self::RightElbow),
            "LS" => Some(Self::LeftShoulder),
            "RS" => Some(Self::RightShoulder),
            _ => None,
        }
    }

    /// Wire name of the group
    pub fn name(self) -> &'static str {
        match self {
            Self::LeftHand => "L",
            Self::RightHand => "R",
            Self::LeftWrist => "LW",
            Self::RightWrist => "RW",
            Self::LeftElbow => "LE",
            Self::RightElbow => "RE",
            Self::LeftShoulder => "LS",
            Self::RightShoulder => "RS",
        }
    }

    pub fn arm(self) -> Arm {
        match self {
            Self::LeftHand | Self::LeftWrist | Self::LeftElbow | Self::LeftShoulder => Arm::Left,
            Self::RightHand | Self::RightWrist | Self::RightElbow | Self::RightShoulder => {
                Arm::Right
            }
        }
    }

    /// Number of servos (angles) in the group
    pub fn expected_len(self) -> usize {
        match self {
            Self::LeftHand | Self::RightHand => 5,
            Self::LeftWrist | Self::RightWrist => 2,
            Self::LeftElbow | Self::RightElbow => 1,
            Self::LeftShoulder | Self::RightShoulder => 2,
        }
    }
}

/// Which controllers must receive a script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArmAssignment {
    pub left: bool,
    pub right: bool,
}

impl ArmAssignment {
    pub const BOTH: ArmAssignment = ArmAssignment {
        left: true,
        right: true,
    };

    pub fn includes(self, arm: Arm) -> bool {
        match arm {
            Arm::Left => self.left,
            Arm::Right => self.right,
        }
    }

    /// Assigned arms in dispatch order
    pub fn arms(self) -> impl Iterator<Item = Arm> {
        Arm::ALL.into_iter().filter(move |arm| self.includes(*arm))
    }
}

impl std::fmt::Display for ArmAssignment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.left, self.right) {
            (true, true) => write!(f, "BOTH"),
            (true, false) => write!(f, "LEFT"),
            (false, true) => write!(f, "RIGHT"),
            (false, false) => write!(f, "NONE"),
        }
    }
}

/// Classify from a stream of group names
///
/// When no recognized group is seen the script goes to both arms, so an empty or
/// unfamiliar script is never silently dropped.
pub fn classify_keys<'a, I>(keys: I) -> ArmAssignment
where
    I: IntoIterator<Item = &'a str>,
{
    let mut assignment = ArmAssignment::default();

    for key in keys {
        match ServoGroup::from_name(key).map(ServoGroup::arm) {
            Some(Arm::Left) => assignment.left = true,
            Some(Arm::Right) => assignment.right = true,
            None => {}
        }
        if assignment == ArmAssignment::BOTH {
            break;
        }
    }

    if !assignment.left && !assignment.right {
        return ArmAssignment::BOTH;
    }
    assignment
}

/// Decide which controller(s) must receive this script
pub fn classify(script: &MotionScript) -> ArmAssignment {
    classify_keys(script.keyframes.iter().flat_map(|frame| frame.group_names()))
}
