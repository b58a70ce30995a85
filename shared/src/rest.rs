//! Rest poses
//!
//! Neutral position for each arm: every servo at 90 degrees.

use crate::routing::{Arm, ServoGroup};
use crate::script::{Keyframe, MotionScript, MotionType};

/// Neutral servo angle
pub const REST_ANGLE: i32 = 90;

/// Time given to reach the rest pose, in seconds
pub const REST_DURATION: f64 = 0.5;

/// Static script moving one arm to its rest pose
pub fn rest_pose(arm: Arm) -> MotionScript {
    let groups = match arm {
        Arm::Left => [
            ServoGroup::LeftHand,
            ServoGroup::LeftWrist,
            ServoGroup::LeftElbow,
            ServoGroup::LeftShoulder,
        ],
        Arm::Right => [
            ServoGroup::RightHand,
            ServoGroup::RightWrist,
            ServoGroup::RightElbow,
            ServoGroup::RightShoulder,
        ],
    };

    let frame = groups.into_iter().fold(Keyframe::new(0.0), |frame, group| {
        frame.with_group(group.name(), vec![REST_ANGLE; group.expected_len()])
    });

    MotionScript {
        token: format!("REST_{}", arm),
        motion_type: MotionType::Static,
        duration: REST_DURATION,
        keyframes: vec![frame],
    }
}
