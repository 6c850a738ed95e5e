//! Built-in correction tables.

use std::collections::HashMap;

use lazy_static::lazy_static;

use super::*;

lazy_static! {
    /// Bandai Namco Research motion dataset, 22 joints in file order.
    ///
    /// The rest pose gets the bones pointing down their local Y axis with
    /// offsets in the XY plane; the keyframe table rolls every joint so local
    /// -Z faces forward, then fixes the shoulders, head, hands and toes.
    /// Source files are in centimetres.
    pub static ref BANDAI_NAMCO: CorrectionTable = {
        let rest: [([f32; 3], f32); 22] = [
            ([0.0, 90.0, 0.0], -90.0), // 0 Hips
            ([0.0, 0.0, 180.0], 0.0),  // 1 LeftUpLeg
            ([0.0, 0.0, 0.0], 0.0),    // 2 LeftLeg
            ([0.0, 0.0, 0.0], 0.0),    // 3 LeftFoot
            ([0.0, 0.0, 0.0], 0.0),    // 4 LeftToe
            ([0.0, 0.0, 180.0], 0.0),  // 5 RightUpLeg
            ([0.0, 0.0, 0.0], 0.0),    // 6 RightLeg
            ([0.0, 0.0, 0.0], 0.0),    // 7 RightFoot
            ([0.0, 0.0, 0.0], 0.0),    // 8 RightToe
            ([0.0, 0.0, 0.0], 0.0),    // 9 Spine
            ([0.0, 0.0, 0.0], 0.0),    // 10 Spine1
            ([0.0, 90.0, 0.0], -90.0), // 11 Spine2
            ([0.0, 0.0, 0.0], 0.0),    // 12 Neck
            ([0.0, 0.0, 0.0], 0.0),    // 13 Head
            ([0.0, 0.0, -90.0], 0.0),  // 14 LeftShoulder
            ([0.0, 0.0, -90.0], 0.0),  // 15 LeftArm
            ([0.0, 0.0, 0.0], 0.0),    // 16 LeftForeArm
            ([0.0, 0.0, 0.0], 0.0),    // 17 LeftHand
            ([0.0, 0.0, 90.0], 0.0),   // 18 RightShoulder
            ([0.0, 0.0, 90.0], 0.0),   // 19 RightArm
            ([0.0, 0.0, 0.0], 0.0),    // 20 RightForeArm
            ([0.0, 0.0, 0.0], 0.0),    // 21 RightHand
        ];
        let joints = rest
            .iter()
            .enumerate()
            .map(|(i, &(euler, roll))| {
                RestCorrection::new(JointRef::Index(i))
                    .euler(euler)
                    .roll(roll)
                    .flatten(i != 0)
            })
            .collect();

        let keyframe = |i| KeyframeCorrection::new(JointRef::Index(i));
        CorrectionTable {
            scale: 0.01,
            zero_root_offset: true,
            keyframe: KeyframeTable {
                roll: -90.0,
                joints: vec![
                    keyframe(14).roll(180.0, true),
                    keyframe(18).roll(180.0, true),
                    keyframe(13).euler([-90.0, 0.0, 0.0]),
                    keyframe(4).euler([-90.0, 0.0, 0.0]),
                    keyframe(8).euler([-90.0, 0.0, 0.0]),
                    keyframe(17).euler([90.0, 0.0, 0.0]),
                    keyframe(21).euler([90.0, 0.0, 0.0]),
                ],
            },
            ..CorrectionTable::new(joints)
        }
    };

    static ref PRESETS: HashMap<&'static str, &'static CorrectionTable> = {
        let mut m = HashMap::new();
        m.insert("bandai-namco", &*BANDAI_NAMCO);
        m
    };
}

pub fn bandai_namco() -> &'static CorrectionTable {
    &BANDAI_NAMCO
}

pub fn by_name(name: &str) -> Option<&'static CorrectionTable> {
    PRESETS.get(name).copied()
}

pub fn names() -> impl Iterator<Item = &'static str> {
    PRESETS.keys().copied()
}
