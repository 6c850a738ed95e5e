//! Forward kinematics.

use cgmath::InnerSpace;

use crate::clip::{Clip, Pose};
use crate::math::{Quat, Vec3};
use crate::skeleton::Skeleton;

/// World-space transform of every joint for one pose.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalFrame {
    pub translations: Vec<Vec3>,
    pub rotations: Vec<Quat>,
}

impl GlobalFrame {
    pub fn len(&self) -> usize {
        self.rotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rotations.is_empty()
    }
}

/// Composes local rotations down the hierarchy, root first.
pub fn forward(skeleton: &Skeleton, pose: &Pose) -> GlobalFrame {
    debug_assert_eq!(pose.rotations.len(), skeleton.len());
    let mut translations: Vec<Vec3> = Vec::with_capacity(skeleton.len());
    let mut rotations: Vec<Quat> = Vec::with_capacity(skeleton.len());
    for (joint, local) in skeleton.joints().iter().zip(&pose.rotations) {
        match joint.parent {
            Some(p) => {
                translations.push(translations[p] + rotations[p] * joint.offset);
                rotations.push((rotations[p] * *local).normalize());
            }
            None => {
                translations.push(pose.root_translation);
                rotations.push(*local);
            }
        }
    }
    GlobalFrame {
        translations,
        rotations,
    }
}

pub fn evaluate(clip: &Clip) -> Vec<GlobalFrame> {
    clip.poses()
        .iter()
        .map(|pose| forward(clip.skeleton(), pose))
        .collect()
}
