//! Rest-pose correction.
//!
//! A [`CorrectionTable`] re-orients every joint's bind frame and rewrites
//! each keyframe so the clip moves the same way in world space under the
//! new convention. Keyframe-only tweaks (bone roll that exists because two
//! rigs disagree on axes) live in a separate [`KeyframeTable`] so they never
//! change the bind orientation.

use cgmath::{InnerSpace, Zero};
use log::*;
use serde::{Deserialize, Serialize};

use crate::clip::Clip;
use crate::math::{self, Axis, EulerOrder, Quat, Vec3};
use crate::skeleton::Skeleton;
use crate::{Error, Result};

pub mod preset;

/// Names a joint either by its name or by its index in the skeleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JointRef {
    Index(usize),
    Name(String),
}

impl JointRef {
    fn resolve(&self, skeleton: &Skeleton) -> Option<usize> {
        match self {
            JointRef::Index(i) if *i < skeleton.len() => Some(*i),
            JointRef::Index(_) => None,
            JointRef::Name(name) => skeleton.find(name),
        }
    }
}

impl std::fmt::Display for JointRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JointRef::Index(i) => write!(f, "#{}", i),
            JointRef::Name(name) => write!(f, "`{}`", name),
        }
    }
}

/// New bind orientation for one joint: `euler(angles) * roll(roll)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestCorrection {
    pub joint: JointRef,
    /// Degrees around x, y, z.
    #[serde(default)]
    pub euler: [f32; 3],
    #[serde(default)]
    pub order: EulerOrder,
    /// Degrees around the table's roll axis, applied after `euler`.
    #[serde(default)]
    pub roll: f32,
    /// Zero the table's flatten axis of this joint's rest offset.
    #[serde(default)]
    pub flatten: bool,
}

impl RestCorrection {
    pub fn new(joint: JointRef) -> Self {
        Self {
            joint,
            euler: [0.0; 3],
            order: EulerOrder::default(),
            roll: 0.0,
            flatten: false,
        }
    }

    pub fn euler(mut self, degrees: [f32; 3]) -> Self {
        self.euler = degrees;
        self
    }

    pub fn roll(mut self, degrees: f32) -> Self {
        self.roll = degrees;
        self
    }

    pub fn flatten(mut self, flatten: bool) -> Self {
        self.flatten = flatten;
        self
    }

    fn rotation(&self, roll_axis: Axis) -> Quat {
        math::from_euler(self.euler, self.order) * math::axis_angle(roll_axis, self.roll)
    }
}

/// A rotation applied to keyframes only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyframeCorrection {
    pub joint: JointRef,
    /// Degrees around the table's roll axis.
    #[serde(default)]
    pub roll: f32,
    /// Also roll every descendant by the same amount.
    #[serde(default)]
    pub recursive: bool,
    /// Degrees around x, y, z, applied after the roll.
    #[serde(default)]
    pub euler: [f32; 3],
    #[serde(default)]
    pub order: EulerOrder,
}

impl KeyframeCorrection {
    pub fn new(joint: JointRef) -> Self {
        Self {
            joint,
            roll: 0.0,
            recursive: false,
            euler: [0.0; 3],
            order: EulerOrder::default(),
        }
    }

    pub fn roll(mut self, degrees: f32, recursive: bool) -> Self {
        self.roll = degrees;
        self.recursive = recursive;
        self
    }

    pub fn euler(mut self, degrees: [f32; 3]) -> Self {
        self.euler = degrees;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyframeTable {
    /// Degrees of roll applied to every joint.
    pub roll: f32,
    #[serde(rename = "joint")]
    pub joints: Vec<KeyframeCorrection>,
}

impl KeyframeTable {
    pub fn is_empty(&self) -> bool {
        self.roll == 0.0 && self.joints.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionTable {
    /// Multiplies every translation once the rotations are corrected.
    #[serde(default = "unit_scale")]
    pub scale: f32,
    #[serde(default = "default_flatten_axis")]
    pub flatten_axis: Axis,
    #[serde(default = "default_roll_axis")]
    pub roll_axis: Axis,
    #[serde(default)]
    pub zero_root_offset: bool,
    /// One entry for every joint of the skeleton.
    #[serde(rename = "joint", default)]
    pub joints: Vec<RestCorrection>,
    #[serde(default)]
    pub keyframe: KeyframeTable,
}

fn unit_scale() -> f32 {
    1.0
}

fn default_flatten_axis() -> Axis {
    Axis::Z
}

fn default_roll_axis() -> Axis {
    Axis::Y
}

/// A table resolved against one skeleton. Building it is the only step that
/// can fail, so a clip is never left half corrected.
struct Plan {
    rest: Vec<Quat>,
    flatten: Vec<bool>,
    keyframe: Vec<Quat>,
}

impl CorrectionTable {
    pub fn new(joints: Vec<RestCorrection>) -> Self {
        Self {
            scale: unit_scale(),
            flatten_axis: default_flatten_axis(),
            roll_axis: default_roll_axis(),
            zero_root_offset: false,
            joints,
            keyframe: KeyframeTable::default(),
        }
    }

    /// A table that leaves every joint of `skeleton` as it is.
    pub fn identity(skeleton: &Skeleton) -> Self {
        Self::new(
            (0..skeleton.len())
                .map(|i| RestCorrection::new(JointRef::Index(i)))
                .collect(),
        )
    }

    pub fn from_toml_str(data: &str) -> Result<Self> {
        Ok(toml::from_str(data)?)
    }

    fn plan(&self, skeleton: &Skeleton) -> Result<Plan> {
        let mut rest: Vec<Option<Quat>> = vec![None; skeleton.len()];
        let mut flatten = vec![false; skeleton.len()];
        for entry in &self.joints {
            let index = entry.joint.resolve(skeleton).ok_or_else(|| {
                Error::IncompleteCorrectionTable(format!(
                    "joint {} is not part of the skeleton",
                    entry.joint
                ))
            })?;
            if rest[index].is_some() {
                return Err(Error::IncompleteCorrectionTable(format!(
                    "joint {} has more than one entry",
                    entry.joint
                )));
            }
            rest[index] = Some(entry.rotation(self.roll_axis));
            flatten[index] = entry.flatten;
        }
        let missing: Vec<&str> = skeleton
            .joints()
            .iter()
            .filter(|j| rest[j.index].is_none())
            .map(|j| &j.name[..])
            .collect();
        if !missing.is_empty() {
            return Err(Error::IncompleteCorrectionTable(format!(
                "no entry for {}",
                missing.join(", ")
            )));
        }
        let rest = rest.into_iter().flatten().collect();

        let mut own_roll = vec![0.0; skeleton.len()];
        let mut subtree_roll = vec![0.0; skeleton.len()];
        let mut extra = vec![math::identity(); skeleton.len()];
        for entry in &self.keyframe.joints {
            let index = entry.joint.resolve(skeleton).ok_or_else(|| {
                Error::IncompleteCorrectionTable(format!(
                    "keyframe joint {} is not part of the skeleton",
                    entry.joint
                ))
            })?;
            if entry.recursive {
                subtree_roll[index] += entry.roll;
            } else {
                own_roll[index] += entry.roll;
            }
            extra[index] = extra[index] * math::from_euler(entry.euler, entry.order);
        }
        let mut inherited = vec![0.0; skeleton.len()];
        let mut keyframe = Vec::with_capacity(skeleton.len());
        for joint in skeleton.joints() {
            let above = joint.parent.map(|p| inherited[p]).unwrap_or(0.0);
            inherited[joint.index] = above + subtree_roll[joint.index];
            let roll = self.keyframe.roll + inherited[joint.index] + own_roll[joint.index];
            keyframe.push(math::axis_angle(self.roll_axis, roll) * extra[joint.index]);
        }

        Ok(Plan {
            rest,
            flatten,
            keyframe,
        })
    }

    /// Rewrites the clip's bind pose and every keyframe in place.
    ///
    /// With `D` the change of each joint's rest frame and `F` its
    /// keyframe-only rotation, a local rotation `q` becomes
    /// `F_p⁻¹ · D_p⁻¹ · q · D · F` and a rest offset `o` becomes
    /// `F_p⁻¹ · D_p⁻¹ · o`, where `p` is the parent. The root has no parent
    /// term. Flattening happens in the `D` frame, before `F` is applied.
    ///
    /// Rest rotations only ever take the rest table; `F` never reaches them.
    pub fn apply(&self, clip: &mut Clip) -> Result<()> {
        if clip.corrected {
            return Err(Error::AlreadyCorrected);
        }
        let plan = self.plan(&clip.skeleton)?;
        let skeleton = &mut clip.skeleton;
        let n = skeleton.len();

        let mut old_global: Vec<Quat> = Vec::with_capacity(n);
        let mut new_global: Vec<Quat> = Vec::with_capacity(n);
        for joint in skeleton.joints() {
            let old_local = joint.rest_rotation;
            let new_local = (old_local * plan.rest[joint.index]).normalize();
            match joint.parent {
                Some(p) => {
                    old_global.push((old_global[p] * old_local).normalize());
                    new_global.push((new_global[p] * new_local).normalize());
                }
                None => {
                    old_global.push(old_local);
                    new_global.push(new_local);
                }
            }
        }
        let delta: Vec<Quat> = old_global
            .iter()
            .zip(&new_global)
            .map(|(old, new)| (old.conjugate() * new).normalize())
            .collect();

        let root = skeleton.root();
        for index in 0..n {
            let parent = skeleton.parent(index);
            let (mut offset, rotation) = match parent {
                Some(p) => (
                    delta[p].conjugate() * skeleton.offset(index),
                    (new_global[p].conjugate() * new_global[index]).normalize(),
                ),
                None => (skeleton.offset(index), new_global[index]),
            };
            if plan.flatten[index] {
                offset = math::flatten(offset, self.flatten_axis);
            }
            if index == root && self.zero_root_offset {
                offset = Vec3::zero();
            }
            // keyframes are expressed in the parent's rolled frame, the offset
            // has to follow it or the child swings around the parent
            if let Some(p) = parent {
                offset = plan.keyframe[p].conjugate() * offset;
            }
            skeleton.set_rest(index, offset * self.scale, rotation);
        }
        debug!(
            "rest pose corrected for {} joints (scale {})",
            n, self.scale
        );

        let frame: Vec<(Quat, Quat)> = (0..n)
            .map(|index| {
                let right = delta[index] * plan.keyframe[index];
                let left = match skeleton.parent(index) {
                    Some(p) => (delta[p] * plan.keyframe[p]).conjugate(),
                    None => math::identity(),
                };
                (left, right)
            })
            .collect();
        for pose in clip.poses.iter_mut() {
            for (q, &(left, right)) in pose.rotations.iter_mut().zip(&frame) {
                *q = (left * *q * right).normalize();
            }
            if plan.flatten[root] {
                pose.root_translation = math::flatten(pose.root_translation, self.flatten_axis);
            }
            pose.root_translation = pose.root_translation * self.scale;
        }
        debug!(
            "{} keyframes corrected{}",
            clip.poses.len(),
            if self.keyframe.is_empty() { "" } else { " with keyframe roll" }
        );

        clip.corrected = true;
        Ok(())
    }
}
