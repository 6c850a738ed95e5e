use cgmath::InnerSpace;
use log::*;

use crate::math::{Quat, Vec3};
use crate::skeleton::Skeleton;
use crate::{Error, Result};

/// Parser output for one motion file, before any validation.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationBuffer {
    pub names: Vec<String>,
    /// `-1` for the root.
    pub parents: Vec<i32>,
    pub offsets: Vec<Vec3>,
    /// `local_rotations[frame][joint]`
    pub local_rotations: Vec<Vec<Quat>>,
    pub root_translations: Vec<Vec3>,
    /// Seconds per frame.
    pub frame_time: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    /// Local rotation of every joint relative to its parent's frame.
    pub rotations: Vec<Quat>,
    pub root_translation: Vec3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    pub(crate) skeleton: Skeleton,
    pub(crate) poses: Vec<Pose>,
    frame_time: f32,
    pub(crate) corrected: bool,
}

impl Clip {
    pub fn new(skeleton: Skeleton, poses: Vec<Pose>, frame_time: f32) -> Result<Self> {
        if !(frame_time > 0.0) || !frame_time.is_finite() {
            return Err(Error::InvalidFrameTime(frame_time));
        }
        for (frame, pose) in poses.iter().enumerate() {
            if pose.rotations.len() != skeleton.len() {
                return Err(Error::ShapeMismatch(format!(
                    "frame {} has {} rotations for {} joints",
                    frame,
                    pose.rotations.len(),
                    skeleton.len()
                )));
            }
        }
        let poses = poses
            .into_iter()
            .map(|pose| Pose {
                rotations: pose.rotations.into_iter().map(|q| q.normalize()).collect(),
                ..pose
            })
            .collect();
        Ok(Self {
            skeleton,
            poses,
            frame_time,
            corrected: false,
        })
    }

    pub fn from_buffer(buffer: AnimationBuffer) -> Result<Self> {
        let AnimationBuffer {
            names,
            parents,
            offsets,
            local_rotations,
            root_translations,
            frame_time,
        } = buffer;
        if local_rotations.len() != root_translations.len() {
            return Err(Error::ShapeMismatch(format!(
                "{} rotation frames but {} root translations",
                local_rotations.len(),
                root_translations.len()
            )));
        }
        let skeleton = Skeleton::new(names, &parents, offsets)?;
        let poses = local_rotations
            .into_iter()
            .zip(root_translations)
            .map(|(rotations, root_translation)| Pose {
                rotations,
                root_translation,
            })
            .collect();
        let clip = Self::new(skeleton, poses, frame_time)?;
        debug!(
            "clip: {} joints, {} frames at {} fps",
            clip.skeleton.len(),
            clip.len(),
            clip.fps()
        );
        Ok(clip)
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn poses(&self) -> &[Pose] {
        &self.poses
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    pub fn frame_time(&self) -> f32 {
        self.frame_time
    }

    pub fn fps(&self) -> u32 {
        (1.0 / self.frame_time).round() as u32
    }

    /// Whether the rest-pose correction has already rewritten this clip.
    pub fn is_corrected(&self) -> bool {
        self.corrected
    }

    /// Checks that the clip's rate is a whole multiple of `base` fps and
    /// returns the rounded rate.
    pub fn check_frame_rate(&self, base: u32) -> Result<u32> {
        let fps = self.fps();
        if base == 0 || fps == 0 || fps % base != 0 {
            return Err(Error::FrameRateMismatch { fps, expected: base });
        }
        Ok(fps)
    }

    /// Keeps every k-th frame so the clip plays at `target` fps.
    pub fn resample(&mut self, target: u32) -> Result<()> {
        let fps = self.check_frame_rate(target)?;
        let stride = (fps / target) as usize;
        if stride == 1 {
            return Ok(());
        }
        let poses = std::mem::take(&mut self.poses);
        self.poses = poses.into_iter().step_by(stride).collect();
        self.frame_time *= stride as f32;
        debug!(
            "resampled {} fps to {} fps, {} frames left",
            fps,
            target,
            self.poses.len()
        );
        Ok(())
    }
}
