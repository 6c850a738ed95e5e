//! Finite-difference velocities.
//!
//! Every field has one sample per pose. Sample `i` looks at poses `i` and
//! `i + 1`; the last pose has nothing ahead of it and repeats the sample
//! before it.

use crate::clip::Clip;
use crate::kinematics::GlobalFrame;
use crate::math::{self, Quat, Vec3};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct KinematicFields {
    /// `[frame]`
    pub root_translation: Vec<Vec3>,
    pub root_rotation: Vec<Quat>,
    pub root_velocity: Vec<Vec3>,
    pub root_angular_velocity: Vec<Vec3>,
    /// `[frame][joint]`
    pub local_rotation: Vec<Vec<Quat>>,
    pub local_angular_velocity: Vec<Vec<Vec3>>,
    pub global_translation: Vec<Vec<Vec3>>,
    pub global_velocity: Vec<Vec<Vec3>>,
}

impl KinematicFields {
    pub fn len(&self) -> usize {
        self.root_translation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root_translation.is_empty()
    }
}

/// `diff(samples[i], samples[i + 1])` for every `i`, with the last value
/// repeated so the output is as long as the input.
fn forward_difference<T, U, F>(samples: &[T], diff: F) -> Vec<U>
where
    U: Clone,
    F: Fn(&T, &T) -> U,
{
    let mut out: Vec<U> = samples.windows(2).map(|w| diff(&w[0], &w[1])).collect();
    if let Some(last) = out.last().cloned() {
        out.push(last);
    }
    out
}

fn linear(dt: f32) -> impl Fn(&Vec3, &Vec3) -> Vec3 {
    move |a: &Vec3, b: &Vec3| (*b - *a) / dt
}

/// Derives every velocity field from a clip and its forward kinematics.
pub fn derive(clip: &Clip, frames: &[GlobalFrame]) -> Result<KinematicFields> {
    if clip.len() < 2 {
        return Err(Error::TooFewFrames(clip.len()));
    }
    if frames.len() != clip.len() {
        return Err(Error::ShapeMismatch(format!(
            "{} global frames for {} poses",
            frames.len(),
            clip.len()
        )));
    }
    let dt = clip.frame_time();
    let root = clip.skeleton().root();

    let root_translation: Vec<Vec3> = frames.iter().map(|f| f.translations[root]).collect();
    let root_rotation: Vec<Quat> = frames.iter().map(|f| f.rotations[root]).collect();
    let root_velocity = forward_difference(&root_translation, linear(dt));
    let root_angular_velocity = forward_difference(&root_rotation, |a, b| {
        math::angular_velocity(math::world_difference(*a, *b), dt)
    });

    let local_rotation: Vec<Vec<Quat>> =
        clip.poses().iter().map(|p| p.rotations.clone()).collect();
    let local_angular_velocity: Vec<Vec<Vec3>> = forward_difference(&local_rotation, |a, b| {
        a.iter()
            .zip(b)
            .map(|(q0, q1)| math::angular_velocity(math::difference(*q0, *q1), dt))
            .collect()
    });

    let global_translation: Vec<Vec<Vec3>> =
        frames.iter().map(|f| f.translations.clone()).collect();
    let global_velocity: Vec<Vec<Vec3>> = forward_difference(&global_translation, |a, b| {
        a.iter().zip(b).map(|(p0, p1)| linear(dt)(p0, p1)).collect()
    });

    Ok(KinematicFields {
        root_translation,
        root_rotation,
        root_velocity,
        root_angular_velocity,
        local_rotation,
        local_angular_velocity,
        global_translation,
        global_velocity,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::clip::AnimationBuffer;
    use crate::kinematics;
    use crate::math::{axis_angle, identity, Axis};
    use approx::assert_abs_diff_eq;
    use cgmath::Zero;

    fn chain(local_rotations: Vec<Vec<Quat>>, root_translations: Vec<Vec3>) -> Clip {
        Clip::from_buffer(AnimationBuffer {
            names: vec!["Root".into(), "Child".into(), "Grandchild".into()],
            parents: vec![-1, 0, 1],
            offsets: vec![Vec3::zero(), Vec3::unit_y(), Vec3::unit_y()],
            local_rotations,
            root_translations,
            frame_time: 1.0 / 30.0,
        })
        .unwrap()
    }

    fn fields(clip: &Clip) -> KinematicFields {
        derive(clip, &kinematics::evaluate(clip)).unwrap()
    }

    #[test]
    fn sliding_root() {
        let clip = chain(
            vec![vec![identity(); 3]; 2],
            vec![Vec3::zero(), Vec3::new(1.0, 0.0, 0.0)],
        );
        let fields = fields(&clip);

        assert_eq!(fields.len(), 2);
        assert_abs_diff_eq!(fields.root_velocity[0], Vec3::new(30.0, 0.0, 0.0), epsilon = 1e-3);
        assert_eq!(fields.root_velocity[1], fields.root_velocity[0]);
        for frame in &fields.local_angular_velocity {
            for w in frame {
                assert_eq!(*w, Vec3::zero());
            }
        }
        for frame in &fields.global_velocity {
            for v in frame {
                assert_abs_diff_eq!(*v, Vec3::new(30.0, 0.0, 0.0), epsilon = 1e-3);
            }
        }
        assert_eq!(fields.root_angular_velocity[0], Vec3::zero());
    }

    #[test]
    fn last_sample_repeats() {
        let rotations = (0..5)
            .map(|i| {
                let t = (i * i) as f32;
                vec![axis_angle(Axis::Y, 3.0 * t), axis_angle(Axis::X, t), identity()]
            })
            .collect();
        let translations = (0..5).map(|i| Vec3::new(0.0, 0.0, (i * i) as f32)).collect();
        let fields = fields(&chain(rotations, translations));

        assert_eq!(fields.len(), 5);
        assert_eq!(fields.root_velocity.len(), 5);
        assert_eq!(fields.root_velocity[4], fields.root_velocity[3]);
        assert_eq!(fields.root_angular_velocity[4], fields.root_angular_velocity[3]);
        assert_eq!(fields.local_angular_velocity[4], fields.local_angular_velocity[3]);
        assert_eq!(fields.global_velocity[4], fields.global_velocity[3]);
        assert_ne!(fields.root_velocity[3], fields.root_velocity[2]);
    }

    #[test]
    fn constant_spin_has_constant_rate() {
        let rotations = (0..4)
            .map(|i| vec![identity(), axis_angle(Axis::Z, 6.0 * i as f32), identity()])
            .collect();
        let fields = fields(&chain(rotations, vec![Vec3::zero(); 4]));

        let rate = 6f32.to_radians() * 30.0;
        for frame in &fields.local_angular_velocity {
            assert_abs_diff_eq!(frame[1], Vec3::new(0.0, 0.0, rate), epsilon = 1e-3);
            assert_eq!(frame[0], Vec3::zero());
        }
        // the grandchild swings around the child's pivot
        let step = 6f32.to_radians();
        let v = fields.global_velocity[0][2];
        assert_abs_diff_eq!(v.x, -step.sin() * 30.0, epsilon = 1e-3);
        assert_abs_diff_eq!(v.y, (step.cos() - 1.0) * 30.0, epsilon = 1e-3);
    }

    #[test]
    fn root_spin_is_measured_in_world_frame() {
        let rotations = (0..3)
            .map(|i| {
                vec![
                    axis_angle(Axis::Y, 10.0 * i as f32) * axis_angle(Axis::X, 90.0),
                    identity(),
                    identity(),
                ]
            })
            .collect();
        let fields = fields(&chain(rotations, vec![Vec3::zero(); 3]));
        let rate = 10f32.to_radians() * 30.0;
        assert_abs_diff_eq!(
            fields.root_angular_velocity[0],
            Vec3::new(0.0, rate, 0.0),
            epsilon = 1e-3
        );
    }

    #[test]
    fn single_frame_is_rejected() {
        let clip = chain(vec![vec![identity(); 3]], vec![Vec3::zero()]);
        assert!(matches!(
            derive(&clip, &kinematics::evaluate(&clip)),
            Err(Error::TooFewFrames(1))
        ));
    }
}
