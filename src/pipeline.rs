//! Buffer to record in one call.
//!
//! Taking the buffer by value means nobody else holds the clip while it is
//! corrected, and forward kinematics only ever sees the corrected rest pose.

use log::*;

use crate::archive::{NdArray, Record};
use crate::clip::{AnimationBuffer, Clip};
use crate::correction::CorrectionTable;
use crate::kinematics;
use crate::math::Vec3;
use crate::velocity::{self, KinematicFields};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Options {
    /// Source clips must run at a multiple of this rate.
    pub base_fps: Option<u32>,
    /// Drop frames down to this rate before anything else.
    pub target_fps: Option<u32>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            base_fps: Some(10),
            target_fps: None,
        }
    }
}

/// Checks, resamples and corrects a clip without evaluating it.
pub fn correct(
    buffer: AnimationBuffer,
    table: Option<&CorrectionTable>,
    options: &Options,
) -> Result<Clip> {
    let mut clip = Clip::from_buffer(buffer)?;
    if let Some(base) = options.base_fps {
        clip.check_frame_rate(base)?;
    }
    if let Some(target) = options.target_fps {
        clip.resample(target)?;
    }
    match table {
        Some(table) => table.apply(&mut clip)?,
        None => debug!("no correction table, keeping the source rest pose"),
    }
    Ok(clip)
}

pub fn process(
    buffer: AnimationBuffer,
    table: Option<&CorrectionTable>,
    options: &Options,
) -> Result<Record> {
    let clip = correct(buffer, table, options)?;
    let frames = kinematics::evaluate(&clip);
    let fields = velocity::derive(&clip, &frames)?;
    record(&clip, &fields)
}

/// Lays the clip's skeleton and kinematic fields out as named arrays.
pub fn record(clip: &Clip, fields: &KinematicFields) -> Result<Record> {
    let skeleton = clip.skeleton();
    let offsets: Vec<Vec3> = skeleton.joints().iter().map(|j| j.offset).collect();

    let mut record = Record::new();
    record.insert("root_translation", NdArray::vectors(&fields.root_translation));
    record.insert("root_rotation", NdArray::quaternions(&fields.root_rotation));
    record.insert("root_velocity", NdArray::vectors(&fields.root_velocity));
    record.insert(
        "root_angular_velocity",
        NdArray::vectors(&fields.root_angular_velocity),
    );
    record.insert(
        "local_rotation",
        NdArray::quaternion_grid(&fields.local_rotation)?,
    );
    record.insert(
        "local_angular_velocity",
        NdArray::vector_grid(&fields.local_angular_velocity)?,
    );
    record.insert(
        "global_translation",
        NdArray::vector_grid(&fields.global_translation)?,
    );
    record.insert(
        "global_velocity",
        NdArray::vector_grid(&fields.global_velocity)?,
    );
    record.insert(
        "node_names",
        NdArray::strings(skeleton.names().map(String::from).collect()),
    );
    record.insert("parent_indices", NdArray::integers(skeleton.parent_indices()));
    record.insert("joint_offsets", NdArray::vectors(&offsets));
    record.insert("fps", NdArray::scalar(clip.fps() as f32));
    Ok(record)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::archive::ArrayData;
    use crate::correction::{JointRef, RestCorrection};
    use crate::math::{axis_angle, identity, Axis};
    use crate::Error;
    use cgmath::Zero;

    fn walk(frames: usize, frame_time: f32) -> AnimationBuffer {
        AnimationBuffer {
            names: vec!["Hips".into(), "Spine".into(), "Head".into()],
            parents: vec![-1, 0, 1],
            offsets: vec![Vec3::zero(), Vec3::new(0.0, 10.0, 0.0), Vec3::new(0.0, 20.0, 0.0)],
            local_rotations: (0..frames)
                .map(|i| vec![identity(), axis_angle(Axis::Y, i as f32), identity()])
                .collect(),
            root_translations: (0..frames)
                .map(|i| Vec3::new(0.0, 90.0, i as f32))
                .collect(),
            frame_time,
        }
    }

    #[test]
    fn record_has_every_field() {
        let record = process(walk(6, 1.0 / 30.0), None, &Options::default()).unwrap();
        let shape = |key| record.get(key).unwrap().shape().to_vec();

        assert_eq!(shape("root_translation"), vec![6, 3]);
        assert_eq!(shape("root_rotation"), vec![6, 4]);
        assert_eq!(shape("root_velocity"), vec![6, 3]);
        assert_eq!(shape("root_angular_velocity"), vec![6, 3]);
        assert_eq!(shape("local_rotation"), vec![6, 3, 4]);
        assert_eq!(shape("local_angular_velocity"), vec![6, 3, 3]);
        assert_eq!(shape("global_translation"), vec![6, 3, 3]);
        assert_eq!(shape("global_velocity"), vec![6, 3, 3]);
        assert_eq!(shape("node_names"), vec![3]);
        assert_eq!(shape("parent_indices"), vec![3]);
        assert_eq!(shape("joint_offsets"), vec![3, 3]);
        assert_eq!(shape("fps"), Vec::<usize>::new());
        assert_eq!(record.len(), 12);

        assert_eq!(
            record.get("parent_indices").unwrap().data(),
            &ArrayData::I64(vec![-1, 0, 1])
        );
        assert_eq!(
            record.get("fps").unwrap().data(),
            &ArrayData::F32(vec![30.0])
        );
    }

    #[test]
    fn resampling_happens_before_velocities() {
        let options = Options {
            target_fps: Some(30),
            ..Options::default()
        };
        let record = process(walk(9, 1.0 / 60.0), None, &options).unwrap();
        assert_eq!(record.get("root_velocity").unwrap().shape(), &[5, 3]);
        match record.get("root_velocity").unwrap().data() {
            // two source frames per sample, one unit each, at 30 fps
            ArrayData::F32(v) => assert!((v[2] - 60.0).abs() < 1e-3),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn correction_scales_the_record() {
        let table = CorrectionTable {
            scale: 0.01,
            ..CorrectionTable::new(
                (0..3)
                    .map(|i| RestCorrection::new(JointRef::Index(i)))
                    .collect(),
            )
        };
        let record = process(walk(3, 1.0 / 30.0), Some(&table), &Options::default()).unwrap();
        match record.get("joint_offsets").unwrap().data() {
            ArrayData::F32(v) => assert!((v[4] - 0.1).abs() < 1e-6),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn correct_stops_before_kinematics() {
        let options = Options {
            target_fps: Some(10),
            ..Options::default()
        };
        // one frame survives resampling, too few for velocities but a valid clip
        let clip = correct(walk(3, 1.0 / 30.0), None, &options).unwrap();
        assert_eq!(clip.len(), 1);
        assert_eq!(clip.fps(), 10);
        assert!(matches!(
            process(walk(3, 1.0 / 30.0), None, &options),
            Err(Error::TooFewFrames(1))
        ));
    }

    #[test]
    fn preconditions_are_enforced() {
        assert!(matches!(
            process(walk(4, 1.0 / 24.0), None, &Options::default()),
            Err(Error::FrameRateMismatch { fps: 24, expected: 10 })
        ));
        let unchecked = Options {
            base_fps: None,
            target_fps: None,
        };
        assert!(process(walk(4, 1.0 / 24.0), None, &unchecked).is_ok());
        assert!(matches!(
            process(walk(1, 1.0 / 30.0), None, &Options::default()),
            Err(Error::TooFewFrames(1))
        ));
    }
}
