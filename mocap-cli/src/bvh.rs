use bvh_anim::*;
use cgmath::Zero;
use log::*;
use mocap::math::{self, Axis, Quat, Vec3};
use mocap::AnimationBuffer;

fn rotation_axis(channel: &Channel) -> Option<Axis> {
    match channel.channel_type() {
        ChannelType::RotationX => Some(Axis::X),
        ChannelType::RotationY => Some(Axis::Y),
        ChannelType::RotationZ => Some(Axis::Z),
        _ => None,
    }
}

fn position_axis(channel: &Channel) -> Option<Axis> {
    match channel.channel_type() {
        ChannelType::PositionX => Some(Axis::X),
        ChannelType::PositionY => Some(Axis::Y),
        ChannelType::PositionZ => Some(Axis::Z),
        _ => None,
    }
}

/// Flattens a parsed BVH file into the buffer the library consumes.
///
/// Rotation channels compose in the order the file lists them. The root's
/// translation comes from its position channels; axes without a channel
/// keep the root offset.
pub fn buffer(bvh: &Bvh) -> AnimationBuffer {
    let mut names = vec![];
    let mut parents = vec![];
    let mut offsets = vec![];
    let mut channels = vec![];
    for joint in bvh.joints() {
        let data = joint.data();
        let offset = data.offset();
        names.push(data.name().to_string());
        parents.push(data.parent_index().map(|p| p as i32).unwrap_or(-1));
        offsets.push(Vec3::new(offset.x, offset.y, offset.z));
        channels.push(data.channels().to_vec());
    }
    trace!("bvh joints: {:?}", names);

    let root_offset = offsets.first().copied().unwrap_or_else(Vec3::zero);
    let root_channels = channels.first().cloned().unwrap_or_default();
    let mut local_rotations = vec![];
    let mut root_translations = vec![];
    for frame in bvh.frames() {
        let rotations: Vec<Quat> = channels
            .iter()
            .map(|joint| {
                joint.iter().fold(math::identity(), |q, channel| {
                    match rotation_axis(channel) {
                        Some(axis) => q * math::axis_angle(axis, frame[channel]),
                        None => q,
                    }
                })
            })
            .collect();
        let mut translation = root_offset;
        for channel in &root_channels {
            if let Some(axis) = position_axis(channel) {
                translation[axis.index()] = frame[channel];
            }
        }
        local_rotations.push(rotations);
        root_translations.push(translation);
    }

    AnimationBuffer {
        names,
        parents,
        offsets,
        local_rotations,
        root_translations,
        frame_time: bvh.frame_time().as_secs_f32(),
    }
}
