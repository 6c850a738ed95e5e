//! Corrected clips written back out as BVH.
//!
//! Every joint gets `Zrotation Xrotation Yrotation` channels and the root
//! also gets positions, so the file replays the clip's forward kinematics
//! exactly. Joints are listed depth first, the order BVH readers index them.

use cookie_factory::combinator::string;
use cookie_factory::multi::all;
use cookie_factory::sequence::tuple;
use cookie_factory::*;
use log::debug;

use super::write::serialize_error;
use super::ClipWriter;
use crate::clip::{Clip, Pose};
use crate::math::{self, Vec3};
use crate::skeleton::Skeleton;
use crate::{Error, Result};

use std::fs;
use std::path::Path;

const ROOT_CHANNELS: &str =
    "CHANNELS 6 Xposition Yposition Zposition Zrotation Xrotation Yrotation";
const JOINT_CHANNELS: &str = "CHANNELS 3 Zrotation Xrotation Yrotation";

/// Joint indices in depth-first order, children in skeleton order.
pub fn file_order(skeleton: &Skeleton) -> Vec<usize> {
    let mut order = Vec::with_capacity(skeleton.len());
    let mut stack = vec![skeleton.root()];
    while let Some(index) = stack.pop() {
        order.push(index);
        let children: Vec<usize> = skeleton.children(index).collect();
        stack.extend(children.into_iter().rev());
    }
    order
}

fn vector(v: Vec3) -> String {
    format!("{:.6} {:.6} {:.6}", v.x, v.y, v.z)
}

fn hierarchy(skeleton: &Skeleton, index: usize, depth: usize, lines: &mut Vec<String>) {
    let indent = "\t".repeat(depth);
    let joint = skeleton.joint(index);
    let (keyword, channels) = match joint.parent {
        None => ("ROOT", ROOT_CHANNELS),
        Some(_) => ("JOINT", JOINT_CHANNELS),
    };
    lines.push(format!("{}{} {}", indent, keyword, joint.name));
    lines.push(format!("{}{{", indent));
    lines.push(format!("{}\tOFFSET {}", indent, vector(joint.offset)));
    lines.push(format!("{}\t{}", indent, channels));

    let mut leaf = true;
    for child in skeleton.children(index) {
        leaf = false;
        hierarchy(skeleton, child, depth + 1, lines);
    }
    if leaf {
        lines.push(format!("{}\tEnd Site", indent));
        lines.push(format!("{}\t{{", indent));
        lines.push(format!("{}\t\tOFFSET {}", indent, vector(Vec3::new(0.0, 0.0, 0.0))));
        lines.push(format!("{}\t}}", indent));
    }
    lines.push(format!("{}}}", indent));
}

fn frame(pose: &Pose, order: &[usize]) -> String {
    let mut values = vec![vector(pose.root_translation)];
    for &index in order {
        let [x, y, z] = math::to_zxy_euler(pose.rotations[index]);
        values.push(format!("{:.6} {:.6} {:.6}", z, x, y));
    }
    values.join(" ")
}

/// Encodes a clip as BVH text.
pub fn bvh_bytes(clip: &Clip) -> Result<Vec<u8>> {
    let skeleton = clip.skeleton();
    if let Some(joint) = skeleton
        .joints()
        .iter()
        .find(|j| j.name.is_empty() || j.name.contains(char::is_whitespace))
    {
        return Err(Error::Serialize(format!(
            "joint {} name `{}` cannot be written to bvh",
            joint.index, joint.name
        )));
    }
    let order = file_order(skeleton);

    let mut lines = vec!["HIERARCHY".to_string()];
    hierarchy(skeleton, skeleton.root(), 0, &mut lines);
    lines.push("MOTION".into());
    lines.push(format!("Frames: {}", clip.len()));
    lines.push(format!("Frame Time: {:.6}", clip.frame_time()));
    lines.extend(clip.poses().iter().map(|pose| frame(pose, &order)));

    gen_simple(
        all(lines.iter().map(|l| tuple((string(l), string("\n"))))),
        Vec::new(),
    )
    .map_err(serialize_error)
}

/// Writes clips as BVH motion files.
#[derive(Debug, Default, Clone, Copy)]
pub struct BvhWriter;

impl ClipWriter for BvhWriter {
    fn extension(&self) -> &'static str {
        "bvh"
    }

    fn write(&self, clip: &Clip, path: &Path) -> Result<()> {
        let bytes = bvh_bytes(clip)?;
        fs::write(path, &bytes)?;
        debug!("wrote {} ({} frames)", path.display(), clip.len());
        Ok(())
    }
}
