use std::collections::HashMap;

use crate::math::{identity, Quat, Vec3};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Joint {
    pub name: String,
    pub index: usize,
    pub parent: Option<usize>,
    /// Rest-pose translation from the parent, in the parent's frame.
    pub offset: Vec3,
    /// Rest-pose rotation relative to the parent's frame.
    pub rest_rotation: Quat,
}

/// Joint hierarchy stored parent-first.
///
/// Every parent index is smaller than its child's index, so walking the
/// joints in order always visits a parent before any of its children. Joint
/// `0` is the only root.
#[derive(Debug, Clone, PartialEq)]
pub struct Skeleton {
    joints: Vec<Joint>,
    names: HashMap<String, usize>,
}

impl Skeleton {
    /// Builds a skeleton from parser output. A parent index of `-1` marks the
    /// root.
    pub fn new(names: Vec<String>, parents: &[i32], offsets: Vec<Vec3>) -> Result<Self> {
        if names.is_empty() {
            return Err(Error::InvalidTopology("skeleton has no joints".into()));
        }
        if names.len() != parents.len() || names.len() != offsets.len() {
            return Err(Error::InvalidTopology(format!(
                "{} names, {} parents and {} offsets",
                names.len(),
                parents.len(),
                offsets.len()
            )));
        }

        let mut joints = Vec::with_capacity(names.len());
        let mut lookup = HashMap::with_capacity(names.len());
        let mut roots = 0;
        for (index, (name, offset)) in names.into_iter().zip(offsets).enumerate() {
            let parent = match parents[index] {
                -1 => {
                    roots += 1;
                    None
                }
                p if p >= 0 && (p as usize) < index => Some(p as usize),
                p => {
                    return Err(Error::InvalidTopology(format!(
                        "joint `{}` ({}) has parent {}",
                        name, index, p
                    )))
                }
            };
            if lookup.insert(name.clone(), index).is_some() {
                return Err(Error::InvalidTopology(format!(
                    "joint name `{}` is used more than once",
                    name
                )));
            }
            joints.push(Joint {
                name,
                index,
                parent,
                offset,
                rest_rotation: identity(),
            });
        }
        if roots != 1 {
            return Err(Error::InvalidTopology(format!(
                "expected exactly one root, found {}",
                roots
            )));
        }

        Ok(Self {
            joints,
            names: lookup,
        })
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn root(&self) -> usize {
        0
    }

    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    pub fn joint(&self, index: usize) -> &Joint {
        &self.joints[index]
    }

    pub fn parent(&self, index: usize) -> Option<usize> {
        self.joints[index].parent
    }

    pub fn offset(&self, index: usize) -> Vec3 {
        self.joints[index].offset
    }

    pub fn rest_rotation(&self, index: usize) -> Quat {
        self.joints[index].rest_rotation
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    pub fn children(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        self.joints[index + 1..]
            .iter()
            .filter(move |j| j.parent == Some(index))
            .map(|j| j.index)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.joints.iter().map(|j| &j.name[..])
    }

    /// Parent indices with the root encoded as `-1`.
    pub fn parent_indices(&self) -> Vec<i64> {
        self.joints
            .iter()
            .map(|j| j.parent.map(|p| p as i64).unwrap_or(-1))
            .collect()
    }

    /// Only the rest-pose corrector rewrites the bind pose.
    pub(crate) fn set_rest(&mut self, index: usize, offset: Vec3, rotation: Quat) {
        let joint = &mut self.joints[index];
        joint.offset = offset;
        joint.rest_rotation = rotation;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use cgmath::Zero;

    fn names(n: &[&str]) -> Vec<String> {
        n.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn chain_builds() {
        let skeleton = Skeleton::new(
            names(&["Hips", "Spine", "Head", "LeftLeg"]),
            &[-1, 0, 1, 0],
            vec![Vec3::zero(), Vec3::unit_y(), Vec3::unit_y(), -Vec3::unit_x()],
        )
        .unwrap();
        assert_eq!(skeleton.len(), 4);
        assert_eq!(skeleton.root(), 0);
        assert_eq!(skeleton.parent(2), Some(1));
        assert_eq!(skeleton.find("LeftLeg"), Some(3));
        assert_eq!(skeleton.find("Tail"), None);
        assert_eq!(skeleton.children(0).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(skeleton.parent_indices(), vec![-1, 0, 1, 0]);
        for joint in skeleton.joints().iter().skip(1) {
            assert!(joint.parent.unwrap() < joint.index);
        }
    }

    #[test]
    fn parent_after_child_is_rejected() {
        let err = Skeleton::new(
            names(&["Hips", "Spine", "Head"]),
            &[-1, 2, 0],
            vec![Vec3::zero(); 3],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidTopology(_)));

        let err = Skeleton::new(names(&["Hips", "Spine"]), &[-1, 1], vec![Vec3::zero(); 2])
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTopology(_)));
    }

    #[test]
    fn second_root_is_rejected() {
        let err = Skeleton::new(
            names(&["Hips", "Spine", "Prop"]),
            &[-1, 0, -1],
            vec![Vec3::zero(); 3],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidTopology(_)));
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(Skeleton::new(vec![], &[], vec![]).is_err());
        assert!(Skeleton::new(names(&["Hips"]), &[-1, 0], vec![Vec3::zero()]).is_err());
        assert!(Skeleton::new(names(&["Hips", "Hips"]), &[-1, 0], vec![Vec3::zero(); 2]).is_err());
        assert!(Skeleton::new(names(&["Hips", "Spine"]), &[-1, -3], vec![Vec3::zero(); 2]).is_err());
    }
}
