//! Rotation helpers over `cgmath` quaternions.
//!
//! Everything in here is a pure function on plain values. Angles that come
//! from configuration are in degrees; angles that come out are in radians.

use cgmath::{Deg, InnerSpace, Matrix3, One, Quaternion, Rotation3, Vector3, Zero};
use serde::{Deserialize, Serialize};

pub type Quat = Quaternion<f32>;
pub type Vec3 = Vector3<f32>;

/// Below this the vector part of a unit quaternion is treated as zero.
const DEGENERATE: f32 = 1e-7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn unit(self) -> Vec3 {
        match self {
            Axis::X => Vec3::unit_x(),
            Axis::Y => Vec3::unit_y(),
            Axis::Z => Vec3::unit_z(),
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Intrinsic rotation order, outermost axis first.
///
/// `Zxy` means `Rz * Rx * Ry`, which is how a `Zrotation Xrotation Yrotation`
/// channel block composes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EulerOrder {
    Xyz,
    Xzy,
    Yxz,
    Yzx,
    Zxy,
    Zyx,
}

impl Default for EulerOrder {
    fn default() -> Self {
        EulerOrder::Zxy
    }
}

impl EulerOrder {
    pub fn axes(self) -> [Axis; 3] {
        use Axis::*;
        match self {
            EulerOrder::Xyz => [X, Y, Z],
            EulerOrder::Xzy => [X, Z, Y],
            EulerOrder::Yxz => [Y, X, Z],
            EulerOrder::Yzx => [Y, Z, X],
            EulerOrder::Zxy => [Z, X, Y],
            EulerOrder::Zyx => [Z, Y, X],
        }
    }
}

pub fn identity() -> Quat {
    Quat::one()
}

pub fn axis_angle(axis: Axis, degrees: f32) -> Quat {
    Quat::from_axis_angle(axis.unit(), Deg(degrees))
}

/// Builds a rotation from `[x, y, z]` angles in degrees, composed in `order`.
pub fn from_euler(degrees: [f32; 3], order: EulerOrder) -> Quat {
    order
        .axes()
        .iter()
        .fold(identity(), |q, &axis| q * axis_angle(axis, degrees[axis.index()]))
}

/// Picks the representative with a non-negative scalar part.
pub fn shortest(q: Quat) -> Quat {
    if q.s < 0.0 {
        -q
    } else {
        q
    }
}

/// Rotation taking `from` to `to`, expressed in `from`'s own frame.
pub fn difference(from: Quat, to: Quat) -> Quat {
    shortest((from.conjugate() * to).normalize())
}

/// Rotation taking `from` to `to`, expressed in the parent (world) frame.
pub fn world_difference(from: Quat, to: Quat) -> Quat {
    shortest((to * from.conjugate()).normalize())
}

/// Splits a rotation into an angle in `[0, π]` and a unit axis.
///
/// A rotation with no measurable vector part has no defined axis; it comes
/// back as a zero angle around the zero vector.
pub fn angle_axis(q: Quat) -> (f32, Vec3) {
    let q = shortest(q.normalize());
    let sin_half = q.v.magnitude();
    if !(sin_half > DEGENERATE) {
        return (0.0, Vec3::zero());
    }
    (2.0 * sin_half.atan2(q.s), q.v / sin_half)
}

/// `axis * angle / dt` for the rotation `delta` covered in `dt` seconds.
pub fn angular_velocity(delta: Quat, dt: f32) -> Vec3 {
    let (angle, axis) = angle_axis(delta);
    axis * (angle / dt)
}

pub fn flatten(mut v: Vec3, axis: Axis) -> Vec3 {
    v[axis.index()] = 0.0;
    v
}

/// Splits `q` back into the `[x, y, z]` degrees `from_euler(_, Zxy)` takes.
///
/// At `x = ±90°` the Y and Z turns share an axis; all of it goes to Z.
pub fn to_zxy_euler(q: Quat) -> [f32; 3] {
    // column major, m[column][row]
    let m = Matrix3::from(q.normalize());
    let sin_x = m[1][2].max(-1.0).min(1.0);
    let x = sin_x.asin();
    let (y, z) = if sin_x.abs() < 1.0 - 1e-6 {
        ((-m[0][2]).atan2(m[2][2]), (-m[1][0]).atan2(m[1][1]))
    } else {
        (0.0, m[0][1].atan2(m[0][0]))
    };
    [x.to_degrees(), y.to_degrees(), z.to_degrees()]
}
