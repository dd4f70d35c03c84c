use serde::{Deserialize, Serialize};
use std::ops::Mul;

use crate::util::vec3::Vec3;

/// Unit quaternion for orientations
///
/// `q` and `-q` describe the same rotation; use [`Quat::same_rotation`]
/// instead of `==` when comparing orientations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

/// Below this angle between inputs, slerp falls back to normalized lerp
const SLERP_LINEAR_THRESHOLD: f32 = 0.9995;

impl Quat {
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    #[inline]
    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Rotation of `angle` radians about `axis`
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let axis = axis.normalize();
        let (sin, cos) = (angle * 0.5).sin_cos();
        Self {
            x: axis.x * sin,
            y: axis.y * sin,
            z: axis.z * sin,
            w: cos,
        }
    }

    /// Rotation about +Y that turns +Z towards `direction` (vertical part ignored)
    pub fn from_yaw_towards(direction: Vec3) -> Self {
        let flat = direction.flatten();
        if flat.is_zero(1e-6) {
            return Self::IDENTITY;
        }
        Self::from_axis_angle(Vec3::UP, flat.x.atan2(flat.z))
    }

    #[inline]
    pub fn dot(&self, other: Quat) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    #[inline]
    pub fn length(&self) -> f32 {
        self.dot(*self).sqrt()
    }

    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len > 0.0 {
            self.scale(1.0 / len)
        } else {
            Self::IDENTITY
        }
    }

    #[inline]
    fn scale(&self, s: f32) -> Self {
        Self {
            x: self.x * s,
            y: self.y * s,
            z: self.z * s,
            w: self.w * s,
        }
    }

    #[inline]
    fn neg(&self) -> Self {
        self.scale(-1.0)
    }

    /// Both quaternions describe the same rotation within `epsilon`
    ///
    /// Compares `1 - |dot|`, so `q` and `-q` are equal.
    pub fn same_rotation(&self, other: Quat, epsilon: f32) -> bool {
        1.0 - self.dot(other).abs() <= epsilon
    }

    /// Angle in radians of the rotation taking `self` to `other`
    pub fn angle_to(&self, other: Quat) -> f32 {
        2.0 * self.dot(other).abs().min(1.0).acos()
    }

    /// Spherical interpolation along the shortest arc
    pub fn slerp(&self, other: Quat, t: f32) -> Self {
        let mut end = other;
        let mut cos = self.dot(other);

        // Shortest path: flip to the same hemisphere
        if cos < 0.0 {
            end = end.neg();
            cos = -cos;
        }

        if cos > SLERP_LINEAR_THRESHOLD {
            let lerped = Self {
                x: self.x + (end.x - self.x) * t,
                y: self.y + (end.y - self.y) * t,
                z: self.z + (end.z - self.z) * t,
                w: self.w + (end.w - self.w) * t,
            };
            return lerped.normalize();
        }

        let theta = cos.acos();
        let sin = theta.sin();
        let a = ((1.0 - t) * theta).sin() / sin;
        let b = (t * theta).sin() / sin;
        Self {
            x: self.x * a + end.x * b,
            y: self.y * a + end.y * b,
            z: self.z * a + end.z * b,
            w: self.w * a + end.w * b,
        }
    }

    /// Rotate a vector by this quaternion
    pub fn rotate(&self, v: Vec3) -> Vec3 {
        let u = Vec3::new(self.x, self.y, self.z);
        let t = u.cross(v) * 2.0;
        v + t * self.w + u.cross(t)
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Quat {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self {
            x: self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            y: self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            z: self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            w: self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        }
    }
}
