//! 2D vector, rotation and transform primitives.

use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

pub const EPSILON: f32 = 1.192092896e-07;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Vec2 { x, y }
    }

    pub fn dot(self, rhs: Vec2) -> f32 {
        self.x * rhs.x + self.y * rhs.y
    }

    /// 2D cross product of two vectors yields a scalar (the z component).
    pub fn cross(self, rhs: Vec2) -> f32 {
        self.x * rhs.y - self.y * rhs.x
    }

    pub fn length(self) -> f32 {
        self.length_sq().sqrt()
    }

    pub fn length_sq(self) -> f32 {
        self.dot(self)
    }

    pub fn normalized(self) -> Vec2 {
        let len = self.length();
        if len < EPSILON {
            return Vec2::ZERO;
        }
        self / len
    }

    /// Normalizes in place and returns the original length.
    pub fn normalize(&mut self) -> f32 {
        let len = self.length();
        if len < EPSILON {
            *self = Vec2::ZERO;
            return 0.0;
        }
        *self = *self / len;
        len
    }

    pub fn perp(self) -> Vec2 {
        Vec2::new(-self.y, self.x)
    }

    pub fn skew(self) -> Vec2 {
        self.perp()
    }

    pub fn min(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x.min(rhs.x), self.y.min(rhs.y))
    }

    pub fn max(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x.max(rhs.x), self.y.max(rhs.y))
    }

    pub fn distance(self, rhs: Vec2) -> f32 {
        (self - rhs).length()
    }

    pub fn distance_sq(self, rhs: Vec2) -> f32 {
        (self - rhs).length_sq()
    }
}

/// Scalar cross product with a vector: `s × v = (-s*v.y, s*v.x)`.
pub fn cross_sv(s: f32, v: Vec2) -> Vec2 {
    Vec2::new(-s * v.y, s * v.x)
}

/// Vector cross product with a scalar: `v × s = (s*v.y, -s*v.x)`.
pub fn cross_vs(v: Vec2, s: f32) -> Vec2 {
    Vec2::new(s * v.y, -s * v.x)
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Vec2) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl Mul<f32> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl Div<f32> for Vec2 {
    type Output = Vec2;
    fn div(self, rhs: f32) -> Vec2 {
        Vec2::new(self.x / rhs, self.y / rhs)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;
    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

/// A 2D rotation stored as a (cos, sin) pair, kept in sync with an angle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rot {
    pub cos: f32,
    pub sin: f32,
}

impl Default for Rot {
    fn default() -> Self {
        Rot::identity()
    }
}

impl Rot {
    pub fn identity() -> Self {
        Rot { cos: 1.0, sin: 0.0 }
    }

    pub fn from_angle(angle: f32) -> Self {
        Rot {
            cos: angle.cos(),
            sin: angle.sin(),
        }
    }

    pub fn angle(self) -> f32 {
        self.sin.atan2(self.cos)
    }

    /// Rotates `v` by this rotation.
    pub fn mul_vec(self, v: Vec2) -> Vec2 {
        Vec2::new(
            self.cos * v.x - self.sin * v.y,
            self.sin * v.x + self.cos * v.y,
        )
    }

    /// Rotates `v` by the inverse of this rotation.
    pub fn mul_t_vec(self, v: Vec2) -> Vec2 {
        Vec2::new(
            self.cos * v.x + self.sin * v.y,
            -self.sin * v.x + self.cos * v.y,
        )
    }
}

/// A rigid transform: rotation followed by translation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform {
    pub position: Vec2,
    pub rotation: Rot,
}

impl Transform {
    pub fn new(position: Vec2, angle: f32) -> Self {
        Transform {
            position,
            rotation: Rot::from_angle(angle),
        }
    }

    pub fn identity() -> Self {
        Transform {
            position: Vec2::ZERO,
            rotation: Rot::identity(),
        }
    }

    /// Transforms a local point into world space.
    pub fn apply(self, local: Vec2) -> Vec2 {
        self.rotation.mul_vec(local) + self.position
    }

    /// Transforms a world point into this transform's local space.
    pub fn apply_inv(self, world: Vec2) -> Vec2 {
        self.rotation.mul_t_vec(world - self.position)
    }
}

/// A 2x2 matrix, row-major via two column vectors (as the solver Jacobians need).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Mat2 {
    pub col1: Vec2,
    pub col2: Vec2,
}

impl Mat2 {
    pub fn new(a11: f32, a12: f32, a21: f32, a22: f32) -> Self {
        Mat2 {
            col1: Vec2::new(a11, a21),
            col2: Vec2::new(a12, a22),
        }
    }

    pub fn mul_vec(self, v: Vec2) -> Vec2 {
        Vec2::new(
            self.col1.x * v.x + self.col2.x * v.y,
            self.col1.y * v.x + self.col2.y * v.y,
        )
    }

    pub fn determinant(self) -> f32 {
        self.col1.x * self.col2.y - self.col2.x * self.col1.y
    }

    /// Returns `None` for a near-singular matrix, signalling the caller to
    /// fall back to a per-row solve.
    pub fn inverse(self) -> Option<Mat2> {
        let det = self.determinant();
        if det.abs() < EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;
        Some(Mat2::new(
            self.col2.y * inv_det,
            -self.col2.x * inv_det,
            -self.col1.y * inv_det,
            self.col1.x * inv_det,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rotation_round_trip() {
        let r = Rot::from_angle(0.7);
        let v = Vec2::new(3.0, -2.0);
        let back = r.mul_t_vec(r.mul_vec(v));
        assert_relative_eq!(back.x, v.x, epsilon = 1e-5);
        assert_relative_eq!(back.y, v.y, epsilon = 1e-5);
    }

    #[test]
    fn transform_round_trip() {
        let t = Transform::new(Vec2::new(1.0, 2.0), 1.2);
        let p = Vec2::new(-4.0, 5.0);
        let back = t.apply_inv(t.apply(p));
        assert_relative_eq!(back.x, p.x, epsilon = 1e-5);
        assert_relative_eq!(back.y, p.y, epsilon = 1e-5);
    }

    #[test]
    fn mat2_inverse() {
        let m = Mat2::new(4.0, 0.0, 0.0, 2.0);
        let inv = m.inverse().unwrap();
        let id = Vec2::new(1.0, 1.0);
        let round = m.mul_vec(inv.mul_vec(id));
        assert_relative_eq!(round.x, id.x, epsilon = 1e-5);
        assert_relative_eq!(round.y, id.y, epsilon = 1e-5);
    }

    #[test]
    fn singular_mat2_returns_none() {
        let m = Mat2::new(1.0, 2.0, 2.0, 4.0);
        assert!(m.inverse().is_none());
    }

    #[test]
    fn cross_product_perp() {
        let v = Vec2::new(3.0, 4.0);
        assert_relative_eq!(v.dot(v.perp()), 0.0, epsilon = 1e-5);
    }
}
