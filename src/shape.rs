//! Shape variants and the per-shape operations the narrow phase needs:
//! support points, feature vertices, featured edges, and mass properties.

use crate::math::{Rot, Transform, Vec2};

/// A local-space edge used by the manifold clipper: two vertices in world
/// space plus the ids the feature clipper needs for warm-start continuity.
#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub p1: Vec2,
    pub p2: Vec2,
    pub id1: u32,
    pub id2: u32,
}

impl Edge {
    pub fn dir(self) -> Vec2 {
        (self.p2 - self.p1).normalized()
    }

    pub fn length_sq(self) -> f32 {
        (self.p2 - self.p1).length_sq()
    }
}

/// Mass, center of mass, and rotational inertia about that center, for a
/// shape of a given density.
#[derive(Debug, Clone, Copy, Default)]
pub struct MassData {
    pub mass: f32,
    pub center: Vec2,
    pub inertia: f32,
}

/// A convex shape variant. Ordinal order (`Circle < Capsule < Polygon`) is
/// load-bearing: the narrow-phase dispatch table is only populated for
/// `type_a >= type_b`, and pairs are canonicalized to that order before
/// lookup.
#[derive(Debug, Clone, PartialEq, PartialOrd, Eq, Ord, Hash, Copy)]
#[repr(u8)]
pub enum ShapeKind {
    Circle = 0,
    Capsule = 1,
    Polygon = 2,
}

#[derive(Debug, Clone)]
pub enum Shape {
    Circle {
        radius: f32,
    },
    Capsule {
        /// Local-space endpoints of the capsule's core segment.
        a: Vec2,
        b: Vec2,
        radius: f32,
    },
    Polygon {
        /// CCW, convex, in local space.
        vertices: Vec<Vec2>,
        /// Outward unit normals, one per edge (`normals[i]` is the normal of
        /// the edge from `vertices[i]` to `vertices[(i+1) % n]`).
        normals: Vec<Vec2>,
        centroid: Vec2,
        radius: f32,
    },
}

impl Shape {
    pub fn new_box(half_width: f32, half_height: f32) -> Shape {
        let vertices = vec![
            Vec2::new(half_width, -half_height),
            Vec2::new(half_width, half_height),
            Vec2::new(-half_width, half_height),
            Vec2::new(-half_width, -half_height),
        ];
        Shape::new_polygon(vertices)
    }

    /// Builds a polygon shape, computing outward CCW normals and the
    /// centroid from the supplied CCW vertex loop.
    pub fn new_polygon(vertices: Vec<Vec2>) -> Shape {
        let n = vertices.len();
        let mut normals = Vec::with_capacity(n);
        for i in 0..n {
            let edge = vertices[(i + 1) % n] - vertices[i];
            normals.push(Vec2::new(edge.y, -edge.x).normalized());
        }
        let centroid = polygon_centroid(&vertices);
        Shape::Polygon {
            vertices,
            normals,
            centroid,
            radius: 0.0,
        }
    }

    pub fn kind(&self) -> ShapeKind {
        match self {
            Shape::Circle { .. } => ShapeKind::Circle,
            Shape::Capsule { .. } => ShapeKind::Capsule,
            Shape::Polygon { .. } => ShapeKind::Polygon,
        }
    }

    pub fn radius(&self) -> f32 {
        match self {
            Shape::Circle { radius } => *radius,
            Shape::Capsule { radius, .. } => *radius,
            Shape::Polygon { radius, .. } => *radius,
        }
    }

    /// Local centroid (center of figure, not necessarily center of mass for
    /// non-uniform density, but this engine assumes uniform density).
    pub fn local_centroid(&self) -> Vec2 {
        match self {
            Shape::Circle { .. } => Vec2::ZERO,
            Shape::Capsule { a, b, .. } => (*a + *b) * 0.5,
            Shape::Polygon { centroid, .. } => *centroid,
        }
    }

    /// Support point in local space along `dir` (not normalized by the
    /// caller). Returns the vertex id too, for feature tracking.
    pub fn support(&self, dir: Vec2) -> (Vec2, u32) {
        match self {
            Shape::Circle { .. } => (Vec2::ZERO, 0),
            Shape::Capsule { a, b, .. } => {
                if a.dot(dir) > b.dot(dir) {
                    (*a, 0)
                } else {
                    (*b, 1)
                }
            }
            Shape::Polygon { vertices, .. } => {
                let mut best_i = 0;
                let mut best_dot = vertices[0].dot(dir);
                for (i, v) in vertices.iter().enumerate().skip(1) {
                    let d = v.dot(dir);
                    if d > best_dot {
                        best_dot = d;
                        best_i = i;
                    }
                }
                (vertices[best_i], best_i as u32)
            }
        }
    }

    pub fn vertex(&self, id: u32) -> Vec2 {
        match self {
            Shape::Circle { .. } => Vec2::ZERO,
            Shape::Capsule { a, b, .. } => {
                if id == 0 {
                    *a
                } else {
                    *b
                }
            }
            Shape::Polygon { vertices, .. } => vertices[id as usize % vertices.len()],
        }
    }

    /// Edge most perpendicular to world-space direction `dir` (the outward
    /// collision normal), translated outward in world space by this shape's
    /// radius. Used by the manifold clipper to select reference/incident
    /// edges.
    pub fn featured_edge(&self, tf: Transform, dir: Vec2) -> Edge {
        let local_dir = tf.rotation.mul_t_vec(dir);
        match self {
            Shape::Circle { .. } => {
                let p = tf.position;
                Edge {
                    p1: p,
                    p2: p,
                    id1: 0,
                    id2: 0,
                }
            }
            Shape::Capsule { a, b, radius } => {
                let ((p1, id1), (p2, id2)) = if a.dot(local_dir) > b.dot(local_dir) {
                    ((*a, 0u32), (*b, 1u32))
                } else {
                    ((*b, 1u32), (*a, 0u32))
                };
                let wp1 = tf.apply(p1) + dir * *radius;
                let wp2 = tf.apply(p2) + dir * *radius;
                Edge {
                    p1: wp1,
                    p2: wp2,
                    id1,
                    id2,
                }
            }
            Shape::Polygon {
                vertices,
                normals,
                radius,
                ..
            } => {
                let n = vertices.len();
                let mut best_i = 0;
                let mut best_dot = normals[0].dot(local_dir);
                for (i, nrm) in normals.iter().enumerate().skip(1) {
                    let d = nrm.dot(local_dir);
                    if d > best_dot {
                        best_dot = d;
                        best_i = i;
                    }
                }
                let i1 = best_i;
                let i2 = (best_i + 1) % n;
                let wp1 = tf.apply(vertices[i1]) + dir * *radius;
                let wp2 = tf.apply(vertices[i2]) + dir * *radius;
                Edge {
                    p1: wp1,
                    p2: wp2,
                    id1: i1 as u32,
                    id2: i2 as u32,
                }
            }
        }
    }

    /// Mass, centroid and inertia about the centroid for density `density`.
    /// Static/kinematic bodies never call this (their inverse mass/inertia
    /// are fixed at zero independent of shape).
    pub fn compute_mass(&self, density: f32) -> MassData {
        match self {
            Shape::Circle { radius } => {
                let mass = std::f32::consts::PI * radius * radius * density;
                let inertia = mass * radius * radius * 0.5;
                MassData {
                    mass,
                    center: Vec2::ZERO,
                    inertia,
                }
            }
            Shape::Capsule { a, b, radius } => {
                // Treat as a rectangle (the core segment's bounding rect)
                // plus two half-circle caps, matching common 2D capsule mass
                // approximations.
                let len = (*b - *a).length();
                let rect_mass = len * (2.0 * radius) * density;
                let circle_mass = std::f32::consts::PI * radius * radius * density;
                let mass = rect_mass + circle_mass;
                let center = (*a + *b) * 0.5;

                let rect_inertia = rect_mass * (len * len + (2.0 * radius) * (2.0 * radius)) / 12.0;
                let half_len = len * 0.5;
                let circle_inertia = circle_mass * radius * radius * 0.5
                    + circle_mass * (half_len + radius * 4.0 / (3.0 * std::f32::consts::PI)).powi(2);
                MassData {
                    mass,
                    center,
                    inertia: rect_inertia + circle_inertia,
                }
            }
            Shape::Polygon {
                vertices, centroid, ..
            } => {
                let (area, inertia_about_origin) = polygon_area_and_inertia(vertices);
                let mass = area * density;
                // Parallel axis theorem: shift inertia from the coordinate
                // origin to the centroid.
                let inertia = inertia_about_origin * density - mass * centroid.length_sq();
                MassData {
                    mass,
                    center: *centroid,
                    inertia,
                }
            }
        }
    }
}

fn polygon_centroid(vertices: &[Vec2]) -> Vec2 {
    let n = vertices.len();
    let mut area = 0.0;
    let mut centroid = Vec2::ZERO;
    for i in 0..n {
        let p1 = vertices[i];
        let p2 = vertices[(i + 1) % n];
        let cross = p1.cross(p2);
        area += cross;
        centroid += (p1 + p2) * cross;
    }
    area *= 0.5;
    if area.abs() < crate::math::EPSILON {
        return Vec2::ZERO;
    }
    centroid / (6.0 * area)
}

/// Returns `(area, second_moment_of_area_about_origin)` via the standard
/// shoelace-based polygon moment formula.
fn polygon_area_and_inertia(vertices: &[Vec2]) -> (f32, f32) {
    let n = vertices.len();
    let mut area = 0.0;
    let mut inertia = 0.0;
    for i in 0..n {
        let p1 = vertices[i];
        let p2 = vertices[(i + 1) % n];
        let cross = p1.cross(p2);
        area += cross;
        let intx2 = p1.x * p1.x + p1.x * p2.x + p2.x * p2.x;
        let inty2 = p1.y * p1.y + p1.y * p2.y + p2.y * p2.y;
        inertia += cross * (intx2 + inty2);
    }
    (area * 0.5, inertia / 12.0)
}

/// Local-space AABB of the shape at identity transform; combined with a
/// body transform by the caller to get the world AABB.
pub fn local_aabb(shape: &Shape) -> (Vec2, Vec2) {
    match shape {
        Shape::Circle { radius } => (Vec2::new(-radius, -radius), Vec2::new(*radius, *radius)),
        Shape::Capsule { a, b, radius } => {
            let min = a.min(*b) - Vec2::new(*radius, *radius);
            let max = a.max(*b) + Vec2::new(*radius, *radius);
            (min, max)
        }
        Shape::Polygon {
            vertices, radius, ..
        } => {
            let mut min = vertices[0];
            let mut max = vertices[0];
            for v in &vertices[1..] {
                min = min.min(*v);
                max = max.max(*v);
            }
            (
                min - Vec2::new(*radius, *radius),
                max + Vec2::new(*radius, *radius),
            )
        }
    }
}

/// World-space AABB of a shape under a transform, computed by transforming
/// the shape's local extent corners (conservative but exact for circles and
/// tight enough for polygons/capsules under rotation).
pub fn world_aabb(shape: &Shape, tf: Transform) -> (Vec2, Vec2) {
    match shape {
        Shape::Circle { radius } => {
            let p = tf.position;
            (p - Vec2::new(*radius, *radius), p + Vec2::new(*radius, *radius))
        }
        Shape::Capsule { a, b, radius } => {
            let wa = tf.apply(*a);
            let wb = tf.apply(*b);
            (
                wa.min(wb) - Vec2::new(*radius, *radius),
                wa.max(wb) + Vec2::new(*radius, *radius),
            )
        }
        Shape::Polygon {
            vertices, radius, ..
        } => {
            let mut min = tf.apply(vertices[0]);
            let mut max = min;
            for v in &vertices[1..] {
                let wv = tf.apply(*v);
                min = min.min(wv);
                max = max.max(wv);
            }
            (
                min - Vec2::new(*radius, *radius),
                max + Vec2::new(*radius, *radius),
            )
        }
    }
}

pub fn rotate_edge_normal(normal: Vec2, rot: Rot) -> Vec2 {
    rot.mul_vec(normal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn circle_mass_matches_formula() {
        let s = Shape::Circle { radius: 2.0 };
        let md = s.compute_mass(1.0);
        assert_relative_eq!(md.mass, std::f32::consts::PI * 4.0, epsilon = 1e-4);
        assert_relative_eq!(md.inertia, md.mass * 4.0 * 0.5, epsilon = 1e-4);
    }

    #[test]
    fn box_inertia_positive() {
        let s = Shape::new_box(1.0, 0.5);
        let md = s.compute_mass(1.0);
        assert!(md.mass > 0.0);
        assert!(md.inertia > 0.0);
        assert_relative_eq!(md.mass, 2.0, epsilon = 1e-4);
    }

    #[test]
    fn polygon_kind_ordinal_order() {
        assert!(ShapeKind::Circle < ShapeKind::Capsule);
        assert!(ShapeKind::Capsule < ShapeKind::Polygon);
    }

    #[test]
    fn box_support_picks_correct_vertex() {
        let s = Shape::new_box(1.0, 1.0);
        let (v, _) = s.support(Vec2::new(1.0, 1.0));
        assert_relative_eq!(v.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(v.y, 1.0, epsilon = 1e-5);
    }
}
