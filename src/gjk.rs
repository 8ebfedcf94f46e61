//! GJK: iterative closest-point-on-the-Minkowski-difference algorithm.
//! Either confirms overlap (simplex grows to a full triangle containing the
//! origin) or converges on the closest points between the two shapes.

use crate::math::{Transform, Vec2};
use crate::shape::Shape;

/// A CSO (Minkowski-difference) vertex: the difference point plus the two
/// source points and vertex ids it came from, needed later for witness-point
/// reconstruction and feature tracking.
#[derive(Debug, Clone, Copy)]
pub struct SupportPoint {
    pub point: Vec2,
    pub point_a: Vec2,
    pub point_b: Vec2,
    pub id_a: u32,
    pub id_b: u32,
}

#[derive(Debug, Clone)]
pub struct Simplex {
    pub vertices: Vec<SupportPoint>,
}

impl Simplex {
    pub fn count(&self) -> usize {
        self.vertices.len()
    }

    /// Closest point on the simplex to the origin, in CSO space.
    pub fn closest_point(&self) -> Vec2 {
        match self.vertices.len() {
            1 => self.vertices[0].point,
            2 => closest_on_segment(self.vertices[0].point, self.vertices[1].point, Vec2::ZERO),
            3 => Vec2::ZERO,
            _ => Vec2::ZERO,
        }
    }

    /// Witness points on the *original* shapes (A and B respectively)
    /// corresponding to the simplex's current closest point, via barycentric
    /// weights on whichever sub-simplex is closest.
    pub fn witness_points(&self) -> (Vec2, Vec2) {
        match self.vertices.len() {
            1 => (self.vertices[0].point_a, self.vertices[0].point_b),
            2 => {
                let a = self.vertices[0];
                let b = self.vertices[1];
                let t = segment_param(a.point, b.point, Vec2::ZERO);
                (
                    a.point_a + (b.point_a - a.point_a) * t,
                    a.point_b + (b.point_b - a.point_b) * t,
                )
            }
            _ => (self.vertices[0].point_a, self.vertices[0].point_b),
        }
    }

    /// Reduces the simplex to the smallest sub-simplex still closest to the
    /// origin (point/segment/triangle-contains-origin reduction), discarding
    /// vertices that don't contribute.
    fn advance(&mut self, origin: Vec2) {
        match self.vertices.len() {
            1 => {}
            2 => {
                let a = self.vertices[0].point;
                let b = self.vertices[1].point;
                let t = segment_param(a, b, origin);
                if t <= 0.0 {
                    self.vertices.truncate(1);
                } else if t >= 1.0 {
                    self.vertices = vec![self.vertices[1]];
                }
            }
            3 => {
                // Check whether the origin lies inside the triangle's
                // Voronoi region (keep all three) or reduce to whichever
                // edge/vertex is actually closest.
                let a = self.vertices[0].point;
                let b = self.vertices[1].point;
                let c = self.vertices[2].point;

                let ab = b - a;
                let ac = c - a;
                let ap = origin - a;
                let d1 = ab.dot(ap);
                let d2 = ac.dot(ap);
                if d1 <= 0.0 && d2 <= 0.0 {
                    self.vertices = vec![self.vertices[0]];
                    return;
                }

                let bp = origin - b;
                let d3 = ab.dot(bp);
                let d4 = ac.dot(bp);
                if d3 >= 0.0 && d4 <= d3 {
                    self.vertices = vec![self.vertices[1]];
                    return;
                }

                let cp = origin - c;
                let d5 = ab.dot(cp);
                let d6 = ac.dot(cp);
                if d6 >= 0.0 && d5 <= d6 {
                    self.vertices = vec![self.vertices[2]];
                    return;
                }

                let vc = d1 * d4 - d3 * d2;
                if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
                    self.vertices = vec![self.vertices[0], self.vertices[1]];
                    return;
                }

                let vb = d5 * d2 - d1 * d6;
                if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
                    self.vertices = vec![self.vertices[0], self.vertices[2]];
                    return;
                }

                let va = d3 * d6 - d5 * d4;
                if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
                    self.vertices = vec![self.vertices[1], self.vertices[2]];
                }
                // else: origin is inside the triangle, keep all three.
            }
            _ => {}
        }
    }

    /// Next search direction: perpendicular to the closest edge (pointing
    /// away from the origin) for a 2-simplex, or origin-to-point for a
    /// 1-simplex.
    fn search_direction(&self) -> Vec2 {
        match self.vertices.len() {
            1 => -self.vertices[0].point,
            2 => {
                let a = self.vertices[0].point;
                let b = self.vertices[1].point;
                let ab = b - a;
                let ao = -a;
                let perp = Vec2::new(-ab.y, ab.x);
                if perp.dot(ao) >= 0.0 {
                    perp
                } else {
                    -perp
                }
            }
            _ => Vec2::ZERO,
        }
    }

    fn contains_point(&self, p: Vec2) -> bool {
        self.vertices.iter().any(|v| (v.point - p).length_sq() < 1e-10)
    }
}

fn segment_param(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    let ab = b - a;
    let len2 = ab.length_sq();
    if len2 < 1e-12 {
        return 0.0;
    }
    ((p - a).dot(ab) / len2).clamp(0.0, 1.0)
}

fn closest_on_segment(a: Vec2, b: Vec2, p: Vec2) -> Vec2 {
    let t = segment_param(a, b, p);
    a + (b - a) * t
}

pub struct GjkResult {
    pub simplex: Simplex,
    pub direction: Vec2,
    pub distance: f32,
}

/// Support point of the Minkowski difference `A - B` along world-space
/// direction `dir`, evaluated by transforming `dir` into each body's local
/// frame (`MulT(rotation, dir)`).
pub fn cso_support(
    a: &Shape,
    tf_a: Transform,
    b: &Shape,
    tf_b: Transform,
    dir: Vec2,
) -> SupportPoint {
    let (local_a, id_a) = a.support(tf_a.rotation.mul_t_vec(dir));
    let (local_b, id_b) = b.support(tf_b.rotation.mul_t_vec(-dir));
    let point_a = tf_a.apply(local_a);
    let point_b = tf_b.apply(local_b);
    SupportPoint {
        point: point_a - point_b,
        point_a,
        point_b,
        id_a,
        id_b,
    }
}

/// Runs GJK to either find the closest points between `a` and `b` or confirm
/// overlap (simplex grows to 3 vertices containing the origin). Bounded by
/// `max_iterations`; `tolerance` gates the overlap/distance judgment the
/// caller makes from the returned distance.
pub fn gjk(
    a: &Shape,
    tf_a: Transform,
    b: &Shape,
    tf_b: Transform,
    max_iterations: u32,
) -> GjkResult {
    let mut direction = tf_b.position - tf_a.position;
    if direction.length_sq() < 1e-12 {
        direction = Vec2::new(1.0, 0.0);
    }

    let first = cso_support(a, tf_a, b, tf_b, direction);
    let mut simplex = Simplex {
        vertices: vec![first],
    };

    let mut exhausted = true;
    for _ in 0..max_iterations {
        simplex.advance(Vec2::ZERO);

        if simplex.count() == 3 {
            exhausted = false;
            break;
        }

        let new_direction = simplex.search_direction();
        if new_direction.length_sq() < 1e-12 {
            exhausted = false;
            break;
        }

        let support = cso_support(a, tf_a, b, tf_b, new_direction);
        if simplex.contains_point(support.point) {
            direction = new_direction;
            exhausted = false;
            break;
        }
        direction = new_direction;
        simplex.vertices.push(support);
    }
    if exhausted {
        log::warn!("gjk: hit iteration cap ({max_iterations}) without converging");
    }

    let closest = simplex.closest_point();
    let distance = closest.length();
    let unit_direction = if distance > 1e-9 {
        closest.normalized()
    } else {
        direction.normalized()
    };

    GjkResult {
        simplex,
        direction: unit_direction,
        distance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn separated_circles_distance_matches_gap() {
        let a = Shape::Circle { radius: 1.0 };
        let b = Shape::Circle { radius: 1.0 };
        let tf_a = Transform::new(Vec2::new(0.0, 0.0), 0.0);
        let tf_b = Transform::new(Vec2::new(5.0, 0.0), 0.0);
        let result = gjk(&a, tf_a, &b, tf_b, 20);
        // GJK operates on the core shapes (no radius inflation); distance is
        // between the zero-radius point supports here since Circle::support
        // always returns the origin (radius applied separately downstream).
        assert_relative_eq!(result.distance, 5.0, epsilon = 1e-3);
    }

    #[test]
    fn overlapping_polygons_yield_triangle_simplex() {
        let a = Shape::new_box(1.0, 1.0);
        let b = Shape::new_box(1.0, 1.0);
        let tf_a = Transform::new(Vec2::new(0.0, 0.0), 0.0);
        let tf_b = Transform::new(Vec2::new(0.5, 0.0), 0.0);
        let result = gjk(&a, tf_a, &b, tf_b, 20);
        assert_eq!(result.simplex.count(), 3);
        assert_relative_eq!(result.distance, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn distance_nonnegative() {
        let a = Shape::new_box(1.0, 1.0);
        let b = Shape::Circle { radius: 0.5 };
        for dx in [0.0, 1.0, 2.0, 10.0] {
            let tf_a = Transform::identity();
            let tf_b = Transform::new(Vec2::new(dx, 0.0), 0.0);
            let result = gjk(&a, tf_a, &b, tf_b, 20);
            assert!(result.distance >= 0.0);
        }
    }
}
