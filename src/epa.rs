//! EPA: expands a confirmed-overlap GJK triangle into a CCW polytope on the
//! boundary of the Minkowski difference, converging on the edge closest to
//! the origin to extract penetration depth and contact normal.

use crate::gjk::{cso_support, Simplex, SupportPoint};
use crate::math::{Transform, Vec2};
use crate::shape::Shape;

struct PolytopeEdge {
    index: usize,
    normal: Vec2,
    distance: f32,
}

pub struct EpaResult {
    pub contact_normal: Vec2,
    pub penetration_depth: f32,
    /// The two polytope vertices bracketing the closest edge, for downstream
    /// witness-point use if needed.
    pub witness_a: Vec2,
    pub witness_b: Vec2,
}

/// Finds the polytope edge with the smallest outward distance from the
/// origin (CCW winding gives every edge an outward normal by construction).
fn closest_edge(vertices: &[SupportPoint]) -> PolytopeEdge {
    let n = vertices.len();
    let mut best = PolytopeEdge {
        index: 0,
        normal: Vec2::ZERO,
        distance: f32::MAX,
    };
    for i in 0..n {
        let j = (i + 1) % n;
        let a = vertices[i].point;
        let b = vertices[j].point;
        let edge = b - a;
        let mut normal = Vec2::new(edge.y, -edge.x).normalized();
        let mut distance = normal.dot(a);
        if distance < 0.0 {
            normal = -normal;
            distance = -distance;
        }
        if distance < best.distance {
            best = PolytopeEdge {
                index: i,
                normal,
                distance,
            };
        }
    }
    best
}

/// Expands `simplex` (already containing the origin) into a full triangle if
/// it has fewer than 3 vertices, then runs EPA to extract penetration depth
/// and normal. Bounded by `max_iterations`; terminates early once the new
/// support's projected distance matches the current closest edge within
/// `tolerance`.
pub fn epa(
    a: &Shape,
    tf_a: Transform,
    b: &Shape,
    tf_b: Transform,
    simplex: &Simplex,
    max_iterations: u32,
    tolerance: f32,
) -> EpaResult {
    let mut vertices = simplex.vertices.clone();
    expand_to_triangle(a, tf_a, b, tf_b, &mut vertices);
    ensure_ccw(&mut vertices);

    for _ in 0..max_iterations {
        let edge = closest_edge(&vertices);
        let support = cso_support(a, tf_a, b, tf_b, edge.normal);
        let new_distance = edge.normal.dot(support.point);

        if (new_distance - edge.distance).abs() <= tolerance {
            return EpaResult {
                contact_normal: edge.normal,
                penetration_depth: edge.distance,
                witness_a: vertices[edge.index].point_a,
                witness_b: vertices[edge.index].point_b,
            };
        }

        vertices.insert(edge.index + 1, support);
    }

    log::warn!("epa: hit iteration cap ({max_iterations}) without converging to within {tolerance}");
    let edge = closest_edge(&vertices);
    EpaResult {
        contact_normal: edge.normal,
        penetration_depth: edge.distance,
        witness_a: vertices[edge.index].point_a,
        witness_b: vertices[edge.index].point_b,
    }
}

fn expand_to_triangle(a: &Shape, tf_a: Transform, b: &Shape, tf_b: Transform, vertices: &mut Vec<SupportPoint>) {
    while vertices.len() < 3 {
        let dir = if vertices.len() == 1 {
            Vec2::new(1.0, 0.0)
        } else {
            let edge = vertices[1].point - vertices[0].point;
            let perp = Vec2::new(edge.y, -edge.x).normalized();
            if perp.length_sq() < 1e-9 {
                Vec2::new(0.0, 1.0)
            } else {
                perp
            }
        };
        let support = cso_support(a, tf_a, b, tf_b, dir);
        if vertices.iter().any(|v| (v.point - support.point).length_sq() < 1e-10) {
            let alt = cso_support(a, tf_a, b, tf_b, -dir);
            vertices.push(alt);
        } else {
            vertices.push(support);
        }
    }
}

fn ensure_ccw(vertices: &mut [SupportPoint]) {
    if vertices.len() < 3 {
        return;
    }
    let area = (vertices[1].point - vertices[0].point).cross(vertices[2].point - vertices[0].point);
    if area < 0.0 {
        vertices.swap(1, 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gjk::gjk;
    use approx::assert_relative_eq;

    #[test]
    fn overlapping_boxes_yield_positive_penetration() {
        let a = Shape::new_box(1.0, 1.0);
        let b = Shape::new_box(1.0, 1.0);
        let tf_a = Transform::identity();
        let tf_b = Transform::new(Vec2::new(1.0, 0.0), 0.0);
        let gjk_result = gjk(&a, tf_a, &b, tf_b, 20);
        assert_eq!(gjk_result.simplex.count(), 3);
        let epa_result = epa(&a, tf_a, &b, tf_b, &gjk_result.simplex, 20, 1e-4);
        assert!(epa_result.penetration_depth > 0.0);
        assert_relative_eq!(epa_result.penetration_depth, 1.0, epsilon = 0.05);
        // Normal should point roughly from A to B (+x).
        assert!(epa_result.contact_normal.x > 0.9);
    }

    #[test]
    fn deeply_overlapping_circles_via_polygon_proxy() {
        let a = Shape::new_box(2.0, 2.0);
        let b = Shape::new_box(2.0, 2.0);
        let tf_a = Transform::identity();
        let tf_b = Transform::new(Vec2::new(0.5, 0.0), 0.0);
        let gjk_result = gjk(&a, tf_a, &b, tf_b, 20);
        let epa_result = epa(&a, tf_a, &b, tf_b, &gjk_result.simplex, 20, 1e-4);
        assert!(epa_result.penetration_depth > 3.0);
    }
}
