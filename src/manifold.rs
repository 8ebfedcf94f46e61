//! Contact manifold construction: given a confirmed collision normal,
//! produces 1-2 clipped contact points via reference/incident feature-edge
//! clipping, plus the shape-specific fast paths that skip GJK/EPA entirely
//! for circle pairs.

use crate::epa::epa;
use crate::gjk::gjk;
use crate::math::{Transform, Vec2};
use crate::shape::{Edge, Shape, ShapeKind};

#[derive(Debug, Clone, Copy)]
pub struct ManifoldPoint {
    pub point: Vec2,
    pub id: u32,
}

#[derive(Debug, Clone)]
pub struct Manifold {
    pub points: Vec<ManifoldPoint>,
    /// Unit normal from A to B.
    pub normal: Vec2,
    pub tangent: Vec2,
    pub penetration: f32,
    pub reference_point: Vec2,
    pub feature_flipped: bool,
}

impl Manifold {
    fn empty() -> Manifold {
        Manifold {
            points: Vec::new(),
            normal: Vec2::ZERO,
            tangent: Vec2::ZERO,
            penetration: 0.0,
            reference_point: Vec2::ZERO,
            feature_flipped: false,
        }
    }
}

/// Clips an edge's endpoints against the half-plane `dot(p - plane_point,
/// plane_dir) >= 0`. When `remove_clipped_point` is set (the final
/// reference-face "inside" clip), an endpoint on the wrong side collapses
/// onto the other endpoint instead of being projected onto the plane.
fn clip_edge(edge: Edge, plane_point: Vec2, plane_dir: Vec2, remove_clipped_point: bool) -> Edge {
    let d1 = (edge.p1 - plane_point).dot(plane_dir);
    let d2 = (edge.p2 - plane_point).dot(plane_dir);

    if d1 >= 0.0 && d2 >= 0.0 {
        return edge;
    }

    let mut out = edge;
    if d1 < 0.0 && d2 < 0.0 {
        // Fully clipped; degenerate, caller will see near-zero length.
        return out;
    }

    if remove_clipped_point {
        if d1 < 0.0 {
            out.p1 = edge.p2;
            out.id1 = edge.id2;
        } else {
            out.p2 = edge.p1;
            out.id2 = edge.id1;
        }
    } else {
        let t = d1 / (d1 - d2);
        let clipped = edge.p1 + (edge.p2 - edge.p1) * t;
        if d1 < 0.0 {
            out.p1 = clipped;
        } else {
            out.p2 = clipped;
        }
    }
    out
}

/// Builds the 1-2 point clipped manifold given a confirmed world-space
/// contact normal (A to B). Picks whichever shape's featured edge is more
/// perpendicular to `normal` as the reference, clips the other (incident)
/// edge against the reference's two side planes and then its face plane.
fn find_contact_points(
    normal: Vec2,
    penetration: f32,
    a: &Shape,
    tf_a: Transform,
    b: &Shape,
    tf_b: Transform,
    merge_threshold: f32,
) -> Manifold {
    let edge_a = a.featured_edge(tf_a, normal);
    let edge_b = b.featured_edge(tf_b, -normal);

    let dir_a = edge_a.dir();
    let dir_b = edge_b.dir();

    let (reference, incident, contact_normal, feature_flipped) =
        if dir_a.dot(normal).abs() <= dir_b.dot(normal).abs() {
            (edge_a, edge_b, normal, false)
        } else {
            (edge_b, edge_a, -normal, true)
        };

    let ref_dir = reference.dir();
    let mut incident = clip_edge(incident, reference.p1, ref_dir, false);
    incident = clip_edge(incident, reference.p2, -ref_dir, false);
    incident = clip_edge(incident, reference.p1, -contact_normal, true);

    let mut manifold = Manifold::empty();
    manifold.normal = normal;
    manifold.tangent = normal.perp();
    manifold.penetration = penetration;
    manifold.reference_point = reference.p1;
    manifold.feature_flipped = feature_flipped;

    // Contact ids always keyed from A's featured-edge vertex ids so warm
    // starting is stable regardless of which side supplied the reference.
    let (id1, id2) = (edge_a.id1, edge_a.id2);

    if incident.length_sq() <= merge_threshold {
        manifold.points.push(ManifoldPoint {
            point: incident.p1,
            id: id1,
        });
    } else {
        manifold.points.push(ManifoldPoint {
            point: incident.p1,
            id: id1,
        });
        manifold.points.push(ManifoldPoint {
            point: incident.p2,
            id: id2,
        });
    }
    manifold
}

fn circle_vs_circle(a: &Shape, tf_a: Transform, b: &Shape, tf_b: Transform) -> Option<Manifold> {
    let (ra, rb) = (a.radius(), b.radius());
    let pa = tf_a.position;
    let pb = tf_b.position;
    let d = pb - pa;
    let dist = d.length();
    if dist > ra + rb {
        return None;
    }
    let normal = if dist > 1e-6 { d / dist } else { Vec2::new(1.0, 0.0) };
    let point = pa + normal * ra;
    Some(Manifold {
        points: vec![ManifoldPoint { point, id: 0 }],
        normal,
        tangent: normal.perp(),
        penetration: ra + rb - dist,
        reference_point: point,
        feature_flipped: false,
    })
}

/// Voronoi-region test of a circle center against a capsule's core segment:
/// either endpoint cap or the segment interior, whichever region the
/// projection falls into.
fn capsule_vs_circle(capsule: &Shape, tf_cap: Transform, circle: &Shape, tf_circle: Transform) -> Option<Manifold> {
    let (seg_a, seg_b, cap_r) = match capsule {
        Shape::Capsule { a, b, radius } => (*a, *b, *radius),
        _ => unreachable!(),
    };
    let local_center = tf_cap.apply_inv(tf_circle.position);
    let seg = seg_b - seg_a;
    let t = ((local_center - seg_a).dot(seg) / seg.length_sq().max(1e-12)).clamp(0.0, 1.0);
    let closest_local = seg_a + seg * t;
    let closest_world = tf_cap.apply(closest_local);

    let circle_r = circle.radius();
    let d = tf_circle.position - closest_world;
    let dist = d.length();
    if dist > cap_r + circle_r {
        return None;
    }
    let normal = if dist > 1e-6 { d / dist } else { Vec2::new(1.0, 0.0) };
    let point = closest_world + normal * cap_r;
    Some(Manifold {
        points: vec![ManifoldPoint { point, id: 0 }],
        normal,
        tangent: normal.perp(),
        penetration: cap_r + circle_r - dist,
        reference_point: point,
        feature_flipped: false,
    })
}

/// Voronoi-region test of a circle center against a polygon: the supporting
/// face's normal if the center projects onto the face interior (or is
/// already inside the polygon), else the nearest vertex.
fn polygon_vs_circle(poly: &Shape, tf_poly: Transform, circle: &Shape, tf_circle: Transform) -> Option<Manifold> {
    let (vertices, normals, poly_r) = match poly {
        Shape::Polygon {
            vertices,
            normals,
            radius,
            ..
        } => (vertices, normals, *radius),
        _ => unreachable!(),
    };
    let circle_r = circle.radius();
    let local_center = tf_poly.apply_inv(tf_circle.position);

    let n = vertices.len();
    let mut best_face = 0;
    let mut best_separation = f32::MIN;
    for i in 0..n {
        let sep = normals[i].dot(local_center - vertices[i]);
        if sep > circle_r + poly_r {
            return None;
        }
        if sep > best_separation {
            best_separation = sep;
            best_face = i;
        }
    }

    let v1 = vertices[best_face];
    let v2 = vertices[(best_face + 1) % n];

    let (local_normal, local_point) = if best_separation < 0.0 {
        (normals[best_face], None)
    } else {
        let u1 = (local_center - v1).dot(v2 - v1);
        let u2 = (local_center - v2).dot(v1 - v2);
        if u1 <= 0.0 {
            let n = (local_center - v1).normalized();
            (n, Some(v1))
        } else if u2 <= 0.0 {
            let n = (local_center - v2).normalized();
            (n, Some(v2))
        } else {
            (normals[best_face], None)
        }
    };

    let normal = tf_poly.rotation.mul_vec(local_normal);
    let closest_world = match local_point {
        Some(p) => tf_poly.apply(p),
        None => {
            let proj = v1 + (v2 - v1) * (((local_center - v1).dot(v2 - v1)) / (v2 - v1).length_sq().max(1e-12)).clamp(0.0, 1.0);
            tf_poly.apply(proj)
        }
    };
    let dist = (tf_circle.position - closest_world).dot(normal);
    if dist > circle_r + poly_r {
        return None;
    }
    let point = closest_world + normal * poly_r;
    Some(Manifold {
        points: vec![ManifoldPoint { point, id: 0 }],
        normal,
        tangent: normal.perp(),
        penetration: circle_r + poly_r - dist,
        reference_point: point,
        feature_flipped: false,
    })
}

/// General convex-vs-convex path: GJK first, then either a shallow-contact
/// direct construction (GJK reports separation but within the combined
/// radius) or EPA (confirmed overlap), always finishing with
/// `find_contact_points` so every pair produces a clipped 1-2 point
/// manifold.
fn convex_vs_convex(
    a: &Shape,
    tf_a: Transform,
    b: &Shape,
    tf_b: Transform,
    gjk_max_iter: u32,
    epa_max_iter: u32,
    epa_tolerance: f32,
    merge_threshold: f32,
) -> Option<Manifold> {
    let radius_sum = a.radius() + b.radius();
    let gjk_result = gjk(a, tf_a, b, tf_b, gjk_max_iter);

    let (normal, penetration) = if gjk_result.simplex.count() < 3 {
        if gjk_result.distance >= radius_sum {
            return None;
        }
        (gjk_result.direction, radius_sum - gjk_result.distance)
    } else {
        let epa_result = epa(a, tf_a, b, tf_b, &gjk_result.simplex, epa_max_iter, epa_tolerance);
        (epa_result.contact_normal, epa_result.penetration_depth + radius_sum)
    };

    Some(find_contact_points(normal, penetration, a, tf_a, b, tf_b, merge_threshold))
}

pub struct NarrowPhaseSettings {
    pub gjk_max_iterations: u32,
    pub epa_max_iterations: u32,
    pub epa_tolerance: f32,
    pub contact_merge_threshold: f32,
}

/// Canonical dispatch: collide two shapes given an ordered pair
/// (`kind(a) >= kind(b)` is NOT required of the caller — this function
/// handles the flip itself, composing the dispatch-order flip with
/// `find_contact_points`'s own reference-edge-selection flip).
pub fn detect_collision(
    a: &Shape,
    tf_a: Transform,
    b: &Shape,
    tf_b: Transform,
    settings: &NarrowPhaseSettings,
) -> Option<Manifold> {
    if b.kind() > a.kind() {
        return detect_collision(b, tf_b, a, tf_a, settings).map(|mut m| {
            m.normal = -m.normal;
            m.tangent = m.normal.perp();
            m.feature_flipped = !m.feature_flipped;
            m
        });
    }

    match (a.kind(), b.kind()) {
        (ShapeKind::Circle, ShapeKind::Circle) => circle_vs_circle(a, tf_a, b, tf_b),
        (ShapeKind::Capsule, ShapeKind::Circle) => capsule_vs_circle(a, tf_a, b, tf_b),
        (ShapeKind::Polygon, ShapeKind::Circle) => polygon_vs_circle(a, tf_a, b, tf_b),
        (ShapeKind::Capsule, ShapeKind::Capsule)
        | (ShapeKind::Polygon, ShapeKind::Capsule)
        | (ShapeKind::Polygon, ShapeKind::Polygon) => convex_vs_convex(
            a,
            tf_a,
            b,
            tf_b,
            settings.gjk_max_iterations,
            settings.epa_max_iterations,
            settings.epa_tolerance,
            settings.contact_merge_threshold,
        ),
        _ => unreachable!("kind(a) >= kind(b) is enforced by the flip above"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn settings() -> NarrowPhaseSettings {
        NarrowPhaseSettings {
            gjk_max_iterations: 20,
            epa_max_iterations: 20,
            epa_tolerance: 1e-4,
            contact_merge_threshold: 1e-4,
        }
    }

    #[test]
    fn circles_overlap_detected() {
        let a = Shape::Circle { radius: 1.0 };
        let b = Shape::Circle { radius: 1.0 };
        let tf_a = Transform::identity();
        let tf_b = Transform::new(Vec2::new(1.5, 0.0), 0.0);
        let m = detect_collision(&a, tf_a, &b, tf_b, &settings()).unwrap();
        assert_relative_eq!(m.penetration, 0.5, epsilon = 1e-4);
        assert_relative_eq!(m.normal.x, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn circles_separated_no_collision() {
        let a = Shape::Circle { radius: 1.0 };
        let b = Shape::Circle { radius: 1.0 };
        let tf_a = Transform::identity();
        let tf_b = Transform::new(Vec2::new(5.0, 0.0), 0.0);
        assert!(detect_collision(&a, tf_a, &b, tf_b, &settings()).is_none());
    }

    #[test]
    fn narrow_phase_symmetry() {
        let a = Shape::new_box(1.0, 1.0);
        let b = Shape::Circle { radius: 0.6 };
        let tf_a = Transform::new(Vec2::new(0.0, 0.0), 0.3);
        let tf_b = Transform::new(Vec2::new(1.2, 0.2), 0.0);
        let m_ab = detect_collision(&a, tf_a, &b, tf_b, &settings());
        let m_ba = detect_collision(&b, tf_b, &a, tf_a, &settings());
        match (m_ab, m_ba) {
            (Some(ab), Some(ba)) => {
                assert_relative_eq!(ab.normal.x, -ba.normal.x, epsilon = 1e-3);
                assert_relative_eq!(ab.normal.y, -ba.normal.y, epsilon = 1e-3);
            }
            (None, None) => {}
            _ => panic!("asymmetric collision result"),
        }
    }

    #[test]
    fn overlapping_boxes_two_point_manifold() {
        let a = Shape::new_box(1.0, 1.0);
        let b = Shape::new_box(1.0, 1.0);
        let tf_a = Transform::identity();
        let tf_b = Transform::new(Vec2::new(1.5, 0.0), 0.0);
        let m = detect_collision(&a, tf_a, &b, tf_b, &settings()).unwrap();
        assert_eq!(m.points.len(), 2);
        assert_relative_eq!(m.penetration, 0.5, epsilon = 1e-3);
    }

    #[test]
    fn polygon_vs_circle_resting_contact() {
        let ground = Shape::new_box(50.0, 0.2);
        let circle = Shape::Circle { radius: 0.5 };
        let tf_ground = Transform::identity();
        let tf_circle = Transform::new(Vec2::new(0.0, 0.69), 0.0);
        let m = detect_collision(&ground, tf_ground, &circle, tf_circle, &settings()).unwrap();
        assert_relative_eq!(m.normal.y, 1.0, epsilon = 1e-3);
        assert_relative_eq!(m.penetration, 0.01, epsilon = 1e-3);
    }
}
