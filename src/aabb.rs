//! Axis-aligned bounding box operations shared by the broad-phase tree and
//! ray casting.

use crate::math::Vec2;
use crate::settings::SahHeuristic;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Aabb { min, max }
    }

    pub fn union(self, rhs: Aabb) -> Aabb {
        Aabb::new(self.min.min(rhs.min), self.max.max(rhs.max))
    }

    pub fn contains(self, rhs: Aabb) -> bool {
        self.min.x <= rhs.min.x
            && self.min.y <= rhs.min.y
            && rhs.max.x <= self.max.x
            && rhs.max.y <= self.max.y
    }

    pub fn contains_point(self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    pub fn overlaps(self, rhs: Aabb) -> bool {
        self.min.x <= rhs.max.x
            && rhs.min.x <= self.max.x
            && self.min.y <= rhs.max.y
            && rhs.min.y <= self.max.y
    }

    pub fn extents(self) -> Vec2 {
        (self.max - self.min) * 0.5
    }

    pub fn center(self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn area(self) -> f32 {
        let d = self.max - self.min;
        d.x * d.y
    }

    pub fn perimeter(self) -> f32 {
        let d = self.max - self.min;
        2.0 * (d.x + d.y)
    }

    /// The Surface-Area-Heuristic cost of this box, under whichever
    /// heuristic the world's settings select. Both variants are monotone in
    /// box size, which is all SAH branch-and-bound insertion relies on.
    pub fn sah_cost(self, heuristic: SahHeuristic) -> f32 {
        match heuristic {
            SahHeuristic::Area => self.area(),
            SahHeuristic::Perimeter => self.perimeter(),
        }
    }

    pub fn expanded(self, margin: f32) -> Aabb {
        let m = Vec2::new(margin, margin);
        Aabb::new(self.min - m, self.max + m)
    }

    /// Fattens `self` by `margin` and extends it further in the direction of
    /// `displacement` scaled by `multiplier`, so a small continuous motion
    /// doesn't force a tree reinsertion every step.
    pub fn fattened(self, margin: f32, displacement: Vec2, multiplier: f32) -> Aabb {
        let mut fat = self.expanded(margin);
        let d = displacement * multiplier;
        if d.x < 0.0 {
            fat.min.x += d.x;
        } else {
            fat.max.x += d.x;
        }
        if d.y < 0.0 {
            fat.min.y += d.y;
        } else {
            fat.max.y += d.y;
        }
        fat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_contains_both() {
        let a = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0));
        let b = Aabb::new(Vec2::new(2.0, -1.0), Vec2::new(3.0, 0.5));
        let u = a.union(b);
        assert!(u.contains(a));
        assert!(u.contains(b));
    }

    #[test]
    fn overlap_detection() {
        let a = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0));
        let b = Aabb::new(Vec2::new(0.5, 0.5), Vec2::new(2.0, 2.0));
        let c = Aabb::new(Vec2::new(5.0, 5.0), Vec2::new(6.0, 6.0));
        assert!(a.overlaps(b));
        assert!(!a.overlaps(c));
    }

    #[test]
    fn fattened_extends_toward_displacement() {
        let a = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0));
        let fat = a.fattened(0.1, Vec2::new(2.0, 0.0), 2.0);
        assert!(fat.max.x > a.max.x + 3.0);
        assert!((fat.min.x - (a.min.x - 0.1)).abs() < 1e-5);
    }
}
