//! Bowyer-Watson Delaunay triangulation over 2D points.

use std::collections::HashMap;

use glam::DVec2;

/// Points closer than this are treated as duplicates and skipped.
const DUPLICATE_EPSILON: f64 = 1e-9;

#[derive(Clone, Copy, Debug)]
struct Triangle {
    v: [usize; 3],
    center: DVec2,
    radius_sq: f64,
}

impl Triangle {
    fn new(v: [usize; 3], pts: &[DVec2]) -> Self {
        let (a, b, c) = (pts[v[0]], pts[v[1]], pts[v[2]]);
        let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
        if d.abs() < f64::EPSILON {
            // Collinear: an infinite circumcircle gets it replaced by the next insertion.
            return Self {
                v,
                center: (a + b + c) / 3.0,
                radius_sq: f64::INFINITY,
            };
        }
        let a2 = a.length_squared();
        let b2 = b.length_squared();
        let c2 = c.length_squared();
        let center = DVec2::new(
            (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d,
            (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d,
        );
        Self {
            v,
            center,
            radius_sq: center.distance_squared(a),
        }
    }

    fn circumcircle_contains(&self, p: DVec2) -> bool {
        p.distance_squared(self.center) < self.radius_sq
    }
}

/// Triangulate `points`, returning counter-clockwise index triples (in a y-up
/// frame; clockwise on screen when y points down).
pub fn triangulate(points: &[[f32; 2]]) -> Vec<[u32; 3]> {
    let n = points.len();
    if n < 3 {
        return Vec::new();
    }

    let mut pts: Vec<DVec2> = points
        .iter()
        .map(|p| DVec2::new(p[0] as f64, p[1] as f64))
        .collect();

    let (min, max) = pts.iter().fold(
        (DVec2::splat(f64::MAX), DVec2::splat(f64::MIN)),
        |(lo, hi), p| (lo.min(*p), hi.max(*p)),
    );
    let span = (max - min).max_element().max(1.0);
    let mid = (min + max) / 2.0;

    // Super triangle enclosing every input point.
    pts.push(mid + DVec2::new(-20.0 * span, -span));
    pts.push(mid + DVec2::new(0.0, 20.0 * span));
    pts.push(mid + DVec2::new(20.0 * span, -span));
    let mut triangles = vec![Triangle::new([n, n + 1, n + 2], &pts)];

    let mut inserted: Vec<usize> = Vec::with_capacity(n);
    for i in 0..n {
        let p = pts[i];
        if inserted
            .iter()
            .any(|&j| pts[j].distance_squared(p) < DUPLICATE_EPSILON)
        {
            continue;
        }
        inserted.push(i);

        let mut edge_count: HashMap<(usize, usize), u32> = HashMap::new();
        triangles.retain(|tri| {
            if !tri.circumcircle_contains(p) {
                return true;
            }
            for k in 0..3 {
                let (a, b) = (tri.v[k], tri.v[(k + 1) % 3]);
                *edge_count.entry((a.min(b), a.max(b))).or_insert(0) += 1;
            }
            false
        });

        for ((a, b), count) in edge_count {
            if count == 1 {
                triangles.push(Triangle::new([a, b, i], &pts));
            }
        }
    }

    triangles
        .into_iter()
        .filter(|tri| tri.v.iter().all(|&v| v < n))
        .filter(|tri| tri.radius_sq.is_finite())
        .map(|tri| {
            let [a, b, c] = tri.v;
            let cross = (pts[b] - pts[a]).perp_dot(pts[c] - pts[a]);
            if cross < 0.0 {
                [a as u32, c as u32, b as u32]
            } else {
                [a as u32, b as u32, c as u32]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn square_splits_into_two_triangles() {
        let tris = triangulate(&[[0.0, 0.0], [1.0, 0.0], [1.0, 1.1], [0.0, 1.0]]);
        assert_eq!(tris.len(), 2);
    }

    #[test]
    fn fewer_than_three_points_yield_nothing() {
        assert!(triangulate(&[[0.0, 0.0], [1.0, 1.0]]).is_empty());
    }

    #[test]
    fn scattered_points_are_all_covered() {
        let points: Vec<[f32; 2]> = (0..200)
            .map(|i| {
                let angle = i as f32 * 2.399_963;
                let r = (i as f32).sqrt();
                [angle.cos() * r, angle.sin() * r]
            })
            .collect();
        let tris = triangulate(&points);
        let used: HashSet<u32> = tris.iter().flatten().copied().collect();
        assert_eq!(used.len(), points.len());
        // Euler: 2n - 2 - hull triangles for a planar triangulation.
        assert!(tris.len() >= points.len());
        assert!(tris.len() <= 2 * points.len());
    }

    #[test]
    fn triangles_are_consistently_wound() {
        let points = [[0.0, 0.0], [2.0, 0.0], [1.0, 2.0], [1.0, 0.7], [0.3, 0.4]];
        for [a, b, c] in triangulate(&points) {
            let (a, b, c) = (points[a as usize], points[b as usize], points[c as usize]);
            let cross = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
            assert!(cross > 0.0);
        }
    }

    #[test]
    fn duplicate_points_are_skipped() {
        let tris = triangulate(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [0.0, 0.0]]);
        assert_eq!(tris.len(), 1);
        assert!(tris[0].iter().all(|&i| i < 3));
    }
}
