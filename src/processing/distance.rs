use anyhow::bail;
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use std::collections::HashMap;

use crate::io::Surface;

/// Computes one distance per vertex of `source` to the surface of `target`.
pub trait DistanceEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Unsigned when `signed` is false; otherwise positive outside `target`
    /// and negative inside.
    fn distances(&self, source: &Surface, target: &Surface, signed: bool) -> anyhow::Result<Vec<f64>>;
}

/// Exact closest-point distance backed by a uniform grid over the target triangles.
///
/// Signs come from the angle-weighted pseudonormal of the face, edge or vertex
/// holding the closest point, which stays correct at sharp edges and corners.
#[derive(Debug, Clone, Default)]
pub struct ClosestPointDistance;

impl ClosestPointDistance {
    /// Distances of arbitrary query points to `target`.
    pub fn point_distances(
        &self,
        points: &[Point3<f64>],
        target: &Surface,
        signed: bool,
    ) -> anyhow::Result<Vec<f64>> {
        if target.triangles.is_empty() {
            bail!("target surface {} has no triangles", target.name);
        }
        let grid = TriangleGrid::build(target);
        let normals = signed.then(|| PseudoNormals::build(target));

        let distances = points
            .par_iter()
            .map(|p| {
                let hit = grid.closest(target, p);
                match &normals {
                    Some(normals) if (p - hit.point).dot(&normals.of(hit.feature)) < 0.0 => -hit.distance,
                    _ => hit.distance,
                }
            })
            .collect();

        Ok(distances)
    }
}

impl DistanceEngine for ClosestPointDistance {
    fn name(&self) -> &str {
        "closest-point"
    }

    fn distances(&self, source: &Surface, target: &Surface, signed: bool) -> anyhow::Result<Vec<f64>> {
        self.point_distances(&source.vertices, target, signed)
    }
}

/// Part of a triangle a closest point lies on, in local corner indices 0..3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriangleRegion {
    Face,
    Edge(usize, usize),
    Vertex(usize),
}

/// Mesh feature holding a closest point, in surface vertex indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceFeature {
    Face(usize),
    /// Endpoints ordered low to high.
    Edge(usize, usize),
    Vertex(usize),
}

impl SurfaceFeature {
    fn on_triangle(triangle: usize, corners: [usize; 3], region: TriangleRegion) -> Self {
        match region {
            TriangleRegion::Face => SurfaceFeature::Face(triangle),
            TriangleRegion::Edge(i, j) => {
                let (a, b) = (corners[i], corners[j]);
                SurfaceFeature::Edge(a.min(b), a.max(b))
            }
            TriangleRegion::Vertex(i) => SurfaceFeature::Vertex(corners[i]),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClosestHit {
    pub distance: f64,
    pub triangle: usize,
    pub point: Point3<f64>,
    pub feature: SurfaceFeature,
}

/// Angle-weighted normals for every face, edge and vertex of a surface.
#[derive(Debug, Clone)]
pub struct PseudoNormals {
    faces: Vec<Vector3<f64>>,
    edges: HashMap<(usize, usize), Vector3<f64>>,
    vertices: Vec<Vector3<f64>>,
}

impl PseudoNormals {
    pub fn build(surface: &Surface) -> Self {
        let faces: Vec<Vector3<f64>> = (0..surface.triangles.len())
            .map(|t| surface.face_normal(t))
            .collect();
        let mut edges: HashMap<(usize, usize), Vector3<f64>> = HashMap::new();
        let mut vertices = vec![Vector3::zeros(); surface.vertices.len()];

        for (t, tri) in surface.triangles.iter().enumerate() {
            let normal = faces[t];
            let corners = surface.triangle(t);
            for i in 0..3 {
                let (j, k) = ((i + 1) % 3, (i + 2) % 3);
                let (a, b) = (tri[i], tri[j]);
                *edges.entry((a.min(b), a.max(b))).or_insert_with(Vector3::zeros) += normal;

                let u = corners[j] - corners[i];
                let v = corners[k] - corners[i];
                if u.norm_squared() > 0.0 && v.norm_squared() > 0.0 {
                    vertices[tri[i]] += normal * u.angle(&v);
                }
            }
        }

        Self {
            faces,
            edges,
            vertices,
        }
    }

    pub fn of(&self, feature: SurfaceFeature) -> Vector3<f64> {
        match feature {
            SurfaceFeature::Face(t) => self.faces[t],
            SurfaceFeature::Edge(a, b) => self.edges.get(&(a, b)).copied().unwrap_or_else(Vector3::zeros),
            SurfaceFeature::Vertex(v) => self.vertices[v],
        }
    }
}

/// Closest point to `p` on triangle (a, b, c), by Voronoi region classification.
pub fn closest_point_on_triangle(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> Point3<f64> {
    closest_region_on_triangle(p, a, b, c).0
}

/// Like [`closest_point_on_triangle`], also reporting which region was hit.
pub fn closest_region_on_triangle(
    p: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
) -> (Point3<f64>, TriangleRegion) {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (*a, TriangleRegion::Vertex(0));
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return (*b, TriangleRegion::Vertex(1));
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return (a + ab * v, TriangleRegion::Edge(0, 1));
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return (*c, TriangleRegion::Vertex(2));
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return (a + ac * w, TriangleRegion::Edge(0, 2));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return (b + (c - b) * w, TriangleRegion::Edge(1, 2));
    }

    let denom = va + vb + vc;
    if denom.abs() < f64::MIN_POSITIVE {
        // degenerate triangle, fall back to the nearest corner
        let nearest = [a, b, c]
            .into_iter()
            .enumerate()
            .min_by(|(_, x), (_, y)| {
                (p - **x)
                    .norm_squared()
                    .partial_cmp(&(p - **y).norm_squared())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, q)| (*q, TriangleRegion::Vertex(i)));
        return nearest.unwrap_or((*a, TriangleRegion::Vertex(0)));
    }
    let v = vb / denom;
    let w = vc / denom;
    (a + ab * v + ac * w, TriangleRegion::Face)
}

const MAX_CELLS_PER_AXIS: usize = 128;

/// Buckets triangle indices by the grid cells their bounding boxes overlap.
#[derive(Debug, Clone)]
pub struct TriangleGrid {
    origin: Point3<f64>,
    cell_size: f64,
    dims: [usize; 3],
    cells: Vec<Vec<usize>>,
}

impl TriangleGrid {
    pub fn build(surface: &Surface) -> Self {
        let (lo, hi) = surface
            .bounds()
            .unwrap_or((Point3::origin(), Point3::origin()));
        let extent = hi - lo;
        let longest = extent.max().max(f64::EPSILON);

        // roughly a handful of triangles per occupied cell
        let target_cells = (surface.triangles.len() as f64).cbrt().ceil().max(1.0);
        let cell_size = (longest / target_cells).max(longest / MAX_CELLS_PER_AXIS as f64);

        let dim = |e: f64| ((e / cell_size).ceil() as usize).clamp(1, MAX_CELLS_PER_AXIS);
        let dims = [dim(extent.x), dim(extent.y), dim(extent.z)];

        let mut grid = Self {
            origin: lo,
            cell_size,
            dims,
            cells: vec![Vec::new(); dims[0] * dims[1] * dims[2]],
        };

        for t in 0..surface.triangles.len() {
            let [a, b, c] = surface.triangle(t);
            let tmin = grid.cell_of(&a.inf(&b).inf(&c));
            let tmax = grid.cell_of(&a.sup(&b).sup(&c));
            for k in tmin[2]..=tmax[2] {
                for j in tmin[1]..=tmax[1] {
                    for i in tmin[0]..=tmax[0] {
                        let idx = grid.index(i, j, k);
                        grid.cells[idx].push(t);
                    }
                }
            }
        }

        grid
    }

    fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.dims[0] * (j + self.dims[1] * k)
    }

    /// Cell containing `p`, clamped to the grid.
    fn cell_of(&self, p: &Point3<f64>) -> [usize; 3] {
        let rel: Vector3<f64> = (p - self.origin) / self.cell_size;
        let clamp = |v: f64, dim: usize| (v.floor().max(0.0) as usize).min(dim - 1);
        [
            clamp(rel.x, self.dims[0]),
            clamp(rel.y, self.dims[1]),
            clamp(rel.z, self.dims[2]),
        ]
    }

    /// Searches rings of cells around `p` until no unvisited cell can be closer
    /// than the best hit found so far.
    pub fn closest(&self, surface: &Surface, p: &Point3<f64>) -> ClosestHit {
        let center = self.cell_of(p);
        let max_ring = *self.dims.iter().max().unwrap_or(&1);
        let mut best = ClosestHit {
            distance: f64::INFINITY,
            triangle: 0,
            point: *p,
            feature: SurfaceFeature::Face(0),
        };

        for ring in 0..=max_ring {
            let r = ring as isize;
            let range = |c: usize, dim: usize| {
                let lo = (c as isize - r).max(0) as usize;
                let hi = ((c as isize + r) as usize).min(dim - 1);
                lo..=hi
            };

            for k in range(center[2], self.dims[2]) {
                for j in range(center[1], self.dims[1]) {
                    for i in range(center[0], self.dims[0]) {
                        let ring_of_cell = (i as isize - center[0] as isize)
                            .abs()
                            .max((j as isize - center[1] as isize).abs())
                            .max((k as isize - center[2] as isize).abs());
                        if ring_of_cell != r {
                            continue;
                        }
                        for &t in &self.cells[self.index(i, j, k)] {
                            let [a, b, c] = surface.triangle(t);
                            let (q, region) = closest_region_on_triangle(p, &a, &b, &c);
                            let d = (p - q).norm();
                            if d < best.distance {
                                best = ClosestHit {
                                    distance: d,
                                    triangle: t,
                                    point: q,
                                    feature: SurfaceFeature::on_triangle(t, surface.triangles[t], region),
                                };
                            }
                        }
                    }
                }
            }

            if best.distance <= ring as f64 * self.cell_size {
                break;
            }
        }

        best
    }
}

#[cfg(test)]
mod distance_tests {
    use super::*;
    use crate::utils::test_utils::{cube_surface, tetrahedron_surface};
    use approx::assert_relative_eq;

    fn brute_force(surface: &Surface, p: &Point3<f64>) -> f64 {
        (0..surface.triangles.len())
            .map(|t| {
                let [a, b, c] = surface.triangle(t);
                (p - closest_point_on_triangle(p, &a, &b, &c)).norm()
            })
            .fold(f64::INFINITY, f64::min)
    }

    #[test]
    fn test_closest_point_regions() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(0.0, 1.0, 0.0);

        // face interior
        let q = closest_point_on_triangle(&Point3::new(0.25, 0.25, 2.0), &a, &b, &c);
        assert_relative_eq!((q - Point3::new(0.25, 0.25, 0.0)).norm(), 0.0);
        // vertex region
        let q = closest_point_on_triangle(&Point3::new(-1.0, -1.0, 0.0), &a, &b, &c);
        assert_eq!(q, a);
        // edge region
        let q = closest_point_on_triangle(&Point3::new(0.5, -1.0, 0.0), &a, &b, &c);
        assert_relative_eq!((q - Point3::new(0.5, 0.0, 0.0)).norm(), 0.0);
        // hypotenuse
        let q = closest_point_on_triangle(&Point3::new(1.0, 1.0, 0.0), &a, &b, &c);
        assert_relative_eq!((q - Point3::new(0.5, 0.5, 0.0)).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_identical_surfaces_have_zero_distance() {
        let cube = cube_surface("cube", [0.0, 0.0, 0.0], 10.0);
        let d = ClosestPointDistance.distances(&cube, &cube, false).unwrap();
        assert_eq!(d.len(), cube.vertices.len());
        assert!(d.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_grid_matches_brute_force() {
        let target = cube_surface("target", [0.0, 0.0, 0.0], 10.0);
        let grid = TriangleGrid::build(&target);
        let queries = [
            Point3::new(5.0, 5.0, 5.0),
            Point3::new(-3.0, 4.0, 12.0),
            Point3::new(25.0, -7.0, 1.0),
            Point3::new(9.9, 0.1, 5.0),
            Point3::new(100.0, 100.0, 100.0),
        ];
        for p in queries.iter() {
            let hit = grid.closest(&target, p);
            assert_relative_eq!(hit.distance, brute_force(&target, p), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_signed_distance_is_negative_inside() {
        let target = cube_surface("target", [0.0, 0.0, 0.0], 10.0);
        let mut source = tetrahedron_surface("segment");
        // one vertex inside the cube, one outside
        source.vertices[0] = Point3::new(5.0, 5.0, 8.0);
        source.vertices[1] = Point3::new(5.0, 5.0, 13.0);

        let d = ClosestPointDistance.distances(&source, &target, true).unwrap();
        assert_relative_eq!(d[0], -2.0, epsilon = 1e-12);
        assert_relative_eq!(d[1], 3.0, epsilon = 1e-12);

        let unsigned = ClosestPointDistance.distances(&source, &target, false).unwrap();
        assert_relative_eq!(unsigned[0], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sign_outside_sharp_edge_does_not_depend_on_face_order() {
        let target = tetrahedron_surface("target");
        // edge (1,0,0)-(0,1,0) between the bottom face and the slanted face
        let q = Point3::new(0.5, 0.5, 0.0);
        let bottom = Vector3::new(0.0, 0.0, -1.0);
        let slanted = Vector3::new(1.0, 1.0, 1.0).normalize();

        let mut source = tetrahedron_surface("source");
        source.vertices[0] = q + bottom * 0.1 + slanted * 1.0;
        source.vertices[1] = q + bottom * 1.0 + slanted * 0.1;
        // just inside the same edge
        source.vertices[2] = q - (bottom + slanted) * 0.01;

        let d = ClosestPointDistance.distances(&source, &target, true).unwrap();
        assert!(d[0] > 0.0, "{}", d[0]);
        assert!(d[1] > 0.0, "{}", d[1]);
        assert!(d[2] < 0.0, "{}", d[2]);
        assert_relative_eq!(d[0], (source.vertices[0] - q).norm(), epsilon = 1e-12);

        let mut reordered = target.clone();
        reordered.triangles.reverse();
        let again = ClosestPointDistance.distances(&source, &reordered, true).unwrap();
        assert_eq!(d.iter().map(|v| v.signum()).collect::<Vec<_>>(), again.iter().map(|v| v.signum()).collect::<Vec<_>>());
    }

    #[test]
    fn test_sign_outside_sharp_vertex_is_positive() {
        let target = cube_surface("target", [0.0, 0.0, 0.0], 10.0);
        let mut source = tetrahedron_surface("source");
        // closest point is the corner (10, 10, 10) for all of these
        source.vertices[0] = Point3::new(11.0, 10.5, 10.2);
        source.vertices[1] = Point3::new(10.2, 11.0, 10.5);
        source.vertices[2] = Point3::new(10.5, 10.2, 11.0);
        source.vertices[3] = Point3::new(12.0, 12.0, 12.0);

        let d = ClosestPointDistance.distances(&source, &target, true).unwrap();
        assert!(d.iter().all(|&v| v > 0.0), "{:?}", d);
        assert_relative_eq!(d[3], 12.0f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_closest_region_reports_feature() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(0.0, 1.0, 0.0);
        let region = |p: Point3<f64>| closest_region_on_triangle(&p, &a, &b, &c).1;

        assert_eq!(region(Point3::new(0.25, 0.25, 1.0)), TriangleRegion::Face);
        assert_eq!(region(Point3::new(2.0, -1.0, 0.0)), TriangleRegion::Vertex(1));
        assert_eq!(region(Point3::new(0.5, -1.0, 0.0)), TriangleRegion::Edge(0, 1));
        assert_eq!(region(Point3::new(-1.0, 0.5, 0.0)), TriangleRegion::Edge(0, 2));
        assert_eq!(region(Point3::new(1.0, 1.0, 0.0)), TriangleRegion::Edge(1, 2));
    }

    #[test]
    fn test_empty_target_is_an_error() {
        let source = tetrahedron_surface("source");
        let target = Surface::new("empty", Vec::new(), Vec::new());
        assert!(ClosestPointDistance.distances(&source, &target, false).is_err());
    }
}
