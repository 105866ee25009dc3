pub mod input;
pub mod output;

use nalgebra::{Point3, Rotation3, Vector3};
use std::collections::HashMap;
use std::path::Path;

use crate::error::SurfaceError;

/// Default display color of freshly loaded models (red).
pub const DEFAULT_COLOR: [f64; 3] = [1.0, 0.0, 0.0];

/// A triangulated segment surface together with its display state.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    pub name: String,
    pub vertices: Vec<Point3<f64>>,
    pub triangles: Vec<[usize; 3]>,
    pub color: [f64; 3],
    pub visible: bool,
    pub opacity: f64,
    /// Rigid transform that has been set but not yet baked into `vertices`.
    pub transform: Option<Rotation3<f64>>,
    pub watertight: bool,
}

impl Surface {
    pub fn new(name: impl Into<String>, vertices: Vec<Point3<f64>>, triangles: Vec<[usize; 3]>) -> Self {
        let watertight = is_watertight(&triangles);
        Self {
            name: name.into(),
            vertices,
            triangles,
            color: DEFAULT_COLOR,
            visible: true,
            opacity: 1.0,
            transform: None,
            watertight,
        }
    }

    /// Reads a surface from an STL or OBJ file. The segment name is the file stem.
    pub fn load<P: AsRef<Path>>(path: P, color: [f64; 3], visible: bool) -> Result<Self, SurfaceError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SurfaceError::NotFound(path.to_path_buf()));
        }

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        let (vertices, triangles) = match extension.as_str() {
            "stl" => input::read_stl(path)?,
            "obj" => input::read_obj(path)?,
            _ => {
                return Err(SurfaceError::UnsupportedFormat {
                    path: path.to_path_buf(),
                    extension,
                })
            }
        };

        if triangles.is_empty() {
            return Err(SurfaceError::Empty(path.to_path_buf()));
        }

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("surface")
            .to_string();

        let mut surface = Surface::new(name, vertices, triangles);
        surface.color = color;
        surface.visible = visible;

        if !surface.watertight {
            log::warn!(
                "{} is not a closed surface, overlap statistics will be unreliable",
                surface.name
            );
        }
        log::info!(
            "{} model loaded ({} vertices, {} triangles)",
            surface.name,
            surface.vertices.len(),
            surface.triangles.len()
        );

        Ok(surface)
    }

    pub fn set_transform(&mut self, rotation: Rotation3<f64>) {
        self.transform = Some(rotation);
    }

    /// Bakes the pending transform into the vertex coordinates and drops it.
    /// Returns false when there was nothing to harden.
    pub fn harden_transform(&mut self) -> bool {
        let Some(rotation) = self.transform.take() else {
            return false;
        };
        for vertex in self.vertices.iter_mut() {
            *vertex = rotation * *vertex;
        }
        true
    }

    pub fn triangle(&self, index: usize) -> [Point3<f64>; 3] {
        let [a, b, c] = self.triangles[index];
        [self.vertices[a], self.vertices[b], self.vertices[c]]
    }

    /// Unit normal following the triangle winding, zero for degenerate faces.
    pub fn face_normal(&self, index: usize) -> Vector3<f64> {
        let [a, b, c] = self.triangle(index);
        (b - a)
            .cross(&(c - a))
            .try_normalize(f64::EPSILON)
            .unwrap_or_else(Vector3::zeros)
    }

    pub fn centroid(&self) -> Point3<f64> {
        if self.vertices.is_empty() {
            return Point3::origin();
        }
        let sum = self
            .vertices
            .iter()
            .fold(Vector3::<f64>::zeros(), |acc, p| acc + p.coords);
        Point3::from(sum / self.vertices.len() as f64)
    }

    /// Axis-aligned bounding box as (min, max).
    pub fn bounds(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let first = *self.vertices.first()?;
        Some(self.vertices.iter().fold((first, first), |(lo, hi), p| {
            (lo.inf(p), hi.sup(p))
        }))
    }
}

/// Closed when every undirected edge is shared by exactly two triangles.
pub fn is_watertight(triangles: &[[usize; 3]]) -> bool {
    if triangles.is_empty() {
        return false;
    }
    let mut edges: HashMap<(usize, usize), u32> = HashMap::new();
    for tri in triangles {
        for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
            *edges.entry((a.min(b), a.max(b))).or_insert(0) += 1;
        }
    }
    edges.values().all(|&count| count == 2)
}

#[cfg(test)]
mod surface_tests {
    use super::*;
    use crate::utils::test_utils::{cube_surface, write_ascii_stl};
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_load_valid_stl_keeps_requested_display_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Liver1.stl");
        write_ascii_stl(&path, &cube_surface("Liver1", [0.0, 0.0, 0.0], 10.0)).unwrap();

        let surface = Surface::load(&path, [0.0, 1.0, 0.0], false).unwrap();
        assert_eq!(surface.name, "Liver1");
        assert_eq!(surface.color, [0.0, 1.0, 0.0]);
        assert!(!surface.visible);
        assert_eq!(surface.vertices.len(), 8);
        assert_eq!(surface.triangles.len(), 12);
        assert!(surface.watertight);
    }

    #[test]
    fn test_load_missing_path_fails() {
        let err = Surface::load("does/not/exist.stl", DEFAULT_COLOR, true).unwrap_err();
        assert!(matches!(err, SurfaceError::NotFound(_)));
    }

    #[test]
    fn test_load_unknown_extension_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.vtk");
        std::fs::write(&path, "# vtk DataFile").unwrap();
        let err = Surface::load(&path, DEFAULT_COLOR, true).unwrap_err();
        assert!(matches!(err, SurfaceError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_harden_transform_moves_vertices_and_clears_transform() {
        let mut surface = cube_surface("cube", [1.0, 2.0, 3.0], 1.0);
        let before = surface.vertices[0];
        surface.set_transform(Rotation3::from_axis_angle(&Vector3::z_axis(), PI / 2.0));
        assert!(surface.harden_transform());
        assert!(surface.transform.is_none());
        assert_relative_eq!(surface.vertices[0].x, -before.y, epsilon = 1e-12);
        assert_relative_eq!(surface.vertices[0].y, before.x, epsilon = 1e-12);
        assert!(!surface.harden_transform());
    }

    #[test]
    fn test_open_surface_is_not_watertight() {
        let mut surface = cube_surface("cube", [0.0, 0.0, 0.0], 1.0);
        surface.triangles.pop();
        assert!(!is_watertight(&surface.triangles));
    }

    #[test]
    fn test_bounds_and_centroid() {
        let surface = cube_surface("cube", [-1.0, 0.0, 2.0], 2.0);
        let (lo, hi) = surface.bounds().unwrap();
        assert_eq!(lo, Point3::new(-1.0, 0.0, 2.0));
        assert_eq!(hi, Point3::new(1.0, 2.0, 4.0));
        let c = surface.centroid();
        assert_relative_eq!(c.x, 0.0);
        assert_relative_eq!(c.y, 1.0);
        assert_relative_eq!(c.z, 3.0);
    }
}
