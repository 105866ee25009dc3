use nalgebra::Point3;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::io::Surface;

/// Axis-aligned cube with outward facing triangles.
pub fn cube_surface(name: &str, min: [f64; 3], size: f64) -> Surface {
    let mut vertices = Vec::with_capacity(8);
    for k in 0..2 {
        for j in 0..2 {
            for i in 0..2 {
                vertices.push(Point3::new(
                    min[0] + size * i as f64,
                    min[1] + size * j as f64,
                    min[2] + size * k as f64,
                ));
            }
        }
    }
    let triangles = vec![
        [0, 2, 3], [0, 3, 1], // z min
        [4, 5, 7], [4, 7, 6], // z max
        [0, 1, 5], [0, 5, 4], // y min
        [2, 6, 7], [2, 7, 3], // y max
        [0, 4, 6], [0, 6, 2], // x min
        [1, 3, 7], [1, 7, 5], // x max
    ];
    Surface::new(name, vertices, triangles)
}

/// Regular-ish tetrahedron, the smallest closed surface.
pub fn tetrahedron_surface(name: &str) -> Surface {
    let vertices = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 1.0),
    ];
    let triangles = vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]];
    Surface::new(name, vertices, triangles)
}

/// Writes the surface as ASCII STL.
pub fn write_ascii_stl(path: &Path, surface: &Surface) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "solid {}", surface.name)?;
    for i in 0..surface.triangles.len() {
        let n = surface.face_normal(i);
        writeln!(w, "  facet normal {} {} {}", n.x, n.y, n.z)?;
        writeln!(w, "    outer loop")?;
        for p in surface.triangle(i) {
            writeln!(w, "      vertex {} {} {}", p.x, p.y, p.z)?;
        }
        writeln!(w, "    endloop")?;
        writeln!(w, "  endfacet")?;
    }
    writeln!(w, "endsolid {}", surface.name)?;
    w.flush()
}
