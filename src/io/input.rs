use nalgebra::Point3;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::SurfaceError;

pub type MeshData = (Vec<Point3<f64>>, Vec<[usize; 3]>);

fn unreadable(path: &Path, reason: impl ToString) -> SurfaceError {
    SurfaceError::Unreadable {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Reads an ASCII or binary STL file. Duplicate vertices are merged by the reader.
pub fn read_stl(path: &Path) -> Result<MeshData, SurfaceError> {
    let mut file = OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|e| unreadable(path, e))?;

    let stl = stl_io::read_stl(&mut file).map_err(|e| unreadable(path, e))?;

    let vertices = stl
        .vertices
        .iter()
        .map(|v| Point3::new(v[0] as f64, v[1] as f64, v[2] as f64))
        .collect();
    let triangles = stl.faces.iter().map(|f| f.vertices).collect();

    Ok((vertices, triangles))
}

/// Reads the `v` and `f` records of a Wavefront OBJ file. Polygons are fan
/// triangulated; texture/normal indices and all other records are ignored.
pub fn read_obj(path: &Path) -> Result<MeshData, SurfaceError> {
    let file = File::open(path).map_err(|e| unreadable(path, e))?;
    let reader = BufReader::new(file);

    let mut vertices: Vec<Point3<f64>> = Vec::new();
    let mut triangles: Vec<[usize; 3]> = Vec::new();

    for (line_no, line_result) in reader.lines().enumerate() {
        let line = line_result.map_err(|e| unreadable(path, e))?;
        let trimmed = line.trim();
        let mut parts = trimmed.split_whitespace();

        match parts.next() {
            Some("v") => {
                let coords: Vec<f64> = parts
                    .take(3)
                    .map(|s| s.parse::<f64>())
                    .collect::<Result<_, _>>()
                    .map_err(|e| unreadable(path, format!("line {}: {}", line_no + 1, e)))?;
                if coords.len() != 3 {
                    return Err(unreadable(
                        path,
                        format!("line {}: vertex needs three coordinates", line_no + 1),
                    ));
                }
                vertices.push(Point3::new(coords[0], coords[1], coords[2]));
            }
            Some("f") => {
                let mut polygon = Vec::new();
                for token in parts {
                    let index_str = token.split('/').next().unwrap_or(token);
                    let index: i64 = index_str
                        .parse()
                        .map_err(|e| unreadable(path, format!("line {}: {}", line_no + 1, e)))?;
                    // OBJ indices are 1-based, negative ones count back from the last vertex
                    let resolved = if index < 0 {
                        vertices.len() as i64 + index
                    } else {
                        index - 1
                    };
                    if resolved < 0 || resolved as usize >= vertices.len() {
                        return Err(unreadable(
                            path,
                            format!("line {}: face index {} out of range", line_no + 1, index),
                        ));
                    }
                    polygon.push(resolved as usize);
                }
                if polygon.len() < 3 {
                    return Err(unreadable(
                        path,
                        format!("line {}: face needs at least three vertices", line_no + 1),
                    ));
                }
                for i in 1..polygon.len() - 1 {
                    triangles.push([polygon[0], polygon[i], polygon[i + 1]]);
                }
            }
            _ => {}
        }
    }

    Ok((vertices, triangles))
}

#[cfg(test)]
mod input_tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_read_obj_fan_triangulates_quads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.obj");
        fs::write(
            &path,
            "# quad\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nvt 0 0\nf 1/1 2/1 3/1 4/1\n",
        )
        .unwrap();

        let (vertices, triangles) = read_obj(&path).unwrap();
        assert_eq!(vertices.len(), 4);
        assert_eq!(triangles, vec![[0, 1, 2], [0, 2, 3]]);
    }

    #[test]
    fn test_read_obj_negative_indices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tri.obj");
        fs::write(&path, "v 0 0 0\nv 1 0 0\nv 0 1 0\nf -3 -2 -1\n").unwrap();

        let (_, triangles) = read_obj(&path).unwrap();
        assert_eq!(triangles, vec![[0, 1, 2]]);
    }

    #[test]
    fn test_read_obj_rejects_out_of_range_face() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.obj");
        fs::write(&path, "v 0 0 0\nv 1 0 0\nf 1 2 3\n").unwrap();

        assert!(matches!(
            read_obj(&path),
            Err(SurfaceError::Unreadable { .. })
        ));
    }

    #[test]
    fn test_read_stl_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.stl");
        fs::write(&path, "solid broken\n facet normal nonsense\n").unwrap();

        assert!(read_stl(&path).is_err());
    }
}
