pub mod colormap;

use anyhow::{bail, Context};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::DistanceMapError;
use crate::io::Surface;
use crate::utils::stats::finite_min_max;
use colormap::{render_legend, to_rgb8, ColorMapPreset, ScalarRange};

pub const DISTANCE_CSV: &str = "distance_map.csv";
pub const LEGEND_PNG: &str = "distance_legend.png";
/// Range labels of the legend bar, bottom (min) and top (max).
pub const LEGEND_CSV: &str = "distance_legend.csv";
const LEGEND_SIZE: (u32, u32) = (32, 256);

/// Per-vertex distance scalars of one surface and how they are colored.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMap {
    pub surface_name: String,
    pub scalars: Vec<f64>,
    pub signed: bool,
    pub range: ScalarRange,
    pub preset: ColorMapPreset,
    pub legend_visible: bool,
}

impl DistanceMap {
    /// New map with its range fitted to the data.
    pub fn new(
        surface_name: impl Into<String>,
        scalars: Vec<f64>,
        signed: bool,
        preset: ColorMapPreset,
    ) -> Self {
        let mut map = Self {
            surface_name: surface_name.into(),
            scalars,
            signed,
            range: ScalarRange { min: 0.0, max: 0.0 },
            preset,
            legend_visible: true,
        };
        map.auto_range();
        map
    }

    /// Finite min/max of the scalars, `[0, 0]` when there are none.
    pub fn data_range(&self) -> ScalarRange {
        let (min, max) = finite_min_max(&self.scalars).unwrap_or((0.0, 0.0));
        ScalarRange { min, max }
    }

    pub fn auto_range(&mut self) {
        self.range = self.data_range();
    }

    pub fn set_range(&mut self, min: f64, max: f64) -> Result<(), DistanceMapError> {
        self.range = ScalarRange::new(min, max)?;
        log::debug!("distance map range set to [{}, {}]", min, max);
        Ok(())
    }

    pub fn set_preset(&mut self, preset: ColorMapPreset) {
        self.preset = preset;
    }

    pub fn set_legend_visible(&mut self, visible: bool) {
        self.legend_visible = visible;
    }

    pub fn colors(&self) -> Vec<[u8; 3]> {
        self.scalars
            .iter()
            .map(|&v| to_rgb8(self.preset.color_at(self.range.normalize(v))))
            .collect()
    }
}

/// Files produced for a distance map.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMapFiles {
    pub csv: PathBuf,
    pub obj: PathBuf,
    pub mtl: PathBuf,
    pub legend: Option<PathBuf>,
    pub legend_labels: Option<PathBuf>,
}

impl DistanceMapFiles {
    pub fn paths(&self) -> Vec<&Path> {
        let mut paths = vec![self.csv.as_path(), self.obj.as_path(), self.mtl.as_path()];
        paths.extend(self.legend.as_deref());
        paths.extend(self.legend_labels.as_deref());
        paths
    }
}

fn write_legend(map: &DistanceMap, output_dir: &Path) -> anyhow::Result<(PathBuf, PathBuf)> {
    let legend_path = output_dir.join(LEGEND_PNG);
    render_legend(map.preset, LEGEND_SIZE.0, LEGEND_SIZE.1)
        .save(&legend_path)
        .with_context(|| format!("Failed to save legend {}", legend_path.display()))?;

    let labels_path = output_dir.join(LEGEND_CSV);
    let mut wtr = csv::Writer::from_path(&labels_path)
        .with_context(|| format!("Failed to create {}", labels_path.display()))?;
    wtr.write_record(["preset", "signed", "min (mm)", "max (mm)"])?;
    wtr.write_record(&[
        map.preset.as_str().to_string(),
        map.signed.to_string(),
        map.range.min.to_string(),
        map.range.max.to_string(),
    ])?;
    wtr.flush()?;

    Ok((legend_path, labels_path))
}

/// Drops legend files left over from an earlier write.
fn remove_legend(output_dir: &Path) -> anyhow::Result<()> {
    for name in [LEGEND_PNG, LEGEND_CSV] {
        let path = output_dir.join(name);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove stale {}", path.display()))?;
        }
    }
    Ok(())
}

/// Writes the per-vertex CSV, a vertex-colored OBJ with its material file and,
/// when the legend is visible, the legend image and its range labels.
pub fn write_distance_map(
    map: &DistanceMap,
    surface: &Surface,
    output_dir: &Path,
) -> anyhow::Result<DistanceMapFiles> {
    if map.scalars.len() != surface.vertices.len() {
        bail!(
            "distance map has {} scalars but {} has {} vertices",
            map.scalars.len(),
            surface.name,
            surface.vertices.len()
        );
    }
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Could not create output directory: {:?}", output_dir))?;

    let colors = map.colors();

    let csv_path = output_dir.join(DISTANCE_CSV);
    let mut wtr = csv::Writer::from_path(&csv_path)
        .with_context(|| format!("Failed to create {}", csv_path.display()))?;
    wtr.write_record(["vertex", "x", "y", "z", "distance", "r", "g", "b"])?;
    for (i, ((p, d), c)) in surface
        .vertices
        .iter()
        .zip(map.scalars.iter())
        .zip(colors.iter())
        .enumerate()
    {
        wtr.write_record(&[
            i.to_string(),
            p.x.to_string(),
            p.y.to_string(),
            p.z.to_string(),
            d.to_string(),
            c[0].to_string(),
            c[1].to_string(),
            c[2].to_string(),
        ])?;
    }
    wtr.flush()?;

    let stem = format!("distance_map_{}", surface.name);
    let mtl_name = format!("{}.mtl", stem);
    let mtl_path = output_dir.join(&mtl_name);
    let mut mtl_file = File::create(&mtl_path)
        .with_context(|| format!("Failed to create {}", mtl_path.display()))?;
    writeln!(
        mtl_file,
        "newmtl distance_material\nKa 1 1 1\nKd 1 1 1\nd {}",
        surface.opacity
    )?;

    let obj_path = output_dir.join(format!("{}.obj", stem));
    let file = File::create(&obj_path)
        .with_context(|| format!("Failed to create {}", obj_path.display()))?;
    let mut writer = BufWriter::new(file);
    writeln!(
        writer,
        "# distance range [{}, {}] {}",
        map.range.min,
        map.range.max,
        map.preset.as_str()
    )?;
    writeln!(writer, "mtllib {}", mtl_name)?;
    writeln!(writer, "usemtl distance_material")?;
    // vertex colors use the common "v x y z r g b" extension
    for (p, c) in surface.vertices.iter().zip(colors.iter()) {
        writeln!(
            writer,
            "v {} {} {} {:.4} {:.4} {:.4}",
            p.x,
            p.y,
            p.z,
            c[0] as f64 / 255.0,
            c[1] as f64 / 255.0,
            c[2] as f64 / 255.0
        )?;
    }
    for tri in &surface.triangles {
        writeln!(writer, "f {} {} {}", tri[0] + 1, tri[1] + 1, tri[2] + 1)?;
    }
    writer.flush()?;

    let (legend, legend_labels) = if map.legend_visible {
        let (png, labels) = write_legend(map, output_dir)?;
        (Some(png), Some(labels))
    } else {
        remove_legend(output_dir)?;
        (None, None)
    };

    log::info!(
        "distance map for {} written to {}",
        surface.name,
        output_dir.display()
    );

    Ok(DistanceMapFiles {
        csv: csv_path,
        obj: obj_path,
        mtl: mtl_path,
        legend,
        legend_labels,
    })
}

#[cfg(test)]
mod distance_map_tests {
    use super::*;
    use crate::io::input::read_obj;
    use crate::utils::test_utils::tetrahedron_surface;

    #[test]
    fn test_new_map_fits_range_to_data() {
        let map = DistanceMap::new("m", vec![1.0, 4.0, f64::NAN, 2.0], false, ColorMapPreset::default());
        assert_eq!(map.range, ScalarRange { min: 1.0, max: 4.0 });
        assert!(map.legend_visible);

        let empty = DistanceMap::new("m", Vec::new(), false, ColorMapPreset::default());
        assert_eq!(empty.range, ScalarRange { min: 0.0, max: 0.0 });
    }

    #[test]
    fn test_set_range_changes_colors() {
        let mut map = DistanceMap::new("m", vec![0.0, 5.0, 10.0], false, ColorMapPreset::Grey);
        assert_eq!(map.colors(), vec![[0, 0, 0], [128, 128, 128], [255, 255, 255]]);

        map.set_range(0.0, 5.0).unwrap();
        assert_eq!(map.colors()[1], [255, 255, 255]);
        assert_eq!(map.colors()[2], [255, 255, 255]);

        assert!(map.set_range(6.0, 5.0).is_err());
        // failed update keeps the previous range
        assert_eq!(map.range, ScalarRange { min: 0.0, max: 5.0 });

        map.auto_range();
        assert_eq!(map.range, ScalarRange { min: 0.0, max: 10.0 });
    }

    #[test]
    fn test_write_distance_map_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let surface = tetrahedron_surface("segment");
        let map = DistanceMap::new("segment", vec![0.0, 1.0, 2.0, 3.0], false, ColorMapPreset::default());

        let files = write_distance_map(&map, &surface, dir.path()).unwrap();
        assert!(files.csv.exists());
        assert!(files.mtl.exists());
        assert!(files.legend.as_ref().unwrap().exists());
        assert_eq!(files.paths().len(), 5);

        let mut rdr = csv::Reader::from_path(&files.csv).unwrap();
        assert_eq!(rdr.records().count(), 4);

        // colored OBJ stays readable as plain geometry
        let (vertices, triangles) = read_obj(&files.obj).unwrap();
        assert_eq!(vertices.len(), 4);
        assert_eq!(triangles, surface.triangles);
    }

    #[test]
    fn test_hidden_legend_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let surface = tetrahedron_surface("segment");
        let mut map = DistanceMap::new("segment", vec![0.0; 4], false, ColorMapPreset::default());
        map.set_legend_visible(false);

        let files = write_distance_map(&map, &surface, dir.path()).unwrap();
        assert!(files.legend.is_none());
        assert!(!dir.path().join(LEGEND_PNG).exists());
    }

    #[test]
    fn test_hiding_legend_removes_previous_legend_files() {
        let dir = tempfile::tempdir().unwrap();
        let surface = tetrahedron_surface("segment");
        let mut map = DistanceMap::new("segment", vec![0.0, 1.0, 2.0, 3.0], false, ColorMapPreset::default());

        write_distance_map(&map, &surface, dir.path()).unwrap();
        assert!(dir.path().join(LEGEND_PNG).exists());
        assert!(dir.path().join(LEGEND_CSV).exists());

        map.set_legend_visible(false);
        let files = write_distance_map(&map, &surface, dir.path()).unwrap();
        assert!(files.legend_labels.is_none());
        assert!(!dir.path().join(LEGEND_PNG).exists());
        assert!(!dir.path().join(LEGEND_CSV).exists());
    }

    #[test]
    fn test_legend_labels_follow_adjusted_range() {
        let dir = tempfile::tempdir().unwrap();
        let surface = tetrahedron_surface("segment");
        let mut map = DistanceMap::new("segment", vec![0.0, 1.0, 2.0, 3.0], false, ColorMapPreset::Grey);
        map.set_range(0.5, 2.5).unwrap();

        let files = write_distance_map(&map, &surface, dir.path()).unwrap();
        let mut rdr = csv::Reader::from_path(files.legend_labels.unwrap()).unwrap();
        let headers = rdr.headers().unwrap().clone();
        assert_eq!(&headers[2], "min (mm)");
        let row = rdr.records().next().unwrap().unwrap();
        assert_eq!(&row[0], ColorMapPreset::Grey.as_str());
        assert_eq!(row[2].parse::<f64>().unwrap(), 0.5);
        assert_eq!(row[3].parse::<f64>().unwrap(), 2.5);
    }

    #[test]
    fn test_mismatched_scalar_count_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let surface = tetrahedron_surface("segment");
        let map = DistanceMap::new("segment", vec![0.0; 3], false, ColorMapPreset::default());
        assert!(write_distance_map(&map, &surface, dir.path()).is_err());
    }
}
