use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::path::Path;

use crate::config::Config;
use crate::io::Surface;
use crate::processing::comparison::{DiceStatistics, HausdorffStatistics};
use crate::session::{Session, SurfaceRole};
use crate::texture::colormap::ColorMapPreset;
use crate::texture::DistanceMap;

fn runtime_err(e: anyhow::Error) -> PyErr {
    PyRuntimeError::new_err(format!("{:#}", e))
}

fn parse_role(model: &str) -> PyResult<SurfaceRole> {
    model
        .parse::<SurfaceRole>()
        .map_err(|e| PyValueError::new_err(e.to_string()))
}

/// Snapshot of a loaded surface model
///
/// Attributes:
///     name (str): Segment name (file stem)
///     color (tuple[float, float, float]): Display color, RGB in [0, 1]
///     visible (bool): Shown in the 3D view
///     opacity (float): Display opacity in [0, 1]
///     watertight (bool): Closed surface, required for Dice
///     vertices (list[tuple[float, float, float]]): Vertex coordinates in mm
///     triangles (list[tuple[int, int, int]]): Vertex indices per triangle
#[pyclass(name = "Surface")]
#[derive(Debug, Clone)]
pub struct PySurface {
    #[pyo3(get)]
    pub name: String,
    #[pyo3(get)]
    pub color: (f64, f64, f64),
    #[pyo3(get)]
    pub visible: bool,
    #[pyo3(get)]
    pub opacity: f64,
    #[pyo3(get)]
    pub watertight: bool,
    #[pyo3(get)]
    pub vertices: Vec<(f64, f64, f64)>,
    #[pyo3(get)]
    pub triangles: Vec<(usize, usize, usize)>,
}

#[pymethods]
impl PySurface {
    fn __repr__(&self) -> String {
        format!(
            "Surface(name={}, vertices={}, triangles={}, visible={}, opacity={:.2})",
            self.name,
            self.vertices.len(),
            self.triangles.len(),
            self.visible,
            self.opacity
        )
    }

    fn __len__(&self) -> usize {
        self.vertices.len()
    }
}

impl From<&Surface> for PySurface {
    fn from(surface: &Surface) -> Self {
        Self {
            name: surface.name.clone(),
            color: (surface.color[0], surface.color[1], surface.color[2]),
            visible: surface.visible,
            opacity: surface.opacity,
            watertight: surface.watertight,
            vertices: surface.vertices.iter().map(|p| (p.x, p.y, p.z)).collect(),
            triangles: surface.triangles.iter().map(|t| (t[0], t[1], t[2])).collect(),
        }
    }
}

/// Sorensen-Dice statistics of the reference and compare segment
#[pyclass(name = "DiceStatistics")]
#[derive(Debug, Clone)]
pub struct PyDiceStatistics {
    #[pyo3(get)]
    pub dice_coefficient: f64,
    #[pyo3(get)]
    pub true_positives_percent: f64,
    #[pyo3(get)]
    pub true_negatives_percent: f64,
    #[pyo3(get)]
    pub false_positives_percent: f64,
    #[pyo3(get)]
    pub false_negatives_percent: f64,
    #[pyo3(get)]
    pub reference_center: (f64, f64, f64),
    #[pyo3(get)]
    pub compare_center: (f64, f64, f64),
    #[pyo3(get)]
    pub reference_volume_cc: f64,
    #[pyo3(get)]
    pub compare_volume_cc: f64,
}

#[pymethods]
impl PyDiceStatistics {
    fn __repr__(&self) -> String {
        format!(
            "DiceStatistics(dice={:.4}, reference_volume_cc={:.3}, compare_volume_cc={:.3})",
            self.dice_coefficient, self.reference_volume_cc, self.compare_volume_cc
        )
    }
}

impl From<DiceStatistics> for PyDiceStatistics {
    fn from(stats: DiceStatistics) -> Self {
        let tuple = |c: [f64; 3]| (c[0], c[1], c[2]);
        Self {
            dice_coefficient: stats.dice_coefficient,
            true_positives_percent: stats.true_positives_percent,
            true_negatives_percent: stats.true_negatives_percent,
            false_positives_percent: stats.false_positives_percent,
            false_negatives_percent: stats.false_negatives_percent,
            reference_center: tuple(stats.reference_center),
            compare_center: tuple(stats.compare_center),
            reference_volume_cc: stats.reference_volume_cc,
            compare_volume_cc: stats.compare_volume_cc,
        }
    }
}

/// Hausdorff distance statistics in mm
#[pyclass(name = "HausdorffStatistics")]
#[derive(Debug, Clone)]
pub struct PyHausdorffStatistics {
    #[pyo3(get)]
    pub maximum_mm: f64,
    #[pyo3(get)]
    pub average_mm: f64,
    #[pyo3(get)]
    pub percentile_95_mm: f64,
}

#[pymethods]
impl PyHausdorffStatistics {
    fn __repr__(&self) -> String {
        format!(
            "HausdorffStatistics(max={:.3}, mean={:.3}, p95={:.3})",
            self.maximum_mm, self.average_mm, self.percentile_95_mm
        )
    }
}

impl From<HausdorffStatistics> for PyHausdorffStatistics {
    fn from(stats: HausdorffStatistics) -> Self {
        Self {
            maximum_mm: stats.maximum_mm,
            average_mm: stats.average_mm,
            percentile_95_mm: stats.percentile_95_mm,
        }
    }
}

/// Per-vertex distance scalars of the comparison model
///
/// Attributes:
///     surface_name (str): Model the scalars belong to
///     scalars (list[float]): One distance per vertex, in mm
///     range (tuple[float, float]): Current color range (min, max)
///     colors (list[tuple[int, int, int]]): Lookup table colors per vertex
///     preset (str): Color map name
///     legend_visible (bool): Whether the legend is shown
#[pyclass(name = "DistanceMap")]
#[derive(Debug, Clone)]
pub struct PyDistanceMap {
    #[pyo3(get)]
    pub surface_name: String,
    #[pyo3(get)]
    pub scalars: Vec<f64>,
    #[pyo3(get)]
    pub range: (f64, f64),
    #[pyo3(get)]
    pub colors: Vec<(u8, u8, u8)>,
    #[pyo3(get)]
    pub preset: String,
    #[pyo3(get)]
    pub legend_visible: bool,
}

#[pymethods]
impl PyDistanceMap {
    fn __repr__(&self) -> String {
        format!(
            "DistanceMap(surface={}, points={}, range=({:.3}, {:.3}), preset={})",
            self.surface_name,
            self.scalars.len(),
            self.range.0,
            self.range.1,
            self.preset
        )
    }
}

impl From<&DistanceMap> for PyDistanceMap {
    fn from(map: &DistanceMap) -> Self {
        Self {
            surface_name: map.surface_name.clone(),
            scalars: map.scalars.clone(),
            range: (map.range.min, map.range.max),
            colors: map.colors().into_iter().map(|c| (c[0], c[1], c[2])).collect(),
            preset: map.preset.as_str().to_string(),
            legend_visible: map.legend_visible,
        }
    }
}

/// Comparison session holding the reference (model 1) and comparison (model 2)
///
/// Models are addressed as ``"reference"``/``"model1"`` and
/// ``"comparison"``/``"model2"``.
///
/// Example:
///     >>> import segcomparers as sc
///     >>> session = sc.Session()
///     >>> session.load_reference("Data/Liver1.stl")
///     True
///     >>> session.load_comparison("Data/Liver1beforeMM.stl")
///     True
///     >>> session.align_models()
///     >>> session.compute_dice().dice_coefficient
#[pyclass(name = "Session")]
pub struct PySession {
    inner: Session,
}

#[pymethods]
impl PySession {
    #[new]
    #[pyo3(signature = (config_path = None))]
    fn new(config_path: Option<&str>) -> PyResult<Self> {
        let config = match config_path {
            Some(path) => Config::from_file(path).map_err(|e| PyValueError::new_err(e.to_string()))?,
            None => Config::default(),
        };
        Ok(Self {
            inner: Session::new(config),
        })
    }

    /// Load model 1. Returns False (and logs the reason) on failure.
    fn load_reference(&mut self, path: &str) -> bool {
        self.inner.load(SurfaceRole::Reference, path)
    }

    /// Load model 2. Returns False (and logs the reason) on failure.
    fn load_comparison(&mut self, path: &str) -> bool {
        self.inner.load(SurfaceRole::Comparison, path)
    }

    fn surface(&self, model: &str) -> PyResult<Option<PySurface>> {
        Ok(self.inner.surface(parse_role(model)?).map(PySurface::from))
    }

    fn set_visibility(&mut self, model: &str, visible: bool) -> PyResult<()> {
        self.inner
            .set_visibility(parse_role(model)?, visible)
            .map_err(runtime_err)
    }

    /// Set opacity from a 0-100 slider value, returns the normalized opacity.
    fn set_opacity(&mut self, model: &str, percent: f64) -> PyResult<f64> {
        self.inner
            .set_opacity_percent(parse_role(model)?, percent)
            .map_err(runtime_err)
    }

    fn set_color(&mut self, model: &str, color: (f64, f64, f64)) -> PyResult<()> {
        self.inner
            .set_color(parse_role(model)?, [color.0, color.1, color.2])
            .map_err(runtime_err)
    }

    /// Rotate model 2 by a half-turn and harden the transform.
    fn align_models(&mut self) -> PyResult<()> {
        self.inner.align().map_err(runtime_err)
    }

    /// Compute the Sorensen-Dice coefficient and write ``dice.csv``.
    #[pyo3(signature = (output_dir = None))]
    fn compute_dice(&self, output_dir: Option<&str>) -> PyResult<PyDiceStatistics> {
        self.inner
            .compute_dice(output_dir.map(Path::new))
            .map(PyDiceStatistics::from)
            .map_err(runtime_err)
    }

    /// Compute the Hausdorff distance and write ``hausdorff.csv``.
    #[pyo3(signature = (output_dir = None))]
    fn compute_hausdorff(&self, output_dir: Option<&str>) -> PyResult<PyHausdorffStatistics> {
        self.inner
            .compute_hausdorff(output_dir.map(Path::new))
            .map(PyHausdorffStatistics::from)
            .map_err(runtime_err)
    }

    /// Compute the distance map of model 2 against model 1.
    fn show_color_map(&mut self) -> PyResult<PyDistanceMap> {
        self.inner
            .compute_distance_map()
            .map(PyDistanceMap::from)
            .map_err(runtime_err)
    }

    fn distance_map(&self) -> Option<PyDistanceMap> {
        self.inner.distance_map().map(PyDistanceMap::from)
    }

    fn set_color_range(&mut self, min: f64, max: f64) -> PyResult<()> {
        self.inner
            .set_color_range(min, max)
            .map_err(|e| PyValueError::new_err(format!("{:#}", e)))
    }

    fn reset_color_range(&mut self) -> PyResult<()> {
        self.inner.reset_color_range().map_err(runtime_err)
    }

    fn set_color_preset(&mut self, preset: &str) -> PyResult<()> {
        let preset = preset
            .parse::<ColorMapPreset>()
            .map_err(|e| PyValueError::new_err(e.to_string()))?;
        self.inner.set_color_preset(preset).map_err(runtime_err)
    }

    fn set_legend_visible(&mut self, visible: bool) -> PyResult<()> {
        self.inner.set_legend_visible(visible).map_err(runtime_err)
    }

    /// Write distance CSV, colored OBJ/MTL, legend PNG and its range labels.
    /// Returns the written paths.
    #[pyo3(signature = (output_dir = None))]
    fn write_distance_map(&self, output_dir: Option<&str>) -> PyResult<Vec<String>> {
        let files = self
            .inner
            .write_distance_map(output_dir.map(Path::new))
            .map_err(runtime_err)?;
        Ok(files.paths().iter().map(|p| p.display().to_string()).collect())
    }

    fn export_surface(&self, model: &str, path: &str) -> PyResult<String> {
        self.inner
            .export_surface(parse_role(model)?, Path::new(path))
            .map(|p| p.display().to_string())
            .map_err(runtime_err)
    }

    fn __repr__(&self) -> String {
        format!("{:?}", self.inner)
    }
}
