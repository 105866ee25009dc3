pub mod classes;

use classes::{PyDiceStatistics, PyHausdorffStatistics};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use std::path::Path;

use crate::config::Config;
use crate::entry::run_comparison;

/// Runs the whole workflow on two model files.
///
/// Pipeline:
///
/// .. code-block:: text
///
///    load model 1 ---+
///                    +--> align model 2 --> Dice + Hausdorff --> distance map
///    load model 2 ---+
///
/// Arguments:
///
/// - ``reference_path`` – Model 1 (STL or OBJ)
/// - ``comparison_path`` – Model 2 (STL or OBJ)
/// - ``output_dir`` (default: from config, "output") – where ``dice.csv``,
///   ``hausdorff.csv``, the distance map files and ``comparison_summary.json`` go
/// - ``align`` (default: True) – rotate model 2 by a half-turn first
/// - ``config_path`` (default: None) – TOML settings file
///
/// Returns:
///
/// A tuple ``(DiceStatistics, HausdorffStatistics, (min, max))`` where the last
/// entry is the fitted distance range.
///
/// Example:
///
/// .. code-block:: python
///
///    import segcomparers as sc
///    dice, hausdorff, rng = sc.run_comparison(
///        "Data/Liver1.stl", "Data/Liver1beforeMM.stl"
///    )
#[pyfunction(name = "run_comparison")]
#[pyo3(
    signature = (
        reference_path,
        comparison_path,
        output_dir = None,
        align = true,
        config_path = None,
    )
)]
pub fn run_comparison_py(
    reference_path: &str,
    comparison_path: &str,
    output_dir: Option<&str>,
    align: bool,
    config_path: Option<&str>,
) -> PyResult<(PyDiceStatistics, PyHausdorffStatistics, (f64, f64))> {
    let config = match config_path {
        Some(path) => Config::from_file(path).map_err(|e| PyValueError::new_err(e.to_string()))?,
        None => Config::default(),
    };

    let report = run_comparison(
        Path::new(reference_path),
        Path::new(comparison_path),
        output_dir.map(Path::new),
        align,
        config,
    )
    .map_err(|e| PyRuntimeError::new_err(format!("{:#}", e)))?;

    Ok((report.dice.into(), report.hausdorff.into(), report.distance_range))
}
