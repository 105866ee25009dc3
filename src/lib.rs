pub mod config;
pub mod entry;
pub mod error;
pub mod io;
pub mod processing;
pub mod session;
pub mod texture;
mod utils;

#[cfg(feature = "python")]
mod binding;

pub use config::Config;
pub use entry::{run_comparison, ComparisonReport};
pub use error::{ConfigError, DistanceMapError, SurfaceError};
pub use io::Surface;
pub use processing::comparison::{ComparisonEngine, DiceStatistics, HausdorffStatistics};
pub use processing::distance::DistanceEngine;
pub use session::{Session, SurfaceRole};

#[cfg(feature = "python")]
use binding::classes::{PyDiceStatistics, PyDistanceMap, PyHausdorffStatistics, PySession, PySurface};
#[cfg(feature = "python")]
use pyo3::prelude::*;

/// This is the module importable from Python:
///
/// ```python
/// import segcomparers as sc
/// session = sc.Session()
/// session.load_reference("Data/Liver1.stl")
/// session.load_comparison("Data/Liver1beforeMM.stl")
/// session.align_models()
/// print(session.compute_dice(), session.compute_hausdorff())
/// ```
#[cfg(feature = "python")]
#[pymodule]
fn segcomparers(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // host may already have installed a logger
    let _ = env_logger::try_init();

    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add_function(wrap_pyfunction!(binding::run_comparison_py, m)?)?;

    m.add_class::<PySession>()?;
    m.add_class::<PySurface>()?;
    m.add_class::<PyDiceStatistics>()?;
    m.add_class::<PyHausdorffStatistics>()?;
    m.add_class::<PyDistanceMap>()?;
    Ok(())
}
