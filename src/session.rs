use anyhow::{anyhow, Context};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::Config;
use crate::error::SurfaceError;
use crate::io::output::{write_dice_csv, write_hausdorff_csv, write_stl};
use crate::io::Surface;
use crate::processing::align::align_surface;
use crate::processing::comparison::{
    ComparisonEngine, DiceStatistics, HausdorffStatistics, VoxelComparisonEngine,
};
use crate::processing::distance::{ClosestPointDistance, DistanceEngine};
use crate::texture::colormap::ColorMapPreset;
use crate::texture::{write_distance_map, DistanceMap, DistanceMapFiles};

/// Which of the two loaded models an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceRole {
    /// Model 1, the fixed reference.
    Reference,
    /// Model 2, the one that gets aligned and compared.
    Comparison,
}

impl fmt::Display for SurfaceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SurfaceRole::Reference => write!(f, "reference"),
            SurfaceRole::Comparison => write!(f, "comparison"),
        }
    }
}

impl FromStr for SurfaceRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reference" | "model1" | "1" => Ok(SurfaceRole::Reference),
            "comparison" | "compare" | "model2" | "2" => Ok(SurfaceRole::Comparison),
            other => Err(anyhow!("unknown model '{}', expected reference or comparison", other)),
        }
    }
}

/// Maps a 0-100 slider value onto a 0.0-1.0 display opacity.
pub fn opacity_from_percent(percent: f64) -> f64 {
    if !(0.0..=100.0).contains(&percent) {
        log::warn!("opacity {}% outside [0, 100], clamping", percent);
    }
    if percent.is_nan() {
        return 0.0;
    }
    percent.clamp(0.0, 100.0) / 100.0
}

/// Owns the two models, the comparison capabilities and the current distance map.
pub struct Session {
    config: Config,
    reference: Option<Surface>,
    comparison: Option<Surface>,
    comparison_engine: Box<dyn ComparisonEngine>,
    distance_engine: Box<dyn DistanceEngine>,
    distance_map: Option<DistanceMap>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("reference", &self.reference.as_ref().map(|s| &s.name))
            .field("comparison", &self.comparison.as_ref().map(|s| &s.name))
            .field("comparison_engine", &self.comparison_engine.name())
            .field("distance_engine", &self.distance_engine.name())
            .field("has_distance_map", &self.distance_map.is_some())
            .finish()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Session {
    /// Session backed by the built-in voxel and closest-point engines.
    pub fn new(config: Config) -> Self {
        let comparison_engine = VoxelComparisonEngine::new(
            config.comparison.voxel_spacing_mm,
            config.comparison.max_grid_dim,
        );
        Self::with_engines(config, Box::new(comparison_engine), Box::new(ClosestPointDistance))
    }

    pub fn with_engines(
        config: Config,
        comparison_engine: Box<dyn ComparisonEngine>,
        distance_engine: Box<dyn DistanceEngine>,
    ) -> Self {
        Self {
            config,
            reference: None,
            comparison: None,
            comparison_engine,
            distance_engine,
            distance_map: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn comparison_engine(&self) -> &dyn ComparisonEngine {
        self.comparison_engine.as_ref()
    }

    pub fn distance_engine(&self) -> &dyn DistanceEngine {
        self.distance_engine.as_ref()
    }

    pub fn surface(&self, role: SurfaceRole) -> Option<&Surface> {
        match role {
            SurfaceRole::Reference => self.reference.as_ref(),
            SurfaceRole::Comparison => self.comparison.as_ref(),
        }
    }

    fn slot_mut(&mut self, role: SurfaceRole) -> &mut Option<Surface> {
        match role {
            SurfaceRole::Reference => &mut self.reference,
            SurfaceRole::Comparison => &mut self.comparison,
        }
    }

    fn require(&self, role: SurfaceRole) -> anyhow::Result<&Surface> {
        self.surface(role)
            .ok_or_else(|| anyhow!("{} model is not loaded", role))
    }

    fn require_mut(&mut self, role: SurfaceRole) -> anyhow::Result<&mut Surface> {
        self.slot_mut(role)
            .as_mut()
            .ok_or_else(|| anyhow!("{} model is not loaded", role))
    }

    /// Loads a model into `role`, using the configured color, visibility and opacity.
    ///
    /// A model with the same name already held in that slot is kept as is.
    pub fn try_load<P: AsRef<Path>>(&mut self, role: SurfaceRole, path: P) -> Result<&Surface, SurfaceError> {
        let path = path.as_ref();
        let name = path.file_stem().and_then(|s| s.to_str()).map(str::to_string);

        let already_loaded = matches!(
            (self.surface(role), name.as_deref()),
            (Some(existing), Some(n)) if existing.name == n
        );
        if !already_loaded {
            let models = &self.config.models;
            let color = match role {
                SurfaceRole::Reference => models.reference_color,
                SurfaceRole::Comparison => models.comparison_color,
            };
            let mut surface = Surface::load(path, color, models.visible)?;
            surface.opacity = opacity_from_percent(models.opacity_percent);

            *self.slot_mut(role) = Some(surface);
            self.distance_map = None;
        } else {
            log::info!("{} model already loaded, keeping it", role);
        }

        self.surface(role)
            .ok_or_else(|| SurfaceError::NotFound(path.to_path_buf()))
    }

    /// Success flag variant of [`Session::try_load`]; failures are logged and
    /// leave the slot untouched.
    pub fn load<P: AsRef<Path>>(&mut self, role: SurfaceRole, path: P) -> bool {
        match self.try_load(role, path) {
            Ok(_) => true,
            Err(e) => {
                log::error!("ERROR: {}", e);
                false
            }
        }
    }

    pub fn set_visibility(&mut self, role: SurfaceRole, visible: bool) -> anyhow::Result<()> {
        self.require_mut(role)?.visible = visible;
        Ok(())
    }

    /// Sets opacity from a 0-100 value and returns the normalized opacity.
    pub fn set_opacity_percent(&mut self, role: SurfaceRole, percent: f64) -> anyhow::Result<f64> {
        let opacity = opacity_from_percent(percent);
        self.require_mut(role)?.opacity = opacity;
        log::debug!("{} opacity {}", role, opacity);
        Ok(opacity)
    }

    pub fn set_color(&mut self, role: SurfaceRole, color: [f64; 3]) -> anyhow::Result<()> {
        self.require_mut(role)?.color = color.map(|c| c.clamp(0.0, 1.0));
        Ok(())
    }

    /// Rotates the comparison model onto the reference and hardens the result.
    pub fn align(&mut self) -> anyhow::Result<()> {
        let surface = self.require_mut(SurfaceRole::Comparison)?;
        align_surface(surface);
        // scalars no longer match the moved geometry
        self.distance_map = None;
        Ok(())
    }

    fn output_dir<'a>(&'a self, output_dir: Option<&'a Path>) -> &'a Path {
        output_dir.unwrap_or(self.config.output.directory.as_path())
    }

    /// Writes `dice.csv` for the loaded pair.
    pub fn save_dice(&self, stats: &DiceStatistics, output_dir: Option<&Path>) -> anyhow::Result<PathBuf> {
        let reference = self.require(SurfaceRole::Reference)?;
        let comparison = self.require(SurfaceRole::Comparison)?;
        write_dice_csv(self.output_dir(output_dir), &reference.name, &comparison.name, stats)
    }

    /// Writes `hausdorff.csv` for the loaded pair.
    pub fn save_hausdorff(
        &self,
        stats: &HausdorffStatistics,
        output_dir: Option<&Path>,
    ) -> anyhow::Result<PathBuf> {
        let reference = self.require(SurfaceRole::Reference)?;
        let comparison = self.require(SurfaceRole::Comparison)?;
        write_hausdorff_csv(self.output_dir(output_dir), &reference.name, &comparison.name, stats)
    }

    /// Computes Dice statistics and writes `dice.csv`.
    pub fn compute_dice(&self, output_dir: Option<&Path>) -> anyhow::Result<DiceStatistics> {
        let reference = self.require(SurfaceRole::Reference)?;
        let comparison = self.require(SurfaceRole::Comparison)?;

        let stats = self
            .comparison_engine
            .dice(reference, comparison)
            .with_context(|| format!("{} engine failed computing Dice", self.comparison_engine.name()))?;
        self.save_dice(&stats, output_dir)?;
        Ok(stats)
    }

    /// Computes Hausdorff statistics and writes `hausdorff.csv`.
    pub fn compute_hausdorff(&self, output_dir: Option<&Path>) -> anyhow::Result<HausdorffStatistics> {
        let reference = self.require(SurfaceRole::Reference)?;
        let comparison = self.require(SurfaceRole::Comparison)?;

        let stats = self
            .comparison_engine
            .hausdorff(reference, comparison)
            .with_context(|| {
                format!("{} engine failed computing Hausdorff", self.comparison_engine.name())
            })?;
        self.save_hausdorff(&stats, output_dir)?;
        Ok(stats)
    }

    /// Distance of every comparison vertex to the reference surface, colored
    /// with the configured preset and range.
    pub fn compute_distance_map(&mut self) -> anyhow::Result<&DistanceMap> {
        let reference = self.require(SurfaceRole::Reference)?;
        let comparison = self.require(SurfaceRole::Comparison)?;
        let settings = &self.config.distance_map;

        let scalars = self
            .distance_engine
            .distances(comparison, reference, settings.signed)
            .with_context(|| format!("{} engine failed", self.distance_engine.name()))?;

        let mut map = DistanceMap::new(comparison.name.clone(), scalars, settings.signed, settings.preset);
        if let Some(range) = settings.range {
            map.set_range(range.min, range.max)?;
        }
        map.set_legend_visible(settings.show_legend);
        log::info!(
            "distance map for {}: range [{:.3}, {:.3}] mm",
            map.surface_name,
            map.range.min,
            map.range.max
        );

        Ok(&*self.distance_map.insert(map))
    }

    pub fn distance_map(&self) -> Option<&DistanceMap> {
        self.distance_map.as_ref()
    }

    fn require_distance_map(&mut self) -> anyhow::Result<&mut DistanceMap> {
        self.distance_map
            .as_mut()
            .ok_or_else(|| anyhow!("no distance map, compute it first"))
    }

    pub fn set_color_range(&mut self, min: f64, max: f64) -> anyhow::Result<()> {
        self.require_distance_map()?.set_range(min, max)?;
        Ok(())
    }

    pub fn reset_color_range(&mut self) -> anyhow::Result<()> {
        self.require_distance_map()?.auto_range();
        Ok(())
    }

    pub fn set_color_preset(&mut self, preset: ColorMapPreset) -> anyhow::Result<()> {
        self.require_distance_map()?.set_preset(preset);
        Ok(())
    }

    pub fn set_legend_visible(&mut self, visible: bool) -> anyhow::Result<()> {
        self.require_distance_map()?.set_legend_visible(visible);
        Ok(())
    }

    pub fn write_distance_map(&self, output_dir: Option<&Path>) -> anyhow::Result<DistanceMapFiles> {
        let map = self
            .distance_map
            .as_ref()
            .ok_or_else(|| anyhow!("no distance map, compute it first"))?;
        let comparison = self.require(SurfaceRole::Comparison)?;
        write_distance_map(map, comparison, self.output_dir(output_dir))
    }

    /// Saves the current (possibly aligned) geometry of a model as STL.
    pub fn export_surface(&self, role: SurfaceRole, path: &Path) -> anyhow::Result<PathBuf> {
        write_stl(path, self.require(role)?)?;
        Ok(path.to_path_buf())
    }
}
