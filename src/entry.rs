use anyhow::{anyhow, Context, Result};
use crossbeam::thread;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::processing::comparison::{DiceStatistics, HausdorffStatistics};
use crate::session::{Session, SurfaceRole};
use crate::texture::DistanceMapFiles;

pub const SUMMARY_JSON: &str = "comparison_summary.json";

/// Everything one comparison run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub reference: String,
    pub comparison: String,
    pub aligned: bool,
    pub dice: DiceStatistics,
    pub hausdorff: HausdorffStatistics,
    pub distance_range: (f64, f64),
    pub output_dir: PathBuf,
    #[serde(skip)]
    pub distance_files: Option<DistanceMapFiles>,
}

/// Loads both models, optionally aligns the comparison model, then computes
/// Dice and Hausdorff in parallel, followed by the distance map.
pub fn run_comparison(
    reference_path: &Path,
    comparison_path: &Path,
    output_dir: Option<&Path>,
    align: bool,
    config: Config,
) -> Result<ComparisonReport> {
    let mut session = Session::new(config);
    let output_dir = output_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| session.config().output.directory.clone());

    session
        .try_load(SurfaceRole::Reference, reference_path)
        .context("loading reference model failed")?;
    session
        .try_load(SurfaceRole::Comparison, comparison_path)
        .context("loading comparison model failed")?;

    if align {
        session.align()?;
    }

    let (dice, hausdorff) = {
        let reference = session
            .surface(SurfaceRole::Reference)
            .ok_or_else(|| anyhow!("reference model missing"))?;
        let comparison = session
            .surface(SurfaceRole::Comparison)
            .ok_or_else(|| anyhow!("comparison model missing"))?;
        let engine = session.comparison_engine();

        let (dice, hausdorff) = thread::scope(|s| -> Result<_> {
            let dice_handle = s.spawn(|_| {
                engine
                    .dice(reference, comparison)
                    .context("Dice computation failed")
            });
            let hausdorff_handle = s.spawn(|_| {
                engine
                    .hausdorff(reference, comparison)
                    .context("Hausdorff computation failed")
            });

            let dice = dice_handle
                .join()
                .map_err(|_| anyhow!("Dice thread panicked"))??;
            let hausdorff = hausdorff_handle
                .join()
                .map_err(|_| anyhow!("Hausdorff thread panicked"))??;
            Ok((dice, hausdorff))
        })
        .map_err(|panic_payload| anyhow!("comparison threads panicked: {:?}", panic_payload))??;
        (dice, hausdorff)
    };
    session.save_dice(&dice, Some(&output_dir))?;
    session.save_hausdorff(&hausdorff, Some(&output_dir))?;

    let distance_range = {
        let map = session.compute_distance_map()?;
        (map.range.min, map.range.max)
    };
    let distance_files = session.write_distance_map(Some(&output_dir))?;

    let report = ComparisonReport {
        reference: session
            .surface(SurfaceRole::Reference)
            .map(|s| s.name.clone())
            .unwrap_or_default(),
        comparison: session
            .surface(SurfaceRole::Comparison)
            .map(|s| s.name.clone())
            .unwrap_or_default(),
        aligned: align,
        dice,
        hausdorff,
        distance_range,
        output_dir: output_dir.clone(),
        distance_files: Some(distance_files),
    };

    let summary_path = output_dir.join(SUMMARY_JSON);
    let file = File::create(&summary_path)
        .with_context(|| format!("Failed to create {}", summary_path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &report)?;

    log::info!(
        "comparison {} vs {} done: Dice {:.4}, Hausdorff {:.3} mm",
        report.reference,
        report.comparison,
        report.dice.dice_coefficient,
        report.hausdorff.maximum_mm
    );

    Ok(report)
}

#[cfg(test)]
mod entry_tests {
    use super::*;
    use crate::utils::test_utils::{cube_surface, write_ascii_stl};
    use approx::assert_relative_eq;

    #[test]
    fn test_run_comparison_with_alignment() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("Liver1.stl");
        let comparison = dir.path().join("Liver1beforeMM.stl");
        write_ascii_stl(&reference, &cube_surface("Liver1", [0.0, 0.0, 0.0], 10.0)).unwrap();
        write_ascii_stl(
            &comparison,
            &cube_surface("Liver1beforeMM", [-10.0, -10.0, 0.0], 10.0),
        )
        .unwrap();
        let out = dir.path().join("out");

        let report = run_comparison(&reference, &comparison, Some(&out), true, Config::default()).unwrap();

        assert_eq!(report.reference, "Liver1");
        assert_eq!(report.comparison, "Liver1beforeMM");
        assert_relative_eq!(report.dice.dice_coefficient, 1.0, epsilon = 1e-9);
        assert_relative_eq!(report.hausdorff.maximum_mm, 0.0, epsilon = 1e-6);
        for name in ["dice.csv", "hausdorff.csv", "distance_map.csv", SUMMARY_JSON] {
            assert!(out.join(name).exists(), "missing {}", name);
        }

        let summary: serde_json::Value =
            serde_json::from_reader(File::open(out.join(SUMMARY_JSON)).unwrap()).unwrap();
        assert_eq!(summary["reference"], "Liver1");
        assert_eq!(summary["aligned"], true);
    }

    #[test]
    fn test_run_comparison_csvs_match_session_output() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("Liver1.stl");
        let comparison = dir.path().join("Liver1beforeMM.stl");
        write_ascii_stl(&reference, &cube_surface("Liver1", [0.0, 0.0, 0.0], 10.0)).unwrap();
        write_ascii_stl(&comparison, &cube_surface("Liver1beforeMM", [5.0, 0.0, 0.0], 10.0)).unwrap();

        let batch_out = dir.path().join("batch");
        run_comparison(&reference, &comparison, Some(&batch_out), false, Config::default()).unwrap();

        let session_out = dir.path().join("session");
        let mut session = Session::default();
        session.try_load(SurfaceRole::Reference, &reference).unwrap();
        session.try_load(SurfaceRole::Comparison, &comparison).unwrap();
        session.compute_dice(Some(&session_out)).unwrap();
        session.compute_hausdorff(Some(&session_out)).unwrap();

        for name in ["dice.csv", "hausdorff.csv"] {
            let batch = std::fs::read_to_string(batch_out.join(name)).unwrap();
            let single = std::fs::read_to_string(session_out.join(name)).unwrap();
            assert_eq!(batch, single, "{} differs", name);
        }
    }

    #[test]
    fn test_run_comparison_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_comparison(
            &dir.path().join("nope.stl"),
            &dir.path().join("nope2.stl"),
            Some(dir.path()),
            false,
            Config::default(),
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("loading reference model failed"));
    }
}
