use anyhow::{anyhow, Context};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use crate::io::Surface;
use crate::processing::comparison::{DiceStatistics, HausdorffStatistics};

pub const DICE_CSV: &str = "dice.csv";
pub const HAUSDORFF_CSV: &str = "hausdorff.csv";

#[derive(Debug, Serialize)]
struct DiceRecord<'a> {
    #[serde(rename = "Reference segment")]
    reference: &'a str,
    #[serde(rename = "Compare segment")]
    compare: &'a str,
    #[serde(rename = "Dice coefficient")]
    dice_coefficient: f64,
    #[serde(rename = "True positives (%)")]
    true_positives: f64,
    #[serde(rename = "True negatives (%)")]
    true_negatives: f64,
    #[serde(rename = "False positives (%)")]
    false_positives: f64,
    #[serde(rename = "False negatives (%)")]
    false_negatives: f64,
    #[serde(rename = "Reference center")]
    reference_center: String,
    #[serde(rename = "Compare center")]
    compare_center: String,
    #[serde(rename = "Reference volume (cc)")]
    reference_volume_cc: f64,
    #[serde(rename = "Compare volume (cc)")]
    compare_volume_cc: f64,
}

#[derive(Debug, Serialize)]
struct HausdorffRecord<'a> {
    #[serde(rename = "Reference segment")]
    reference: &'a str,
    #[serde(rename = "Compare segment")]
    compare: &'a str,
    #[serde(rename = "Maximum (mm)")]
    maximum_mm: f64,
    #[serde(rename = "Average (mm)")]
    average_mm: f64,
    #[serde(rename = "95% (mm)")]
    percentile_95_mm: f64,
}

fn format_center(center: &[f64; 3]) -> String {
    format!("{:.3} {:.3} {:.3}", center[0], center[1], center[2])
}

fn ensure_dir(output_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Could not create output directory: {:?}", output_dir))
}

/// Writes `dice.csv` into `output_dir` and returns its path.
pub fn write_dice_csv(
    output_dir: &Path,
    reference: &str,
    compare: &str,
    stats: &DiceStatistics,
) -> anyhow::Result<PathBuf> {
    ensure_dir(output_dir)?;
    let path = output_dir.join(DICE_CSV);
    let mut wtr = csv::Writer::from_path(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    wtr.serialize(DiceRecord {
        reference,
        compare,
        dice_coefficient: stats.dice_coefficient,
        true_positives: stats.true_positives_percent,
        true_negatives: stats.true_negatives_percent,
        false_positives: stats.false_positives_percent,
        false_negatives: stats.false_negatives_percent,
        reference_center: format_center(&stats.reference_center),
        compare_center: format_center(&stats.compare_center),
        reference_volume_cc: stats.reference_volume_cc,
        compare_volume_cc: stats.compare_volume_cc,
    })?;
    wtr.flush()?;

    log::info!("Dice statistics written to {}", path.display());
    Ok(path)
}

/// Writes `hausdorff.csv` into `output_dir` and returns its path.
pub fn write_hausdorff_csv(
    output_dir: &Path,
    reference: &str,
    compare: &str,
    stats: &HausdorffStatistics,
) -> anyhow::Result<PathBuf> {
    ensure_dir(output_dir)?;
    let path = output_dir.join(HAUSDORFF_CSV);
    let mut wtr = csv::Writer::from_path(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    wtr.serialize(HausdorffRecord {
        reference,
        compare,
        maximum_mm: stats.maximum_mm,
        average_mm: stats.average_mm,
        percentile_95_mm: stats.percentile_95_mm,
    })?;
    wtr.flush()?;

    log::info!("Hausdorff statistics written to {}", path.display());
    Ok(path)
}

/// Exports the (hardened) surface geometry as binary STL.
pub fn write_stl(path: &Path, surface: &Surface) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    let to_vector = |x: f64, y: f64, z: f64| stl_io::Vector::new([x as f32, y as f32, z as f32]);

    let triangles: Vec<stl_io::Triangle> = (0..surface.triangles.len())
        .map(|i| {
            let n = surface.face_normal(i);
            let [a, b, c] = surface.triangle(i);
            stl_io::Triangle {
                normal: to_vector(n.x, n.y, n.z),
                vertices: [
                    to_vector(a.x, a.y, a.z),
                    to_vector(b.x, b.y, b.z),
                    to_vector(c.x, c.y, c.z),
                ],
            }
        })
        .collect();

    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    stl_io::write_stl(&mut writer, triangles.iter())
        .map_err(|e| anyhow!("Failed to write STL {}: {}", path.display(), e))?;

    log::info!("{} exported to {}", surface.name, path.display());
    Ok(())
}
