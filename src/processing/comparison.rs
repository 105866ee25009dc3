use anyhow::{bail, Context};
use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use serde::Serialize;

use super::distance::ClosestPointDistance;
use crate::io::Surface;
use crate::utils::stats::{mean, percentile};

/// Overlap statistics of a reference and a compare segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiceStatistics {
    pub dice_coefficient: f64,
    pub true_positives_percent: f64,
    pub true_negatives_percent: f64,
    pub false_positives_percent: f64,
    pub false_negatives_percent: f64,
    pub reference_center: [f64; 3],
    pub compare_center: [f64; 3],
    pub reference_volume_cc: f64,
    pub compare_volume_cc: f64,
}

/// Symmetric surface-to-surface distance statistics, in mm.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HausdorffStatistics {
    pub maximum_mm: f64,
    pub average_mm: f64,
    pub percentile_95_mm: f64,
}

/// Computes comparison statistics for two segments.
///
/// Both operations take the reference first. Callers are responsible for
/// spatially aligning the surfaces beforehand.
pub trait ComparisonEngine: Send + Sync {
    fn name(&self) -> &str;

    fn dice(&self, reference: &Surface, compare: &Surface) -> anyhow::Result<DiceStatistics>;

    fn hausdorff(&self, reference: &Surface, compare: &Surface) -> anyhow::Result<HausdorffStatistics>;
}

pub const DEFAULT_VOXEL_SPACING_MM: f64 = 0.5;
pub const DEFAULT_MAX_GRID_DIM: usize = 256;

// Sub-voxel offsets keep scanlines off shared triangle edges.
const ROW_JITTER_Y: f64 = 1.317e-4;
const ROW_JITTER_Z: f64 = 2.713e-4;

// Caps samples per edge so very coarse triangles stay bounded.
const MAX_EDGE_SUBDIVISIONS: usize = 64;

/// Voxelizes both closed surfaces on a shared grid for Dice. Hausdorff samples
/// each surface at roughly voxel spacing and measures to the other surface.
#[derive(Debug, Clone)]
pub struct VoxelComparisonEngine {
    pub voxel_spacing_mm: f64,
    pub max_grid_dim: usize,
    distance: ClosestPointDistance,
}

impl Default for VoxelComparisonEngine {
    fn default() -> Self {
        Self::new(DEFAULT_VOXEL_SPACING_MM, DEFAULT_MAX_GRID_DIM)
    }
}

impl VoxelComparisonEngine {
    pub fn new(voxel_spacing_mm: f64, max_grid_dim: usize) -> Self {
        Self {
            voxel_spacing_mm,
            max_grid_dim: max_grid_dim.max(1),
            distance: ClosestPointDistance,
        }
    }
}

#[derive(Debug, Clone)]
struct VoxelGrid {
    origin: Point3<f64>,
    spacing: f64,
    dims: [usize; 3],
}

impl VoxelGrid {
    /// Grid covering both surfaces plus a one voxel margin.
    fn enclosing(a: &Surface, b: &Surface, spacing: f64, max_dim: usize) -> anyhow::Result<Self> {
        let (alo, ahi) = a.bounds().context("reference surface has no vertices")?;
        let (blo, bhi) = b.bounds().context("compare surface has no vertices")?;
        let lo = alo.inf(&blo);
        let hi = ahi.sup(&bhi);
        let extent = hi - lo;

        let spacing = spacing.max(extent.max() / max_dim.saturating_sub(2).max(1) as f64);
        if !(spacing.is_finite() && spacing > 0.0) {
            bail!("invalid voxel spacing {}", spacing);
        }

        let margin = Vector3::repeat(spacing);
        let origin = lo - margin;
        let padded = extent + margin * 2.0;
        let dim = |e: f64| ((e / spacing).ceil() as usize).clamp(1, max_dim.max(1));

        Ok(Self {
            origin,
            spacing,
            dims: [dim(padded.x), dim(padded.y), dim(padded.z)],
        })
    }

    fn len(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    fn center(&self, i: usize, j: usize, k: usize) -> Point3<f64> {
        self.origin
            + Vector3::new(i as f64 + 0.5, j as f64 + 0.5, k as f64 + 0.5) * self.spacing
    }

    fn voxel_volume_cc(&self) -> f64 {
        // mm^3 -> cc
        self.spacing.powi(3) / 1000.0
    }
}

/// Marks voxels whose centers lie inside the closed surface, row by row along x,
/// using the non-zero winding rule on signed scanline crossings.
fn voxelize(surface: &Surface, grid: &VoxelGrid) -> Vec<bool> {
    let [nx, ny, nz] = grid.dims;

    // bucket triangles by the z rows they can intersect
    let mut by_row_z: Vec<Vec<usize>> = vec![Vec::new(); nz];
    for t in 0..surface.triangles.len() {
        let [a, b, c] = surface.triangle(t);
        let zmin = a.z.min(b.z).min(c.z);
        let zmax = a.z.max(b.z).max(c.z);
        let to_row = |z: f64| ((z - grid.origin.z) / grid.spacing - 0.5).max(0.0);
        let k0 = to_row(zmin).floor() as usize;
        let k1 = (to_row(zmax).ceil() as usize).min(nz - 1);
        for bucket in by_row_z.iter_mut().take(k1 + 1).skip(k0) {
            bucket.push(t);
        }
    }

    (0..ny * nz)
        .into_par_iter()
        .flat_map_iter(|row| {
            let j = row % ny;
            let k = row / ny;
            let y = grid.origin.y + (j as f64 + 0.5 + ROW_JITTER_Y) * grid.spacing;
            let z = grid.origin.z + (k as f64 + 0.5 + ROW_JITTER_Z) * grid.spacing;

            let mut crossings: Vec<(f64, i32)> = by_row_z[k]
                .iter()
                .filter_map(|&t| scanline_crossing(surface, t, y, z))
                .collect();
            crossings.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            let mut inside = Vec::with_capacity(nx);
            let mut winding = 0;
            let mut next = 0;
            for i in 0..nx {
                let x = grid.origin.x + (i as f64 + 0.5) * grid.spacing;
                while next < crossings.len() && crossings[next].0 < x {
                    winding += crossings[next].1;
                    next += 1;
                }
                inside.push(winding != 0);
            }
            inside
        })
        .collect()
}

/// Intersection of the line {(s, y, z)} with triangle `t`, as (x, orientation).
fn scanline_crossing(surface: &Surface, t: usize, y: f64, z: f64) -> Option<(f64, i32)> {
    let [a, b, c] = surface.triangle(t);

    // barycentric coordinates in the yz projection
    let area = (b.y - a.y) * (c.z - a.z) - (c.y - a.y) * (b.z - a.z);
    if area.abs() < f64::EPSILON {
        return None;
    }
    let w_b = ((y - a.y) * (c.z - a.z) - (c.y - a.y) * (z - a.z)) / area;
    let w_c = ((b.y - a.y) * (z - a.z) - (y - a.y) * (b.z - a.z)) / area;
    let w_a = 1.0 - w_b - w_c;
    if w_a < 0.0 || w_b < 0.0 || w_c < 0.0 {
        return None;
    }

    let x = w_a * a.x + w_b * b.x + w_c * c.x;
    Some((x, if area > 0.0 { 1 } else { -1 }))
}

fn mask_center(mask: &[bool], grid: &VoxelGrid) -> Option<[f64; 3]> {
    let [nx, ny, _] = grid.dims;
    let mut sum = Vector3::<f64>::zeros();
    let mut count = 0usize;
    for (idx, &m) in mask.iter().enumerate() {
        if !m {
            continue;
        }
        let i = idx % nx;
        let j = (idx / nx) % ny;
        let k = idx / (nx * ny);
        sum += grid.center(i, j, k).coords;
        count += 1;
    }
    (count > 0).then(|| {
        let c = sum / count as f64;
        [c.x, c.y, c.z]
    })
}

impl ComparisonEngine for VoxelComparisonEngine {
    fn name(&self) -> &str {
        "voxel"
    }

    fn dice(&self, reference: &Surface, compare: &Surface) -> anyhow::Result<DiceStatistics> {
        for surface in [reference, compare] {
            if !surface.watertight {
                bail!("{} is not a closed surface, cannot compute overlap", surface.name);
            }
        }

        let grid = VoxelGrid::enclosing(reference, compare, self.voxel_spacing_mm, self.max_grid_dim)?;
        log::debug!(
            "voxelizing on {}x{}x{} grid, spacing {:.3} mm",
            grid.dims[0],
            grid.dims[1],
            grid.dims[2],
            grid.spacing
        );

        let ref_mask = voxelize(reference, &grid);
        let cmp_mask = voxelize(compare, &grid);

        let (mut tp, mut fp, mut fn_, mut tn) = (0usize, 0usize, 0usize, 0usize);
        for (&r, &c) in ref_mask.iter().zip(cmp_mask.iter()) {
            match (r, c) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (true, false) => fn_ += 1,
                (false, false) => tn += 1,
            }
        }

        let denom = 2 * tp + fp + fn_;
        // two empty segments are considered identical
        let dice_coefficient = if denom == 0 {
            1.0
        } else {
            (2 * tp) as f64 / denom as f64
        };

        let total = grid.len() as f64;
        let percent = |n: usize| 100.0 * n as f64 / total;
        let fallback = |s: &Surface| {
            let c = s.centroid();
            [c.x, c.y, c.z]
        };

        let stats = DiceStatistics {
            dice_coefficient,
            true_positives_percent: percent(tp),
            true_negatives_percent: percent(tn),
            false_positives_percent: percent(fp),
            false_negatives_percent: percent(fn_),
            reference_center: mask_center(&ref_mask, &grid).unwrap_or_else(|| fallback(reference)),
            compare_center: mask_center(&cmp_mask, &grid).unwrap_or_else(|| fallback(compare)),
            reference_volume_cc: (tp + fn_) as f64 * grid.voxel_volume_cc(),
            compare_volume_cc: (tp + fp) as f64 * grid.voxel_volume_cc(),
        };

        log::info!(
            "Dice coefficient {} vs {}: {:.4}",
            reference.name,
            compare.name,
            stats.dice_coefficient
        );
        Ok(stats)
    }

    fn hausdorff(&self, reference: &Surface, compare: &Surface) -> anyhow::Result<HausdorffStatistics> {
        let spacing = self.voxel_spacing_mm;
        let mut all = self
            .distance
            .point_distances(&surface_samples(reference, spacing), compare, false)
            .context("reference to compare distances failed")?;
        all.extend(
            self.distance
                .point_distances(&surface_samples(compare, spacing), reference, false)
                .context("compare to reference distances failed")?,
        );

        let average_mm = mean(&all).context("surfaces have no vertices")?;
        let maximum_mm = all.iter().copied().fold(0.0, f64::max);
        let percentile_95_mm = percentile(&mut all, 0.95).context("surfaces have no vertices")?;

        log::info!(
            "Hausdorff distance {} vs {}: max {:.3} mm, mean {:.3} mm",
            reference.name,
            compare.name,
            maximum_mm,
            average_mm
        );

        Ok(HausdorffStatistics {
            maximum_mm,
            average_mm,
            percentile_95_mm,
        })
    }
}

fn subdivisions(length: f64, spacing: f64) -> usize {
    if !(spacing > 0.0) || !length.is_finite() {
        return 1;
    }
    ((length / spacing).ceil() as usize).clamp(1, MAX_EDGE_SUBDIVISIONS)
}

/// Vertices, plus points along every edge and across every triangle no more
/// than `spacing` apart. Shared edges are sampled once.
pub fn surface_samples(surface: &Surface, spacing: f64) -> Vec<Point3<f64>> {
    let mut samples = surface.vertices.clone();

    let mut edges: Vec<(usize, usize)> = surface
        .triangles
        .iter()
        .flat_map(|t| [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])])
        .map(|(a, b)| (a.min(b), a.max(b)))
        .collect();
    edges.sort_unstable();
    edges.dedup();

    for (a, b) in edges {
        let (pa, pb) = (surface.vertices[a], surface.vertices[b]);
        let n = subdivisions((pb - pa).norm(), spacing);
        for i in 1..n {
            samples.push(pa + (pb - pa) * (i as f64 / n as f64));
        }
    }

    for t in 0..surface.triangles.len() {
        let [a, b, c] = surface.triangle(t);
        let longest = (b - a).norm().max((c - b).norm()).max((a - c).norm());
        let n = subdivisions(longest, spacing);
        // strictly interior barycentric lattice points
        for i in 1..n {
            for j in 1..(n - i) {
                let u = i as f64 / n as f64;
                let v = j as f64 / n as f64;
                samples.push(a + (b - a) * u + (c - a) * v);
            }
        }
    }

    samples
}
