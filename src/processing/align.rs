use nalgebra::{Rotation3, Vector3};
use std::f64::consts::PI;

use crate::io::Surface;

/// The comparison model is exported upside down relative to the reference.
pub const ALIGNMENT_ANGLE_RAD: f64 = -PI;

/// Fixed half-turn about the superior (z) axis.
pub fn alignment_rotation() -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Vector3::z_axis(), ALIGNMENT_ANGLE_RAD)
}

/// Applies the alignment rotation and hardens it into the geometry.
///
/// Not idempotent: a second call rotates another half-turn, which restores the
/// original coordinates. A transform that was already pending is composed
/// before the alignment rotation.
pub fn align_surface(surface: &mut Surface) {
    let pending = surface.transform.take().unwrap_or_else(Rotation3::identity);
    surface.set_transform(alignment_rotation() * pending);
    surface.harden_transform();
    log::info!("{} aligned and transform hardened", surface.name);
}
