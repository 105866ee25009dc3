use image::{ImageBuffer, Rgb, RgbImage};
use serde::Deserialize;
use std::str::FromStr;

use crate::error::DistanceMapError;

/// Lookup tables available for the distance map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum ColorMapPreset {
    /// blue (close) through green to red (far)
    #[default]
    ColdToHotRainbow,
    Rainbow,
    Grey,
}

impl ColorMapPreset {
    fn control_points(&self) -> &'static [(f64, [f64; 3])] {
        match self {
            ColorMapPreset::ColdToHotRainbow => &[
                (0.0, [0.0, 0.0, 1.0]),
                (0.25, [0.0, 1.0, 1.0]),
                (0.5, [0.0, 1.0, 0.0]),
                (0.75, [1.0, 1.0, 0.0]),
                (1.0, [1.0, 0.0, 0.0]),
            ],
            ColorMapPreset::Rainbow => &[
                (0.0, [1.0, 0.0, 0.0]),
                (0.2, [1.0, 1.0, 0.0]),
                (0.4, [0.0, 1.0, 0.0]),
                (0.6, [0.0, 1.0, 1.0]),
                (0.8, [0.0, 0.0, 1.0]),
                (1.0, [1.0, 0.0, 1.0]),
            ],
            ColorMapPreset::Grey => &[(0.0, [0.0, 0.0, 0.0]), (1.0, [1.0, 1.0, 1.0])],
        }
    }

    /// Color at normalized position `t`, clamped to [0, 1].
    pub fn color_at(&self, t: f64) -> [f64; 3] {
        let points = self.control_points();
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };

        for pair in points.windows(2) {
            let (t0, c0) = pair[0];
            let (t1, c1) = pair[1];
            if t <= t1 {
                let f = if t1 > t0 { (t - t0) / (t1 - t0) } else { 0.0 };
                return [
                    c0[0] + (c1[0] - c0[0]) * f,
                    c0[1] + (c1[1] - c0[1]) * f,
                    c0[2] + (c1[2] - c0[2]) * f,
                ];
            }
        }
        points[points.len() - 1].1
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColorMapPreset::ColdToHotRainbow => "ColdToHotRainbow",
            ColorMapPreset::Rainbow => "Rainbow",
            ColorMapPreset::Grey => "Grey",
        }
    }
}

impl FromStr for ColorMapPreset {
    type Err = DistanceMapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "coldtohotrainbow" | "cold_to_hot_rainbow" => Ok(ColorMapPreset::ColdToHotRainbow),
            "rainbow" => Ok(ColorMapPreset::Rainbow),
            "grey" | "gray" => Ok(ColorMapPreset::Grey),
            _ => Err(DistanceMapError::UnknownPreset(s.to_string())),
        }
    }
}

/// Inclusive scalar window mapped onto the lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ScalarRange {
    pub min: f64,
    pub max: f64,
}

impl ScalarRange {
    pub fn new(min: f64, max: f64) -> Result<Self, DistanceMapError> {
        if !min.is_finite() || !max.is_finite() {
            return Err(DistanceMapError::NonFinite { min, max });
        }
        if min > max {
            return Err(DistanceMapError::InvalidRange { min, max });
        }
        Ok(Self { min, max })
    }

    /// Position of `value` inside the window; values outside saturate.
    pub fn normalize(&self, value: f64) -> f64 {
        let width = self.max - self.min;
        if width <= 0.0 {
            return if value > self.min { 1.0 } else { 0.0 };
        }
        ((value - self.min) / width).clamp(0.0, 1.0)
    }
}

pub fn to_rgb8(color: [f64; 3]) -> [u8; 3] {
    color.map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
}

/// Vertical color bar with the range maximum at the top.
pub fn render_legend(preset: ColorMapPreset, width: u32, height: u32) -> RgbImage {
    let mut img = ImageBuffer::new(width.max(1), height.max(1));
    let rows = img.height();
    for y in 0..rows {
        let t = if rows > 1 {
            1.0 - y as f64 / (rows - 1) as f64
        } else {
            1.0
        };
        let pixel = Rgb(to_rgb8(preset.color_at(t)));
        for x in 0..img.width() {
            img.put_pixel(x, y, pixel);
        }
    }
    img
}
