use crate::{calibration::CalibrationParams, mesh::Mesh};

/// Row of the color ramp texture every coordinate samples
const RAMP_ROW: f32 = 0.5;

/// Windows per-vertex color samples onto a horizontal color ramp.
///
/// Samples at or below the window threshold land on `u = 0`, the brightest
/// representable sample on `u = 1`, linear in between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColorMapper {
    low: i32,
    high: i32,
}

impl ColorMapper {
    /// Window from the raw noise threshold up to full intensity, both in the
    /// same display units marching cubes writes into `Mesh::colors`
    pub fn new(calibration: &CalibrationParams, threshold: u8) -> Self {
        Self {
            low: calibration.window_threshold(threshold),
            high: calibration.display_value(u8::MAX),
        }
    }

    pub fn window(&self) -> (i32, i32) {
        (self.low, self.high)
    }

    pub fn map(&self, color: i32) -> [f32; 2] {
        let u = if self.high > self.low {
            ((color - self.low) as f32 / (self.high - self.low) as f32).clamp(0.0, 1.0)
        } else if color >= self.low {
            1.0
        } else {
            0.0
        };
        [u, RAMP_ROW]
    }

    pub fn map_all(&self, colors: &[i32]) -> Vec<[f32; 2]> {
        colors.iter().map(|&c| self.map(c)).collect()
    }
}

impl Mesh {
    /// Fills `uvs` from `colors`
    pub fn compute_uvs(&mut self, mapper: &ColorMapper) {
        self.uvs = mapper.map_all(&self.colors);
    }
}
