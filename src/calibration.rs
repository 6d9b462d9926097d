/// Linear rescale pair read from the Rescale Intercept / Rescale Slope tags.
///
/// `calibrated = raw * slope + intercept`. A series without the tags yields
/// `intercept = 0, slope = 0`; check [`CalibrationParams::is_available`]
/// before treating the pair as a real rescale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CalibrationParams {
    pub intercept: i32,
    pub slope: u16,
}

impl CalibrationParams {
    /// The pair reported when the series carries no rescale tags
    pub const NONE: Self = Self {
        intercept: 0,
        slope: 0,
    };

    /// Full range of the stored values the intercept is expressed against
    const STORED_RANGE: f32 = 4096.0;

    pub fn new(intercept: i32, slope: u16) -> Self {
        Self { intercept, slope }
    }

    pub fn is_available(&self) -> bool {
        self.slope != 0
    }

    /// Applies the affine rescale to a raw sample
    pub fn calibrate(&self, raw: u8) -> i32 {
        raw as i32 * self.slope as i32 + self.intercept
    }

    /// Maps a raw 8-bit sample into display units.
    ///
    /// The intercept is scaled from the 12-bit stored range down to the 8-bit
    /// range the volume is decoded into: `raw * slope + intercept / 4096 * 255`,
    /// truncated toward zero. Without calibration the raw value passes through
    /// unchanged.
    pub fn display_value(&self, raw: u8) -> i32 {
        if !self.is_available() {
            return raw as i32;
        }
        let scaled = raw as f32 * self.slope as f32
            + self.intercept as f32 / Self::STORED_RANGE * 255.0;
        scaled as i32
    }

    /// Lower edge of the color window for a raw noise threshold
    pub fn window_threshold(&self, threshold: u8) -> i32 {
        self.display_value(threshold)
    }
}
