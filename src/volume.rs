use log::debug;
use ndarray::Array3;
use ndarray::ArrayView2;
use ndarray::ShapeError;
use ndarray::s;
use rayon::prelude::*;

/// Dense grid of 8-bit intensities, indexed `[z, y, x]`.
///
/// Slices are stacked along z; within a slice rows run along y and columns
/// along x, so x is the fastest-varying axis in memory.
#[derive(Clone, Debug, PartialEq)]
pub struct Volume {
    pub data: Array3<u8>,
    /// Row spacing, column spacing and slice thickness when the series
    /// carries them
    pub spacing: Option<(f32, f32, f32)>,
}

impl Volume {
    /// Wraps a sample grid.
    ///
    /// # Panics
    ///
    /// If any axis has zero extent.
    pub fn new(data: Array3<u8>) -> Self {
        let (depth, height, width) = data.dim();
        assert!(
            depth > 0 && height > 0 && width > 0,
            "volume must not be empty, got {width}x{height}x{depth}"
        );
        Self {
            data,
            spacing: None,
        }
    }

    /// Builds a volume from samples laid out x-fastest, then y, then z
    pub fn from_shape_vec(
        (dim_x, dim_y, dim_z): (usize, usize, usize),
        samples: Vec<u8>,
    ) -> Result<Self, ShapeError> {
        Ok(Self::new(Array3::from_shape_vec(
            (dim_z, dim_y, dim_x),
            samples,
        )?))
    }

    /// Builds a volume by evaluating `f(x, y, z)` at every grid point
    pub fn from_fn(
        (dim_x, dim_y, dim_z): (usize, usize, usize),
        mut f: impl FnMut(usize, usize, usize) -> u8,
    ) -> Self {
        Self::new(Array3::from_shape_fn((dim_z, dim_y, dim_x), |(z, y, x)| {
            f(x, y, z)
        }))
    }

    pub fn with_spacing(mut self, spacing: (f32, f32, f32)) -> Self {
        self.spacing = Some(spacing);
        self
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn dim_x(&self) -> usize {
        self.data.dim().2
    }

    pub fn dim_y(&self) -> usize {
        self.data.dim().1
    }

    pub fn dim_z(&self) -> usize {
        self.data.dim().0
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array3<u8> {
        &self.data
    }

    /// Sample at grid coordinate `(x, y, z)`
    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> u8 {
        self.data[[z, y, x]]
    }

    /// One slice along the stacking axis, as `[y, x]`
    pub fn slice(&self, z: usize) -> Option<ArrayView2<'_, u8>> {
        (z < self.dim_z()).then(|| self.data.slice(s![z, .., ..]))
    }

    /// Zeroes every sample strictly below `threshold`, in place
    pub fn suppress_noise(&mut self, threshold: u8) {
        self.data
            .par_mapv_inplace(|v| if v < threshold { 0 } else { v });
        debug!(
            "noise suppression at {threshold}: {} of {} samples remain",
            self.count_nonzero(),
            self.data.len()
        );
    }

    pub fn count_nonzero(&self) -> usize {
        self.data.par_iter().filter(|&&v| v != 0).count()
    }

    /// Smallest and largest sample
    pub fn intensity_range(&self) -> (u8, u8) {
        self.data
            .iter()
            .fold((u8::MAX, u8::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    }
}
