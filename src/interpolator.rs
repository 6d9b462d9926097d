pub(crate) struct Interpolator;

impl Interpolator {
    /// Fraction along an edge from its low corner to its high corner where
    /// the field reaches `isovalue`, clamped to `[0, 1]`
    #[inline]
    pub(crate) fn edge_fraction(isovalue: u8, low: u8, high: u8) -> f32 {
        if high == low {
            return 0.0;
        }
        let t = (isovalue as f32 - low as f32) / (high as f32 - low as f32);
        t.clamp(0.0, 1.0)
    }

    #[inline]
    pub(crate) fn lerp(a: [f32; 3], b: [f32; 3], t: f32) -> [f32; 3] {
        let one_minus_t = 1.0 - t;
        [
            a[0].mul_add(one_minus_t, b[0] * t),
            a[1].mul_add(one_minus_t, b[1] * t),
            a[2].mul_add(one_minus_t, b[2] * t),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn fraction_hits_isovalue() {
        assert_relative_eq!(Interpolator::edge_fraction(100, 0, 200), 0.5);
        assert_relative_eq!(Interpolator::edge_fraction(150, 100, 200), 0.5);
        assert_relative_eq!(Interpolator::edge_fraction(200, 0, 200), 1.0);
    }

    #[test]
    fn fraction_is_clamped() {
        assert_eq!(Interpolator::edge_fraction(10, 50, 200), 0.0);
        assert_eq!(Interpolator::edge_fraction(250, 50, 200), 1.0);
        assert_eq!(Interpolator::edge_fraction(80, 80, 80), 0.0);
    }

    #[test]
    fn lerp_endpoints() {
        let a = [1.0, 2.0, 3.0];
        let b = [3.0, 2.0, 1.0];
        assert_eq!(Interpolator::lerp(a, b, 0.0), a);
        assert_eq!(Interpolator::lerp(a, b, 1.0), b);
        assert_eq!(Interpolator::lerp(a, b, 0.5), [2.0, 2.0, 2.0]);
    }
}
