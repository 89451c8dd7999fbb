//! Equal-loudness weighting per band
//!
//! Piecewise fit of the ISO 226 60 phon contour in log-frequency, used to
//! flatten the perceived response of the bars.

/// Contour level in dB at `freq` Hz
fn contour(freq: f64) -> f64 {
    let l = freq.log10();
    if freq <= 800.0 {
        (-14.424 * l + 91.472) * l - 143.88
    } else if freq < 2000.0 {
        ((530.0 * l - 4875.5) * l + 14926.688) * l - 15210.564
    } else {
        (-101.5 * l + 708.3) * l - 1232.1
    }
}

/// Weight table for `band_count` bands spaced `frequency_step` Hz apart.
///
/// Band `i` sits at `(i + 1) * frequency_step` Hz. The `1 / cbrt(window_len)`
/// factor keeps amplitudes comparable across window sizes.
pub fn weighting(band_count: usize, frequency_step: u32, window_len: usize) -> Vec<f32> {
    let norm = 1.0 / (window_len as f64).cbrt();
    (0..band_count)
        .map(|i| {
            let freq = (i + 1) as f64 * frequency_step as f64;
            (2f64.powf(contour(freq) / 18.06) * norm) as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected(level: f64, window_len: usize) -> f32 {
        (2f64.powf(level / 18.06) / (window_len as f64).cbrt()) as f32
    }

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() <= expected.abs() * 1e-5,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_low_range_includes_800hz() {
        let weights = weighting(30, 100, 441);
        let l = 800f64.log10();
        assert_close(weights[7], expected((-14.424 * l + 91.472) * l - 143.88, 441));
    }

    #[test]
    fn test_mid_range() {
        let weights = weighting(30, 100, 441);
        let l = 1100f64.log10();
        let level = ((530.0 * l - 4875.5) * l + 14926.688) * l - 15210.564;
        assert_close(weights[10], expected(level, 441));
    }

    #[test]
    fn test_high_range_starts_at_2000hz() {
        let weights = weighting(30, 100, 441);
        let l = 2000f64.log10();
        assert_close(weights[19], expected((-101.5 * l + 708.3) * l - 1232.1, 441));
    }

    #[test]
    fn test_table_is_deterministic() {
        assert_eq!(weighting(64, 10, 4410), weighting(64, 10, 4410));
        assert_eq!(weighting(64, 10, 4410).len(), 64);
        assert!(weighting(0, 10, 4410).is_empty());
    }

    #[test]
    fn test_longer_window_scales_down() {
        let short = weighting(8, 10, 1000);
        let long = weighting(8, 10, 8000);
        for (s, l) in short.iter().zip(&long) {
            assert_close(*l * 2.0, *s);
        }
    }
}
