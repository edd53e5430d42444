use super::moving_average::{calculate_sma, calculate_std_dev};
use crate::models::{BollingerBand, Metric};

/// Calculate Bollinger Bands over a sequence of closes
///
/// Entry `j` summarizes closes `[j, j + period - 1]`, so the result holds
/// `closes.len() - period + 1` entries. The middle band is the SMA of the
/// window; upper and lower sit `multiplier` population standard deviations
/// away from it.
///
/// # Returns
/// An empty vector for a zero period, fewer than `period` closes, or any
/// non-finite close.
pub fn calculate_bollinger_bands(
    closes: &[f64],
    period: usize,
    multiplier: f64,
) -> Vec<BollingerBand> {
    if period == 0 || closes.len() < period || !multiplier.is_finite() {
        return Vec::new();
    }
    if closes.iter().any(|c| !c.is_finite()) {
        return Vec::new();
    }

    closes
        .windows(period)
        .filter_map(|window| {
            let middle = calculate_sma(window, period)?;
            let std_dev = calculate_std_dev(window, period, middle)?;

            Some(BollingerBand {
                middle,
                upper: middle + multiplier * std_dev,
                lower: middle - multiplier * std_dev,
            })
        })
        .collect()
}

/// Band width as a percentage of the middle band
///
/// `Unavailable` when the middle band is zero or the result is not finite.
pub fn bandwidth_pct(band: &BollingerBand) -> Metric {
    if band.middle == 0.0 {
        return Metric::Unavailable;
    }
    Metric::from_value((band.upper - band.lower) / band.middle * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_closes() -> Vec<f64> {
        (0..40)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 4.0 + (i % 5) as f64)
            .collect()
    }

    #[test]
    fn test_band_count_and_alignment() {
        let closes = sample_closes();
        let bands = calculate_bollinger_bands(&closes, 20, 2.0);
        assert_eq!(bands.len(), 21);

        // Last entry covers the last 20 closes
        let last_mean = closes[20..].iter().sum::<f64>() / 20.0;
        assert!((bands[20].middle - last_mean).abs() < 1e-9);

        let first_mean = closes[..20].iter().sum::<f64>() / 20.0;
        assert!((bands[0].middle - first_mean).abs() < 1e-9);
    }

    #[test]
    fn test_band_symmetry() {
        let bands = calculate_bollinger_bands(&sample_closes(), 20, 2.0);
        for band in &bands {
            let up = band.upper - band.middle;
            let down = band.middle - band.lower;
            assert!((up - down).abs() < 1e-9);
            assert!(band.upper >= band.lower);
        }
    }

    #[test]
    fn test_constant_series_has_zero_width() {
        let closes = vec![250.0; 25];
        let bands = calculate_bollinger_bands(&closes, 20, 2.0);
        assert_eq!(bands.len(), 6);
        for band in &bands {
            assert_eq!(band.upper, band.middle);
            assert_eq!(band.lower, band.middle);
            assert_eq!(band.middle, 250.0);
        }
    }

    #[test]
    fn test_population_std_dev() {
        let closes = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let bands = calculate_bollinger_bands(&closes, 8, 2.0);
        assert_eq!(bands.len(), 1);
        assert_eq!(bands[0].middle, 5.0);
        assert_eq!(bands[0].upper, 9.0);
        assert_eq!(bands[0].lower, 1.0);
    }

    #[test]
    fn test_insufficient_data() {
        let closes = vec![1.0, 2.0, 3.0];
        assert!(calculate_bollinger_bands(&closes, 20, 2.0).is_empty());
        assert!(calculate_bollinger_bands(&closes, 0, 2.0).is_empty());
        assert_eq!(calculate_bollinger_bands(&closes, 3, 2.0).len(), 1);
    }

    #[test]
    fn test_non_finite_input() {
        let mut closes = sample_closes();
        closes[3] = f64::INFINITY;
        assert!(calculate_bollinger_bands(&closes, 20, 2.0).is_empty());
    }

    #[test]
    fn test_bandwidth_pct() {
        let band = BollingerBand {
            middle: 100.0,
            upper: 105.0,
            lower: 95.0,
        };
        let width = bandwidth_pct(&band).value().unwrap();
        assert!((width - 10.0).abs() < 1e-9);

        let zero = BollingerBand {
            middle: 0.0,
            upper: 0.0,
            lower: 0.0,
        };
        assert_eq!(bandwidth_pct(&zero), Metric::Unavailable);
    }
}
