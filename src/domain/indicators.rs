use super::types::Bands;
use statrs::statistics::Statistics;

/// Bollinger-style bands over the trailing `window` prices.
/// `prices` is the history up to and including the current step; nothing
/// after it is visible. Returns `None` until `window` prices are available.
pub fn bollinger_bands(prices: &[f64], window: usize, num_std: f64) -> Option<Bands> {
    let middle = sma(prices, window)?;
    let std = rolling_std(prices, window)?;
    Some(Bands {
        middle,
        upper: middle + num_std * std,
        lower: middle - num_std * std,
    })
}

/// Simple moving average of the last `period` values.
pub fn sma(data: &[f64], period: usize) -> Option<f64> {
    if period == 0 || data.len() < period {
        return None;
    }
    Some(data[data.len() - period..].iter().mean())
}

/// Sample standard deviation (n - 1) of the last `period` values.
/// A single observation has no spread, so it reports 0.
fn rolling_std(data: &[f64], period: usize) -> Option<f64> {
    if period == 0 || data.len() < period {
        return None;
    }
    if period == 1 {
        return Some(0.0);
    }
    Some(data[data.len() - period..].iter().std_dev())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((sma(&data, 3).unwrap() - 4.0).abs() < 1e-10); // (3+4+5)/3
        assert!((sma(&data, 5).unwrap() - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_sma_insufficient_data() {
        assert_eq!(sma(&[1.0, 2.0], 5), None);
        assert_eq!(sma(&[1.0, 2.0], 0), None);
    }

    #[test]
    fn test_bands_absent_before_window_fills() {
        let data = vec![100.0; 19];
        assert!(bollinger_bands(&data, 20, 2.0).is_none());
    }

    #[test]
    fn test_bands_collapse_on_flat_prices() {
        let data = vec![100.0; 20];
        let bands = bollinger_bands(&data, 20, 2.0).unwrap();
        assert!((bands.middle - 100.0).abs() < 1e-10);
        assert!((bands.upper - 100.0).abs() < 1e-10); // zero std -> bands collapse
        assert!((bands.lower - 100.0).abs() < 1e-10);
    }

    #[test]
    fn test_bands_use_sample_std() {
        // 1, 2, 3, 4: mean 2.5, sample variance 5/3
        let data = vec![1.0, 2.0, 3.0, 4.0];
        let bands = bollinger_bands(&data, 4, 1.0).unwrap();
        let expected_std = (5.0f64 / 3.0).sqrt();
        assert!((bands.middle - 2.5).abs() < 1e-10);
        assert!((bands.upper - (2.5 + expected_std)).abs() < 1e-10);
        assert!((bands.lower - (2.5 - expected_std)).abs() < 1e-10);
    }

    #[test]
    fn test_bands_only_see_trailing_window() {
        let mut data = vec![1_000.0; 10];
        data.extend(vec![100.0; 5]);
        let bands = bollinger_bands(&data, 5, 2.0).unwrap();
        assert!((bands.middle - 100.0).abs() < 1e-10);
    }

    #[test]
    fn test_bands_symmetric() {
        let data: Vec<f64> = (0..20)
            .map(|i| 100.0 + if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let bands = bollinger_bands(&data, 20, 2.0).unwrap();
        assert!(bands.upper > bands.middle);
        assert!(bands.lower < bands.middle);
        assert!((bands.upper - bands.middle - (bands.middle - bands.lower)).abs() < 1e-10);
    }

    #[test]
    fn test_window_of_one_has_zero_width() {
        let bands = bollinger_bands(&[42.0], 1, 2.0).unwrap();
        assert_eq!(bands.upper, 42.0);
        assert_eq!(bands.lower, 42.0);
    }
}
