//! Time-series statistics shared by every analysis.
//!
//! Variance and covariance are sample estimates (divide by n-1). All inputs are
//! checked for finiteness; a NaN never flows silently into a result.

use crate::domain::error::SamquantError;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

fn ensure_finite(values: &[f64], context: &str) -> Result<(), SamquantError> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(SamquantError::invalid(
            context,
            format!("non-finite value {} at index {}", values[i], i),
        )),
        None => Ok(()),
    }
}

fn ensure_len(values: &[f64], need: usize, context: &str) -> Result<(), SamquantError> {
    if values.len() < need {
        return Err(SamquantError::insufficient(context, values.len(), need));
    }
    ensure_finite(values, context)
}

fn ensure_pair(a: &[f64], b: &[f64], context: &str) -> Result<(), SamquantError> {
    if a.len() != b.len() {
        return Err(SamquantError::invalid(
            context,
            format!("length mismatch ({} vs {})", a.len(), b.len()),
        ));
    }
    ensure_len(a, 2, context)?;
    ensure_finite(b, context)
}

/// Period-over-period percentage changes: r[i] = p[i+1] / p[i] - 1.
pub fn returns(prices: &[f64]) -> Result<Vec<f64>, SamquantError> {
    ensure_len(prices, 2, "returns")?;
    prices
        .windows(2)
        .map(|w| {
            if w[0] == 0.0 {
                Err(SamquantError::degenerate("returns", "zero price"))
            } else {
                Ok(w[1] / w[0] - 1.0)
            }
        })
        .collect()
}

pub fn mean(values: &[f64]) -> Result<f64, SamquantError> {
    ensure_len(values, 1, "mean")?;
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn variance(values: &[f64]) -> Result<f64, SamquantError> {
    ensure_len(values, 2, "variance")?;
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Ok(ss / (values.len() - 1) as f64)
}

pub fn stddev(values: &[f64]) -> Result<f64, SamquantError> {
    Ok(variance(values)?.sqrt())
}

pub fn covariance(a: &[f64], b: &[f64]) -> Result<f64, SamquantError> {
    ensure_pair(a, b, "covariance")?;
    let ma = mean(a)?;
    let mb = mean(b)?;
    let sum: f64 = a.iter().zip(b).map(|(x, y)| (x - ma) * (y - mb)).sum();
    Ok(sum / (a.len() - 1) as f64)
}

/// Pearson correlation, clamped to [-1, 1]. Fails when either side is constant.
pub fn correlation(a: &[f64], b: &[f64]) -> Result<f64, SamquantError> {
    let cov = covariance(a, b)?;
    let sa = stddev(a)?;
    let sb = stddev(b)?;
    if sa == 0.0 || sb == 0.0 {
        return Err(SamquantError::degenerate("correlation", "zero variance input"));
    }
    Ok((cov / (sa * sb)).clamp(-1.0, 1.0))
}

/// Compound a mean daily return over `trading_days`.
pub fn annualize_return(daily: f64, trading_days: f64) -> f64 {
    (1.0 + daily).powf(trading_days) - 1.0
}

/// Scale a daily standard deviation by the square root of time.
pub fn annualize_volatility(daily_sd: f64, trading_days: f64) -> f64 {
    daily_sd * trading_days.sqrt()
}

/// Empirical quantile with linear interpolation between order statistics.
pub fn quantile(values: &[f64], q: f64) -> Result<f64, SamquantError> {
    ensure_len(values, 1, "quantile")?;
    if !(0.0..=1.0).contains(&q) {
        return Err(SamquantError::invalid("quantile", format!("q={q} outside [0, 1]")));
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Ok(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Cumulative growth of 1.0 under `returns`, starting with the initial 1.0.
pub fn equity_curve(returns: &[f64]) -> Vec<f64> {
    let mut curve = Vec::with_capacity(returns.len() + 1);
    let mut equity = 1.0;
    curve.push(equity);
    for r in returns {
        equity *= 1.0 + r;
        curve.push(equity);
    }
    curve
}

/// Worst peak-to-trough decline as a positive fraction of the peak.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let Some(&first) = equity.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut max_dd = 0.0_f64;
    for &value in equity {
        if value > peak {
            peak = value;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - value) / peak);
        }
    }
    max_dd
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn returns_length_is_one_less() {
        let r = returns(&[100.0, 110.0, 99.0]).unwrap();
        assert_eq!(r.len(), 2);
        assert_relative_eq!(r[0], 0.10, epsilon = 1e-12);
        assert_relative_eq!(r[1], -0.10, epsilon = 1e-12);
    }

    #[test]
    fn constant_prices_give_zero_returns() {
        let r = returns(&[50.0; 10]).unwrap();
        assert!(r.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn returns_rejects_short_input() {
        let err = returns(&[1.0]).unwrap_err();
        assert!(matches!(err, SamquantError::InsufficientData { have: 1, need: 2, .. }));
    }

    #[test]
    fn returns_rejects_nan() {
        let err = returns(&[1.0, f64::NAN, 2.0]).unwrap_err();
        assert!(matches!(err, SamquantError::InvalidParameter { .. }));
    }

    #[test]
    fn returns_rejects_zero_price() {
        let err = returns(&[0.0, 1.0]).unwrap_err();
        assert!(matches!(err, SamquantError::NumericDegeneracy { .. }));
    }

    #[test]
    fn sample_variance_known_values() {
        // sum of squared deviations = 32, n-1 = 7
        let v = variance(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_relative_eq!(v, 32.0 / 7.0, epsilon = 1e-12);
    }

    #[test]
    fn correlation_self_and_negated() {
        let a = [0.01, -0.02, 0.03, 0.005, -0.01, 0.02];
        let neg: Vec<f64> = a.iter().map(|x| -x).collect();
        assert_relative_eq!(correlation(&a, &a).unwrap(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(correlation(&a, &neg).unwrap(), -1.0, epsilon = 1e-9);
    }

    #[test]
    fn correlation_constant_input_is_degenerate() {
        let err = correlation(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, SamquantError::NumericDegeneracy { .. }));
    }

    #[test]
    fn covariance_length_mismatch() {
        let err = covariance(&[1.0, 2.0], &[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, SamquantError::InvalidParameter { .. }));
    }

    #[test]
    fn annualization() {
        assert_relative_eq!(annualize_return(0.0, 252.0), 0.0);
        assert_relative_eq!(annualize_volatility(0.01, 252.0), 0.01 * 252f64.sqrt());
    }

    #[test]
    fn quantile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(quantile(&v, 0.0).unwrap(), 1.0);
        assert_relative_eq!(quantile(&v, 0.5).unwrap(), 3.0);
        assert_relative_eq!(quantile(&v, 0.1).unwrap(), 1.4, epsilon = 1e-12);
        assert!(quantile(&v, 1.5).is_err());
    }

    #[test]
    fn drawdown_of_equity_curve() {
        let equity = [1.0, 1.1, 0.9, 0.95, 0.8, 1.0];
        assert_relative_eq!(max_drawdown(&equity), (1.1 - 0.8) / 1.1, epsilon = 1e-12);
    }

    #[test]
    fn drawdown_counts_first_day_loss() {
        let equity = equity_curve(&[-0.1, 0.05]);
        assert_relative_eq!(max_drawdown(&equity), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn equity_curve_compounds() {
        let eq = equity_curve(&[0.1, 0.1]);
        assert_eq!(eq.len(), 3);
        assert_relative_eq!(eq[2], 1.21, epsilon = 1e-12);
    }

    proptest! {
        #[test]
        fn correlation_is_bounded(
            a in prop::collection::vec(-1.0f64..1.0, 3..40),
            seed in 0.0f64..1.0,
        ) {
            let b: Vec<f64> = a.iter().enumerate().map(|(i, x)| x * seed + (i as f64 * 0.37).sin()).collect();
            if let Ok(c) = correlation(&a, &b) {
                prop_assert!((-1.0..=1.0).contains(&c));
            }
        }

        #[test]
        fn returns_length_property(prices in prop::collection::vec(1.0f64..1000.0, 2..100)) {
            let r = returns(&prices).unwrap();
            prop_assert_eq!(r.len(), prices.len() - 1);
        }
    }
}
