//! Small-sample statistics for runtime bounds.
//!
//! Student-t critical values and a one-covariate least-squares fit with
//! prediction intervals. Quantiles are computed numerically (Acklam's
//! rational approximation for the normal inverse CDF, refined into a t
//! quantile with Hill's asymptotic expansion), accurate to well under a
//! percent for the degrees of freedom this crate ever sees (n >= 10).

/// Inverse standard-normal CDF (Acklam's rational approximation).
///
/// Maximum absolute error ~4.5e-4 over (0, 1); more than enough for
/// runtime ceilings measured against second-granularity pump runs.
pub fn inverse_normal_cdf(p: f64) -> f64 {
    debug_assert!(p > 0.0 && p < 1.0, "probability out of range: {p}");

    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const P_LOW: f64 = 0.02425;

    if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p > 1.0 - P_LOW {
        -inverse_normal_cdf(1.0 - p)
    } else {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    }
}

/// Two-sided Student-t critical value at `confidence` with `dof` degrees
/// of freedom: the t such that P(|T| <= t) = confidence.
///
/// Non-decreasing in `confidence` for fixed `dof`.
pub fn t_critical(confidence: f64, dof: usize) -> f64 {
    debug_assert!(confidence > 0.0 && confidence < 1.0);
    let p = 1.0 - (1.0 - confidence) / 2.0;

    match dof {
        0 => f64::INFINITY,
        // Exact closed forms for the two df where the expansion is poor.
        1 => (std::f64::consts::PI * (p - 0.5)).tan(),
        2 => {
            let a = 2.0 * p - 1.0;
            a * (2.0 / (1.0 - a * a)).sqrt()
        }
        _ => {
            // Hill's expansion of the t quantile around the normal one.
            let z = inverse_normal_cdf(p);
            let v = dof as f64;
            let z2 = z * z;
            let g1 = (z2 + 1.0) * z / 4.0;
            let g2 = ((5.0 * z2 + 16.0) * z2 + 3.0) * z / 96.0;
            let g3 = (((3.0 * z2 + 19.0) * z2 + 17.0) * z2 - 15.0) * z / 384.0;
            let g4 =
                ((((79.0 * z2 + 776.0) * z2 + 1482.0) * z2 - 1920.0) * z2 - 945.0) * z / 92160.0;
            z + g1 / v + g2 / (v * v) + g3 / (v * v * v) + g4 / (v * v * v * v)
        }
    }
}

/// Sample mean and standard deviation (n-1 denominator).
/// Returns `None` for fewer than two values.
pub fn mean_sd(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let ss = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>();
    Some((mean, (ss / (n - 1.0)).sqrt()))
}

/// Ordinary least-squares fit of `y = intercept + slope * x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OlsFit {
    pub intercept: f64,
    pub slope: f64,
    pub n: usize,
    x_mean: f64,
    sxx: f64,
    resid_se: f64,
}

impl OlsFit {
    /// Fit the line. Returns `None` with fewer than three points or when
    /// the x values are degenerate (no spread to regress against).
    pub fn fit(xs: &[f64], ys: &[f64]) -> Option<Self> {
        if xs.len() != ys.len() || xs.len() < 3 {
            return None;
        }
        let n = xs.len() as f64;
        let x_mean = xs.iter().sum::<f64>() / n;
        let y_mean = ys.iter().sum::<f64>() / n;

        let sxx = xs.iter().map(|x| (x - x_mean) * (x - x_mean)).sum::<f64>();
        if sxx <= f64::EPSILON {
            return None;
        }
        let sxy = xs
            .iter()
            .zip(ys)
            .map(|(x, y)| (x - x_mean) * (y - y_mean))
            .sum::<f64>();

        let slope = sxy / sxx;
        let intercept = y_mean - slope * x_mean;
        let ss_resid = xs
            .iter()
            .zip(ys)
            .map(|(x, y)| {
                let e = y - (intercept + slope * x);
                e * e
            })
            .sum::<f64>();
        let resid_se = (ss_resid / (n - 2.0)).sqrt();

        Some(Self {
            intercept,
            slope,
            n: xs.len(),
            x_mean,
            sxx,
            resid_se,
        })
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }

    /// Two-sided prediction interval for a *new* observation at `x`.
    pub fn prediction_interval(&self, x: f64, confidence: f64) -> (f64, f64) {
        let n = self.n as f64;
        let dx = x - self.x_mean;
        let se = self.resid_se * (1.0 + 1.0 / n + dx * dx / self.sxx).sqrt();
        let t = t_critical(confidence, self.n - 2);
        let y = self.predict(x);
        (y - t * se, y + t * se)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() < tol
    }

    #[test]
    fn inverse_normal_known_points() {
        assert!(close(inverse_normal_cdf(0.5), 0.0, 1e-9));
        assert!(close(inverse_normal_cdf(0.975), 1.959964, 1e-3));
        assert!(close(inverse_normal_cdf(0.995), 2.575829, 2e-3));
        assert!(close(inverse_normal_cdf(0.025), -1.959964, 1e-3));
    }

    #[test]
    fn t_critical_known_points() {
        // Reference values from standard t tables.
        assert!(close(t_critical(0.95, 9), 2.2622, 5e-3));
        assert!(close(t_critical(0.95, 29), 2.0452, 5e-3));
        assert!(close(t_critical(0.99, 9), 3.2498, 2e-2));
        assert!(close(t_critical(0.90, 14), 1.7613, 5e-3));
    }

    #[test]
    fn t_approaches_normal_for_large_dof() {
        let t = t_critical(0.95, 10_000);
        assert!(close(t, 1.9600, 2e-3));
    }

    #[test]
    fn t_monotone_in_confidence() {
        for dof in [9usize, 14, 29, 99] {
            let mut last = 0.0;
            for conf in [0.5, 0.8, 0.9, 0.95, 0.99] {
                let t = t_critical(conf, dof);
                assert!(t >= last, "t({conf}, {dof}) = {t} < {last}");
                last = t;
            }
        }
    }

    #[test]
    fn mean_sd_basic() {
        let (mean, sd) = mean_sd(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!(close(mean, 5.0, 1e-9));
        assert!(close(sd, 2.138, 1e-3));
        assert!(mean_sd(&[1.0]).is_none());
    }

    #[test]
    fn ols_recovers_exact_line() {
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0];
        let ys: Vec<f64> = xs.iter().map(|x| 3.0 + 2.0 * x).collect();
        let fit = OlsFit::fit(&xs, &ys).unwrap();
        assert!(close(fit.slope, 2.0, 1e-9));
        assert!(close(fit.intercept, 3.0, 1e-9));
        // Perfect fit: prediction interval collapses onto the line.
        let (lo, hi) = fit.prediction_interval(2.0, 0.95);
        assert!(close(lo, 7.0, 1e-6));
        assert!(close(hi, 7.0, 1e-6));
    }

    #[test]
    fn ols_rejects_degenerate_x() {
        assert!(OlsFit::fit(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_none());
        assert!(OlsFit::fit(&[1.0, 2.0], &[1.0, 2.0]).is_none());
    }

    #[test]
    fn prediction_interval_widens_away_from_mean() {
        let xs = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        let ys = [1.0, 2.2, 2.8, 4.1, 5.0, 6.2];
        let fit = OlsFit::fit(&xs, &ys).unwrap();
        let (lo_c, hi_c) = fit.prediction_interval(2.5, 0.95);
        let (lo_f, hi_f) = fit.prediction_interval(10.0, 0.95);
        assert!(hi_f - lo_f > hi_c - lo_c);
    }
}
