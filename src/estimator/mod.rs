//! Adaptive step-runtime estimation.
//!
//! Every completed run appends a [`RuntimeSample`] to the step's
//! append-only history. The estimator turns that history into a ceiling
//! on how long the next run may take before it is declared timed out:
//!
//! - fewer than 10 samples: the step's configured seed ceiling, as is;
//! - 10 or more: a Student-t interval around the sample mean;
//! - 30 or more: a least-squares regression of run time on seconds since
//!   the first recorded run, with a t-based prediction interval (run
//!   times drift as tubing clogs and sensors foul, which a plain mean
//!   never tracks).
//!
//! The upper bound is authoritative for timeouts. The lower bound is
//! advisory only: a run finishing below it is logged as an anomaly,
//! never failed.
//!
//! Model fitting is rate-limited: a step's model is refit at most once
//! per configured update interval, and only between runs. Estimate
//! calls in between reuse the previously fitted model.

pub mod stats;

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::step::Step;
use stats::{OlsFit, mean_sd, t_critical};

/// Minimum history before any statistical bound replaces the seed.
const MIN_SAMPLES_T: usize = 10;
/// Minimum history before the regression tier takes over.
const MIN_SAMPLES_REGRESSION: usize = 30;

/// One completed run of a step.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSample {
    pub elapsed_secs: f64,
    pub at: DateTime<Utc>,
    /// Error-sensor budgets observed at run time, kept as covariates for
    /// model diagnostics and status reporting.
    pub covariates: BTreeMap<String, f64>,
}

/// Which strategy produced an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Seed,
    TInterval,
    Regression,
}

/// A bounded runtime estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    /// Authoritative timeout ceiling, seconds.
    pub upper: f64,
    /// Advisory floor, seconds. Absent for the seed method.
    pub lower: Option<f64>,
    pub method: Method,
    /// Sample count the producing model was fitted on.
    pub samples: usize,
}

#[derive(Debug, Clone)]
enum Model {
    TInterval { mean: f64, sd: f64, n: usize },
    Regression { fit: OlsFit, first_at: DateTime<Utc> },
}

#[derive(Debug, Default, Clone)]
struct StepHistory {
    samples: Vec<RuntimeSample>,
    model: Option<Model>,
    fitted_at: Option<DateTime<Utc>>,
}

/// Runtime histories and rate-limited model state, keyed per routine and
/// step. Step names are only unique within a routine, so two routines
/// that both define a "Drain" step keep independent histories.
#[derive(Debug, Clone)]
pub struct RuntimeEstimator {
    confidence: f64,
    refit_interval: Duration,
    histories: HashMap<(String, String), StepHistory>,
}

impl RuntimeEstimator {
    pub fn new(confidence: f64, refit_interval: Duration) -> Self {
        Self {
            confidence,
            refit_interval,
            histories: HashMap::new(),
        }
    }

    /// Append a completed-run sample. History only ever grows; models
    /// are not refit here but on the next (rate-limited) estimate call.
    pub fn record(&mut self, routine: &str, step: &str, sample: RuntimeSample) {
        self.histories
            .entry((routine.to_string(), step.to_string()))
            .or_default()
            .samples
            .push(sample);
    }

    pub fn sample_count(&self, routine: &str, step: &str) -> usize {
        self.history(routine, step).map_or(0, |h| h.samples.len())
    }

    pub fn samples(&self, routine: &str, step: &str) -> &[RuntimeSample] {
        self.history(routine, step).map_or(&[], |h| h.samples.as_slice())
    }

    fn history(&self, routine: &str, step: &str) -> Option<&StepHistory> {
        self.histories
            .get(&(routine.to_string(), step.to_string()))
    }

    /// Bound the next run of `step` within `routine`. Never called
    /// mid-run.
    pub fn estimate(&mut self, routine: &str, step: &Step, now: DateTime<Utc>) -> Estimate {
        let seed = step.bound.seed_secs();
        let history = self
            .histories
            .entry((routine.to_string(), step.name.clone()))
            .or_default();

        if history.samples.len() < MIN_SAMPLES_T {
            return Estimate {
                upper: seed,
                lower: None,
                method: Method::Seed,
                samples: history.samples.len(),
            };
        }

        let due_for_refit = match history.fitted_at {
            None => true,
            Some(at) => now - at >= self.refit_interval,
        };
        if due_for_refit || history.model.is_none() {
            history.model = fit_model(&history.samples);
            history.fitted_at = Some(now);
            debug!(
                "estimator: refit '{routine}/{}' on {} samples",
                step.name,
                history.samples.len()
            );
        }

        match &history.model {
            Some(Model::TInterval { mean, sd, n }) => {
                let half = t_critical(self.confidence, n - 1) * sd / (*n as f64).sqrt();
                Estimate {
                    upper: mean + half,
                    lower: Some((mean - half).max(0.0)),
                    method: Method::TInterval,
                    samples: *n,
                }
            }
            Some(Model::Regression { fit, first_at }) => {
                let x = seconds_between(*first_at, now);
                let (lo, hi) = fit.prediction_interval(x, self.confidence);
                if !hi.is_finite() || hi <= 0.0 {
                    // Degenerate extrapolation; the seed ceiling is the
                    // only bound that still means anything.
                    return Estimate {
                        upper: seed,
                        lower: None,
                        method: Method::Seed,
                        samples: fit.n,
                    };
                }
                Estimate {
                    upper: hi,
                    lower: Some(lo.max(0.0)),
                    method: Method::Regression,
                    samples: fit.n,
                }
            }
            None => Estimate {
                upper: seed,
                lower: None,
                method: Method::Seed,
                samples: history.samples.len(),
            },
        }
    }
}

fn fit_model(samples: &[RuntimeSample]) -> Option<Model> {
    if samples.len() >= MIN_SAMPLES_REGRESSION {
        let first_at = samples.iter().map(|s| s.at).min()?;
        let xs: Vec<f64> = samples.iter().map(|s| seconds_between(first_at, s.at)).collect();
        let ys: Vec<f64> = samples.iter().map(|s| s.elapsed_secs).collect();
        if let Some(fit) = OlsFit::fit(&xs, &ys) {
            return Some(Model::Regression { fit, first_at });
        }
        // Degenerate timestamps: every sample at the same instant.
        // Fall through to the t-interval tier.
    }
    let elapsed: Vec<f64> = samples.iter().map(|s| s.elapsed_secs).collect();
    let (mean, sd) = mean_sd(&elapsed)?;
    Some(Model::TInterval {
        mean,
        sd,
        n: samples.len(),
    })
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}
