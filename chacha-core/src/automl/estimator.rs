//! Streaming reward estimators and the sequential tests built on them.
//!
//! An [`Estimator`] keeps exponentially decayed sums of importance-weighted
//! rewards and turns them into a confidence interval on the expected reward
//! of the policy it tracks. The interval is a Wilson score interval on the
//! decayed mean, rescaled to the range the weighted rewards can take
//! (`[w_max * min(r_min, 0), w_max * max(r_max, 0)]`), so it tightens
//! monotonically as decayed evidence accumulates and never claims more than
//! the observed reward range allows.
//!
//! Every live slot carries a [`LiveSlot`] pair: the challenger's own
//! estimator and the champion's estimator restricted to the rounds that
//! challenger took part in.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::namespace::InteractionList;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EstimatorParams {
    /// Two-sided significance level of the confidence interval.
    pub significance_level: f64,
    /// Per-update decay applied to previous evidence (`tau`). `1.0` keeps
    /// everything.
    pub decay: f64,
}

impl EstimatorParams {
    pub fn new(significance_level: f64, decay: f64) -> Self {
        Self {
            significance_level,
            decay,
        }
    }

    pub fn z(&self) -> f64 {
        probit(1.0 - self.significance_level / 2.0)
    }
}

impl Default for EstimatorParams {
    fn default() -> Self {
        Self::new(0.05, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimator {
    params: EstimatorParams,
    update_count: u64,
    /// Decayed number of updates.
    evidence: f64,
    /// Decayed sum of `w * r`.
    value_sum: f64,
    w_max: f64,
    r_min: f64,
    r_max: f64,
}

impl Estimator {
    pub fn new(params: EstimatorParams) -> Self {
        Self {
            params,
            update_count: 0,
            evidence: 0.0,
            value_sum: 0.0,
            w_max: 1.0,
            r_min: 0.0,
            r_max: 1.0,
        }
    }

    /// Adds one observation: `w` is the importance weight of the tracked
    /// policy agreeing with the logged action (zero when it disagrees), `r`
    /// the observed reward. Negative or non-finite inputs are ignored.
    pub fn update(&mut self, w: f64, r: f64) {
        if !(w.is_finite() && w >= 0.0 && r.is_finite()) {
            return;
        }
        let tau = self.params.decay;
        self.update_count += 1;
        self.evidence = tau * self.evidence + 1.0;
        self.value_sum = tau * self.value_sum + w * r;
        self.w_max = self.w_max.max(w);
        self.r_min = self.r_min.min(r);
        self.r_max = self.r_max.max(r);
    }

    pub fn reset_stats(&mut self) {
        *self = Self::new(self.params);
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn evidence(&self) -> f64 {
        self.evidence
    }

    /// Inverse-propensity estimate of the expected reward.
    pub fn ips(&self) -> f64 {
        if self.evidence > 0.0 {
            self.value_sum / self.evidence
        } else {
            0.0
        }
    }

    /// `(lower, upper)` confidence bounds on the expected reward.
    /// Without evidence both bounds are infinite.
    pub fn bounds(&self) -> (f64, f64) {
        if self.update_count == 0 || self.evidence <= 0.0 {
            return (f64::NEG_INFINITY, f64::INFINITY);
        }
        let lo = self.w_max * self.r_min.min(0.0);
        let hi = self.w_max * self.r_max.max(0.0);
        let span = hi - lo;
        debug_assert!(span >= 1.0, "reward range collapsed to {span}");
        let p_hat = ((self.ips() - lo) / span).clamp(0.0, 1.0);
        let (low, high) = wilson_interval(p_hat, self.evidence, self.params.z());
        (lo + span * low, lo + span * high)
    }

    pub fn lower_bound(&self) -> f64 {
        self.bounds().0
    }

    pub fn upper_bound(&self) -> f64 {
        self.bounds().1
    }
}

/// Wilson score interval for a proportion `p_hat` over `n` (possibly
/// fractional) trials, clamped into `[0, 1]`.
pub fn wilson_interval(p_hat: f64, n: f64, z: f64) -> (f64, f64) {
    if !(n > 0.0) {
        return (0.0, 1.0);
    }
    let z = if z.is_finite() && z > 0.0 { z } else { 1.96 };
    let z2 = z * z;
    let denom = 1.0 + z2 / n;
    let center = (p_hat + z2 / (2.0 * n)) / denom;
    let radius = z * (p_hat * (1.0 - p_hat) / n + z2 / (4.0 * n * n)).sqrt() / denom;
    (
        (center - radius).clamp(0.0, 1.0),
        (center + radius).clamp(0.0, 1.0),
    )
}

/// Inverse standard normal CDF, Abramowitz & Stegun 26.2.23
/// (absolute error below 4.5e-4).
pub fn probit(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    let (sign, q) = if p < 0.5 { (-1.0, 1.0 - p) } else { (1.0, p) };

    const C0: f64 = 2.515517;
    const C1: f64 = 0.802853;
    const C2: f64 = 0.010328;
    const D1: f64 = 1.432788;
    const D2: f64 = 0.189269;
    const D3: f64 = 0.001308;

    let t = (-2.0 * (1.0 - q).ln()).sqrt();
    let z = t - (C0 + C1 * t + C2 * t * t) / (1.0 + D1 * t + D2 * t * t + D3 * t * t * t);
    sign * z
}

/// Whether the challenger is statistically better than the champion measured
/// on the same rounds.
///
/// With `lb_trick` the champion estimator tracks the reward complement, so
/// its upper bound on reward is `1 - champion.lower_bound()`.
pub fn better(lb_trick: bool, challenger: &Estimator, champion: &Estimator) -> bool {
    if lb_trick {
        challenger.lower_bound() > 1.0 - champion.lower_bound()
    } else {
        challenger.lower_bound() > champion.upper_bound()
    }
}

/// Whether the challenger is statistically dominated by the champion and
/// should give its slot up.
pub fn worse(lb_trick: bool, challenger: &Estimator, champion: &Estimator) -> bool {
    if lb_trick {
        challenger.upper_bound() < 1.0 - champion.upper_bound()
    } else {
        challenger.upper_bound() < champion.lower_bound()
    }
}

/// One live slot's binding: its configuration, eligibility partition, the
/// interactions it trains with, and its estimator pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveSlot {
    pub config_index: usize,
    /// Regular slots (`true`) are evicted when their lease runs out; priority
    /// slots keep running with a doubled lease.
    pub eligible_to_inactivate: bool,
    pub live_interactions: Arc<InteractionList>,
    /// The configuration's own performance.
    pub challenger: Estimator,
    /// The champion's performance over the rounds this slot was live.
    pub champion: Estimator,
}

impl LiveSlot {
    pub fn new(params: EstimatorParams, config_index: usize, eligible_to_inactivate: bool) -> Self {
        Self {
            config_index,
            eligible_to_inactivate,
            live_interactions: Arc::new(InteractionList::new()),
            challenger: Estimator::new(params),
            champion: Estimator::new(params),
        }
    }

    pub fn reset_stats(&mut self) {
        self.challenger.reset_stats();
        self.champion.reset_stats();
    }

    pub fn beats_champion(&self, lb_trick: bool) -> bool {
        better(lb_trick, &self.challenger, &self.champion)
    }

    pub fn dominated_by_champion(&self, lb_trick: bool) -> bool {
        worse(lb_trick, &self.challenger, &self.champion)
    }

    /// Rebases a demoted champion's statistics on the horizon of the
    /// challenger that replaced it.
    ///
    /// The promoted slot measured itself (`challenger`) against the old
    /// champion (`champion`) over the same rounds. After promotion the roles
    /// flip: the old champion is now the challenger and the promoted
    /// configuration is the reference. Configuration index, eligibility and
    /// interactions of `self` are left untouched.
    pub fn take_mirrored_horizon(&mut self, promoted: &LiveSlot) {
        self.challenger = promoted.champion.clone();
        self.champion = promoted.challenger.clone();
    }
}
