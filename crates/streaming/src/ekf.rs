// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Extended Kalman filter over culture growth.
//!
//! Two-dimensional state `[nOD, rate]` with an exponential-growth
//! transition: over `dt` hours, `nOD' = nOD * exp(rate * dt)`. Every
//! photodiode channel observes nOD directly, so the observation noise is
//! diagonal and the update can run sequentially per channel, with no
//! general matrix inversion needed at this size.

/// Floor applied to the nOD variance while a dilution is recent, letting
/// the density estimate jump to the diluted level without dragging the
/// rate. 0.04 std on normalized OD.
const DILUTION_OD_VARIANCE: f64 = 0.04 * 0.04;

#[derive(Debug, Clone)]
pub struct CultureGrowthEKF {
    state: [f64; 2],
    covariance: [[f64; 2]; 2],
    /// Per-step process variances `[nOD, rate]`.
    process_variance: [f64; 2],
    /// Per-channel observation variances, in channel order.
    observation_variance: Vec<f64>,
    /// Innovations beyond this many standard deviations are rejected.
    outlier_std_threshold: f64,
}

impl CultureGrowthEKF {
    pub fn new(
        initial_state: [f64; 2],
        initial_covariance: [[f64; 2]; 2],
        process_variance: [f64; 2],
        observation_variance: Vec<f64>,
        outlier_std_threshold: f64,
    ) -> Self {
        Self {
            state: initial_state,
            covariance: initial_covariance,
            process_variance,
            observation_variance,
            outlier_std_threshold,
        }
    }

    pub fn state(&self) -> [f64; 2] {
        self.state
    }

    pub fn covariance(&self) -> [[f64; 2]; 2] {
        self.covariance
    }

    /// One predict + update cycle.
    ///
    /// `observations` are the scaled per-channel nODs, in the same order
    /// as the observation variances; `dt` is in hours. With
    /// `recent_dilution`, the nOD process noise is widened so the state
    /// can follow the dilution step.
    pub fn update(
        &mut self,
        observations: &[f64],
        dt: f64,
        recent_dilution: bool,
    ) -> ([f64; 2], [[f64; 2]; 2]) {
        self.predict(dt, recent_dilution);

        for (i, &z) in observations.iter().enumerate() {
            let r = self
                .observation_variance
                .get(i)
                .copied()
                .unwrap_or_else(|| self.observation_variance.last().copied().unwrap_or(1e-4));
            self.correct(z, r, recent_dilution);
        }

        (self.state, self.covariance)
    }

    fn predict(&mut self, dt: f64, recent_dilution: bool) {
        let [od, rate] = self.state;
        let growth = (rate * dt).exp();
        self.state = [od * growth, rate];

        // F = [[growth, od*dt*growth], [0, 1]]
        let f01 = od * dt * growth;
        let [[p00, p01], [p10, p11]] = self.covariance;
        let fp00 = growth * p00 + f01 * p10;
        let fp01 = growth * p01 + f01 * p11;
        let q0 = self.process_variance[0];
        let mut p00_next = fp00 * growth + fp01 * f01 + q0;
        if recent_dilution {
            p00_next = p00_next.max(DILUTION_OD_VARIANCE);
        }
        self.covariance = [
            [p00_next, fp01],
            [p10 * growth + p11 * f01, p11 + self.process_variance[1]],
        ];
    }

    /// Sequential scalar update for one channel observing nOD.
    fn correct(&mut self, z: f64, r: f64, recent_dilution: bool) {
        let [[p00, p01], [p10, p11]] = self.covariance;
        let innovation = z - self.state[0];
        let s = p00 + r;
        // an implausible innovation is a glitch, not signal; skip it.
        // dilutions legitimately produce large innovations, let those in.
        if !recent_dilution && innovation.abs() > self.outlier_std_threshold * s.sqrt() {
            return;
        }
        let k0 = p00 / s;
        let k1 = p10 / s;
        self.state[0] += k0 * innovation;
        self.state[1] += k1 * innovation;
        self.covariance = [
            [(1.0 - k0) * p00, (1.0 - k0) * p01],
            [p10 - k1 * p00, p11 - k1 * p01],
        ];
    }
}

#[cfg(test)]
#[path = "ekf_tests.rs"]
mod tests;
