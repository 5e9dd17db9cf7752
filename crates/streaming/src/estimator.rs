// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The growth-rate estimation pipeline.
//!
//! Consumes a merged OD/dosing stream, scales each OD sample against the
//! experiment's normalization statistics and blanks, feeds the scaled
//! vector through the culture-growth EKF, and emits
//! `(GrowthRate, ODFiltered, KalmanFilterOutput)` while writing the
//! latest values back to the node's persistent cache.

use crate::ekf::CultureGrowthEKF;
use crate::error::StreamError;
use crate::merge::{merge_historical_streams, merge_live_streams, StreamEvent};
use crate::sources::{DosingObservationSource, ODObservationSource};
use crate::stats::od_statistics;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use pio_core::settings::{PublishedSetting, SettingType, SettingValue};
use pio_core::structs::{GrowthRate, KalmanFilterOutput, ODFiltered, ODReadings};
use pio_core::whoami::is_testing_env;
use pio_jobs::{JobBehavior, JobContext};
use pio_storage::local_persistent_storage;
use std::collections::BTreeMap;

pub const JOB_NAME: &str = "growth_rate_calculating";

/// The background-job face of the pipeline: declares the published
/// settings the estimates fan out through.
pub struct GrowthRateEstimator;

impl JobBehavior for GrowthRateEstimator {
    fn job_name(&self) -> &str {
        JOB_NAME
    }

    fn published_settings(&self) -> IndexMap<String, PublishedSetting> {
        let mut settings = IndexMap::new();
        settings.insert(
            "growth_rate".to_string(),
            PublishedSetting::new(SettingType::Json, false).with_unit("h⁻¹"),
        );
        settings.insert("od_filtered".to_string(), PublishedSetting::new(SettingType::Json, false));
        settings.insert(
            "kalman_filter_outputs".to_string(),
            PublishedSetting::new(SettingType::Json, false),
        );
        settings
    }
}

/// Mutable pipeline state, driven by the thread that owns the streams.
pub struct GrowthRatePipeline {
    /// Ignore cached statistics from this experiment; use for replays.
    ignore_cache: bool,
    expected_dt: f64,
    obs_since_last_dose: Option<usize>,
    obs_required_to_reset: usize,
    recent_dilution: bool,
    time_of_previous_observation: Option<DateTime<Utc>>,
    od_normalization_factors: BTreeMap<String, f64>,
    od_variances: BTreeMap<String, f64>,
    od_blank: BTreeMap<String, f64>,
    ekf: Option<CultureGrowthEKF>,
}

impl GrowthRatePipeline {
    pub fn new(ignore_cache: bool) -> Self {
        Self {
            ignore_cache,
            expected_dt: 0.0,
            obs_since_last_dose: None,
            obs_required_to_reset: 1,
            recent_dilution: false,
            time_of_previous_observation: None,
            od_normalization_factors: BTreeMap::new(),
            od_variances: BTreeMap::new(),
            od_blank: BTreeMap::new(),
            ekf: None,
        }
    }

    /// Consume both streams until they end or the job's latch fires.
    ///
    /// Both streams must be live, or both historical. Bad samples (zero
    /// normalization, non-positive scaled OD, late data) are logged and
    /// skipped; the pipeline continues.
    pub fn run<O, D>(
        &mut self,
        ctx: &JobContext,
        mut od: O,
        dosing: D,
        mut emit: impl FnMut(&GrowthRate, &ODFiltered, &KalmanFilterOutput),
    ) -> Result<(), StreamError>
    where
        O: ODObservationSource,
        D: DosingObservationSource,
    {
        if od.is_live() != dosing.is_live() {
            return Err(StreamError::MixedLiveness);
        }
        let live = od.is_live();

        let config = ctx.config();
        let threshold = config.getfloat_or(JOB_NAME, "ekf_outlier_std_threshold", 3.0);
        if threshold <= 2.0 {
            return Err(StreamError::OutlierThresholdTooLow);
        }
        let samples_per_second = config.getfloat_or("od_reading", "samples_per_second", 0.2);
        self.expected_dt = 1.0 / (3600.0 * samples_per_second);
        let n_samples = config.getint_or(JOB_NAME, "samples_for_od_statistics", 35) as usize;
        self.obs_required_to_reset = config.getint_or(JOB_NAME, "obs_required_to_reset", 1) as usize;

        self.acquire_statistics(ctx, &mut od, n_samples)?;
        self.acquire_blanks(ctx)?;

        let obs_std = config.getfloat_or("growth_rate_kalman", "obs_std", 1.0);
        let observation_variance = self.observation_noise(ctx, obs_std)?;

        let (initial_nod, initial_rate) = self.initial_values(ctx, &mut od)?;
        ctx.logger().debug(format!("Initial state: [{initial_nod}, {initial_rate}]"));

        let od_std = config.getfloat_or("growth_rate_kalman", "od_std", 0.0025);
        let rate_std = config.getfloat_or("growth_rate_kalman", "rate_std", 0.1);
        let process_variance =
            [(od_std * self.expected_dt).powi(2), (rate_std * self.expected_dt).powi(2)];
        self.ekf = Some(CultureGrowthEKF::new(
            [initial_nod, initial_rate],
            [[0.04 * 0.04, 0.0], [0.0, 0.01 * 0.01]],
            process_variance,
            observation_variance,
            threshold,
        ));

        if live {
            let merged = merge_live_streams(od, dosing, ctx.latch())?;
            for event in merged {
                self.handle_event(ctx, event, &mut emit);
            }
        } else {
            let merged = merge_historical_streams(od, dosing)?;
            for event in merged {
                self.handle_event(ctx, event, &mut emit);
            }
        }
        Ok(())
    }

    fn handle_event(
        &mut self,
        ctx: &JobContext,
        event: StreamEvent,
        emit: &mut impl FnMut(&GrowthRate, &ODFiltered, &KalmanFilterOutput),
    ) {
        match event {
            StreamEvent::Od(readings) => self.handle_od(ctx, readings, emit),
            StreamEvent::Dosing(event) => {
                ctx.logger().debug(format!(
                    "Observed {} of {} mL; pausing rate updates briefly.",
                    event.event_name, event.volume_change
                ));
                self.obs_since_last_dose = Some(0);
                self.recent_dilution = true;
            }
        }
    }

    fn handle_od(
        &mut self,
        ctx: &JobContext,
        readings: ODReadings,
        emit: &mut impl FnMut(&GrowthRate, &ODFiltered, &KalmanFilterOutput),
    ) {
        let timestamp = readings.timestamp;
        let scaled = match self.scale_raw_observations(&readings) {
            Ok(scaled) => scaled,
            Err(message) => {
                ctx.logger().warning(message);
                return;
            }
        };

        let dt = if is_testing_env() {
            self.expected_dt
        } else {
            let dt = match self.time_of_previous_observation {
                Some(previous) => {
                    let millis = (timestamp - previous).num_milliseconds();
                    if millis < 0 {
                        ctx.logger().debug(format!(
                            "Late arriving data: timestamp={timestamp}, previous={previous}"
                        ));
                        return;
                    }
                    millis as f64 / 1000.0 / 3600.0
                }
                None => 0.0,
            };
            self.time_of_previous_observation = Some(timestamp);
            dt
        };

        let Some(ekf) = self.ekf.as_mut() else { return };
        let (state, covariance) = ekf.update(&scaled, dt, self.recent_dilution);

        if let Some(count) = self.obs_since_last_dose.as_mut() {
            *count += 1;
            if *count >= self.obs_required_to_reset {
                self.obs_since_last_dose = None;
                self.recent_dilution = false;
            }
        }

        let growth_rate = GrowthRate { growth_rate: state[1], timestamp };
        let od_filtered = ODFiltered { od_filtered: state[0], timestamp };
        let kalman_filter_outputs =
            KalmanFilterOutput { state, covariance_matrix: covariance, timestamp };

        self.publish(ctx, "growth_rate", &growth_rate);
        self.publish(ctx, "od_filtered", &od_filtered);
        self.publish(ctx, "kalman_filter_outputs", &kalman_filter_outputs);

        self.write_cache(ctx, "growth_rate", state[1]);
        self.write_cache(ctx, "od_filtered", state[0]);

        emit(&growth_rate, &od_filtered, &kalman_filter_outputs);
    }

    fn publish<T: serde::Serialize>(&self, ctx: &JobContext, name: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(json) => ctx.update_setting(name, SettingValue::Json(json)),
            Err(e) => ctx.logger().debug(format!("could not encode {name}: {e}")),
        }
    }

    fn write_cache(&self, ctx: &JobContext, name: &str, value: f64) {
        let result = local_persistent_storage(ctx.data_dir(), name)
            .and_then(|cache| cache.set_json(ctx.experiment(), &value));
        if let Err(e) = result {
            ctx.logger().debug(format!("could not cache {name}: {e}"));
        }
    }

    /// Scale each channel as `(od - blank) / (mean - blank)`, channels in
    /// ascending order. Non-positive results reject the whole sample.
    fn scale_raw_observations(&self, readings: &ODReadings) -> Result<Vec<f64>, String> {
        let mut scaled = Vec::with_capacity(readings.ods.len());
        for (channel, reading) in &readings.ods {
            let Some(&mean) = self.od_normalization_factors.get(channel) else {
                continue;
            };
            let blank = self.od_blank.get(channel).copied().unwrap_or(0.0);
            let value = (reading.od - blank) / (mean - blank);
            if value <= 0.0 || !value.is_finite() {
                return Err(format!(
                    "Non-positive normalized value observed on channel {channel}: {value}. Likely the optical signal received is less than the blank signal, or the OD reading is 0."
                ));
            }
            scaled.push(value);
        }
        if scaled.is_empty() {
            return Err("No channels with normalization statistics in this sample.".to_string());
        }
        Ok(scaled)
    }

    fn acquire_statistics<O: ODObservationSource>(
        &mut self,
        ctx: &JobContext,
        od: &mut O,
        n_samples: usize,
    ) -> Result<(), StreamError> {
        if !self.ignore_cache {
            let means = local_persistent_storage(ctx.data_dir(), "od_normalization_mean")?
                .get_json::<BTreeMap<String, f64>>(ctx.experiment())?;
            let variances = local_persistent_storage(ctx.data_dir(), "od_normalization_variance")?
                .get_json::<BTreeMap<String, f64>>(ctx.experiment())?;
            if let (Some(means), Some(variances)) = (means, variances) {
                self.od_normalization_factors = means;
                self.od_variances = variances;
                self.warn_on_zero_variance(ctx);
                return Ok(());
            }
            ctx.logger()
                .debug("OD normalization factors or variances not found in cache. Computing them now.");
        }

        let (means, variances) = od_statistics(od, n_samples)?;
        ctx.logger().info("Completed OD normalization metrics.");
        if !self.ignore_cache {
            local_persistent_storage(ctx.data_dir(), "od_normalization_mean")?
                .set_json(ctx.experiment(), &means)?;
            local_persistent_storage(ctx.data_dir(), "od_normalization_variance")?
                .set_json(ctx.experiment(), &variances)?;
        }
        self.od_normalization_factors = means;
        self.od_variances = variances;
        self.warn_on_zero_variance(ctx);
        Ok(())
    }

    fn warn_on_zero_variance(&self, ctx: &JobContext) {
        if self.od_variances.values().any(|&v| v == 0.0) {
            ctx.logger().error(
                "OD variance is zero - this suggests the OD sensor is not working properly, or a calibration is wrong.",
            );
        }
    }

    fn acquire_blanks(&mut self, ctx: &JobContext) -> Result<(), StreamError> {
        self.od_blank = if self.ignore_cache {
            BTreeMap::new()
        } else {
            local_persistent_storage(ctx.data_dir(), "od_blank")?
                .get_json::<BTreeMap<String, f64>>(ctx.experiment())?
                .unwrap_or_default()
        };
        // a blank indistinguishable from the signal is stale; drop it
        for (channel, &mean) in &self.od_normalization_factors {
            let blank = self.od_blank.get(channel).copied().unwrap_or(0.0);
            if mean * 0.90 < blank {
                ctx.logger()
                    .info("Resetting od_blank because it is too close to current observations.");
                self.od_blank.insert(channel.clone(), 0.0);
            }
        }
        Ok(())
    }

    /// Observation noise per channel: the sensor variance scaled by the
    /// squared normalization factor, times the configured obs_std.
    fn observation_noise(&self, ctx: &JobContext, obs_std: f64) -> Result<Vec<f64>, StreamError> {
        let mut variances = Vec::new();
        for (channel, &mean) in &self.od_normalization_factors {
            let blank = self.od_blank.get(channel).copied().unwrap_or(0.0);
            let denominator = (mean - blank).powi(2);
            if denominator == 0.0 {
                // the statistics are unusable; force a recompute next run
                for cache_name in ["od_normalization_mean", "od_normalization_variance"] {
                    if let Ok(cache) = local_persistent_storage(ctx.data_dir(), cache_name) {
                        let _ = cache.pop(ctx.experiment());
                    }
                }
                return Err(StreamError::ZeroNormalization);
            }
            let variance = self.od_variances.get(channel).copied().unwrap_or(0.0);
            variances.push(obs_std.powi(2) * variance / denominator);
        }
        Ok(variances)
    }

    fn initial_values<O: ODObservationSource>(
        &mut self,
        ctx: &JobContext,
        od: &mut O,
    ) -> Result<(f64, f64), StreamError> {
        if self.ignore_cache {
            loop {
                let Some(readings) = od.next_reading() else {
                    return Err(StreamError::ExhaustedDuringNormalization);
                };
                match self.scale_raw_observations(&readings) {
                    Ok(scaled) => {
                        let mean = scaled.iter().sum::<f64>() / scaled.len() as f64;
                        return Ok((mean, 0.0));
                    }
                    Err(message) => ctx.logger().warning(message),
                }
            }
        }
        let initial_nod = local_persistent_storage(ctx.data_dir(), "od_filtered")?
            .get_json::<f64>(ctx.experiment())?
            .unwrap_or(1.0);
        let initial_rate = local_persistent_storage(ctx.data_dir(), "growth_rate")?
            .get_json::<f64>(ctx.experiment())?
            .unwrap_or(0.0);
        Ok((initial_nod, initial_rate))
    }
}

#[cfg(test)]
#[path = "estimator_tests.rs"]
mod tests;
