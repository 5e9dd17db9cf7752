// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! OD-dodging: briefly yield around optical-density sampling windows.
//!
//! Stirring drives a magnetic field, LEDs skew photodiodes; jobs like
//! that wrap themselves in [`DodgingJob`], which aligns a repeating timer
//! to the OD job's cadence and calls the behavior's before/after hooks on
//! each side of the sampling window. When dodging is off, or the OD job
//! is not running, the behavior runs continuously instead.

use crate::base::{JobBehavior, JobContext, SetOutcome};
use crate::error::JobError;
use indexmap::IndexMap;
use parking_lot::Mutex;
use pio_core::settings::{PublishedSetting, SettingType, SettingValue};
use pio_core::{topics, JobState, Latch, RepeatedTimer};
use pio_pubsub::Message;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// How long one OD sample takes. May drift between releases; do not
/// build timing-critical logic on the exact value.
pub const OD_READING_DURATION: f64 = 1.0;

/// The computed budget for one OD cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OdTiming {
    /// Seconds the main activity may run inside one interval.
    pub wait_window: f64,
    /// Seconds until the next OD reading starts, aligned to the cadence.
    pub time_to_next_od: f64,
}

/// Compute the time budget between OD readings.
///
/// The schedule of one cycle is `[pre_delay][od_duration][post_delay]
/// [after_action][wait_window]`; a non-positive wait window means dodging
/// is impossible with the current timings. A boundary `now` (exactly on
/// the cadence) maps to a full interval, never zero.
pub fn compute_od_timing(
    interval: f64,
    first_od_obs_time: f64,
    now: f64,
    od_duration: f64,
    pre_delay: f64,
    post_delay: f64,
    after_action: f64,
) -> Result<OdTiming, JobError> {
    let wait_window = interval - od_duration - (pre_delay + post_delay) - after_action;
    if wait_window <= 0.0 {
        return Err(JobError::DodgingTiming {
            interval,
            od_duration,
            pre_delay,
            post_delay,
            after_action,
        });
    }
    let time_to_next_od = interval - ((now - first_od_obs_time).rem_euclid(interval));
    Ok(OdTiming { wait_window, time_to_next_od })
}

/// Should we dodge, given the user's enable flag and the OD job's state?
pub fn desired_dodging_mode(enable_dodging_od: bool, od_state: Option<JobState>) -> bool {
    if !enable_dodging_od {
        return false;
    }
    matches!(od_state, Some(JobState::Ready | JobState::Sleeping | JobState::Init))
}

/// The dodging half of a job: before/after actions around each OD
/// sample, and one-time initializers for each mode.
pub trait DodgingBehavior: Send + 'static {
    fn job_name(&self) -> &str;

    fn published_settings(&self) -> IndexMap<String, PublishedSetting> {
        IndexMap::new()
    }

    fn on_init(&mut self, _ctx: &JobContext) -> Result<(), JobError> {
        Ok(())
    }

    fn on_disconnected(&mut self, _ctx: &JobContext) {}

    fn action_to_do_before_od_reading(&mut self, _ctx: &JobContext) {}

    fn action_to_do_after_od_reading(&mut self, _ctx: &JobContext) {}

    fn initialize_dodging_operation(&mut self, _ctx: &JobContext) {}

    fn initialize_continuous_operation(&mut self, _ctx: &JobContext) {}

    fn set_setting(&mut self, _ctx: &JobContext, _name: &str, value: SettingValue) -> SetOutcome {
        SetOutcome::Assign(value)
    }
}

struct DodgeState {
    enabled: AtomicBool,
    currently_dodging: AtomicBool,
    init_called_once: AtomicBool,
    timer: Mutex<Option<RepeatedTimer>>,
    /// Set to break out of the wait window early (sleep, disconnect,
    /// mode flip).
    dodge_wait: Latch,
    pre_delay: Mutex<f64>,
    post_delay: Mutex<f64>,
}

impl DodgeState {
    fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            currently_dodging: AtomicBool::new(false),
            init_called_once: AtomicBool::new(false),
            timer: Mutex::new(None),
            dodge_wait: Latch::new(),
            pre_delay: Mutex::new(1.5),
            post_delay: Mutex::new(0.5),
        }
    }

    fn cancel_timer(&self) {
        if let Some(timer) = self.timer.lock().take() {
            timer.cancel();
        }
    }
}

/// Wraps a [`DodgingBehavior`] into a [`JobBehavior`].
pub struct DodgingJob<B: DodgingBehavior> {
    name: String,
    inner: Arc<Mutex<B>>,
    state: Arc<DodgeState>,
}

impl<B: DodgingBehavior> DodgingJob<B> {
    pub fn new(inner: B) -> Self {
        let name = inner.job_name().to_string();
        Self { name, inner: Arc::new(Mutex::new(inner)), state: Arc::new(DodgeState::new()) }
    }

    fn set_enable_dodging(
        inner: &Arc<Mutex<B>>,
        state: &Arc<DodgeState>,
        ctx: &JobContext,
        enable: bool,
    ) {
        state.enabled.store(enable, Ordering::SeqCst);
        ctx.update_setting("enable_dodging_od", enable);
        // without a retained OD state yet, fall back on the registry
        let od_state = match ctx.job_manager().is_job_running("od_reading") {
            Ok(true) => Some(JobState::Ready),
            _ => Some(JobState::Disconnected),
        };
        let desired = desired_dodging_mode(enable, od_state);
        Self::set_currently_dodging(inner, state, ctx, desired);
    }

    fn set_currently_dodging(
        inner: &Arc<Mutex<B>>,
        state: &Arc<DodgeState>,
        ctx: &JobContext,
        value: bool,
    ) {
        if !matches!(ctx.state(), JobState::Ready | JobState::Init) {
            return;
        }
        if state.init_called_once.load(Ordering::SeqCst)
            && state.currently_dodging.load(Ordering::SeqCst) == value
        {
            return;
        }
        state.currently_dodging.store(value, Ordering::SeqCst);
        state.init_called_once.store(true, Ordering::SeqCst);
        ctx.update_setting("currently_dodging_od", value);

        if value {
            ctx.logger().debug("Dodging enabled.");
            state.dodge_wait.clear();
            inner.lock().initialize_dodging_operation(ctx);
            Self::setup_timer(inner, state, ctx);
        } else {
            ctx.logger().debug("Dodging disabled; running continuously.");
            state.dodge_wait.set();
            state.cancel_timer();
            inner.lock().initialize_continuous_operation(ctx);
        }
    }

    /// Install the sneak-in timer, aligned to the OD cadence read from
    /// the running OD job's published settings.
    fn setup_timer(inner: &Arc<Mutex<B>>, state: &Arc<DodgeState>, ctx: &JobContext) {
        state.cancel_timer();

        let pre_delay = *state.pre_delay.lock();
        let post_delay = *state.post_delay.lock();

        let lookup = |setting: &str| -> Option<f64> {
            ctx.job_manager()
                .get_setting_from_running_job("od_reading", setting, Duration::from_secs(5))
                .ok()
                .and_then(|v| v.parse::<f64>().ok())
        };
        let (Some(interval), Some(first_od_obs_time)) =
            (lookup("interval"), lookup("first_od_obs_time"))
        else {
            ctx.logger().error(
                "Could not read the OD job's interval and first_od_obs_time; cannot dodge.",
            );
            ctx.request_clean_up_from_thread();
            return;
        };

        if interval - OD_READING_DURATION <= post_delay + pre_delay {
            ctx.logger().error(format!(
                "pre_delay={pre_delay} or post_delay={post_delay} is too high for samples_per_second={}. Decrease a delay or decrease samples_per_second.",
                1.0 / interval
            ));
            ctx.request_clean_up_from_thread();
            return;
        }

        let time_to_next_od = interval - ((epoch_seconds() - first_od_obs_time).rem_euclid(interval));

        let timer_inner = Arc::clone(inner);
        let timer_state = Arc::clone(state);
        let timer_ctx = ctx.clone();
        let sneak_in = move || {
            let ok = || {
                timer_ctx.state() == JobState::Ready
                    && timer_state.currently_dodging.load(Ordering::SeqCst)
            };
            if !ok() {
                return;
            }
            let started = Instant::now();
            timer_inner.lock().action_to_do_after_od_reading(&timer_ctx);
            let after_action = started.elapsed().as_secs_f64();

            let timing = match compute_od_timing(
                interval,
                first_od_obs_time,
                epoch_seconds(),
                OD_READING_DURATION,
                pre_delay,
                post_delay,
                after_action,
            ) {
                Ok(timing) => timing,
                Err(e) => {
                    timer_ctx.logger().error(e.to_string());
                    timer_ctx.request_clean_up();
                    return;
                }
            };
            if !ok() {
                return;
            }
            timer_state.dodge_wait.wait_for(Duration::from_secs_f64(timing.wait_window));
            if !ok() {
                return;
            }
            timer_inner.lock().action_to_do_before_od_reading(&timer_ctx);
        };

        let timer = RepeatedTimer::new(Duration::from_secs_f64(interval), sneak_in)
            .run_immediately(true)
            .run_after(Duration::from_secs_f64(
                time_to_next_od + post_delay + OD_READING_DURATION,
            ))
            .start();
        *state.timer.lock() = Some(timer);
    }
}

fn epoch_seconds() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

impl<B: DodgingBehavior> JobBehavior for DodgingJob<B> {
    fn job_name(&self) -> &str {
        &self.name
    }

    fn published_settings(&self) -> IndexMap<String, PublishedSetting> {
        let mut settings = self.inner.lock().published_settings();
        settings.insert(
            "enable_dodging_od".to_string(),
            PublishedSetting::new(SettingType::Boolean, true),
        );
        settings.insert(
            "currently_dodging_od".to_string(),
            PublishedSetting::new(SettingType::Boolean, false),
        );
        settings
    }

    fn on_init(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        let section = ctx.job_name().to_string();
        let pre_delay = ctx.config().getfloat_or(&section, "pre_delay_duration", 1.5);
        let post_delay = ctx.config().getfloat_or(&section, "post_delay_duration", 0.5);
        if pre_delay < 0.25 {
            ctx.logger().warning(
                "For optimal OD readings, keep `pre_delay_duration` more than 0.25 seconds.",
            );
        }
        if post_delay < 0.25 {
            ctx.logger().warning(
                "For optimal OD readings, keep `post_delay_duration` more than 0.25 seconds.",
            );
        }
        *self.state.pre_delay.lock() = pre_delay;
        *self.state.post_delay.lock() = post_delay;

        self.inner.lock().on_init(ctx)?;

        // flip modes when the OD job's state changes
        let od_state_topic = topics::state(ctx.unit(), ctx.experiment(), "od_reading");
        let callback_inner = Arc::clone(&self.inner);
        let callback_state = Arc::clone(&self.state);
        let callback_ctx = ctx.clone();
        ctx.subscribe(
            &[od_state_topic.as_str()],
            false,
            Arc::new(move |message: &Message| {
                if !callback_state.enabled.load(Ordering::SeqCst) {
                    return;
                }
                let Ok(od_state) = message.payload_str().parse::<JobState>() else { return };
                let desired = desired_dodging_mode(true, Some(od_state));
                Self::set_currently_dodging(
                    &callback_inner,
                    &callback_state,
                    &callback_ctx,
                    desired,
                );
            }),
        )?;

        let enable = ctx.config().getbool_or(&section, "enable_dodging_od", false);
        Self::set_enable_dodging(&self.inner, &self.state, ctx, enable);
        Ok(())
    }

    fn on_sleeping(&mut self, _ctx: &JobContext) {
        self.state.dodge_wait.set();
        if let Some(timer) = self.state.timer.lock().as_ref() {
            timer.pause();
        }
    }

    fn on_transition(&mut self, from: JobState, to: JobState, _ctx: &JobContext) {
        if from == JobState::Sleeping && to == JobState::Ready {
            self.state.dodge_wait.clear();
            if let Some(timer) = self.state.timer.lock().as_ref() {
                timer.unpause();
            }
        }
    }

    fn on_disconnected(&mut self, ctx: &JobContext) {
        self.state.dodge_wait.set();
        self.state.cancel_timer();
        self.inner.lock().on_disconnected(ctx);
    }

    fn set_setting(&mut self, ctx: &JobContext, name: &str, value: SettingValue) -> SetOutcome {
        if name == "enable_dodging_od" {
            let enable = value.as_bool().unwrap_or(false);
            Self::set_enable_dodging(&self.inner, &self.state, ctx, enable);
            return SetOutcome::Handled;
        }
        self.inner.lock().set_setting(ctx, name, value)
    }
}

#[cfg(test)]
#[path = "dodging_tests.rs"]
mod tests;
