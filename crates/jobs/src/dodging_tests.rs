// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::base::{BackgroundJob, JobSpec};
use pio_core::Config;
use pio_pubsub::InProcessBroker;
use pio_storage::{DataDir, JobManager};
use std::sync::atomic::AtomicUsize;

#[test]
fn boundary_wraps_to_full_interval() {
    // interval=5, first observation at 100, now 105: the next OD is a
    // whole interval away, not zero
    let timing = compute_od_timing(5.0, 100.0, 105.0, 1.0, 0.5, 0.5, 0.0).unwrap();
    assert_eq!(timing.time_to_next_od, 5.0);
}

#[yare::parameterized(
    mid_cycle   = { 5.0, 100.0, 106.5, 3.5 },
    just_after  = { 5.0, 100.0, 105.1, 4.9 },
    many_cycles = { 4.0, 10.0, 101.0, 1.0 },
)]
fn alignment_to_the_od_cadence(interval: f64, first: f64, now: f64, expected: f64) {
    let timing = compute_od_timing(interval, first, now, 0.5, 0.1, 0.1, 0.0).unwrap();
    assert!((timing.time_to_next_od - expected).abs() < 1e-9);
}

#[test]
fn wait_window_is_the_leftover_budget() {
    let timing = compute_od_timing(10.0, 0.0, 3.0, 1.0, 1.5, 0.5, 0.25).unwrap();
    assert!((timing.wait_window - 6.75).abs() < 1e-9);
}

#[yare::parameterized(
    exactly_full   = { 4.0, 1.0, 1.5, 1.5, 0.0 },
    overfull       = { 4.0, 1.0, 1.5, 1.5, 0.6 },
    tiny_interval  = { 1.0, 1.0, 0.25, 0.25, 0.0 },
)]
fn infeasible_budgets_error(
    interval: f64,
    od_duration: f64,
    pre_delay: f64,
    post_delay: f64,
    after_action: f64,
) {
    let err = compute_od_timing(interval, 0.0, 2.0, od_duration, pre_delay, post_delay, after_action)
        .unwrap_err();
    assert!(matches!(err, JobError::DodgingTiming { .. }));
}

#[test]
fn feasible_iff_components_sum_below_interval() {
    // wait_window > 0 exactly when od + pre + post + after < interval
    assert!(compute_od_timing(5.0, 0.0, 1.0, 1.0, 1.5, 1.5, 0.9).is_ok());
    assert!(compute_od_timing(5.0, 0.0, 1.0, 1.0, 1.5, 1.5, 1.0).is_err());
}

#[yare::parameterized(
    disabled_ready        = { false, Some(JobState::Ready), false },
    disabled_none         = { false, None, false },
    disabled_lost         = { false, Some(JobState::Lost), false },
    enabled_ready         = { true, Some(JobState::Ready), true },
    enabled_sleeping      = { true, Some(JobState::Sleeping), true },
    enabled_init          = { true, Some(JobState::Init), true },
    enabled_disconnected  = { true, Some(JobState::Disconnected), false },
    enabled_lost          = { true, Some(JobState::Lost), false },
    enabled_none          = { true, None, false },
    disabled_init         = { false, Some(JobState::Init), false },
    disabled_sleeping     = { false, Some(JobState::Sleeping), false },
    disabled_disconnected = { false, Some(JobState::Disconnected), false },
)]
fn desired_mode_grid(enable: bool, od_state: Option<JobState>, expected: bool) {
    assert_eq!(desired_dodging_mode(enable, od_state), expected);
}

// -- integration against a fake od_reading registration ----------------

const UNIT: &str = "unit1";
const EXPERIMENT: &str = "exp1";

#[derive(Default)]
struct Bubbler {
    before_calls: Arc<AtomicUsize>,
    after_calls: Arc<AtomicUsize>,
    dodging_inits: Arc<AtomicUsize>,
    continuous_inits: Arc<AtomicUsize>,
}

impl DodgingBehavior for Bubbler {
    fn job_name(&self) -> &str {
        "air_bubbler"
    }

    fn action_to_do_before_od_reading(&mut self, _ctx: &JobContext) {
        self.before_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn action_to_do_after_od_reading(&mut self, _ctx: &JobContext) {
        self.after_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn initialize_dodging_operation(&mut self, _ctx: &JobContext) {
        self.dodging_inits.fetch_add(1, Ordering::SeqCst);
    }

    fn initialize_continuous_operation(&mut self, _ctx: &JobContext) {
        self.continuous_inits.fetch_add(1, Ordering::SeqCst);
    }
}

struct Fixture {
    broker: InProcessBroker,
    _tmp: tempfile::TempDir,
    data_dir: DataDir,
}

impl Fixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        Self {
            broker: InProcessBroker::new(),
            data_dir: DataDir::new(tmp.path()),
            _tmp: tmp,
        }
    }

    /// Register a fake running od_reading job with the given cadence.
    fn register_od_reading(&self, interval: f64) -> i64 {
        let jm = JobManager::open_in_dir(&self.data_dir).unwrap();
        let job_id = jm
            .register_and_set_running(UNIT, EXPERIMENT, "od_reading", "user", 2_000_000_000, "leader", false)
            .unwrap();
        jm.upsert_setting(job_id, "interval", Some(&interval.to_string())).unwrap();
        let first_obs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs_f64();
        jm.upsert_setting(job_id, "first_od_obs_time", Some(&first_obs.to_string())).unwrap();
        job_id
    }

    fn spec(&self, enable_dodging: bool) -> JobSpec {
        let config = Config::parse(&format!(
            "[air_bubbler]\nenable_dodging_od = {enable_dodging}\npre_delay_duration = 0.3\npost_delay_duration = 0.3\n"
        ))
        .unwrap();
        JobSpec::new(UNIT, EXPERIMENT, Arc::new(self.broker.clone()), self.data_dir.clone())
            .with_config(config)
            .local_only_logging()
    }

    fn wait_until<F: Fn() -> bool>(&self, predicate: F) {
        for _ in 0..1200 {
            if predicate() {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("condition not met within 6s");
    }
}

#[test]
fn dodging_disabled_runs_continuously() {
    let fixture = Fixture::new();
    let behavior = Bubbler::default();
    let continuous = Arc::clone(&behavior.continuous_inits);
    let dodging = Arc::clone(&behavior.dodging_inits);

    let job = BackgroundJob::start(DodgingJob::new(behavior), fixture.spec(false)).unwrap();
    assert_eq!(continuous.load(Ordering::SeqCst), 1);
    assert_eq!(dodging.load(Ordering::SeqCst), 0);
    assert_eq!(
        job.context().setting("currently_dodging_od"),
        Some(SettingValue::Boolean(false))
    );
    job.clean_up();
}

#[test]
fn dodging_enabled_with_running_od_job_installs_the_timer() {
    let fixture = Fixture::new();
    fixture.register_od_reading(1.7);

    let behavior = Bubbler::default();
    let dodging = Arc::clone(&behavior.dodging_inits);
    let before = Arc::clone(&behavior.before_calls);
    let after = Arc::clone(&behavior.after_calls);

    let job = BackgroundJob::start(DodgingJob::new(behavior), fixture.spec(true)).unwrap();
    assert_eq!(dodging.load(Ordering::SeqCst), 1);
    assert_eq!(
        job.context().setting("currently_dodging_od"),
        Some(SettingValue::Boolean(true))
    );

    // the sneak-in cycle fires within a couple of intervals
    fixture.wait_until(|| {
        after.load(Ordering::SeqCst) >= 1 && before.load(Ordering::SeqCst) >= 1
    });
    job.clean_up();
}

#[test]
fn od_job_disconnecting_flips_to_continuous() {
    let fixture = Fixture::new();
    fixture.register_od_reading(1.7);

    let behavior = Bubbler::default();
    let continuous = Arc::clone(&behavior.continuous_inits);

    let job = BackgroundJob::start(DodgingJob::new(behavior), fixture.spec(true)).unwrap();
    assert_eq!(continuous.load(Ordering::SeqCst), 0);

    fixture.broker.inject(&topics::state(UNIT, EXPERIMENT, "od_reading"), "disconnected", false);

    fixture.wait_until(|| continuous.load(Ordering::SeqCst) == 1);
    assert_eq!(
        job.context().setting("currently_dodging_od"),
        Some(SettingValue::Boolean(false))
    );
    job.clean_up();
}

#[test]
fn enable_over_the_set_topic_flips_modes() {
    let fixture = Fixture::new();
    fixture.register_od_reading(1.7);

    let behavior = Bubbler::default();
    let dodging = Arc::clone(&behavior.dodging_inits);

    let job = BackgroundJob::start(DodgingJob::new(behavior), fixture.spec(false)).unwrap();
    assert_eq!(dodging.load(Ordering::SeqCst), 0);

    fixture.broker.inject(
        &topics::setting_set(UNIT, EXPERIMENT, "air_bubbler", "enable_dodging_od"),
        "true",
        false,
    );

    fixture.wait_until(|| dodging.load(Ordering::SeqCst) == 1);
    fixture
        .wait_until(|| job.context().setting("enable_dodging_od") == Some(SettingValue::Boolean(true)));
    job.clean_up();
}

#[test]
fn infeasible_delays_clean_the_job_up() {
    let fixture = Fixture::new();
    // interval 1.0s with od duration 1.0s leaves nothing to budget
    fixture.register_od_reading(1.0);

    let behavior = Bubbler::default();
    let job = BackgroundJob::start(DodgingJob::new(behavior), fixture.spec(true)).unwrap();

    fixture.wait_until(|| job.is_cleaned_up());
    assert_eq!(
        fixture.broker.retained_str(&topics::state(UNIT, EXPERIMENT, "air_bubbler")).as_deref(),
        Some("disconnected")
    );
}

#[test]
fn missing_od_job_with_dodging_enabled_stays_continuous() {
    let fixture = Fixture::new();
    let behavior = Bubbler::default();
    let continuous = Arc::clone(&behavior.continuous_inits);

    let job = BackgroundJob::start(DodgingJob::new(behavior), fixture.spec(true)).unwrap();
    assert_eq!(continuous.load(Ordering::SeqCst), 1);
    assert_eq!(
        job.context().setting("currently_dodging_od"),
        Some(SettingValue::Boolean(false))
    );
    job.clean_up();
}
