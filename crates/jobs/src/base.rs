// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The background-job runtime.
//!
//! Lifecycle convention (Homie-inspired): a job starts in `init`, moves
//! to `ready`, may pause in `sleeping`, and ends in `disconnected`. If the
//! process dies without cleaning up, the subscriber connection's last-will
//! marks the retained `$state` topic `lost`.
//!
//! Construction order matters and is load-bearing:
//!
//! 1. validate the job name,
//! 2. open the publisher connection,
//! 3. refuse duplicates (the Job Manager is authoritative locally),
//! 4. register in the Job Manager,
//! 5. open the subscriber connection, installing the last-will,
//! 6. merge the framework's `state` entry into the settings schema,
//! 7. publish `init` (retained),
//! 8. hook the signal stack,
//! 9. validate the schema (clean up and surface on failure),
//! 10. subscribe to the `/set` channels and the `$state` echo,
//! 11. run the behavior's init,
//! 12. only then publish `ready`; a crash in behavior init must never
//!     leave a retained `ready` behind.

use crate::error::JobError;
use crate::logger::JobLogger;
use crate::signals;
use indexmap::IndexMap;
use parking_lot::Mutex;
use pio_core::settings::{
    decode_setting_payload, format_with_optional_units, validate_published_settings,
    PublishedSetting, SettingType, SettingValue,
};
use pio_core::{topics, Config, JobState, Latch};
use pio_pubsub::{Broker, Callback, Client, ClientPair, Message, QoS};
use pio_storage::{local_persistent_storage, DataDir, JobManager};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// How a behavior's setter registry responded to an ingest.
pub enum SetOutcome {
    /// Store and publish this (possibly clamped) value.
    Assign(SettingValue),
    /// The behavior already published the final value itself.
    Handled,
}

/// One control loop, hosted by [`BackgroundJob`].
///
/// Hooks run with the behavior lock held: they may freely use the
/// [`JobContext`], but must not call `request_state`/`request_clean_up`
/// (spawn a thread or use a timer for that).
pub trait JobBehavior: Send + 'static {
    fn job_name(&self) -> &str;

    /// Declarative schema of this job's published settings. The runtime
    /// merges in the `state` entry.
    fn published_settings(&self) -> IndexMap<String, PublishedSetting>;

    /// Behavior initialization. Runs after `init` is published and before
    /// `ready`; an error here cleans the job up and surfaces.
    fn on_init(&mut self, _ctx: &JobContext) -> Result<(), JobError> {
        Ok(())
    }

    fn on_ready(&mut self, _ctx: &JobContext) {}

    fn on_sleeping(&mut self, _ctx: &JobContext) {}

    fn on_disconnected(&mut self, _ctx: &JobContext) {}

    /// Called on every state change, before the target state's entry hook.
    fn on_transition(&mut self, _from: JobState, _to: JobState, _ctx: &JobContext) {}

    /// Explicit setter registry: decode already happened; return
    /// [`SetOutcome::Assign`] to accept (optionally clamped), or
    /// [`SetOutcome::Handled`] after publishing via the context yourself.
    fn set_setting(&mut self, _ctx: &JobContext, _name: &str, value: SettingValue) -> SetOutcome {
        SetOutcome::Assign(value)
    }
}

/// Everything a job needs beyond the behavior itself.
pub struct JobSpec {
    pub unit: String,
    pub experiment: String,
    pub broker: Arc<dyn Broker>,
    pub data_dir: DataDir,
    pub config: Config,
    /// Who started this job: "user", "experiment_profile", …
    /// Defaults from `JOB_SOURCE`.
    pub job_source: String,
    /// Where the job's code lives: "app", or a plugin name.
    pub source: String,
    pub long_running: bool,
    pub local_only_logging: bool,
}

impl JobSpec {
    pub fn new(
        unit: impl Into<String>,
        experiment: impl Into<String>,
        broker: Arc<dyn Broker>,
        data_dir: DataDir,
    ) -> Self {
        let config = Config::load_from_dir(data_dir.root()).unwrap_or_default();
        Self {
            unit: unit.into(),
            experiment: experiment.into(),
            broker,
            data_dir,
            config,
            job_source: std::env::var("JOB_SOURCE").unwrap_or_else(|_| "user".to_string()),
            source: "app".to_string(),
            long_running: false,
            local_only_logging: false,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Long-running jobs skip the active-worker check and resist
    /// wildcard kills (monitor, watchdog, …).
    pub fn long_running(mut self) -> Self {
        self.long_running = true;
        self
    }

    /// Plugin jobs carry their plugin's name as the source tag.
    pub fn plugin(mut self, plugin_name: impl Into<String>) -> Self {
        self.source = plugin_name.into();
        self
    }

    pub fn job_source(mut self, job_source: impl Into<String>) -> Self {
        self.job_source = job_source.into();
        self
    }

    pub fn local_only_logging(mut self) -> Self {
        self.local_only_logging = true;
        self
    }
}

struct SettingEntry {
    schema: PublishedSetting,
    value: Option<SettingValue>,
}

struct ContextInner {
    unit: String,
    experiment: String,
    job_name: String,
    job_id: i64,
    config: Config,
    data_dir: DataDir,
    logger: JobLogger,
    publisher: Arc<Client>,
    subscriber: Mutex<Option<Arc<Client>>>,
    job_manager: Arc<JobManager>,
    settings: Mutex<IndexMap<String, SettingEntry>>,
    state: Mutex<JobState>,
    latch: Latch,
    control: Mutex<Option<Weak<dyn JobControl>>>,
}

/// Cheap-to-clone handle behaviors use to talk to the outside world.
#[derive(Clone)]
pub struct JobContext {
    inner: Arc<ContextInner>,
}

impl JobContext {
    pub fn unit(&self) -> &str {
        &self.inner.unit
    }

    pub fn experiment(&self) -> &str {
        &self.inner.experiment
    }

    pub fn job_name(&self) -> &str {
        &self.inner.job_name
    }

    pub fn job_id(&self) -> i64 {
        self.inner.job_id
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn data_dir(&self) -> &DataDir {
        &self.inner.data_dir
    }

    pub fn logger(&self) -> &JobLogger {
        &self.inner.logger
    }

    pub fn job_manager(&self) -> &Arc<JobManager> {
        &self.inner.job_manager
    }

    pub fn state(&self) -> JobState {
        *self.inner.state.lock()
    }

    /// The event `clean_up` sets; live streams take it as a stop signal.
    pub fn latch(&self) -> Latch {
        self.inner.latch.clone()
    }

    /// Current value of a published setting.
    pub fn setting(&self, name: &str) -> Option<SettingValue> {
        self.inner.settings.lock().get(name).and_then(|e| e.value.clone())
    }

    /// Write a published setting: stores it, publishes it retained, and
    /// upserts the Job Manager row. The settings fan-out contract.
    pub fn update_setting(&self, name: &str, value: impl Into<SettingValue>) {
        let value = value.into();
        let known = {
            let mut settings = self.inner.settings.lock();
            match settings.get_mut(name) {
                Some(entry) => {
                    entry.value = Some(value.clone());
                    true
                }
                None => false,
            }
        };
        if !known {
            self.inner.logger.debug(format!("`{name}` is not a published setting; ignoring."));
            return;
        }
        let topic =
            topics::setting(&self.inner.unit, &self.inner.experiment, &self.inner.job_name, name);
        if let Err(e) =
            self.inner.publisher.publish(&topic, value.to_payload(), QoS::ExactlyOnce, true)
        {
            self.inner.logger.debug(format!("could not publish {name}: {e}"));
        }
        let row_name = if name == "state" { topics::STATE_SETTING } else { name };
        if let Err(e) =
            self.inner.job_manager.upsert_setting(self.inner.job_id, row_name, Some(&value.to_string()))
        {
            self.inner.logger.debug(format!("could not record {name}: {e}"));
        }
    }

    /// Publish a non-retained event payload (dosing events, automation
    /// events) via the publisher connection.
    pub fn publish_event(&self, topic: &str, payload: impl Into<Vec<u8>>) {
        if let Err(e) = self.inner.publisher.publish(topic, payload, QoS::AtLeastOnce, false) {
            self.inner.logger.debug(format!("could not publish event on {topic}: {e}"));
        }
    }

    /// Ask the monitor job to flash the error code on the node's LED.
    pub fn blink_error_code(&self, error_code: i32) {
        let topic = topics::monitor_flicker(&self.inner.unit, &self.inner.experiment);
        self.publish_event(&topic, error_code.to_string());
    }

    /// Add passive subscriptions on the subscriber connection.
    pub fn subscribe(
        &self,
        filters: &[&str],
        allow_retained: bool,
        callback: Callback,
    ) -> Result<(), JobError> {
        let subscriber = self.inner.subscriber.lock();
        match subscriber.as_ref() {
            Some(client) => {
                client.subscribe_and_callback(filters, QoS::ExactlyOnce, allow_retained, callback)?;
                Ok(())
            }
            None => Err(JobError::Pubsub(pio_pubsub::PubsubError::ConnectionClosed)),
        }
    }

    /// Request a state change. Must not be called from inside a behavior
    /// hook (the behavior lock is held there).
    pub fn request_state(&self, state: JobState) {
        if let Some(control) = self.control() {
            control.set_state(state);
        }
    }

    /// Request full clean-up. Same restriction as [`Self::request_state`].
    pub fn request_clean_up(&self) {
        if let Some(control) = self.control() {
            control.clean_up();
        }
    }

    /// Request clean-up from a fresh thread. The one escape hatch that is
    /// safe from inside a behavior hook.
    pub fn request_clean_up_from_thread(&self) {
        let ctx = self.clone();
        std::thread::spawn(move || ctx.request_clean_up());
    }

    fn control(&self) -> Option<Arc<dyn JobControl>> {
        self.inner.control.lock().as_ref().and_then(|weak| weak.upgrade())
    }
}

trait JobControl: Send + Sync {
    fn set_state(&self, state: JobState);
    fn clean_up(&self);
}

struct JobCore<B: JobBehavior> {
    ctx: JobContext,
    behavior: Mutex<B>,
    cleaned_up: AtomicBool,
    reconnect_ready: AtomicBool,
    signal_id: Mutex<Option<u64>>,
}

impl<B: JobBehavior> JobControl for JobCore<B> {
    fn set_state(&self, state: JobState) {
        JobCore::set_state(self, state);
    }

    fn clean_up(&self) {
        JobCore::clean_up(self);
    }
}

impl<B: JobBehavior> JobCore<B> {
    fn logger(&self) -> &JobLogger {
        self.ctx.logger()
    }

    fn set_state(&self, new_state: JobState) {
        if new_state == JobState::Disconnected {
            self.clean_up();
            return;
        }
        let current = self.ctx.state();
        if current == new_state {
            return;
        }
        if new_state == JobState::Lost {
            // only the broker's last-will writes `lost`
            self.logger().debug("Ignoring request to set state to lost.");
            return;
        }
        if !current.can_transition_to(new_state) {
            self.logger().debug(format!("Invalid transition {current} -> {new_state}; ignoring."));
            return;
        }
        {
            let mut behavior = self.behavior.lock();
            behavior.on_transition(current, new_state, &self.ctx);
            *self.ctx.inner.state.lock() = new_state;
            match new_state {
                JobState::Ready => behavior.on_ready(&self.ctx),
                JobState::Sleeping => behavior.on_sleeping(&self.ctx),
                _ => {}
            }
        }
        self.publish_state(new_state);
    }

    fn publish_state(&self, state: JobState) {
        self.ctx.update_setting("state", SettingValue::String(state.to_string()));
        match state {
            JobState::Ready | JobState::Disconnected | JobState::Lost => {
                self.logger().info(format!("{}.", capitalize(state.as_str())));
            }
            _ => self.logger().debug(format!("{}.", capitalize(state.as_str()))),
        }
    }

    /// Republish every held setting; runs on broker reconnect so retained
    /// state recovers from a broker restart.
    fn republish_settings(&self) {
        let held: Vec<(String, SettingValue)> = self
            .ctx
            .inner
            .settings
            .lock()
            .iter()
            .filter_map(|(name, entry)| entry.value.clone().map(|v| (name.clone(), v)))
            .collect();
        for (name, value) in held {
            self.ctx.update_setting(&name, value);
        }
    }

    fn handle_set_message(&self, message: &Message) {
        let Some(setting) = topics::setting_from_set_topic(&message.topic) else { return };
        let setting = setting.to_string();

        if setting == "state" {
            match message.payload_str().parse::<JobState>() {
                Ok(state) => self.set_state(state),
                Err(e) => self.logger().debug(format!("Bad state payload: {e}")),
            }
            return;
        }

        let (schema, previous) = {
            let settings = self.ctx.inner.settings.lock();
            match settings.get(&setting) {
                None => {
                    self.logger().debug(format!(
                        "Unable to set `{setting}` in {}. `{setting}` is not a published setting.",
                        self.ctx.job_name()
                    ));
                    return;
                }
                Some(entry) => (entry.schema.clone(), entry.value.clone()),
            }
        };
        if !schema.settable {
            self.logger().warning(format!(
                "Unable to set `{setting}` in {}. `{setting}` is read-only.",
                self.ctx.job_name()
            ));
            return;
        }

        let value = match decode_setting_payload(&message.payload, schema.datatype) {
            Ok(value) => value,
            Err(e) => {
                self.logger().debug(format!("Bad payload for `{setting}`: {e}"));
                return;
            }
        };

        let outcome = self.behavior.lock().set_setting(&self.ctx, &setting, value);
        if let SetOutcome::Assign(value) = outcome {
            self.ctx.update_setting(&setting, value);
        }

        let unit = schema.unit.as_deref();
        let before = previous.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());
        let after =
            self.ctx.setting(&setting).map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());
        self.logger().info(format!(
            "Updated {setting} from {} to {}.",
            format_with_optional_units(&before, unit),
            format_with_optional_units(&after, unit)
        ));
    }

    /// Divergence repair: a retained `lost` while we are alive means the
    /// broker fired our will spuriously (e.g. a network flap). Republish
    /// the real state once, after a short delay.
    ///
    /// The delay runs on its own thread; this callback shares the
    /// subscriber's dispatch thread and must not stall ingress.
    fn handle_state_echo(&self, message: &Message) {
        if message.is_empty() {
            return;
        }
        let local = self.ctx.state();
        if local == JobState::Init {
            return;
        }
        let broker_state = message.payload_str().to_string();
        if broker_state == JobState::Lost.as_str() && local != JobState::Lost {
            self.logger().debug(format!(
                "Job is in state {local}, but in state {broker_state} in broker. Attempting fix by publishing {local}."
            ));
            let ctx = self.ctx.clone();
            std::thread::spawn(move || {
                // a clean-up racing in sets the latch and wins
                if ctx.latch().wait_for(Duration::from_secs(1)) {
                    return;
                }
                let current = ctx.state();
                if current.is_alive() {
                    ctx.update_setting("state", SettingValue::String(current.to_string()));
                }
            });
        }
    }

    fn clean_up(&self) {
        if self.cleaned_up.swap(true, Ordering::SeqCst) {
            return;
        }
        let current = self.ctx.state();
        if current != JobState::Disconnected {
            {
                let mut behavior = self.behavior.lock();
                behavior.on_transition(current, JobState::Disconnected, &self.ctx);
                *self.ctx.inner.state.lock() = JobState::Disconnected;
                // at-exit races are common here; the hook's failures are
                // the behavior's own to log
                behavior.on_disconnected(&self.ctx);
            }
            self.ctx.update_setting("state", SettingValue::String(JobState::Disconnected.to_string()));
            self.logger().info("Disconnected.");
        }

        self.clear_nonpersistent_settings();

        if let Err(e) = self.ctx.inner.job_manager.set_not_running(self.ctx.job_id()) {
            self.logger().debug(format!("could not deregister from the job manager: {e}"));
        }

        if let Some(id) = self.signal_id.lock().take() {
            signals::deregister_cleanup(id);
        }

        // subscriber first so the will cannot fire spuriously; the
        // publisher carried the final `disconnected` and goes last
        if let Some(subscriber) = self.ctx.inner.subscriber.lock().as_ref() {
            subscriber.disconnect();
        }
        self.ctx.inner.publisher.disconnect();

        self.ctx.inner.latch.set();
    }

    /// Zero-length retained payloads on the broker, NULLs in the Job
    /// Manager, for every setting not marked `persist`.
    fn clear_nonpersistent_settings(&self) {
        let to_clear: Vec<String> = {
            let mut settings = self.ctx.inner.settings.lock();
            let names: Vec<String> = settings
                .iter()
                .filter(|(_, entry)| !entry.schema.persist && entry.value.is_some())
                .map(|(name, _)| name.clone())
                .collect();
            for name in &names {
                if let Some(entry) = settings.get_mut(name) {
                    entry.value = None;
                }
            }
            names
        };
        for name in &to_clear {
            let topic = topics::setting(
                &self.ctx.inner.unit,
                &self.ctx.inner.experiment,
                &self.ctx.inner.job_name,
                name,
            );
            if let Err(e) = self.ctx.inner.publisher.clear_retained(&topic) {
                self.logger().debug(format!("could not clear {name}: {e}"));
            }
            if let Err(e) =
                self.ctx.inner.job_manager.upsert_setting(self.ctx.job_id(), name, None)
            {
                self.logger().debug(format!("could not null {name}: {e}"));
            }
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

/// Active-worker check: `ACTIVE` env wins, then the persistent
/// `active_workers` cache maintained by the leader, defaulting active.
fn worker_is_active(spec: &JobSpec) -> bool {
    match std::env::var("ACTIVE").as_deref() {
        Ok("1") => return true,
        Ok("0") => return false,
        _ => {}
    }
    match local_persistent_storage(&spec.data_dir, "active_workers") {
        Ok(cache) => match cache.get(&spec.unit) {
            Ok(Some(value)) => value != "0" && value.to_lowercase() != "false",
            _ => true,
        },
        Err(_) => true,
    }
}

/// A running background job. Dropping it cleans up.
pub struct BackgroundJob<B: JobBehavior> {
    core: Arc<JobCore<B>>,
}

impl<B: JobBehavior> std::fmt::Debug for BackgroundJob<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundJob").finish_non_exhaustive()
    }
}

impl<B: JobBehavior> BackgroundJob<B> {
    /// Run the construction sequence and bring the job to `ready`.
    pub fn start(behavior: B, spec: JobSpec) -> Result<Self, JobError> {
        let job_name = behavior.job_name().to_string();
        if !topics::is_valid_job_name(&job_name) {
            return Err(JobError::BadJobName(job_name));
        }
        if !spec.long_running && !worker_is_active(&spec) {
            return Err(JobError::NotActiveWorker { unit: spec.unit });
        }

        let publisher = Arc::new(Client::connect(
            spec.broker.as_ref(),
            ClientPair::publisher_options(&spec.unit, &spec.experiment, &job_name),
        )?);
        let logger = JobLogger::new(
            &spec.unit,
            &spec.experiment,
            &job_name,
            &spec.source,
            if spec.local_only_logging { None } else { Some(Arc::clone(&publisher)) },
        );

        let job_manager = Arc::new(JobManager::open_in_dir(&spec.data_dir)?);
        if let Some(job_id) = job_manager.get_running_job_id(&job_name)? {
            logger.warning(format!("{job_name} is already running (job_id={job_id}). Skipping."));
            publisher.disconnect();
            return Err(JobError::JobPresent { job_name, job_id });
        }

        let leader = pio_core::whoami::leader_hostname(&spec.config);
        let job_id = job_manager.register_and_set_running(
            &spec.unit,
            &spec.experiment,
            &job_name,
            &spec.job_source,
            std::process::id() as i32,
            &leader,
            spec.long_running,
        )?;

        let mut settings: IndexMap<String, SettingEntry> = behavior
            .published_settings()
            .into_iter()
            .map(|(name, schema)| (name, SettingEntry { schema, value: None }))
            .collect();
        settings.insert(
            "state".to_string(),
            SettingEntry {
                schema: PublishedSetting::new(SettingType::String, true).persisted(),
                value: None,
            },
        );

        let ctx = JobContext {
            inner: Arc::new(ContextInner {
                unit: spec.unit.clone(),
                experiment: spec.experiment.clone(),
                job_name: job_name.clone(),
                job_id,
                config: spec.config,
                data_dir: spec.data_dir,
                logger,
                publisher,
                subscriber: Mutex::new(None),
                job_manager,
                settings: Mutex::new(settings),
                state: Mutex::new(JobState::Init),
                latch: Latch::new(),
                control: Mutex::new(None),
            }),
        };

        let core = Arc::new(JobCore {
            ctx: ctx.clone(),
            behavior: Mutex::new(behavior),
            cleaned_up: AtomicBool::new(false),
            reconnect_ready: AtomicBool::new(false),
            signal_id: Mutex::new(None),
        });
        {
            let weak: Weak<dyn JobControl> = {
                let weak: Weak<JobCore<B>> = Arc::downgrade(&core);
                weak
            };
            *ctx.inner.control.lock() = Some(weak);
        }

        // subscriber carries the last-will; reconnects republish settings
        let reconnect_core = Arc::downgrade(&core);
        let on_connect: Arc<dyn Fn() + Send + Sync> = Arc::new(move || {
            if let Some(core) = reconnect_core.upgrade() {
                if core.reconnect_ready.load(Ordering::SeqCst) {
                    core.logger().info("Sub client reconnected to the MQTT broker on leader.");
                    core.republish_settings();
                }
            }
        });
        let subscriber = Arc::new(Client::connect(
            spec.broker.as_ref(),
            ClientPair::subscriber_options(
                &ctx.inner.unit,
                &ctx.inner.experiment,
                &job_name,
                on_connect,
            ),
        )?);
        *ctx.inner.subscriber.lock() = Some(Arc::clone(&subscriber));

        // retained `init` goes out before anything can fail below
        core.publish_state(JobState::Init);

        let signal_core = Arc::downgrade(&core);
        let signal_id = signals::register_cleanup(move || {
            if let Some(core) = signal_core.upgrade() {
                core.clean_up();
            }
        });
        *core.signal_id.lock() = Some(signal_id);

        {
            let settings = ctx.inner.settings.lock();
            let result =
                validate_published_settings(settings.iter().map(|(n, e)| (n.as_str(), &e.schema)));
            if let Err(e) = result {
                drop(settings);
                core.logger().error(e.to_string());
                core.clean_up();
                return Err(e.into());
            }
        }

        let set_core = Arc::downgrade(&core);
        let set_filters = [
            topics::set_filter(&ctx.inner.unit, &ctx.inner.experiment, &job_name),
            topics::set_filter(topics::BROADCAST, &ctx.inner.experiment, &job_name),
        ];
        subscriber.subscribe_and_callback(
            &[set_filters[0].as_str(), set_filters[1].as_str()],
            QoS::ExactlyOnce,
            false,
            Arc::new(move |message: &Message| {
                if let Some(core) = set_core.upgrade() {
                    core.handle_set_message(message);
                }
            }),
        )?;

        let echo_core = Arc::downgrade(&core);
        let state_topic = topics::state(&ctx.inner.unit, &ctx.inner.experiment, &job_name);
        subscriber.subscribe_and_callback(
            &[state_topic.as_str()],
            QoS::ExactlyOnce,
            true,
            Arc::new(move |message: &Message| {
                if let Some(core) = echo_core.upgrade() {
                    core.handle_state_echo(message);
                }
            }),
        )?;

        let init_result = core.behavior.lock().on_init(&ctx);
        if let Err(e) = init_result {
            core.logger().error(e.to_string());
            core.clean_up();
            return Err(e);
        }

        core.reconnect_ready.store(true, Ordering::SeqCst);
        core.set_state(JobState::Ready);

        Ok(Self { core })
    }

    pub fn context(&self) -> &JobContext {
        &self.core.ctx
    }

    pub fn state(&self) -> JobState {
        self.core.ctx.state()
    }

    pub fn job_id(&self) -> i64 {
        self.core.ctx.job_id()
    }

    pub fn set_state(&self, state: JobState) {
        self.core.set_state(state);
    }

    /// Full, idempotent clean-up: `disconnected` published, non-persistent
    /// settings cleared, Job Manager row closed, connections shut in order.
    pub fn clean_up(&self) {
        self.core.clean_up();
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.core.cleaned_up.load(Ordering::SeqCst)
    }

    /// Block the calling thread until the job disconnects, via signal,
    /// broker `$state/set`, or another thread's `clean_up`.
    pub fn block_until_disconnected(&self) {
        self.core.logger().debug(format!("{} is blocking until disconnected.", self.core.ctx.job_name()));
        self.core.ctx.inner.latch.wait();
    }

    /// Run a closure against the behavior (tests and owning loops).
    pub fn with_behavior<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        f(&mut self.core.behavior.lock())
    }
}

impl<B: JobBehavior> Drop for BackgroundJob<B> {
    fn drop(&mut self) {
        self.core.clean_up();
    }
}

#[cfg(test)]
#[path = "base_tests.rs"]
mod tests;
