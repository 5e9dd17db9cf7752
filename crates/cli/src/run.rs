// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `pio run <job>`: host a job in this process until it disconnects.

use crate::commands::{broker, current_experiment, data_dir, load_config, parse_setting_pairs};
use clap::Args;
use indexmap::IndexMap;
use pio_core::settings::{PublishedSetting, SettingType, SettingValue};
use pio_jobs::{
    BackgroundJob, DodgingBehavior, DodgingJob, JobContext, JobError, JobSpec, SetOutcome,
};
use pio_streaming::{GrowthRateEstimator, GrowthRatePipeline, MqttDosingSource, MqttODSource};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// The job to run, e.g. `stirring` or `growth_rate_calculating`.
    pub job: String,

    /// Job-specific options, e.g. `--target-rpm 500` or `--ignore-cache`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub options: Vec<String>,
}

fn spec() -> JobSpec {
    let dir = data_dir();
    let config = load_config(&dir);
    let unit = pio_core::whoami::get_unit_name();
    let experiment = current_experiment();
    let broker = broker(&config);
    JobSpec::new(unit, experiment, broker, dir).with_config(config)
}

pub fn run(args: RunArgs) -> anyhow::Result<()> {
    match args.job.as_str() {
        "stirring" => run_stirring(&args.options),
        "growth_rate_calculating" => run_growth_rate(&args.options),
        other => {
            println!("Unknown job {other:?}. See `pio run --help`.");
            std::process::exit(1);
        }
    }
}

/// Stirring keeps the culture mixed; the magnetic field skews the
/// photodiodes, so it dodges OD readings. The PWM drive itself lives in
/// the hardware layer; this loop owns the target and the schedule.
struct Stirrer {
    target_rpm: f64,
}

impl DodgingBehavior for Stirrer {
    fn job_name(&self) -> &str {
        "stirring"
    }

    fn published_settings(&self) -> IndexMap<String, PublishedSetting> {
        let mut settings = IndexMap::new();
        settings.insert(
            "target_rpm".to_string(),
            PublishedSetting::new(SettingType::Float, true).with_unit("rpm"),
        );
        settings
    }

    fn on_init(&mut self, ctx: &JobContext) -> Result<(), JobError> {
        ctx.update_setting("target_rpm", self.target_rpm);
        Ok(())
    }

    fn action_to_do_before_od_reading(&mut self, ctx: &JobContext) {
        ctx.logger().debug("Pausing stirring for the OD reading.");
    }

    fn action_to_do_after_od_reading(&mut self, ctx: &JobContext) {
        ctx.logger().debug("Resuming stirring.");
    }

    fn set_setting(&mut self, _ctx: &JobContext, name: &str, value: SettingValue) -> SetOutcome {
        if name == "target_rpm" {
            self.target_rpm = value.as_f64().unwrap_or(self.target_rpm).max(0.0);
            return SetOutcome::Assign(SettingValue::Float(self.target_rpm));
        }
        SetOutcome::Assign(value)
    }
}

fn run_stirring(options: &[String]) -> anyhow::Result<()> {
    let pairs = parse_setting_pairs(options).map_err(anyhow::Error::msg)?;
    let spec = spec();
    let mut target_rpm = spec.config.getfloat_or("stirring", "target_rpm", 500.0);
    for (name, value) in pairs {
        if name == "target_rpm" {
            target_rpm = value.parse().map_err(|_| anyhow::anyhow!("bad --target-rpm"))?;
        }
    }

    let job = BackgroundJob::start(DodgingJob::new(Stirrer { target_rpm }), spec)?;
    job.block_until_disconnected();
    Ok(())
}

fn run_growth_rate(options: &[String]) -> anyhow::Result<()> {
    let ignore_cache = options.iter().any(|o| o == "--ignore-cache");
    let spec = spec();
    let broker = spec.broker.clone();
    let unit = spec.unit.clone();
    let experiment = spec.experiment.clone();

    let od = MqttODSource::new(broker.as_ref(), &unit, &experiment, 5)?;
    let dosing = MqttDosingSource::new(broker.as_ref(), &unit, &experiment)?;

    let job = BackgroundJob::start(GrowthRateEstimator, spec)?;
    let mut pipeline = GrowthRatePipeline::new(ignore_cache);
    pipeline.run(job.context(), od, dosing, |_, _, _| {})?;
    job.clean_up();
    Ok(())
}
