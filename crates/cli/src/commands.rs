// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker CLI commands backed by the local registry and the broker.

use clap::{Args, Subcommand};
use pio_core::{topics, Config};
use pio_jobs::JobLogger;
use pio_pubsub::{Broker, Client, ConnectOptions, MqttBroker, QoS};
use pio_storage::{DataDir, JobManager, KillFilter};
use std::sync::Arc;

pub(crate) fn data_dir() -> DataDir {
    DataDir::from_env()
}

pub(crate) fn load_config(dir: &DataDir) -> Config {
    Config::load_from_dir(dir.root()).unwrap_or_default()
}

pub(crate) fn current_experiment() -> String {
    std::env::var("EXPERIMENT").unwrap_or_else(|_| topics::UNIVERSAL_EXPERIMENT.to_string())
}

pub(crate) fn broker(config: &Config) -> Arc<dyn Broker> {
    Arc::new(MqttBroker::leader(pio_core::whoami::leader_hostname(config)))
}

#[derive(Debug, Args)]
pub struct KillArgs {
    #[arg(long)]
    pub job_name: Option<String>,

    #[arg(long)]
    pub experiment: Option<String>,

    #[arg(long)]
    pub job_source: Option<String>,

    #[arg(long)]
    pub job_id: Option<i64>,

    /// Kill every job except long-running ones.
    #[arg(long)]
    pub all_jobs: bool,
}

/// Always exits 0; prints the number of signals issued.
pub fn kill(args: KillArgs) -> anyhow::Result<()> {
    let filter = KillFilter {
        all_jobs: args.all_jobs,
        job_name: args.job_name,
        experiment: args.experiment,
        job_source: args.job_source,
        job_id: args.job_id,
    };
    if filter.is_empty() {
        println!("Provide at least one filter: --job-name, --experiment, --job-source, --job-id, or --all-jobs.");
        return Ok(());
    }
    match JobManager::open_in_dir(&data_dir()).and_then(|jm| jm.kill_jobs(&filter)) {
        Ok(count) => println!("Killed {count} job(s)."),
        Err(e) => println!("Could not kill jobs: {e}"),
    }
    Ok(())
}

#[derive(Debug, Subcommand)]
pub enum JobsCommand {
    /// List currently running jobs on this node.
    Running,
    /// List every job ever run on this node.
    History,
    /// Show one job's record and settings.
    Info {
        #[arg(long)]
        job_id: Option<i64>,
        #[arg(long)]
        job_name: Option<String>,
    },
    /// Delete all non-running job records.
    Purge,
}

pub fn jobs(command: JobsCommand) -> anyhow::Result<()> {
    let jm = JobManager::open_in_dir(&data_dir())?;
    match command {
        JobsCommand::Running => {
            for job in jm.list_jobs()? {
                println!(
                    "[job_id={}] {} (unit={}, experiment={}, source={}) is running.",
                    job.job_id, job.job_name, job.unit, job.experiment, job.job_source
                );
            }
        }
        JobsCommand::History => {
            for job in jm.list_job_history()? {
                let ended = job.ended_at.as_deref().unwrap_or("-");
                println!(
                    "[job_id={}] {} (unit={}, experiment={}, source={}) started_at={} ended_at={}",
                    job.job_id, job.job_name, job.unit, job.experiment, job.job_source,
                    job.started_at, ended
                );
            }
        }
        JobsCommand::Info { job_id, job_name } => {
            let job_id = match (job_id, job_name) {
                (Some(job_id), _) => job_id,
                (None, Some(job_name)) => match jm.get_running_job_id(&job_name)? {
                    Some(job_id) => job_id,
                    None => {
                        println!("No running job named {job_name}.");
                        return Ok(());
                    }
                },
                (None, None) => {
                    println!("Provide --job-id or --job-name.");
                    return Ok(());
                }
            };
            match jm.get_job_info(job_id)? {
                None => println!("No job found with job_id={job_id}."),
                Some(job) => {
                    println!(
                        "[job_id={}] {} (unit={}, experiment={}, source={}, running={})",
                        job.job_id, job.job_name, job.unit, job.experiment, job.job_source,
                        job.is_running
                    );
                    for setting in jm.list_job_settings(job_id)? {
                        let value = setting.value.as_deref().unwrap_or("<cleared>");
                        println!("  {} = {}", setting.setting, value);
                    }
                }
            }
        }
        JobsCommand::Purge => {
            let removed = jm.purge_job_history()?;
            println!("Removed {removed} job record(s).");
        }
    }
    Ok(())
}

#[derive(Debug, Args)]
pub struct UpdateSettingsArgs {
    /// The job whose settings to change.
    pub job: String,

    #[arg(long, default_value = topics::UNIVERSAL_EXPERIMENT)]
    pub experiment: String,

    /// Pairs of `--<setting> <value>`, e.g. `--target-rpm 500`.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub settings: Vec<String>,
}

/// Parse `--name value` pairs; hyphens map to underscores.
pub(crate) fn parse_setting_pairs(raw: &[String]) -> Result<Vec<(String, String)>, String> {
    let mut pairs = Vec::new();
    let mut iter = raw.iter();
    while let Some(flag) = iter.next() {
        let Some(name) = flag.strip_prefix("--") else {
            return Err(format!("expected a --setting flag, got {flag:?}"));
        };
        let Some(value) = iter.next() else {
            return Err(format!("missing value for --{name}"));
        };
        pairs.push((name.replace('-', "_"), value.clone()));
    }
    Ok(pairs)
}

pub fn update_settings(args: UpdateSettingsArgs) -> anyhow::Result<()> {
    let pairs = match parse_setting_pairs(&args.settings) {
        Ok(pairs) if !pairs.is_empty() => pairs,
        Ok(_) => {
            println!("Provide at least one --<setting> <value> pair.");
            return Ok(());
        }
        Err(message) => {
            println!("{message}");
            return Ok(());
        }
    };

    let dir = data_dir();
    let config = load_config(&dir);
    let unit = pio_core::whoami::get_unit_name();
    let client = Client::connect(
        broker(&config).as_ref(),
        ConnectOptions::new(format!("update-settings-{unit}")),
    )?;
    for (setting, value) in pairs {
        let topic = topics::setting_set(&unit, &args.experiment, &args.job, &setting);
        client.publish(&topic, value.as_bytes().to_vec(), QoS::ExactlyOnce, false)?;
        println!("Set {} -> {}.", setting, value);
    }
    client.disconnect();
    Ok(())
}

pub fn blink() -> anyhow::Result<()> {
    let dir = data_dir();
    let config = load_config(&dir);
    let unit = pio_core::whoami::get_unit_name();
    let client = Client::connect(
        broker(&config).as_ref(),
        ConnectOptions::new(format!("blink-{unit}")),
    )?;
    let topic = topics::monitor_flicker(&unit, topics::UNIVERSAL_EXPERIMENT);
    client.publish(&topic, b"0".to_vec(), QoS::AtLeastOnce, false)?;
    client.disconnect();
    println!("Asked monitor to blink.");
    Ok(())
}

#[derive(Debug, Args)]
pub struct LogArgs {
    #[arg(short, long)]
    pub message: String,

    #[arg(short, long, default_value = "info")]
    pub level: String,

    #[arg(short, long, default_value = "CLI")]
    pub name: String,

    /// Do not forward the record to the broker.
    #[arg(long)]
    pub local_only: bool,
}

pub fn log(args: LogArgs) -> anyhow::Result<()> {
    let dir = data_dir();
    let config = load_config(&dir);
    let unit = pio_core::whoami::get_unit_name();
    let experiment = current_experiment();

    let publisher = if args.local_only {
        None
    } else {
        let client = Client::connect(
            broker(&config).as_ref(),
            ConnectOptions::new(format!("log-{unit}")),
        )?;
        Some(Arc::new(client))
    };
    let logger = JobLogger::new(&unit, &experiment, &args.name, "user", publisher.clone());
    logger.log_level(&args.level, &args.message);
    if let Some(publisher) = publisher {
        // give the record a beat to flush before dropping the connection
        std::thread::sleep(std::time::Duration::from_millis(100));
        publisher.disconnect();
    }
    Ok(())
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
