// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `pio serve`: host this node's HTTP surfaces.
//!
//! Every node serves `/unit_api`; the leader additionally serves `/api`,
//! backed by the dispatcher and the cluster inventory.

use crate::commands::{data_dir, load_config};
use clap::Args;
use pio_cluster::{
    leader_router, unit_api_router, ClusterDispatcher, Inventory, LeaderState, TaskStore,
    UnitApiState,
};
use pio_pubsub::{Client, ConnectOptions, MqttBroker};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Port to bind; defaults to the configured API port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Executable used to spawn jobs (defaults to this binary).
    #[arg(long)]
    pub pio_executable: Option<PathBuf>,
}

pub fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let dir = data_dir();
    let config = load_config(&dir);
    let unit = pio_core::whoami::get_unit_name();
    let port = args.port.unwrap_or_else(|| pio_core::whoami::api_port(&config));
    let pio_executable = match args.pio_executable {
        Some(path) => path,
        None => std::env::current_exe()?,
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let broker = MqttBroker::leader(pio_core::whoami::leader_hostname(&config));
        let publisher = Arc::new(Client::connect(
            &broker,
            ConnectOptions::new(format!("unit-api-{unit}")),
        )?);

        let unit_state = UnitApiState {
            unit: unit.clone(),
            data_dir: dir.clone(),
            config: config.clone(),
            tasks: TaskStore::new(),
            publisher,
            pio_executable,
        };
        let mut app = unit_api_router(unit_state);

        if pio_core::whoami::am_i_leader(&config) {
            let inventory = Arc::new(Inventory::open_in_dir(&dir)?);
            let leader_state = LeaderState {
                dispatcher: ClusterDispatcher::new(config.clone()),
                inventory,
            };
            app = app.merge(leader_router(leader_state));
            tracing::info!(unit, port, "serving /unit_api and /api (leader)");
        } else {
            tracing::info!(unit, port, "serving /unit_api");
        }

        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
        axum::serve(listener, app).await?;
        Ok::<(), anyhow::Error>(())
    })
}
