//
// Copyright (c) The Ofctl Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![warn(rust_2018_idioms)]

mod app;
mod codec;
mod config;
mod error;
mod southbound;

use std::sync::Arc;

use app::DefaultApp;
use clap::{App as ClapApp, Arg};
use codec::{PlaceholderCodec, PlaceholderPacketCodec};
use config::Config;
use ofctl_core::topology::InMemoryTopology;
use ofctl_core::{Controller, NetworkEvent};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &config::Logging) {
    if !logging.stdout {
        return;
    }
    let env_filter = EnvFilter::builder()
        .with_default_directive(format!("ofctl={}", logging.level).parse().unwrap())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

fn main() {
    let matches = ClapApp::new("Ofctl OpenFlow 1.0 controller")
        .version(clap::crate_version!())
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("file")
                .help("Specify an alternative configuration file."),
        )
        .get_matches();

    let config_file = matches.value_of("config");
    let config = Config::load(config_file);

    init_tracing(&config.logging);

    info!("starting up");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to create async runtime")
        .block_on(run(config));
}

async fn run(config: Config) {
    let listener = match southbound::bind(
        config.southbound.listen_addr,
        config.southbound.accept_backlog,
    ) {
        Ok(listener) => listener,
        Err(error) => {
            error.log();
            std::process::exit(1);
        }
    };
    info!(addr = %config.southbound.listen_addr, "southbound listener bound");

    let controller = Controller::new(config.update_mode());
    let handle = controller.handle();

    let (switch_tx, switch_rx) = mpsc::channel(256);
    // No LLDP-based discovery component is wired in (spec.md §1: out of
    // scope); the topology channel exists so the driver's multiplexer has
    // a second source to select over, but nothing ever sends on it here.
    let (_topo_tx, topo_rx) = mpsc::channel::<NetworkEvent>(1);

    let topology = InMemoryTopology::new();
    let wire_codec = Arc::new(PlaceholderCodec);
    let packet_codec = PlaceholderPacketCodec;

    ofctl_utils::task::Task::spawn(southbound::run(
        listener,
        wire_codec,
        switch_tx,
        handle,
    ))
    .detach();

    controller
        .start(switch_rx, topo_rx, &topology, &packet_codec, DefaultApp)
        .await;
}
