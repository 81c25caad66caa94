// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Drive the OP-TEE session dispatch layer from Linux userland
//!
//! The secure world is simulated in-process: TAs are the built-in apps of [`apps`], their images
//! are read from a directory standing in for the normal-world TA store, and requests come from a
//! JSON-formatted command sequence.

use anyhow::{Context as _, Result};
use clap::Parser;
use litebox_common_optee::TeeOrigin;
use litebox_optee_dispatch::{DispatchConfig, Dispatcher, SessionRegistry, TaLoader as _};
use std::path::PathBuf;

pub mod apps;
pub mod commands;
pub mod loader;
pub mod shm;
pub mod ta_image;
pub mod ta_manager;


use commands::CommandRunner;
use loader::FsTaLoader;
use shm::NormalWorldMemory;
use ta_manager::UserTaManager;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    /// Directory holding TA images, named `<uuid>.ta`
    #[arg(required = true, value_hint = clap::ValueHint::DirPath)]
    pub ta_dir: PathBuf,
    /// JSON-formatted command sequence to send to the dispatcher
    #[arg(required = true, value_hint = clap::ValueHint::FilePath)]
    pub command_sequence: PathBuf,
    /// Make the TA with this UUID resident before running any command (can be repeated)
    #[arg(long = "preload", value_name = "UUID")]
    pub preload: Vec<String>,
    /// Maximum number of sessions open at the same time
    #[arg(long, default_value = "16")]
    pub max_sessions: usize,
    /// Number of requests that can be in flight at the same time
    #[arg(long, default_value_t = DispatchConfig::default().scratch_slots)]
    pub scratch_slots: usize,
    /// Fail opens of TAs that are not resident instead of loading them
    #[arg(long)]
    pub no_lazy_load: bool,
    /// Increase verbosity (pass multiple times to increase)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl CliArgs {
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            scratch_slots: self.scratch_slots,
            lazy_load: !self.no_lazy_load,
        }
    }
}

/// Run a command sequence against a fresh secure world.
pub fn run(cli_args: &CliArgs) -> Result<()> {
    let commands = {
        let json = std::fs::read_to_string(&cli_args.command_sequence).with_context(|| {
            format!("cannot read {}", cli_args.command_sequence.display())
        })?;
        commands::parse_commands(&json)?
    };

    let shm = NormalWorldMemory::new();
    let manager = UserTaManager::new(&shm);
    let loader = FsTaLoader::new(&cli_args.ta_dir);
    let registry = SessionRegistry::new(cli_args.max_sessions);

    for uuid in &cli_args.preload {
        let uuid = commands::parse_uuid(uuid)?;
        let mut origin = TeeOrigin::Tee;
        let loaded = loader
            .load_from_normal_world(&uuid, &mut origin)
            .map_err(|res| {
                anyhow::anyhow!("cannot preload TA {uuid:?}: {res:?} (origin {origin:?})")
            })?;
        manager.install(&loaded.image);
    }

    let dispatcher = Dispatcher::new(&manager, &loader, &registry, cli_args.dispatch_config())?;
    CommandRunner::new(&dispatcher, &shm).run_all(&commands)?;
    tracing::info!(
        open_sessions = registry.len(),
        live_instances = manager.live_instances(),
        "finished {} commands",
        commands.len()
    );
    Ok(())
}
