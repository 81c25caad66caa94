// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

use clap::Parser as _;
use litebox_runner_optee_dispatch::CliArgs;

fn main() -> anyhow::Result<()> {
    let cli_args = CliArgs::parse();
    tracing_subscriber::fmt()
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_level(true)
        .with_max_level(match cli_args.verbose {
            0 => tracing::Level::INFO,
            1 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        })
        .init();
    if cli_args.verbose > 2 {
        tracing::warn!(
            verbosity = cli_args.verbose,
            "Too much verbosity, capping to TRACE (equivalent to -vv)"
        );
    }
    litebox_runner_optee_dispatch::run(&cli_args)
}
