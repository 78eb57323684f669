//! Entry point: parses CLI options, builds a [`shadow_rs::core::config::SimConfig`], and runs the
//! [`shadow_rs::core::controller::Controller`] to completion.

use anyhow::Context;
use clap::Parser;

use shadow_rs::core::config::{CliOptions, SimConfig};
use shadow_rs::core::controller::Controller;
use shadow_rs::core::logger;

fn main() -> anyhow::Result<()> {
    let opts = CliOptions::parse();
    logger::init(opts.log_level);

    log::info!("starting up");

    let config = SimConfig::from_cli(&opts).context("building simulation config")?;
    let controller = Controller::new(config);
    let stats = controller.run().context("running simulation")?;

    log::info!(
        "simulation complete: {} events executed over {:?} of simulated time",
        stats.events_executed(),
        stats.final_time()
    );

    if stats.had_fatal_error() {
        std::process::exit(1);
    }
    Ok(())
}
