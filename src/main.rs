use clap::Parser;
use log::{error, info};
use snafu::ErrorCompat;

mod args;
mod report;

use crate::args::Args;
use crate::report::config_reader::build_settings;

fn main() {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if args.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let res = build_settings(args.config.as_deref(), &args.overrides())
        .and_then(|settings| report::run_report(&settings));

    match res {
        Ok(report) => {
            info!(
                "Analysis complete: {} jurisdictions, {} benefits",
                report.n_jurisdictions,
                report.benefit_flags.len()
            );
        }
        Err(e) => {
            error!("{:?}", e);
            eprintln!("An error occurred: {}", e);
            if let Some(bt) = ErrorCompat::backtrace(&e) {
                eprintln!("trace: {}", bt);
            }
            std::process::exit(1);
        }
    }
}
