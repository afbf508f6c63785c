use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cli;
pub mod exit_codes;

use cli::args::Cli;
use cli::commands::dispatch;

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("pumuki_core=debug,pumuki_cli=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("fatal: {e:?}");
            e.downcast_ref::<pumuki_core::SkillsError>()
                .map(pumuki_core::SkillsError::exit_code)
                .unwrap_or(exit_codes::CONFIG_ERROR)
        }
    };
    std::process::exit(code);
}
