use venvpack::cli::commands::{CliArgs, Commands};
use venvpack::cli::handlers::{handle_build, handle_health, handle_local, handle_plan, handle_run};
use venvpack::util::logging::{init_logging, json_requested, parse_level, LoggingConfig};
use venvpack::VERSION;

use clap::Parser;
use std::env;
use tracing::{debug, Level};

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging_from_args(&args);

    debug!("venvpack v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Plan(plan_args) => handle_plan(plan_args).await,
        Commands::Build(build_args) => handle_build(build_args).await,
        Commands::Run(run_args) => handle_run(run_args).await,
        Commands::Local(local_args) => handle_local(local_args).await,
        Commands::Health(health_args) => handle_health(health_args).await,
    };

    std::process::exit(exit_code);
}

fn init_logging_from_args(args: &CliArgs) {
    let level = if let Some(level_str) = &args.log_level {
        parse_level(level_str)
    } else if args.verbose {
        Level::DEBUG
    } else if args.quiet {
        Level::ERROR
    } else {
        let level_str = env::var("VENVPACK_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        parse_level(&level_str)
    };

    init_logging(LoggingConfig {
        level,
        use_json: json_requested(),
        include_target: true,
        ..Default::default()
    });
}
