pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{
    BuildArgs, BuildOverrides, CliArgs, Commands, HealthArgs, LocalArgs, PlanArgs, RunArgs,
};
pub use output::{OutputFormat, OutputFormatter};
