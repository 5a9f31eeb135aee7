use crate::config::VenvpackConfig;
use crate::toolchain::ToolKind;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Build-and-launch pipeline for Python applications in an isolated environment
#[derive(Parser, Debug)]
#[command(
    name = "venvpack",
    about = "Build-and-launch pipeline for Python applications in an isolated environment",
    version,
    author,
    long_about = "venvpack plans a container image for a Python application: a pinned \
                  base runtime, the build context copied into a fixed working directory, \
                  a virtual environment provisioned by uv, poetry or pipenv, and a fixed \
                  entry point that runs main.py inside that environment. It can build the \
                  image through the Docker daemon, run containers from it, or execute the \
                  same stages directly on the host."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - suppress non-error output"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Plan the image for a build context",
        long_about = "Scans the build context, pins the base runtime, detects the dependency \
                      tool and prints the resulting recipe.\n\n\
                      Examples:\n  \
                      venvpack plan\n  \
                      venvpack plan ./service --format dockerfile\n  \
                      venvpack plan --tool poetry --format json -o recipe.json"
    )]
    Plan(PlanArgs),

    #[command(
        about = "Build the image through the Docker daemon",
        long_about = "Plans the recipe, sends the build context to the Docker daemon and tags \
                      the result. Exits 1 when any stage fails.\n\n\
                      Examples:\n  \
                      venvpack build --tag jobs:latest\n  \
                      venvpack build ./service --tag jobs:dev --no-cache"
    )]
    Build(BuildArgs),

    #[command(
        about = "Run a container from a built image",
        long_about = "Starts the image's fixed entry point, relays its output and exits with \
                      the container's exit code. Configuration reaches the application through \
                      environment variables only.\n\n\
                      Examples:\n  \
                      venvpack run jobs:latest\n  \
                      venvpack run jobs:latest --env API_TOKEN=secret --env-file .env"
    )]
    Run(RunArgs),

    #[command(
        about = "Execute the stages on the host",
        long_about = "Materializes the context under a root directory, provisions the \
                      environment with the host interpreter and runs the entry point with the \
                      environment's bin directory first on PATH. Provisioning is skipped when \
                      the manifest and lock file are unchanged.\n\n\
                      Examples:\n  \
                      venvpack local --root /tmp/venvpack\n  \
                      venvpack local ./service --root ./.stage --force"
    )]
    Local(LocalArgs),

    #[command(
        about = "Check Docker daemon availability",
        long_about = "Pings the Docker daemon and reports its version.\n\n\
                      Examples:\n  \
                      venvpack health\n  \
                      venvpack health --format json"
    )]
    Health(HealthArgs),
}

/// Overrides for the `VENVPACK_*` build settings
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct BuildOverrides {
    #[arg(long, value_name = "VERSION", help = "Pin the interpreter version (e.g. 3.11)")]
    pub python: Option<String>,

    #[arg(long, value_name = "IMAGE", help = "Base image reference")]
    pub base_image: Option<String>,

    #[arg(long, value_name = "DIR", help = "Absolute working directory inside the image")]
    pub workdir: Option<String>,

    #[arg(long, value_name = "DIR", help = "Environment directory relative to the workdir")]
    pub venv: Option<String>,

    #[arg(long, value_parser = parse_tool, help = "Force the dependency tool (uv, poetry, pipenv)")]
    pub tool: Option<ToolKind>,

    #[arg(long, value_name = "VERSION", help = "Pin the dependency tool version")]
    pub tool_version: Option<String>,

    #[arg(long, value_name = "FILE", help = "Entry-point script relative to the workdir")]
    pub script: Option<String>,
}

impl BuildOverrides {
    pub fn apply(&self, mut config: VenvpackConfig) -> VenvpackConfig {
        if let Some(python) = &self.python {
            config.python_version = Some(python.clone());
        }
        if let Some(image) = &self.base_image {
            config.base_image = Some(image.clone());
        }
        if let Some(workdir) = &self.workdir {
            config.workdir = workdir.clone();
        }
        if let Some(venv) = &self.venv {
            config.venv_dir = venv.clone();
        }
        if let Some(tool) = self.tool {
            config.tool = Some(tool);
        }
        if let Some(version) = &self.tool_version {
            config.tool_version = Some(version.clone());
        }
        if let Some(script) = &self.script {
            config.script = script.clone();
        }
        config
    }
}

#[derive(Parser, Debug, Clone)]
pub struct PlanArgs {
    #[arg(value_name = "PATH", help = "Build context (defaults to current directory)")]
    pub context: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,

    #[arg(
        short = 'o',
        long,
        value_name = "FILE",
        help = "Write output to file instead of stdout"
    )]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: BuildOverrides,
}

#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    #[arg(value_name = "PATH", help = "Build context (defaults to current directory)")]
    pub context: Option<PathBuf>,

    #[arg(
        short = 't',
        long,
        value_name = "TAG",
        help = "Image tag (defaults to <project>:latest)"
    )]
    pub tag: Option<String>,

    #[arg(long, help = "Do not use the build cache")]
    pub no_cache: bool,

    #[arg(long, help = "Always attempt to pull a newer base image")]
    pub pull: bool,

    #[command(flatten)]
    pub overrides: BuildOverrides,
}

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    #[arg(value_name = "IMAGE", help = "Image to run")]
    pub image: String,

    #[arg(
        short = 'e',
        long = "env",
        value_name = "KEY=VALUE",
        help = "Environment variable for the application (repeatable)"
    )]
    pub env: Vec<String>,

    #[arg(long, value_name = "FILE", help = "Read environment variables from a .env file")]
    pub env_file: Option<PathBuf>,

    #[arg(long, help = "Keep the container after it exits")]
    pub keep: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct LocalArgs {
    #[arg(value_name = "PATH", help = "Build context (defaults to current directory)")]
    pub context: Option<PathBuf>,

    #[arg(long, value_name = "DIR", help = "Directory standing in for the image root")]
    pub root: PathBuf,

    #[arg(long, help = "Provision even when the manifest is unchanged")]
    pub force: bool,

    #[arg(
        long,
        value_name = "PROGRAM",
        default_value = "python3",
        help = "Host interpreter used in place of the image's"
    )]
    pub interpreter: String,

    #[command(flatten)]
    pub overrides: BuildOverrides,
}

#[derive(Parser, Debug, Clone)]
pub struct HealthArgs {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
    Dockerfile,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
            OutputFormatArg::Dockerfile => super::output::OutputFormat::Dockerfile,
        }
    }
}

fn parse_tool(s: &str) -> Result<ToolKind, String> {
    s.parse::<ToolKind>()
}
