use clap::{ArgAction, Parser, ValueEnum};
use diff_test_runner::config::ConfigLoader;
use diff_test_runner::{ColorMode, HarnessBuilder, Result};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

/// Run every test under a directory and diff its output against a reference file
#[derive(Parser, Debug)]
#[command(name = "diff-test-runner", version, long_about = None)]
struct Cli {
    /// Test file or directory (default: `tests/` next to the executable)
    #[arg(value_name = "PATH")]
    path: Option<PathBuf>,

    /// Increase verbosity (-v progress, -vv summary, -vvv per-test status, -vvvv captured output)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Per-test timeout in seconds
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Interpreter used for every registered extension
    #[arg(long, value_name = "PATH")]
    interpreter: Option<PathBuf>,

    /// When to color the report
    #[arg(long, value_enum, value_name = "WHEN")]
    color: Option<ColorArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorArg {
    Auto,
    Always,
    Never,
}

impl From<ColorArg> for ColorMode {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => ColorMode::Auto,
            ColorArg::Always => ColorMode::Always,
            ColorArg::Never => ColorMode::Never,
        }
    }
}

fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(2);
        }
    }
}

fn run(cli: Cli) -> Result<i32> {
    let tool_dir = tool_dir()?;

    let mut loader = ConfigLoader::new().tool_dir(&tool_dir);
    if let Some(path) = cli.config {
        loader = loader.config_file(path);
    }
    let (config, base_dir) = loader.load()?;

    let mut builder = HarnessBuilder::new().with_config(config).base_dir(base_dir);
    if cli.verbose > 0 {
        builder = builder.verbosity(cli.verbose);
    }
    if let Some(secs) = cli.timeout {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    if let Some(interpreter) = cli.interpreter {
        builder = builder.interpreter(interpreter);
    }
    if let Some(color) = cli.color {
        builder = builder.color(color.into());
    }
    let harness = builder.build()?;

    let root = cli.path.unwrap_or_else(|| tool_dir.join("tests"));
    let summary = harness.run(&root)?;
    Ok(summary.exit_code())
}

/// Directory containing the running executable.
fn tool_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe()?;
    Ok(exe
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".")))
}
