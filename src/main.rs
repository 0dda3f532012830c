use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use env_logger::{Env, Target};
use log::LevelFilter;

use replay_analyzer::config::{self, AnalyzerConfig};
use replay_analyzer::protocol::{convert, definition_file_name, ProtocolRegistry};
use replay_analyzer::runner;
use replay_analyzer::stats::{BuildProcessor, CameraProcessor};

#[derive(Parser)]
#[command(name = "replay-analyzer", version, about = "Mass replay analyzer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Count trained units, constructed buildings and unit-spawning abilities
    Builds(CommonArgs),
    /// Count camera hotkey saves and jumps
    Cameras(CommonArgs),
    /// Convert s2protocol protocol<build>.py modules into protocol definitions
    Convert(ConvertArgs),
}

#[derive(Args)]
struct ConvertArgs {
    /// Directory receiving the protocol<build>.json files
    #[arg(long, env = "S2_PROTOCOLS_DIR", default_value = config::DEFAULT_PROTOCOLS)]
    out: PathBuf,

    /// s2protocol version modules, such as s2protocol/versions/protocol*.py
    #[arg(required = true, value_name = "MODULE")]
    modules: Vec<PathBuf>,
}

#[derive(Args)]
struct CommonArgs {
    /// CSV file receiving the aggregated statistics
    #[arg(long, default_value = config::DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Log file
    #[arg(long, default_value = config::DEFAULT_LOG)]
    log: PathBuf,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long = "verbose", value_name = "LEVEL", default_value = "info")]
    verbosity: LevelFilter,

    /// Number of worker threads
    #[arg(long, default_value_t = config::default_cpus())]
    cpus: usize,

    /// Directory with protocol<build>.json definitions
    #[arg(long, env = "S2_PROTOCOLS_DIR", default_value = config::DEFAULT_PROTOCOLS)]
    protocols: PathBuf,

    /// Directories containing replays and replay packs
    #[arg(required = true, value_name = "DIR")]
    paths: Vec<PathBuf>,
}

impl From<CommonArgs> for AnalyzerConfig {
    fn from(args: CommonArgs) -> Self {
        Self {
            paths: args.paths,
            output: args.output,
            log_file: args.log,
            log_level: args.verbosity,
            protocols: args.protocols,
            cpus: args.cpus.max(1),
            progress: true,
        }
    }
}

fn init_logging(path: &Path, level: LevelFilter) -> anyhow::Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create log file {}", path.display()))?;

    env_logger::Builder::from_env(Env::default().default_filter_or(level.as_str()))
        .target(Target::Pipe(Box::new(file)))
        .format_timestamp_millis()
        .try_init()?;
    Ok(())
}

fn convert_modules(args: &ConvertArgs) -> anyhow::Result<()> {
    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;

    for module in &args.modules {
        let build = convert::module_build(module).with_context(|| {
            format!("{} is not named protocol<build>.py", module.display())
        })?;
        let source = std::fs::read_to_string(module)
            .with_context(|| format!("failed to read {}", module.display()))?;
        let protocol = convert::convert(&source, build)
            .with_context(|| format!("failed to convert {}", module.display()))?;

        let path = args.out.join(definition_file_name(build));
        std::fs::write(&path, protocol.to_json()?)
            .with_context(|| format!("failed to write {}", path.display()))?;
        log::info!("converted {} to {}", module.display(), path.display());
    }

    println!(
        "Converted {} protocol modules into {}",
        args.modules.len(),
        args.out.display()
    );
    Ok(())
}

fn open_registry(dir: &Path) -> anyhow::Result<ProtocolRegistry> {
    let hint = format!(
        "create definitions with `replay-analyzer convert --out {} <s2protocol>/versions/protocol*.py`",
        dir.display()
    );

    if !dir.is_dir() {
        anyhow::bail!("protocol directory {} does not exist; {hint}", dir.display());
    }

    let registry = ProtocolRegistry::open(dir).with_context(|| {
        format!("failed to read protocol definitions from {}", dir.display())
    })?;
    if registry.builds().is_empty() {
        anyhow::bail!("no protocol definitions in {}; {hint}", dir.display());
    }

    log::info!(
        "{} protocol definitions, latest build {}",
        registry.builds().len(),
        registry.latest().unwrap_or_default()
    );
    Ok(registry)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (is_builds, args) = match cli.command {
        Command::Builds(args) => (true, args),
        Command::Cameras(args) => (false, args),
        Command::Convert(args) => {
            env_logger::Builder::from_env(Env::default().default_filter_or("info")).try_init()?;
            return convert_modules(&args);
        }
    };
    let config = AnalyzerConfig::from(args);

    init_logging(&config.log_file, config.log_level)?;

    let registry = open_registry(&config.protocols)?;

    let summary = if is_builds {
        runner::run::<BuildProcessor>(&config, &registry)?
    } else {
        runner::run::<CameraProcessor>(&config, &registry)?
    };

    println!(
        "Processed {} replays ({} failed), results in {}",
        summary.processed,
        summary.failed,
        config.output.display()
    );
    Ok(())
}
