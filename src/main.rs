use anyhow::Result;
use clap::Parser;
use kinetia_core::kernel::Backend;
use kinetia_core::metrics::init_logging;
use kinetia_core::reactions::SchedulerPolicy;
use kinetia_lib::{load_config, run, RunOverrides};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Simulation config file
    #[arg(short, long, default_value = "kinetia.toml")]
    config: PathBuf,

    /// Number of steps (overrides the config)
    #[arg(short, long)]
    steps: Option<u64>,

    /// Random seed (overrides the config)
    #[arg(long)]
    seed: Option<u64>,

    /// Kernel backend
    #[arg(short, long, value_enum)]
    backend: Option<BackendArg>,

    /// Reaction scheduler
    #[arg(long, value_enum)]
    scheduler: Option<SchedulerArg>,

    /// Worker threads for the parallel backends
    #[arg(short, long)]
    threads: Option<usize>,

    /// Write records here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Validate the config, print its fingerprint and exit
    #[arg(long)]
    check: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log: String,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    SingleCpu,
    Cpu,
    Domain,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::SingleCpu => Backend::SingleCpu,
            BackendArg::Cpu => Backend::Cpu,
            BackendArg::Domain => Backend::Domain,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SchedulerArg {
    Uncontrolled,
    Gillespie,
    DetailedBalance,
}

impl From<SchedulerArg> for SchedulerPolicy {
    fn from(arg: SchedulerArg) -> Self {
        match arg {
            SchedulerArg::Uncontrolled => SchedulerPolicy::UncontrolledApproximation,
            SchedulerArg::Gillespie => SchedulerPolicy::Gillespie,
            SchedulerArg::DetailedBalance => SchedulerPolicy::DetailedBalance,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log);

    let mut config = load_config(&args.config)?;
    RunOverrides {
        steps: args.steps,
        seed: args.seed,
        backend: args.backend.map(Into::into),
        scheduler: args.scheduler.map(Into::into),
        threads: args.threads,
    }
    .apply(&mut config);
    config.validate()?;

    if args.check {
        config.build_context()?;
        println!("{}", config.fingerprint());
        return Ok(());
    }

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    let summary = run(&config, &mut out)?;
    tracing::info!(
        fingerprint = %summary.fingerprint,
        seed = summary.seed,
        steps = summary.steps,
        records = summary.records,
        particles = summary.particles,
        reactions = summary.reactions,
        "Simulation finished"
    );
    Ok(())
}
