use clap::{Parser, Subcommand, ValueEnum};
use midivel::config::{self, DeltaMode};
use midivel::{convert, dataset, npy, probe, Config, DatasetBuilder, MidiVelError};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Performance-MIDI velocity dataset preparation
#[derive(Parser)]
#[command(name = "midivel")]
#[command(about = "Turn MIDI performances into fixed-length velocity training samples")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum DeltaArg {
    StartToStart,
    EndToStart,
}

impl From<DeltaArg> for DeltaMode {
    fn from(arg: DeltaArg) -> Self {
        match arg {
            DeltaArg::StartToStart => DeltaMode::StartToStart,
            DeltaArg::EndToStart => DeltaMode::EndToStart,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a directory of MIDI files into one serialized sequence file
    Convert {
        /// Input folder containing MIDI files
        #[arg(long = "input_dir")]
        input_dir: PathBuf,

        /// Output file to write converted sequences to
        #[arg(long = "output_file")]
        output_file: PathBuf,

        /// Number of parallel workers
        #[arg(long)]
        processes: Option<usize>,

        /// Custom configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Build train/test sample arrays from converted sequences
    BuildDataset {
        /// Converted sequence file (or a JSON array of sequences)
        #[arg(long = "input_file")]
        input_file: PathBuf,

        /// Directory to write train.npy and test.npy to
        #[arg(long = "output_dir")]
        output_dir: PathBuf,

        /// Notes per sample
        #[arg(long = "seq_length")]
        seq_length: Option<usize>,

        /// Fraction of samples held out for testing
        #[arg(long = "test_size")]
        test_size: Option<f64>,

        /// Number of velocity bins
        #[arg(long = "num_bins")]
        num_bins: Option<usize>,

        /// Stride between sample starts (defaults to seq_length)
        #[arg(long)]
        hop: Option<usize>,

        /// Seed for a reproducible split
        #[arg(long)]
        seed: Option<u64>,

        /// Time delta reference point
        #[arg(long = "delta_mode", value_enum)]
        delta_mode: Option<DeltaArg>,

        /// Custom configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the shape and velocity distribution of a sample array
    Inspect {
        /// A train.npy or test.npy file
        file: PathBuf,

        /// Bins to histogram velocities into
        #[arg(long = "num_bins")]
        num_bins: Option<usize>,
    },
    /// Validate configuration file
    ValidateConfig {
        /// Configuration file to validate
        config: PathBuf,
    },
    /// Show default configuration
    ShowConfig,
}

fn load_or_default(path: Option<PathBuf>) -> midivel::MidiVelResult<Config> {
    match path {
        Some(path) => config::load_config(path),
        None => Ok(Config::default()),
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let quiet = cli.quiet;

    match cli.command {
        Commands::Convert {
            input_dir,
            output_file,
            processes,
            config,
        } => {
            let mut config = load_or_default(config)?;
            if let Some(processes) = processes {
                config.conversion.processes = processes;
            }
            config::validate_config(&config)?;
            probe::check_worker_count(config.conversion.processes);

            let start = Instant::now();
            let report = convert::convert_dir(&input_dir, &config.conversion)?;
            convert::save_filemap(&output_file, &report.filemap)?;

            if !quiet {
                println!(
                    "Converted {} files into {}",
                    report.converted(),
                    output_file.display()
                );
                for failure in &report.failures {
                    println!("  failed: {} ({})", failure.file, failure.reason);
                }
                println!("Conversion took {:.2}s", start.elapsed().as_secs_f64());
            }
        }
        Commands::BuildDataset {
            input_file,
            output_dir,
            seq_length,
            test_size,
            num_bins,
            hop,
            seed,
            delta_mode,
            config,
        } => {
            let mut config = load_or_default(config)?;
            if let Some(seq_length) = seq_length {
                config.windowing.seq_length = seq_length;
            }
            if hop.is_some() {
                config.windowing.hop = hop;
            }
            if let Some(test_size) = test_size {
                config.split.test_size = test_size;
            }
            if seed.is_some() {
                config.split.seed = seed;
            }
            if let Some(num_bins) = num_bins {
                config.encoding.num_bins = num_bins;
            }
            if let Some(delta_mode) = delta_mode {
                config.encoding.delta_mode = delta_mode.into();
            }

            let builder = DatasetBuilder::new(config)?;
            let start = Instant::now();
            let summary = builder.build(&input_file, &output_dir)?;

            if !quiet {
                println!(
                    "{} sequences -> {} samples ({} train, {} test)",
                    summary.sequences, summary.samples, summary.train_samples, summary.test_samples
                );
                println!(
                    "Saved {} and {}",
                    output_dir.join(dataset::TRAIN_FILE).display(),
                    output_dir.join(dataset::TEST_FILE).display()
                );
                println!("Preprocessing took {:.2}s", start.elapsed().as_secs_f64());
            }
        }
        Commands::Inspect { file, num_bins } => {
            let samples = npy::load_array3(&file)?;
            let shape = samples.shape();
            println!("{}: shape {:?}", file.display(), shape);

            let num_bins = match num_bins {
                Some(n) => n,
                None => dataset::inferred_bin_count(&samples)?,
            };
            let histogram = dataset::velocity_histogram(&samples, num_bins)?;
            for (bin, count) in histogram.iter().enumerate() {
                println!("  bin {:>3}: {}", bin, count);
            }
        }
        Commands::ValidateConfig { config } => {
            let config = config::load_config(config)?;
            println!("Configuration is valid");
            if let Ok(json) = serde_json::to_string_pretty(&config) {
                println!("{}", json);
            }
        }
        Commands::ShowConfig => {
            let config = Config::default();
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.verbose && cli.quiet {
        eprintln!("Cannot specify both --verbose and --quiet");
        return ExitCode::from(2);
    }

    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    probe::capabilities();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            let code = err
                .downcast_ref::<MidiVelError>()
                .map(MidiVelError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}
