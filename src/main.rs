//! Typist ID CLI
//!
//! Identify who is typing from keystroke timing.

use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use crossbeam_channel::RecvTimeoutError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use typist_id::{
    collector::{read_keystrokes, Keystroke, LineCollector},
    config::Config,
    core::{
        BackendKind, FallbackPolicy, IdentificationSession, IdentityRegistry, IdentitySource,
        KernelVoter, ReferenceCorpus, SharedRegistry,
    },
    report::{GuessSnapshot, SnapshotBuilder},
    VERSION,
};

#[derive(Parser)]
#[command(name = "typist-id")]
#[command(version = VERSION)]
#[command(about = "Online typist identification from keystroke timing", long_about = None)]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Settings that take precedence over the configuration file.
#[derive(Args)]
struct Overrides {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Inter-key gaps at or above this many seconds are ignored in reference data
    #[arg(long, global = true)]
    gap_threshold: Option<f64>,

    /// Number of recent scores summed per identity
    #[arg(long, global = true)]
    window: Option<usize>,

    /// Fit and score timings in log space (true or false)
    #[arg(long, global = true)]
    log_transform: Option<bool>,

    /// Key-pairs with fewer reference samples than this get no timing model
    #[arg(long, global = true)]
    min_samples: Option<usize>,

    /// Scoring backend (parametric, kernel-window or kernel-vote)
    #[arg(long, global = true)]
    backend: Option<BackendKind>,

    /// Seed for the voting backend's random fallback (enables the fallback)
    #[arg(long, global = true)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a keystroke file as a live stream and report the guess
    Identify {
        /// Known identity as LABEL=FILE[,FILE...] (repeatable)
        #[arg(long = "id", value_name = "LABEL=FILES")]
        ids: Vec<String>,

        /// Keystroke file to identify
        input: PathBuf,

        /// Print the guess after every keystroke
        #[arg(long)]
        trace: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Identify keystrokes read from stdin as they arrive
    Live {
        /// Known identity as LABEL=FILE[,FILE...] (repeatable)
        #[arg(long = "id", value_name = "LABEL=FILES")]
        ids: Vec<String>,

        /// Print the guess after every keystroke, not only when it changes
        #[arg(long)]
        trace: bool,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Classify a whole keystroke file at once by kernel density vote
    Predict {
        /// Known identity as LABEL=FILE[,FILE...] (repeatable)
        #[arg(long = "id", value_name = "LABEL=FILES")]
        ids: Vec<String>,

        /// Keystroke file to classify
        input: PathBuf,
    },

    /// Summarize the key-pairs found in keystroke files
    Corpus {
        /// Keystroke files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Only list key-pairs with at least this many samples
        #[arg(long, default_value = "1")]
        min_count: usize,
    },

    /// Show configuration
    Config {
        /// Write a default configuration file if none exists
        #[arg(long)]
        init: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable lines
    Text,
    /// One JSON snapshot per keystroke
    Jsonl,
    /// A JSON session summary at the end
    Json,
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Identify {
            ids,
            input,
            trace,
            format,
        } => {
            cmd_identify(&cli.overrides, &ids, &input, trace, format);
        }
        Commands::Live { ids, trace, format } => {
            cmd_live(&cli.overrides, &ids, trace, format);
        }
        Commands::Predict { ids, input } => {
            cmd_predict(&cli.overrides, &ids, &input);
        }
        Commands::Corpus { files, min_count } => {
            cmd_corpus(&cli.overrides, &files, min_count);
        }
        Commands::Config { init } => {
            cmd_config(&cli.overrides, init);
        }
    }
}

/// Log to stderr so stdout stays machine-readable; level from RUST_LOG.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn cmd_identify(
    overrides: &Overrides,
    ids: &[String],
    input: &Path,
    trace: bool,
    format: OutputFormat,
) {
    let config = load_config(overrides);
    let registry = build_registry(&config, ids);

    let keystrokes = match read_keystrokes(input) {
        Ok(keystrokes) => keystrokes,
        Err(e) => fail(&e.to_string()),
    };

    let mut session = match IdentificationSession::new(registry, &config.session) {
        Ok(session) => session,
        Err(e) => fail(&e.to_string()),
    };
    let mut builder = SnapshotBuilder::new();

    for keystroke in keystrokes {
        let outcome = session.process_keystroke(keystroke);
        if (trace && format == OutputFormat::Text) || format == OutputFormat::Jsonl {
            let snapshot = builder.snapshot(&session, &keystroke, outcome);
            print_snapshot(&snapshot, format);
        }
    }

    match format {
        OutputFormat::Text => {
            println!(
                "Guess: {}",
                session.guess_label().unwrap_or("undetermined")
            );
            for (label, total) in session.totals() {
                println!("  {label}: {total:.4}");
            }
            println!();
            println!("{}", session.stats().summary());
        }
        OutputFormat::Json => print_json(&builder.summary(&session)),
        OutputFormat::Jsonl => {}
    }
}

fn cmd_live(overrides: &Overrides, ids: &[String], trace: bool, format: OutputFormat) {
    let config = load_config(overrides);
    let registry = build_registry(&config, ids);

    if format == OutputFormat::Text {
        println!("Typist ID v{VERSION}");
        println!("  Identities: {}", registry.labels().join(", "));
        println!("  Backend: {}", config.session.backend);
        println!();
        println!("Reading `code timestamp` lines from stdin. Press Ctrl+C to stop.");
        println!();
    }

    let mut session = match IdentificationSession::new(registry, &config.session) {
        Ok(session) => session,
        Err(e) => fail(&e.to_string()),
    };
    let mut builder = SnapshotBuilder::new();

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(running.clone());

    let mut collector = LineCollector::stdin();
    if let Err(e) = collector.start() {
        fail(&format!("could not start reading stdin: {e}"));
    }
    let receiver = collector.receiver().clone();

    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(keystroke) => {
                let before = session.guess();
                let outcome = session.process_keystroke(keystroke);
                let snapshot = builder.snapshot(&session, &keystroke, outcome);
                match format {
                    OutputFormat::Jsonl => print_snapshot(&snapshot, format),
                    OutputFormat::Text if trace => print_snapshot(&snapshot, format),
                    OutputFormat::Text if before != session.guess() => {
                        print_guess_change(&snapshot, &keystroke);
                    }
                    _ => {}
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::info!("Input closed");
                break;
            }
        }
    }

    collector.stop();

    match format {
        OutputFormat::Text => {
            println!();
            println!(
                "Final guess: {}",
                session.guess_label().unwrap_or("undetermined")
            );
            println!("{}", session.stats().summary());
        }
        OutputFormat::Json => print_json(&builder.summary(&session)),
        OutputFormat::Jsonl => {}
    }
}

fn cmd_predict(overrides: &Overrides, ids: &[String], input: &Path) {
    let config = load_config(overrides);
    let registry = build_registry(&config, ids);

    let data = match ReferenceCorpus::load(&[input], config.gap_threshold_secs) {
        Ok(data) => data,
        Err(e) => fail(&e.to_string()),
    };

    let mut voter = KernelVoter::new(registry.clone(), config.session.voting.fallback);
    let (guess, votes) = voter.predict_with_votes(&data);

    println!(
        "Voting key-pairs: {} common, {} present in input",
        voter.voting_pairs().len(),
        voter
            .voting_pairs()
            .iter()
            .filter(|pair| data.contains(pair))
            .count()
    );
    for (identity, count) in registry.iter().zip(&votes) {
        println!("  {}: {} votes", identity.label(), count);
    }
    println!();
    println!(
        "Prediction: {}",
        guess
            .index()
            .and_then(|index| registry.get(index))
            .map(|identity| identity.label())
            .unwrap_or("undetermined")
    );
}

fn cmd_corpus(overrides: &Overrides, files: &[PathBuf], min_count: usize) {
    let config = load_config(overrides);

    let corpus = match ReferenceCorpus::load(files, config.gap_threshold_secs) {
        Ok(corpus) => corpus,
        Err(e) => fail(&e.to_string()),
    };

    println!(
        "{} key-pairs, {} samples (gap threshold {}s)",
        corpus.pair_count(),
        corpus.sample_count(),
        config.gap_threshold_secs
    );
    println!();

    let pairs = corpus.frequent_pairs(min_count);
    if pairs.is_empty() {
        println!("No key-pair has {min_count} or more samples.");
        return;
    }
    println!("{:<24} {:>7} {:>10}", "key-pair", "samples", "mean (s)");
    for (pair, count, mean) in pairs {
        println!("{:<24} {:>7} {:>10.4}", pair.to_string(), count, mean);
    }
}

fn cmd_config(overrides: &Overrides, init: bool) {
    let path = config_file(overrides);

    if init {
        if path.exists() {
            fail(&format!("{path:?} already exists"));
        }
        if let Err(e) = Config::default().save_to(&path) {
            fail(&format!("could not write {path:?}: {e}"));
        }
        println!("Wrote default configuration to {path:?}");
        return;
    }

    let config = load_config(overrides);

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {path:?}");
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}

fn config_file(overrides: &Overrides) -> PathBuf {
    overrides.config.clone().unwrap_or_else(Config::config_path)
}

/// Load the configuration file and apply command-line overrides.
fn load_config(overrides: &Overrides) -> Config {
    let path = config_file(overrides);
    let mut config = match Config::load_from(&path) {
        Ok(config) => config,
        Err(e) => fail(&format!("{path:?}: {e}")),
    };

    if let Some(gap) = overrides.gap_threshold {
        config.gap_threshold_secs = gap;
    }
    if let Some(window) = overrides.window {
        config.session.window_length = window;
    }
    if let Some(log_transform) = overrides.log_transform {
        config.model.log_transform = log_transform;
    }
    if let Some(min_samples) = overrides.min_samples {
        config.model.min_samples = min_samples;
    }
    if let Some(backend) = overrides.backend {
        config.session.backend = backend;
    }
    if let Some(seed) = overrides.seed {
        config.session.voting.fallback = FallbackPolicy::Random { seed: Some(seed) };
    }

    if let Err(e) = config.validate() {
        fail(&e.to_string());
    }
    config
}

/// Build the registry from `--id` arguments, or the configured identities
/// when none are given.
fn build_registry(config: &Config, ids: &[String]) -> SharedRegistry {
    let sources = if ids.is_empty() {
        config.identities.clone()
    } else {
        match ids
            .iter()
            .map(|id| IdentitySource::parse(id))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(sources) => sources,
            Err(e) => fail(&e),
        }
    };

    if sources.is_empty() {
        eprintln!("Error: no identities given.");
        eprintln!();
        eprintln!("Pass --id LABEL=FILE[,FILE...] once per identity, or list them");
        eprintln!("under \"identities\" in {:?}", Config::config_path());
        std::process::exit(1);
    }

    match IdentityRegistry::build(&sources, config.gap_threshold_secs, &config.model) {
        Ok(registry) => registry.shared(),
        Err(e) => fail(&e.to_string()),
    }
}

fn print_snapshot(snapshot: &GuessSnapshot, format: OutputFormat) {
    match format {
        OutputFormat::Jsonl => match serde_json::to_string(snapshot) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("Warning: could not serialize snapshot: {e}"),
        },
        _ => println!("{}", snapshot.to_line()),
    }
}

fn print_guess_change(snapshot: &GuessSnapshot, keystroke: &Keystroke) {
    println!(
        "[{}] key {} -> {}",
        Local::now().format("%H:%M:%S"),
        keystroke.code,
        snapshot.guess.as_deref().unwrap_or("undetermined")
    );
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => fail(&format!("could not serialize output: {e}")),
    }
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) {
    if let Err(e) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        eprintln!("Warning: could not set Ctrl+C handler: {e}");
    }
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {message}");
    std::process::exit(1);
}
