use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::process;

use is_terminal::IsTerminal;
use tracing_subscriber::EnvFilter;

use logrecycler::source::signals::TerminationSignals;
use logrecycler::source::ExitWatch;
use logrecycler::{
    AppConfig, ConfigError, LineDispatcher, ProcessingError, ProcessingStats, SinkSet,
    StreamMultiplexer, Subprocess, TransformPipeline, DEFAULT_CONFIG_PATH,
};

/// Usage errors, bad config and commands that cannot be started
const USAGE_EXIT_CODE: i32 = 2;

const USAGE: &str = "pipe logs to logrecycler or pass a command after --";

#[derive(Parser)]
#[command(name = "logrecycler")]
#[command(about = "Re-emit log lines as JSON and count them as metrics")]
#[command(version)]
struct Args {
    /// Config file
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Debug mode - log startup and final statistics to stderr
    #[arg(long)]
    debug: bool,

    /// Command to wrap; its stdout and stderr are transformed separately
    #[arg(last = true, value_name = "COMMAND")]
    command: Vec<String>,
}

impl Args {
    fn validate(&self, stdin_piped: bool) -> Result<(), String> {
        match (stdin_piped, self.command.is_empty()) {
            (true, true) => Ok(()),   // stdin only
            (false, false) => Ok(()), // command only
            (true, false) => Err(format!("{} (not both)", USAGE)),
            (false, true) => Err(USAGE.to_string()),
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.debug);

    if let Err(e) = args.validate(stdin_is_piped()) {
        eprintln!("Error: {}", e);
        process::exit(USAGE_EXIT_CODE);
    }

    // exit directly: a blocked stdin reader must not hold up runtime shutdown
    match run(args).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(failure_code(&e));
        }
    }
}

fn init_tracing(debug: bool) {
    let default_filter = if debug { "logrecycler=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(io::stderr)
        .init();
}

async fn run(args: Args) -> anyhow::Result<i32> {
    let config = AppConfig::load(&args.config)?;

    let mut sinks = SinkSet::from_config(&config)?;
    sinks.start()?;
    let pipeline = TransformPipeline::new(config.pipeline);

    let mut mux = StreamMultiplexer::new();
    let exit = if args.command.is_empty() {
        mux.add_source(tokio::io::stdin());
        None
    } else {
        let child = Subprocess::spawn(&args.command)?;
        Some(child.attach(&mut mux))
    };
    let signals = TerminationSignals::install().map_err(ProcessingError::from)?;
    let mut lines = mux.spawn();

    let mut dispatcher = LineDispatcher::new(&pipeline, &sinks, io::stdout(), io::stderr());
    let stats = dispatcher
        .run_until(&mut lines, stop_on_signal(signals, exit.clone()))
        .await?;
    drop(dispatcher);
    // lets readers give up if output stopped early
    drop(lines);
    log_stats(&stats, args.debug);

    let code = match exit {
        Some(mut exit) => exit.wait().await,
        None => 0,
    };

    sinks.stop();
    Ok(code)
}

/// Completes on the first signal received while no wrapped command is
/// running. A live command gets the signal forwarded and decides itself;
/// once it is gone, whatever still holds its pipes open must not keep us.
async fn stop_on_signal(mut signals: TerminationSignals, command: Option<ExitWatch>) {
    loop {
        let signo = match signals.recv().await {
            Some(signo) => signo,
            None => return std::future::pending().await,
        };
        match command.as_ref().map(ExitWatch::code) {
            Some(None) => tracing::debug!(signal = signo, "command still running"),
            _ => {
                tracing::debug!(signal = signo, "received signal, stopping");
                return;
            }
        }
    }
}

fn log_stats(stats: &ProcessingStats, debug: bool) {
    if debug {
        tracing::info!(
            processed = stats.lines_processed,
            output = stats.lines_output,
            discarded = stats.lines_discarded,
            sampled_out = stats.lines_sampled_out,
            stderr = stats.stderr_lines,
            elapsed = ?stats.processing_time,
            "finished"
        );
    } else {
        tracing::debug!(
            processed = stats.lines_processed,
            dropped = stats.lines_dropped(),
            "finished"
        );
    }
}

fn failure_code(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<ConfigError>().is_some() {
        return USAGE_EXIT_CODE;
    }
    match error.downcast_ref::<ProcessingError>() {
        Some(ProcessingError::Spawn { .. }) => USAGE_EXIT_CODE,
        _ => 1,
    }
}

/// A terminal or /dev/null on stdin means nothing is being piped in.
#[cfg(unix)]
fn stdin_is_piped() -> bool {
    use std::os::unix::fs::FileTypeExt;

    match std::fs::metadata("/dev/stdin") {
        Ok(meta) => !meta.file_type().is_char_device(),
        Err(_) => !io::stdin().is_terminal(),
    }
}

#[cfg(not(unix))]
fn stdin_is_piped() -> bool {
    !io::stdin().is_terminal()
}
