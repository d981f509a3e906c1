//! gi_run: run a Gateway Interface program against a console call leg
//!
//! Launches a local GI program or connects to a `gi://` gateway, feeds it
//! the preamble for a simulated call and shows every channel operation the
//! program performs. Digits typed on stdin are delivered as DTMF.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use pbx_gi_tokio::{
    launch_and_run, Channel, GiConfig, GiError, GiRequest, Registry, Services, SessionStatus,
    STATUS_VARIABLE,
};
use std::path::PathBuf;
use tracing::info;

mod commands;
mod console_channel;
mod display;

use commands::CommandPrinter;
use console_channel::ConsoleChannel;

/// Run a GI program against a simulated call
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Program path (relative to the script directory) or gi://host[:port][/script]
    program: Option<String>,

    /// Arguments passed to the program as gi_arg_N
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory relative program paths are resolved against
    #[arg(short, long)]
    script_dir: Option<PathBuf>,

    /// Enable debug logging and wire tracing
    #[arg(short, long)]
    debug: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,

    /// List every registered command and exit
    #[arg(short, long)]
    list: bool,

    /// Show the usage of one command and exit
    #[arg(long, value_name = "WORDS")]
    show: Option<String>,

    /// Open the audio side channel on fd 3
    #[arg(short, long)]
    audio: bool,

    /// Name of the simulated channel
    #[arg(long, default_value = "Console/dsp")]
    channel: String,

    /// Dialplan context reported in the preamble
    #[arg(long, default_value = "default")]
    context: String,

    /// Extension reported in the preamble
    #[arg(long, default_value = "s")]
    extension: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.debug)?;

    let printer = CommandPrinter::new(Registry::global(), args.no_color);
    if args.list {
        printer.show_commands();
        return Ok(());
    }
    if let Some(ref words) = args.show {
        printer.show_usage(words);
        return Ok(());
    }

    let Some(ref program) = args.program else {
        eprintln!("No program given; use --list to see the supported commands");
        std::process::exit(2);
    };

    let config = load_config(&args)?;
    let mut request = GiRequest::new(program.as_str()).with_args(args.args.iter());
    if args.audio {
        request = request.with_audio();
    }

    let mut channel = ConsoleChannel::new(&args.channel, args.audio, args.no_color)
        .with_context(&args.context, &args.extension);
    info!("Running {} on {}", program, args.channel);

    match launch_and_run(
        &mut channel,
        &request,
        &config,
        &Services::default(),
        Registry::global(),
    )
    .await
    {
        Ok(status) => {
            print_status(status, &channel, args.no_color);
            std::process::exit(if status.is_failure() { 1 } else { 0 });
        }
        Err(e) => {
            print_launch_error(program, &e, args.no_color);
            std::process::exit(1);
        }
    }
}

/// Set up logging based on debug level.
///
/// VERBOSE messages from the program always reach the console.
fn setup_logging(debug: bool) -> Result<()> {
    let filter = if debug {
        "debug"
    } else {
        "warn,pbx_gi::verbose=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}

fn load_config(args: &Args) -> Result<GiConfig> {
    let mut config = match args.config {
        Some(ref path) => GiConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => GiConfig::default(),
    };
    if let Some(ref dir) = args.script_dir {
        config = config.with_script_dir(dir);
    }
    if args.debug {
        config = config.with_debug(true);
    }
    Ok(config)
}

fn print_status(status: SessionStatus, channel: &ConsoleChannel, no_color: bool) {
    let variable = channel
        .get_variable(STATUS_VARIABLE)
        .unwrap_or_default();
    let line = format!(
        "GI finished: {:?} (code {}, {}={})",
        status,
        status.code(),
        STATUS_VARIABLE,
        variable
    );
    if no_color {
        println!("{}", line);
    } else if status.is_failure() {
        println!("{}", line.red().bold());
    } else {
        println!("{}", line.green());
    }
}

fn print_launch_error(program: &str, error: &GiError, no_color: bool) {
    let hint = match error {
        GiError::ProgramNotFound { .. } => " - check --script-dir",
        GiError::NotExecutable { .. } => " - is the execute bit set?",
        _ => "",
    };
    if no_color {
        eprintln!("Error: failed to start {}: {}{}", program, error, hint);
    } else {
        eprintln!(
            "{}: failed to start {}: {}{}",
            "Error".red().bold(),
            program,
            error,
            hint
        );
    }
}
