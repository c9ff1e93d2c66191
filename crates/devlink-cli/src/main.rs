mod completion;
mod dispatch;
mod render;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use clap_complete::Shell;
use devlink_linker::{HostEvent, InterruptFlag};
use signal_hook::consts::TERM_SIGNALS;
use signal_hook::flag;
use tracing::{warn, Level};

use crate::dispatch::{error_exit_code, run_cli, INTERRUPTED_EXIT_CODE};
use crate::render::{resolve_output_style, TerminalRenderer};

#[derive(Parser, Debug)]
#[command(name = "devlink")]
#[command(
    about = "Temporarily link locally checked-out packages into a Composer project",
    long_about = None
)]
struct Cli {
    /// Project root holding composer.json (defaults to the current directory).
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,
    /// Directory scanned for local packages, relative to the project root.
    #[arg(long, global = true)]
    package_dir: Option<String>,
    /// Installation target directory, relative to the project root.
    #[arg(long, global = true)]
    vendor_dir: Option<String>,
    /// Resolver executable.
    #[arg(long, global = true)]
    resolver: Option<String>,
    #[arg(long, global = true)]
    plain: bool,
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the handler bound to a host lifecycle event.
    Hook { event: HostEvent },
    /// Remove stale symlinked installs of local packages.
    PreResolve,
    /// Link local packages, then restore composer.json and composer.lock.
    PostResolve,
    /// Run `install` with both handlers around it.
    Install,
    /// Run `update` with both handlers around it.
    Update,
    /// Show the discovered local packages.
    List,
    Completions { shell: Shell },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let interrupt = InterruptFlag::new();
    if let Err(err) = install_signal_handlers(&interrupt) {
        warn!(error = %err, "could not install termination signal handlers");
    }

    let renderer = TerminalRenderer::from_style(resolve_output_style(
        cli.plain,
        std::io::stdout().is_terminal(),
    ));
    match run_cli(cli, renderer, &interrupt) {
        Ok(_) if interrupt.is_raised() => ExitCode::from(INTERRUPTED_EXIT_CODE),
        Ok(status) => status.exit_code(),
        Err(err) => {
            renderer.print_error(&err);
            error_exit_code(&err)
        }
    }
}

/// The first SIGINT/SIGTERM only raises `interrupt`, so a running cycle can
/// put the manifest back before exiting. A second one while the flag is up
/// exits immediately.
fn install_signal_handlers(interrupt: &InterruptFlag) -> std::io::Result<()> {
    for &signal in TERM_SIGNALS {
        flag::register_conditional_shutdown(
            signal,
            i32::from(INTERRUPTED_EXIT_CODE),
            interrupt.shared(),
        )?;
        flag::register(signal, interrupt.shared())?;
    }
    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    tracing_subscriber::fmt()
        .with_max_level(log_level(verbose, quiet))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn log_level(verbose: u8, quiet: bool) -> Level {
    if quiet {
        return Level::ERROR;
    }
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}
