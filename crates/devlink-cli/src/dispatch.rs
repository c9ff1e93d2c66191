use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};

use anyhow::{Context, Result};
use devlink_core::{LinkError, ProjectManifest, MANIFEST_FILE};
use devlink_linker::{
    CycleOutcome, DevLinker, HandlerOutcome, HostEvent, InterruptFlag, ProcessExecutor,
    ProcessOutput, ResolverCommand, SystemProcessExecutor,
};
use devlink_project::{read_optional_file, LinkSettings, ProjectLayout, SettingsOverrides};
use tracing::info;

use crate::completion::write_completions_script;
use crate::render::{
    format_cleanup_lines, format_cycle_outcome, format_package_list, TerminalRenderer,
};
use crate::{Cli, Commands};

/// Conventional status for a process stopped by SIGINT.
pub(crate) const INTERRUPTED_EXIT_CODE: u8 = 130;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunStatus {
    Success,
    ResolverFailed,
}

impl RunStatus {
    pub(crate) fn exit_code(self) -> ExitCode {
        match self {
            Self::Success => ExitCode::SUCCESS,
            Self::ResolverFailed => ExitCode::from(2),
        }
    }
}

pub(crate) fn error_exit_code(err: &anyhow::Error) -> ExitCode {
    ExitCode::from(error_code(err))
}

/// 3 when restoring the snapshot failed, 130 after a termination signal,
/// 1 for every other fatal error.
pub(crate) fn error_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<LinkError>() {
        Some(err) if err.is_restore_failure() => 3,
        Some(err) if err.is_interrupted() => INTERRUPTED_EXIT_CODE,
        _ => 1,
    }
}

pub(crate) fn is_restore_failure(err: &anyhow::Error) -> bool {
    err.downcast_ref::<LinkError>()
        .is_some_and(LinkError::is_restore_failure)
}

/// Shows a spinner while the wrapped executor runs.
#[derive(Debug)]
pub(crate) struct SpinnerExecutor<E> {
    inner: E,
    renderer: TerminalRenderer,
}

impl<E> SpinnerExecutor<E> {
    pub(crate) fn new(inner: E, renderer: TerminalRenderer) -> Self {
        Self { inner, renderer }
    }
}

impl<E: ProcessExecutor> ProcessExecutor for SpinnerExecutor<E> {
    fn execute(&mut self, command: &ResolverCommand) -> devlink_core::Result<ProcessOutput> {
        info!(command = %command.command_line(), "running resolver");
        let spinner = self.renderer.start_spinner("linking dev packages");
        let output = self.inner.execute(command);
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
        output
    }
}

type CliLinker = DevLinker<SpinnerExecutor<SystemProcessExecutor>>;

struct ProjectArgs {
    project_dir: Option<PathBuf>,
    interrupt: InterruptFlag,
    overrides: SettingsOverrides,
}

pub(crate) fn run_cli(
    cli: Cli,
    renderer: TerminalRenderer,
    interrupt: &InterruptFlag,
) -> Result<RunStatus> {
    let project = ProjectArgs {
        project_dir: cli.project_dir,
        interrupt: interrupt.clone(),
        overrides: SettingsOverrides {
            package_dir: cli.package_dir,
            vendor_dir: cli.vendor_dir,
            resolver: cli.resolver,
        },
    };

    match cli.command {
        Commands::Completions { shell } => {
            write_completions_script(shell, &mut std::io::stdout().lock())?;
            Ok(RunStatus::Success)
        }
        Commands::Hook { event } => {
            let mut linker = open_linker(&project, renderer)?;
            run_hook(&mut linker, event, renderer)
        }
        Commands::PreResolve => {
            let mut linker = open_linker(&project, renderer)?;
            run_event(&mut linker, HostEvent::PreUpdateCmd, renderer)
        }
        Commands::PostResolve => {
            let mut linker = open_linker(&project, renderer)?;
            run_event(&mut linker, HostEvent::PostUpdateCmd, renderer)
        }
        Commands::Install => {
            let mut linker = open_linker(&project, renderer)?;
            run_host_flow(&mut linker, HostOperation::Install, renderer)
        }
        Commands::Update => {
            let mut linker = open_linker(&project, renderer)?;
            run_host_flow(&mut linker, HostOperation::Update, renderer)
        }
        Commands::List => {
            let mut linker = open_linker(&project, renderer)?;
            let root = linker.layout().root().to_path_buf();
            let package_dir = linker.layout().package_dir().to_string();
            let index = linker.packages()?;
            if index.is_empty() {
                renderer.print_status(
                    "info",
                    &format!("no local packages found under {package_dir}"),
                );
            } else {
                renderer.print_lines(&format_package_list(index, &root));
            }
            Ok(RunStatus::Success)
        }
    }
}

fn open_linker(project: &ProjectArgs, renderer: TerminalRenderer) -> Result<CliLinker> {
    let root = resolve_project_root(project.project_dir.as_deref())?;
    let settings = load_settings(&root, &project.overrides)?;
    let layout = ProjectLayout::new(&root, &settings);
    Ok(DevLinker::new(
        layout,
        settings.resolver,
        SpinnerExecutor::new(SystemProcessExecutor, renderer),
    )
    .with_interrupt(project.interrupt.clone()))
}

pub(crate) fn resolve_project_root(project_dir: Option<&Path>) -> Result<PathBuf> {
    let dir = match project_dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir().context("failed to determine current directory")?,
    };
    std::fs::canonicalize(&dir)
        .with_context(|| format!("failed to resolve project directory: {}", dir.display()))
}

pub(crate) fn load_settings(root: &Path, overrides: &SettingsOverrides) -> Result<LinkSettings> {
    let manifest_path = root.join(MANIFEST_FILE);
    let manifest = read_optional_file(&manifest_path)?
        .map(|bytes| ProjectManifest::from_json_slice(&manifest_path, &bytes))
        .transpose()?;
    let settings = LinkSettings::load(root, overrides, manifest.as_ref())?;
    Ok(settings)
}

pub(crate) fn run_event<E: ProcessExecutor>(
    linker: &mut DevLinker<E>,
    event: HostEvent,
    renderer: TerminalRenderer,
) -> Result<RunStatus> {
    let outcome = linker.handle(event)?;
    Ok(report_handler_outcome(&outcome, linker.layout().root(), renderer))
}

/// Entry point for host scripts. The host aborts its own install/update on a
/// non-zero script exit, so a resolver failure is reported but exits 0.
pub(crate) fn run_hook<E: ProcessExecutor>(
    linker: &mut DevLinker<E>,
    event: HostEvent,
    renderer: TerminalRenderer,
) -> Result<RunStatus> {
    info!(%event, "running host event handler");
    let outcome = linker
        .handle(event)
        .with_context(|| format!("{event} handler failed"))?;
    report_handler_outcome(&outcome, linker.layout().root(), renderer);
    Ok(RunStatus::Success)
}

fn report_handler_outcome(
    outcome: &HandlerOutcome,
    root: &Path,
    renderer: TerminalRenderer,
) -> RunStatus {
    match outcome {
        HandlerOutcome::Cleaned { removed } => {
            for (status, message) in format_cleanup_lines(removed, root) {
                renderer.print_status(status, &message);
            }
            RunStatus::Success
        }
        HandlerOutcome::Cycle(cycle) => report_cycle(cycle, renderer),
    }
}

fn report_cycle(outcome: &CycleOutcome, renderer: TerminalRenderer) -> RunStatus {
    for (status, message) in format_cycle_outcome(outcome) {
        renderer.print_status(status, &message);
    }
    if outcome.resolver_failed() {
        RunStatus::ResolverFailed
    } else {
        RunStatus::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HostOperation {
    Install,
    Update,
}

impl HostOperation {
    fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Update => "update",
        }
    }

    fn events(self) -> (HostEvent, HostEvent) {
        match self {
            Self::Install => (HostEvent::PreInstallCmd, HostEvent::PostInstallCmd),
            Self::Update => (HostEvent::PreUpdateCmd, HostEvent::PostUpdateCmd),
        }
    }
}

pub(crate) fn host_command(resolver: &str, root: &Path, operation: HostOperation) -> Command {
    let mut command = Command::new(resolver);
    command
        .arg(format!("--working-dir={}", root.display()))
        .arg(operation.as_str())
        .current_dir(root);
    command
}

/// Emulates the host lifecycle in one process: pre handler, the resolver's
/// own install/update with inherited output, post handler.
fn run_host_flow(
    linker: &mut CliLinker,
    operation: HostOperation,
    renderer: TerminalRenderer,
) -> Result<RunStatus> {
    let (pre_event, post_event) = operation.events();
    run_event(linker, pre_event, renderer)?;

    let resolver = linker.resolver_program().to_string();
    let root = linker.layout().root().to_path_buf();
    let status = host_command(&resolver, &root, operation)
        .status()
        .with_context(|| format!("failed launching {resolver} {}", operation.as_str()))?;
    if linker.interrupt().is_raised() {
        return Err(LinkError::Interrupted {
            stage: operation.as_str(),
        }
        .into());
    }
    if !status.success() {
        anyhow::bail!("{resolver} {} failed: {status}", operation.as_str());
    }

    run_event(linker, post_event, renderer)
}
