use std::error::Error as _;
use std::fmt;
use std::path::{Path, PathBuf};

use devlink_core::{LinkError, PackagePathIndex, ProjectManifest, Result};
use devlink_project::{content_digest, read_file, write_file, ProjectLayout};
use tracing::{debug, error, info, warn};

use crate::interrupt::InterruptFlag;
use crate::resolver::{ProcessExecutor, ResolverCommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Snapshotted,
    Mutated,
    Written,
    Resolving,
    Restored,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Snapshotted => "snapshotted",
            Self::Mutated => "mutated",
            Self::Written => "written",
            Self::Resolving => "resolving",
            Self::Restored => "restored",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverStatus {
    Succeeded,
    Failed { exit_code: i32, stderr: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkReport {
    pub packages: Vec<String>,
    pub command_line: String,
    pub resolver: ResolverStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    NoLocalPackages,
    Linked(LinkReport),
}

impl CycleOutcome {
    pub fn resolver_failed(&self) -> bool {
        matches!(
            self,
            Self::Linked(LinkReport {
                resolver: ResolverStatus::Failed { .. },
                ..
            })
        )
    }
}

/// Original bytes of the manifest and lockfile. Both files must exist.
#[derive(Debug, Clone)]
pub struct ManifestSnapshot {
    manifest_path: PathBuf,
    manifest: Vec<u8>,
    lock_path: PathBuf,
    lock: Vec<u8>,
}

impl ManifestSnapshot {
    pub fn capture(layout: &ProjectLayout) -> Result<Self> {
        let manifest_path = layout.manifest_path();
        let lock_path = layout.lock_path();
        let manifest = read_file(&manifest_path)?;
        let lock = read_file(&lock_path)?;

        debug!(
            manifest = %content_digest(&manifest),
            lock = %content_digest(&lock),
            "captured manifest snapshot"
        );
        Ok(Self {
            manifest_path,
            manifest,
            lock_path,
            lock,
        })
    }

    pub fn manifest_bytes(&self) -> &[u8] {
        &self.manifest
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Writes both files back and verifies them. Both files are attempted
    /// even if the first one fails.
    pub fn restore(&self) -> Result<()> {
        let manifest_result = restore_file(&self.manifest_path, &self.manifest);
        let lock_result = restore_file(&self.lock_path, &self.lock);
        manifest_result.and(lock_result)
    }
}

fn restore_file(path: &Path, expected: &[u8]) -> Result<()> {
    write_file(path, expected).map_err(|err| restore_error(path, &err))?;

    let written = read_file(path).map_err(|err| restore_error(path, &err))?;
    if content_digest(&written) != content_digest(expected) {
        return Err(LinkError::Restore {
            path: path.to_path_buf(),
            reason: "content read back does not match the snapshot".to_string(),
        });
    }
    Ok(())
}

fn restore_error(path: &Path, err: &LinkError) -> LinkError {
    let mut reason = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        reason.push_str(": ");
        reason.push_str(&cause.to_string());
        source = cause.source();
    }
    LinkError::Restore {
        path: path.to_path_buf(),
        reason,
    }
}

/// Holds a snapshot until it is written back.
///
/// `restore` consumes the guard. If the guarded region unwinds instead, the
/// snapshot is written back from `Drop` and a failure there can only be logged.
#[derive(Debug)]
pub struct RestoreGuard {
    snapshot: ManifestSnapshot,
    restored: bool,
}

impl RestoreGuard {
    pub fn new(snapshot: ManifestSnapshot) -> Self {
        Self {
            snapshot,
            restored: false,
        }
    }

    pub fn snapshot(&self) -> &ManifestSnapshot {
        &self.snapshot
    }

    pub fn restore(mut self) -> Result<()> {
        self.restored = true;
        self.snapshot.restore()
    }
}

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        self.restored = true;

        match self.snapshot.restore() {
            Ok(()) => warn!(
                manifest = %self.snapshot.manifest_path.display(),
                "restored manifest after an interrupted link cycle"
            ),
            Err(err) => error!(error = %err, "failed to restore manifest after an interrupted link cycle"),
        }
    }
}

/// Post-resolve cycle: snapshot, mutate, write, resolve, restore.
///
/// Restoration runs once after the resolver step however it ended. A restore
/// failure takes precedence over any earlier error, which is logged instead.
/// A raised `interrupt` ends the cycle with `Interrupted` after restoring.
pub fn run_post_resolve<E>(
    layout: &ProjectLayout,
    index: &PackagePathIndex,
    resolver_program: &str,
    executor: &mut E,
    interrupt: &InterruptFlag,
) -> Result<CycleOutcome>
where
    E: ProcessExecutor + ?Sized,
{
    if index.is_empty() {
        debug!(phase = %CyclePhase::Idle, "no local packages discovered");
        return Ok(CycleOutcome::NoLocalPackages);
    }
    if interrupt.is_raised() {
        return Err(LinkError::Interrupted {
            stage: "package discovery",
        });
    }

    let guard = RestoreGuard::new(ManifestSnapshot::capture(layout)?);
    debug!(phase = %CyclePhase::Snapshotted, "manifest and lockfile captured");

    let linked = link_and_resolve(
        layout,
        index,
        guard.snapshot(),
        resolver_program,
        executor,
        interrupt,
    );

    let restored = guard.restore();
    match (linked, restored) {
        (linked, Err(restore_err)) => {
            if let Err(cycle_err) = linked {
                error!(error = %cycle_err, "link cycle failed before restoration failed");
            }
            Err(restore_err)
        }
        (Err(cycle_err), Ok(())) => {
            info!(phase = %CyclePhase::Restored, "manifest and lockfile restored after failure");
            Err(cycle_err)
        }
        (Ok(report), Ok(())) => {
            info!(phase = %CyclePhase::Restored, "manifest and lockfile restored");
            Ok(CycleOutcome::Linked(report))
        }
    }
}

fn link_and_resolve<E>(
    layout: &ProjectLayout,
    index: &PackagePathIndex,
    snapshot: &ManifestSnapshot,
    resolver_program: &str,
    executor: &mut E,
    interrupt: &InterruptFlag,
) -> Result<LinkReport>
where
    E: ProcessExecutor + ?Sized,
{
    let manifest_path = snapshot.manifest_path();
    let mut manifest = ProjectManifest::from_json_slice(manifest_path, snapshot.manifest_bytes())?;
    for (name, path) in index.iter() {
        manifest.add_path_repository(path, layout.root())?;
        manifest.pin_dev_version(name)?;
    }
    debug!(phase = %CyclePhase::Mutated, packages = index.len(), "manifest mutated");

    write_file(manifest_path, &manifest.to_pretty_json(manifest_path)?)?;
    debug!(phase = %CyclePhase::Written, path = %manifest_path.display(), "mutated manifest written");

    let names = index.names();
    let command = ResolverCommand::update_packages(resolver_program, layout.root(), &names);
    info!(
        phase = %CyclePhase::Resolving,
        packages = %names.join(" "),
        "linking dev packages"
    );
    if interrupt.is_raised() {
        return Err(LinkError::Interrupted {
            stage: "manifest mutation",
        });
    }
    let output = executor.execute(&command);
    if interrupt.is_raised() {
        if let Err(err) = &output {
            debug!(error = %err, "resolver ended after an interruption");
        }
        return Err(LinkError::Interrupted {
            stage: "the resolver run",
        });
    }
    let output = output?;

    let resolver = if output.success() {
        ResolverStatus::Succeeded
    } else {
        warn!(exit_code = output.exit_code, "resolver exited with failure");
        ResolverStatus::Failed {
            exit_code: output.exit_code,
            stderr: output.stderr,
        }
    };

    Ok(LinkReport {
        packages: names.into_iter().map(str::to_string).collect(),
        command_line: command.command_line(),
        resolver,
    })
}
